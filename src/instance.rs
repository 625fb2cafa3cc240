//! # Remote instances
//!
//! Agents act on remote compute instances started by an external provisioning
//! service. This module defines the interfaces of that service
//! ([`InstanceProvider`], [`RemoteInstance`], [`BrowserControl`]) and the
//! [`InstanceManager`], which maps affinity keys to instances.
//!
//! ## Resolution
//!
//! - A key that is already mapped resolves to the same instance every time.
//! - `"shared"` starts one instance (within the configured timeout budget) the
//!   first time it is asked for.
//! - Any other key is an instance id looked up in the provider's list. An id
//!   the provider does not know is not an error: the manager logs the fallback
//!   and resolves to the shared instance, reporting the downgrade in
//!   [`Resolution::fell_back`] so the caller can rebind the agent.
//!
//! ## Teardown
//!
//! [`InstanceManager::teardown`] releases every tracked instance (browser
//! first, then the instance). A failed release is logged and recorded in the
//! returned [`TeardownReport`]; it never stops the remaining releases.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::BoxError;
use tracing::{debug, error, info, warn};

use crate::agent::Affinity;
use crate::error::{Result, SwarmError};

/// Kind of machine the provisioning service starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    #[default]
    Ubuntu,
    Browser,
    Windows,
}

/// Lifecycle status reported by an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Deploying,
    Running,
    Paused,
    Terminated,
    Error,
}

/// Arguments of the shell tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShellCommand {
    /// The command to run.
    #[serde(default)]
    pub command: Option<String>,
    /// Restart the shell session instead of running a command.
    #[serde(default)]
    pub restart: bool,
}

/// Arguments of the computer-control tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComputerCommand {
    /// Action to perform, e.g. `screenshot`, `left_click`, `type`, `key`.
    pub action: String,
    /// Screen coordinate for pointer actions.
    #[serde(default)]
    pub coordinate: Option<[i64; 2]>,
    /// Text for typing and key actions.
    #[serde(default)]
    pub text: Option<String>,
}

/// Arguments of the file-edit tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditCommand {
    /// One of `view`, `create`, `str_replace`, `insert`, `undo_edit`.
    pub command: String,
    /// Absolute path of the file.
    pub path: String,
    #[serde(default)]
    pub file_text: Option<String>,
    #[serde(default)]
    pub old_str: Option<String>,
    #[serde(default)]
    pub new_str: Option<String>,
    #[serde(default)]
    pub insert_line: Option<u64>,
    #[serde(default)]
    pub view_range: Option<[i64; 2]>,
}

/// An action executed on a remote instance by one of the built-in tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "lowercase")]
pub enum InstanceAction {
    Shell(ShellCommand),
    Computer(ComputerCommand),
    Edit(EditCommand),
}

/// Browser control attached to an instance.
#[async_trait]
pub trait BrowserControl: Send + Sync + Debug {
    async fn stop(&self) -> std::result::Result<(), BoxError>;
}

/// Handle to a machine started by the provisioning service.
#[async_trait]
pub trait RemoteInstance: Send + Sync + Debug {
    fn id(&self) -> &str;

    fn status(&self) -> InstanceStatus;

    fn is_active(&self) -> bool {
        self.status() == InstanceStatus::Running
    }

    /// Runs a tool action on the instance.
    async fn execute(&self, action: InstanceAction) -> std::result::Result<Value, BoxError>;

    /// Browser control, when the instance exposes one.
    fn browser(&self) -> Option<Arc<dyn BrowserControl>> {
        None
    }

    async fn stop(&self) -> std::result::Result<(), BoxError>;
}

/// The external provisioning service.
#[async_trait]
pub trait InstanceProvider: Send + Sync {
    /// Starts a new instance. `timeout` is the lifetime budget granted to it.
    async fn create(
        &self,
        kind: InstanceKind,
        timeout: Duration,
    ) -> std::result::Result<Arc<dyn RemoteInstance>, BoxError>;

    /// Lists the instances already provisioned for this account.
    async fn list(&self) -> std::result::Result<Vec<Arc<dyn RemoteInstance>>, BoxError>;
}

/// Outcome of resolving an affinity key.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub instance: Arc<dyn RemoteInstance>,
    /// The affinity the instance is tracked under. `Shared` after a fallback.
    pub affinity: Affinity,
    /// Whether an explicit id was downgraded to the shared instance.
    pub fell_back: bool,
}

/// Which release failed during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStage {
    Browser,
    Instance,
}

/// A release that failed during teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub affinity: String,
    pub instance_id: String,
    pub stage: ReleaseStage,
    pub message: String,
}

/// What a teardown released and what it could not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Ids of instances whose stop call succeeded.
    pub released: Vec<String>,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Maps affinity keys to remote instances and owns their teardown.
///
/// Not designed for concurrent mutation: the run loop is its only caller and
/// resolves one agent at a time.
pub struct InstanceManager {
    provider: Arc<dyn InstanceProvider>,
    kind: InstanceKind,
    timeout: Duration,
    // insertion order is the teardown order
    instances: Vec<(String, Arc<dyn RemoteInstance>)>,
}

impl InstanceManager {
    pub fn new(provider: Arc<dyn InstanceProvider>, kind: InstanceKind, timeout: Duration) -> Self {
        Self {
            provider,
            kind,
            timeout,
            instances: Vec::new(),
        }
    }

    /// The instance tracked under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Arc<dyn RemoteInstance>> {
        self.instances
            .iter()
            .find(|(tracked, _)| tracked == key)
            .map(|(_, instance)| instance)
    }

    /// Tracked affinity keys, in the order they were first resolved.
    pub fn keys(&self) -> Vec<&str> {
        self.instances.iter().map(|(key, _)| key.as_str()).collect()
    }

    pub fn tracked(&self) -> usize {
        self.instances.len()
    }

    /// Resolves an affinity key to an instance, creating the shared instance
    /// on first use.
    pub async fn get_or_create(&mut self, affinity: &Affinity) -> Result<Resolution> {
        if let Some(instance) = self.get(affinity.key()) {
            return Ok(Resolution {
                instance: instance.clone(),
                affinity: affinity.clone(),
                fell_back: false,
            });
        }

        let id = match affinity {
            Affinity::Shared => {
                let instance = self.start_shared().await?;
                return Ok(Resolution {
                    instance,
                    affinity: Affinity::Shared,
                    fell_back: false,
                });
            }
            Affinity::Instance(id) => id,
        };

        let existing = self
            .provider
            .list()
            .await
            .map_err(|e| SwarmError::provisioning("failed to list instances", e))?;

        if let Some(instance) = existing.into_iter().find(|instance| instance.id() == id) {
            debug!(instance_id = %id, "Attached to existing instance");
            self.instances.push((id.clone(), instance.clone()));
            return Ok(Resolution {
                instance,
                affinity: affinity.clone(),
                fell_back: false,
            });
        }

        warn!(instance_id = %id, "Instance not found, falling back to shared instance");
        let instance = match self.get(Affinity::Shared.key()).cloned() {
            Some(shared) => shared,
            None => self.start_shared().await?,
        };
        Ok(Resolution {
            instance,
            affinity: Affinity::Shared,
            fell_back: true,
        })
    }

    async fn start_shared(&mut self) -> Result<Arc<dyn RemoteInstance>> {
        let instance = self
            .provider
            .create(self.kind, self.timeout)
            .await
            .map_err(|e| SwarmError::provisioning("failed to start shared instance", e))?;
        info!(instance_id = %instance.id(), kind = ?self.kind, "Started shared instance");
        self.instances
            .push((Affinity::Shared.key().to_string(), instance.clone()));
        Ok(instance)
    }

    /// Releases every tracked instance and clears the tracked set. Calling it
    /// again releases nothing.
    pub async fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let mut released_ids = HashSet::new();

        for (key, instance) in std::mem::take(&mut self.instances) {
            // one instance may be tracked under more than one key
            if !released_ids.insert(instance.id().to_string()) {
                continue;
            }

            if let Some(browser) = instance.browser() {
                if let Err(e) = browser.stop().await {
                    error!(instance_id = %instance.id(), error = %e, "Failed to stop browser");
                    report.failures.push(TeardownFailure {
                        affinity: key.clone(),
                        instance_id: instance.id().to_string(),
                        stage: ReleaseStage::Browser,
                        message: e.to_string(),
                    });
                }
            }

            match instance.stop().await {
                Ok(()) => {
                    info!(instance_id = %instance.id(), "Stopped instance");
                    report.released.push(instance.id().to_string());
                }
                Err(e) => {
                    error!(instance_id = %instance.id(), error = %e, "Failed to stop instance");
                    report.failures.push(TeardownFailure {
                        affinity: key,
                        instance_id: instance.id().to_string(),
                        stage: ReleaseStage::Instance,
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

impl Debug for InstanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceManager")
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .field("keys", &self.keys())
            .finish()
    }
}
