//! # Token usage
//!
//! [`Usage`] records what a single completion consumed. The run loop keeps the
//! final completion's usage and a running total across every turn.

use serde::{Deserialize, Serialize};
use std::ops::Add;

/// Token usage reported by one completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// The number of tokens in the input prompt.
    pub prompt_tokens: usize,

    /// The number of tokens in the generated completion.
    pub completion_tokens: usize,

    /// The total number of tokens (prompt + completion).
    pub total_tokens: usize,

    /// The number of completion requests this usage covers.
    pub request_count: usize,
}

impl Usage {
    /// Creates a new `Usage` instance from the prompt and completion token counts.
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            request_count: 1,
        }
    }

    /// Creates an empty `Usage` instance with all fields set to zero.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds the values from another `Usage` instance to this one.
    pub fn add_usage(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.request_count += other.request_count;
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self.add_usage(&other);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_usage_new() {
        let usage = Usage::new(100, 50);
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(usage.request_count, 1);
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = Usage::empty();
        total.add_usage(&Usage::new(10, 5));
        total.add_usage(&Usage::new(20, 10));
        assert_eq!(
            total,
            Usage {
                prompt_tokens: 30,
                completion_tokens: 15,
                total_tokens: 45,
                request_count: 2,
            }
        );
        assert_eq!(Usage::new(1, 1) + Usage::new(2, 2), Usage {
            prompt_tokens: 3,
            completion_tokens: 3,
            total_tokens: 6,
            request_count: 2,
        });
    }
}
