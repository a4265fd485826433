// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-supplied time budget for long-running pipeline stages.

use std::time::{Duration, Instant};

use crate::errors::{Error, Result};

/// A point in time after which a pipeline stops at its next checkpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { at: None }
    }

    /// Expires `timeout` from now; `None` never expires.
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Fails with [`Error::Timeout`] naming `stage` once expired.
    pub fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_expired() {
            return Err(Error::Timeout(stage));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_expires() {
        assert!(Deadline::none().check("chunking").is_ok());
        assert!(Deadline::after(None).check("chunking").is_ok());
    }

    #[test]
    fn test_zero_timeout_expires_immediately() {
        let deadline = Deadline::after(Some(Duration::ZERO));
        assert!(matches!(deadline.check("embedding"), Err(Error::Timeout("embedding"))));
    }

    #[test]
    fn test_generous_timeout() {
        let deadline = Deadline::after(Some(Duration::from_secs(3600)));
        assert!(!deadline.is_expired());
    }
}
