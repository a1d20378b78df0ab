//! Cooperative cancellation.
//!
//! A `CancelToken` is cloned down the call chain of one workflow run. It is polled at
//! the top of every copy sampling iteration and between phases; the copy supervisor
//! honours it by killing the copy process tree. Tokens also observe the process-wide
//! `shutdown` flag so Ctrl-C cancels whatever is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{MoveError, Result};
use crate::shutdown;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || shutdown::is_requested()
    }

    /// `Err(MoveError::Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MoveError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(b.check().is_ok());
        a.cancel();
        assert!(b.is_cancelled());
        assert!(matches!(b.check(), Err(MoveError::Cancelled)));
    }
}
