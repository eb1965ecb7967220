use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Source of viewport generations. Starting a new generation supersedes
/// every token handed out for older ones.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Supersede the current generation and return a token for the new one.
    pub fn advance(&self) -> ViewportToken {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        ViewportToken {
            generation,
            current: Arc::clone(&self.current),
        }
    }

    pub fn token(&self) -> ViewportToken {
        ViewportToken {
            generation: self.current(),
            current: Arc::clone(&self.current),
        }
    }
}

/// Identifies the viewport a unit of work belongs to. Once the viewport
/// changes the token is stale and its results must be discarded.
#[derive(Debug, Clone)]
pub struct ViewportToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl ViewportToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    pub fn ensure_current(&self) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(Error::Superseded {
                generation: self.generation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_supersedes_older_tokens() {
        let counter = GenerationCounter::new();
        let first = counter.advance();
        assert_eq!(first.generation(), 1);
        assert!(first.is_current());

        let second = counter.advance();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert_eq!(
            first.ensure_current(),
            Err(Error::Superseded { generation: 1 })
        );
        assert_eq!(second.ensure_current(), Ok(()));
    }

    #[test]
    fn clones_share_the_counter() {
        let counter = GenerationCounter::new();
        let shared = counter.clone();
        let token = counter.token();
        shared.advance();
        assert!(!token.is_current());
        assert_eq!(counter.current(), 1);
    }
}
