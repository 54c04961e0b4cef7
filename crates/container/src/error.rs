//! Errors raised by element code
//!
//! Factories, allocators and instances report failures with `ElementError`.
//! The container turns them into `PlexusError::Element` for the element
//! concerned; siblings are never affected.

use plexus_core::{ElementId, PlexusError};
use thiserror::Error;

/// Failure inside a factory, allocator or instance
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ElementError {
    /// The element could not be created from its setup
    #[error("create failed: {0}")]
    Create(String),

    /// The element rejected its context
    #[error("context rejected: {0}")]
    Context(String),

    /// Start (or resume) failed
    #[error("start failed: {0}")]
    Start(String),

    /// Pause failed
    #[error("pause failed: {0}")]
    Pause(String),

    /// Stop failed
    #[error("stop failed: {0}")]
    Stop(String),

    /// A checkpoint image could not be produced or loaded
    #[error("checkpoint failed: {0}")]
    Checkpoint(String),
}

impl ElementError {
    /// Attach the element id and convert to the crate-wide error
    pub fn into_plexus(self, element: ElementId) -> PlexusError {
        PlexusError::element(element, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_plexus_keeps_reason() {
        let id = ElementId::new();
        let err = ElementError::Start("no paper".into()).into_plexus(id);
        match err {
            PlexusError::Element { element, reason } => {
                assert_eq!(element, id);
                assert!(reason.contains("no paper"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
