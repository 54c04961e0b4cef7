//! Element kinds and the lifecycle state machine
//!
//! ```text
//! Created → ContextBound → Started ⇄ Paused
//!                              ↓        ↓
//!                            Stopped ←──┘
//!                              ↓
//!                        ContextUnbound → Discarded
//! ```
//!
//! A failure during creation or binding skips straight to teardown:
//! `Created`/`ContextBound` may move to `ContextUnbound`, and every state may
//! move to `Discarded` when the element is lost.

use plexus_core::{Contract, ElementId, PlexusError, PlexusResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an element is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// Produces instances
    Factory,
    /// Produces resources
    Allocator,
    /// A running component created by a factory
    Instance,
    /// A reservation created by an allocator
    Resource,
}

impl ElementKind {
    /// Display name
    pub const fn name(&self) -> &'static str {
        match self {
            ElementKind::Factory => "factory",
            ElementKind::Allocator => "allocator",
            ElementKind::Instance => "instance",
            ElementKind::Resource => "resource",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementState {
    /// Constructed, not yet bound
    Created,
    /// Context bound, not yet started
    ContextBound,
    /// Running
    Started,
    /// Suspended, may be resumed
    Paused,
    /// Stopped, context still bound
    Stopped,
    /// Context released
    ContextUnbound,
    /// Gone for good
    Discarded,
}

impl ElementState {
    /// Display name
    pub const fn name(&self) -> &'static str {
        match self {
            ElementState::Created => "created",
            ElementState::ContextBound => "context-bound",
            ElementState::Started => "started",
            ElementState::Paused => "paused",
            ElementState::Stopped => "stopped",
            ElementState::ContextUnbound => "context-unbound",
            ElementState::Discarded => "discarded",
        }
    }

    /// Whether the element is running or paused
    pub const fn is_live(&self) -> bool {
        matches!(self, ElementState::Started | ElementState::Paused)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: ElementState) -> bool {
        use ElementState::*;
        if next == Discarded {
            return *self != Discarded;
        }
        matches!(
            (self, next),
            (Created, ContextBound)
                | (Created, ContextUnbound)
                | (ContextBound, Started)
                | (ContextBound, ContextUnbound)
                | (Started, Paused)
                | (Paused, Started)
                | (Started, Stopped)
                | (Paused, Stopped)
                | (Stopped, ContextUnbound)
        )
    }

    /// Move to `next`, or fail with `InvalidTransition`
    pub fn transition(&mut self, element: ElementId, next: ElementState) -> PlexusResult<()> {
        if !self.can_transition_to(next) {
            return Err(PlexusError::InvalidTransition {
                element,
                from: self.name().to_string(),
                to: next.name().to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time description of an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementStatus {
    /// Element id
    pub id: ElementId,
    /// Kind
    pub kind: ElementKind,
    /// Lifecycle state
    pub state: ElementState,
    /// Name of the factory/allocator template, or of the setup
    pub name: String,
    /// Factory or allocator the element was created by
    pub source: Option<ElementId>,
    /// Number of assemblies holding the element
    pub refs: usize,
    /// Current status contract (setup template or element template)
    pub contract: Contract,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let id = ElementId::new();
        let mut state = ElementState::Created;
        for next in [
            ElementState::ContextBound,
            ElementState::Started,
            ElementState::Paused,
            ElementState::Started,
            ElementState::Stopped,
            ElementState::ContextUnbound,
            ElementState::Discarded,
        ] {
            state.transition(id, next).unwrap();
        }
        assert_eq!(state, ElementState::Discarded);
    }

    #[test]
    fn test_cannot_start_unbound() {
        let mut state = ElementState::Created;
        let err = state
            .transition(ElementId::new(), ElementState::Started)
            .unwrap_err();
        assert!(matches!(err, PlexusError::InvalidTransition { .. }));
        assert_eq!(state, ElementState::Created);
    }

    #[test]
    fn test_discarded_is_terminal() {
        let state = ElementState::Discarded;
        for next in [
            ElementState::Created,
            ElementState::Started,
            ElementState::Discarded,
        ] {
            assert!(!state.can_transition_to(next));
        }
    }

    #[test]
    fn test_stopped_cannot_restart() {
        assert!(!ElementState::Stopped.can_transition_to(ElementState::Started));
        assert!(ElementState::Stopped.can_transition_to(ElementState::ContextUnbound));
    }

    #[test]
    fn test_live_states() {
        assert!(ElementState::Started.is_live());
        assert!(ElementState::Paused.is_live());
        assert!(!ElementState::Stopped.is_live());
        assert!(!ElementState::ContextBound.is_live());
    }
}
