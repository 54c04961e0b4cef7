//! Error types for Plexus
//!
//! This module defines the error hierarchy shared by every layer of the
//! middleware. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! ## Taxonomy
//!
//! - **Configuration**: malformed contract trees and invalid settings. Raised
//!   synchronously by the mutation that would have produced the bad state.
//! - **Negotiation**: only surfaced when a caller asks for a result that does
//!   not exist. A demand nobody can satisfy is a `false`/`None`, not an error.
//! - **Protocol/liveness**: unknown sessions, stale pointers, expired leases,
//!   unreachable peers. The affected session is torn down.
//! - **Element**: a factory, allocator or instance failed a lifecycle call.

use crate::contract::ContractType;
use crate::types::{ElementId, SessionId, SystemId};
use std::io;
use thiserror::Error;

/// Result type alias for Plexus operations
pub type PlexusResult<T> = std::result::Result<T, PlexusError>;

/// Error types for the Plexus middleware
#[derive(Debug, Error)]
pub enum PlexusError {
    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------
    /// A sibling with the same kind and name already exists
    #[error("duplicate {kind} contract '{name}'")]
    DuplicateContract {
        /// Kind of the rejected child
        kind: ContractType,
        /// Name of the rejected child
        name: String,
    },

    /// A child kind is not allowed below the parent kind
    #[error("{child} cannot be a child of {parent}")]
    InvalidChild {
        /// Parent kind
        parent: ContractType,
        /// Rejected child kind
        child: ContractType,
    },

    /// A feature value does not have the declared feature type
    #[error("feature '{feature}' declared as {expected} but got {actual}")]
    FeatureTypeMismatch {
        /// Feature name (may be empty when validated before naming)
        feature: String,
        /// Declared type
        expected: &'static str,
        /// Type of the supplied value
        actual: &'static str,
    },

    /// A comparator was used with the wrong constraint shape
    #[error("comparator {0} is not valid here")]
    InvalidComparator(String),

    /// A node whose feature payload does not fit its kind
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A range constraint with minimum above maximum
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ------------------------------------------------------------------
    // Negotiation
    // ------------------------------------------------------------------
    /// Every preference of a session was exhausted without a match
    #[error("no preference of session {0} could be resolved")]
    NoMatchingPreference(SessionId),

    /// A session or binding is not in the RESOLVED state
    #[error("session {session} is not resolved: {reason}")]
    NotResolved {
        /// Session that was asked for a result
        session: SessionId,
        /// What is missing
        reason: String,
    },

    // ------------------------------------------------------------------
    // Protocol / liveness
    // ------------------------------------------------------------------
    /// The session is not known on this system
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The session is already owned by another origin system
    #[error("session {0} already exists")]
    SessionExists(SessionId),

    /// The pointer does not name a live negotiation node
    #[error("invalid pointer: {0}")]
    InvalidPointer(String),

    /// The session lease ran out before it was renewed
    #[error("lease of session {0} expired")]
    LeaseExpired(SessionId),

    /// The session was removed while it was being resolved
    #[error("session {0} was cancelled")]
    SessionCancelled(SessionId),

    /// A remote system could not be reached
    #[error("system {system} unavailable: {reason}")]
    RemoteUnavailable {
        /// Unreachable system
        system: SystemId,
        /// Transport-level reason
        reason: String,
    },

    /// A remote system did not report in time
    #[error("system {0} did not report in time")]
    RemoteTimeout(SystemId),

    // ------------------------------------------------------------------
    // Element
    // ------------------------------------------------------------------
    /// An element failed a lifecycle call
    #[error("element {element} failed: {reason}")]
    Element {
        /// Failed element (nil id for elements that never got one)
        element: ElementId,
        /// Failure description
        reason: String,
    },

    /// No element with this id is registered
    #[error("unknown element {0}")]
    UnknownElement(ElementId),

    /// A lifecycle transition that the state machine forbids
    #[error("element {element}: cannot go from {from} to {to}")]
    InvalidTransition {
        /// Element
        element: ElementId,
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// The element still has live dependants
    #[error("element {0} is still in use")]
    ElementInUse(ElementId),

    // ------------------------------------------------------------------
    // Other
    // ------------------------------------------------------------------
    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlexusError {
    /// Build a `RemoteUnavailable` error
    pub fn unavailable(system: &SystemId, reason: impl Into<String>) -> Self {
        PlexusError::RemoteUnavailable {
            system: system.clone(),
            reason: reason.into(),
        }
    }

    /// Build an `Element` error
    pub fn element(element: ElementId, reason: impl Into<String>) -> Self {
        PlexusError::Element {
            element,
            reason: reason.into(),
        }
    }

    /// True for configuration errors (bad trees or settings)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PlexusError::DuplicateContract { .. }
                | PlexusError::InvalidChild { .. }
                | PlexusError::FeatureTypeMismatch { .. }
                | PlexusError::InvalidComparator(_)
                | PlexusError::InvalidPayload(_)
                | PlexusError::InvalidRange(_)
                | PlexusError::InvalidConfig(_)
        )
    }

    /// True for element failures, which only affect the failing element
    pub fn is_element(&self) -> bool {
        matches!(
            self,
            PlexusError::Element { .. }
                | PlexusError::UnknownElement(_)
                | PlexusError::InvalidTransition { .. }
                | PlexusError::ElementInUse(_)
        )
    }

    /// True for protocol and liveness errors, which tear a session down
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            PlexusError::UnknownSession(_)
                | PlexusError::SessionExists(_)
                | PlexusError::InvalidPointer(_)
                | PlexusError::LeaseExpired(_)
                | PlexusError::SessionCancelled(_)
                | PlexusError::RemoteUnavailable { .. }
                | PlexusError::RemoteTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_duplicate() {
        let err = PlexusError::DuplicateContract {
            kind: ContractType::InterfaceDemand,
            name: "Printer".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("duplicate"));
        assert!(msg.contains("Printer"));
    }

    #[test]
    fn test_error_display_invalid_child() {
        let err = PlexusError::InvalidChild {
            parent: ContractType::FeatureDemand,
            child: ContractType::DimensionDemand,
        };
        assert!(err.to_string().contains("cannot be a child"));
    }

    #[test]
    fn test_error_display_remote() {
        let err = PlexusError::unavailable(&SystemId::new("node-b"), "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("node-b"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_error_classification() {
        assert!(PlexusError::InvalidRange("5 > 1".into()).is_configuration());
        assert!(!PlexusError::InvalidRange("5 > 1".into()).is_protocol());
        assert!(PlexusError::LeaseExpired(SessionId::new()).is_protocol());
        assert!(PlexusError::RemoteTimeout(SystemId::new("x")).is_protocol());
        assert!(!PlexusError::UnknownElement(ElementId::new()).is_protocol());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: PlexusError = io_err.into();
        assert!(matches!(err, PlexusError::Io(_)));
    }
}
