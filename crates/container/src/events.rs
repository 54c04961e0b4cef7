//! Container status-change events

use plexus_core::ElementId;
use serde::{Deserialize, Serialize};

use crate::element::ElementKind;

/// Something changed in a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerEvent {
    /// An element reached `Started` (factories/allocators when registered)
    ElementStarted {
        /// Element
        element: ElementId,
        /// Its kind
        kind: ElementKind,
    },
    /// An element was torn down normally
    ElementStopped {
        /// Element
        element: ElementId,
        /// Its kind
        kind: ElementKind,
    },
    /// An element failed or was lost and has been discarded
    ElementFailed {
        /// Element
        element: ElementId,
        /// What happened
        reason: String,
    },
    /// A registered template was committed
    TemplateChanged {
        /// Element owning the template
        element: ElementId,
        /// Revision after the commit
        revision: u64,
    },
    /// An allocator's free vector changed
    CapacityChanged {
        /// Allocator
        allocator: ElementId,
        /// Free capacity per axis
        free: Vec<i64>,
    },
}

impl ContainerEvent {
    /// Element the event is about
    pub fn element(&self) -> ElementId {
        match self {
            ContainerEvent::ElementStarted { element, .. }
            | ContainerEvent::ElementStopped { element, .. }
            | ContainerEvent::ElementFailed { element, .. }
            | ContainerEvent::TemplateChanged { element, .. } => *element,
            ContainerEvent::CapacityChanged { allocator, .. } => *allocator,
        }
    }
}
