//! Bindings: one negotiation node per demand
//!
//! ## State machine
//!
//! ```text
//! RESOLVING ──► RESOLVED ──► RELEASING ──► (removed)
//!     │                          ▲
//!     └──────────────────────────┘
//! ```
//!
//! A binding is created RESOLVING when its demand is first looked at, becomes
//! RESOLVED once an element answers it, and goes through RELEASING on its way
//! out of the arena. Releases always run children first.
//!
//! Advancing a node (`setup` on its pointer) releases what answers it and
//! puts it back to RESOLVING while the next untried offer is attempted.

use plexus_container::Offer;
use plexus_core::{Contract, ElementId, SystemId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::assembly::Assembly;
use crate::pointer::{NodeKey, Pointer};

/// Negotiation state of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingState {
    /// Looking for an element
    Resolving,
    /// An element answers the demand
    Resolved,
    /// Being torn down
    Releasing,
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindingState::Resolving => "RESOLVING",
            BindingState::Resolved => "RESOLVED",
            BindingState::Releasing => "RELEASING",
        };
        f.write_str(name)
    }
}

/// Where the answering element lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Placement {
    Unplaced,
    /// Committed in the local container
    Local { element: ElementId },
    /// Committed on another system through `setup`
    Remote { system: SystemId },
    /// Delegated with `resolve`; waiting for the report of `phase`
    Awaiting { system: SystemId, phase: u64 },
    /// Resolved by another system
    Delegated { system: SystemId },
}

impl Placement {
    pub(crate) fn system(&self) -> Option<&SystemId> {
        match self {
            Placement::Remote { system }
            | Placement::Awaiting { system, .. }
            | Placement::Delegated { system } => Some(system),
            _ => None,
        }
    }
}

/// Identity of an offer across repeated `derive_setups` calls
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct OfferKey {
    system: SystemId,
    source: ElementId,
    existing: Option<ElementId>,
    setup: String,
}

impl OfferKey {
    pub(crate) fn of(offer: &Offer) -> Self {
        Self {
            system: offer.system.clone(),
            source: offer.source,
            existing: offer.existing,
            setup: offer.setup.name().to_string(),
        }
    }
}

/// Negotiation node for one demand
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) pointer: Pointer,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) demand: Contract,
    pub(crate) state: BindingState,
    pub(crate) reuse: bool,
    /// Last phase this node sent to a remote system
    pub(crate) phase: u64,
    /// Newest report phase accepted
    pub(crate) applied_report: u64,
    /// Report delivered for the current delegation, if any
    pub(crate) report: Option<Option<Assembly>>,
    pub(crate) assembly: Option<Assembly>,
    pub(crate) children: Vec<NodeKey>,
    pub(crate) placement: Placement,
    /// Offers already tried for this node, in rank order
    pub(crate) tried: Vec<OfferKey>,
}

impl Binding {
    pub(crate) fn new(pointer: Pointer, parent: Option<NodeKey>, demand: Contract) -> Self {
        Self {
            pointer,
            parent,
            demand,
            state: BindingState::Resolving,
            reuse: false,
            phase: 0,
            applied_report: 0,
            report: None,
            assembly: None,
            children: Vec::new(),
            placement: Placement::Unplaced,
            tried: Vec::new(),
        }
    }

    /// Advance and return the phase for the next message to a remote system
    pub(crate) fn next_phase(&mut self) -> u64 {
        self.phase += 1;
        self.phase
    }

    pub(crate) fn info(&self) -> BindingInfo {
        let (system, element) = match (&self.placement, &self.assembly) {
            (Placement::Local { element }, _) => (None, Some(*element)),
            (placement, Some(assembly)) => (
                placement.system().cloned().or_else(|| Some(assembly.system().clone())),
                Some(assembly.element()),
            ),
            (placement, None) => (placement.system().cloned(), None),
        };
        BindingInfo {
            pointer: self.pointer.clone(),
            demand: self.demand.name().to_string(),
            state: self.state,
            reused: self.reuse,
            phase: self.phase,
            remote: system,
            element,
            children: self.children.len(),
        }
    }
}

/// Read-only description of a binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingInfo {
    /// Pointer of the binding
    pub pointer: Pointer,
    /// Name of the demand
    pub demand: String,
    /// Negotiation state
    pub state: BindingState,
    /// Whether the element was carried over from an earlier negotiation
    pub reused: bool,
    /// Last phase sent for this node
    pub phase: u64,
    /// Remote system involved, if the element is not local
    pub remote: Option<SystemId>,
    /// Answering element once resolved
    pub element: Option<ElementId>,
    /// Number of child bindings
    pub children: usize,
}
