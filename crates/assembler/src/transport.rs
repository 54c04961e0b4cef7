//! The peer surface and the transport seam
//!
//! `Peer` is everything one assembler can ask of another. Every argument
//! and result is a serde value, so a network transport can carry the calls
//! as opaque records; `Transport` hands out the peer for a system id.
//!
//! `LoopbackTransport` connects assemblers living in the same process. It
//! holds weak references so the assemblers and the transport do not keep
//! each other alive, and it can mark systems unreachable to simulate a
//! partition.

use parking_lot::RwLock;
use plexus_container::Offer;
use plexus_core::{Contract, PlexusError, PlexusResult, SessionId, SystemId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::assembly::Assembly;
use crate::lease::Lease;
use crate::pointer::Pointer;

/// What `setup` carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblyState {
    /// Ranked alternative trees for a session (sent to the origin)
    Preferences(Vec<Contract>),
    /// Move a resolved node of the session on to its next ranked offer
    /// (sent to the origin with the node's pointer)
    Advance,
    /// Accept an offer under the caller's pointer (sent to a participant)
    Commit {
        /// Phase of the commit for the caller's pointer
        phase: u64,
        /// Name of the demand the offer answers
        demand: String,
        /// The offer this system made earlier
        offer: Offer,
        /// Assemblies of the offer's nested demands
        children: Vec<Assembly>,
    },
}

/// Outcome of a phased message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delivery {
    /// The message was newer than anything seen for the pointer and took
    /// effect
    Applied,
    /// The message was stale and was dropped
    Ignored,
}

impl Delivery {
    /// Whether the message took effect
    pub fn is_applied(&self) -> bool {
        *self == Delivery::Applied
    }
}

/// Operations one assembler exposes to applications and to other
/// assemblers
pub trait Peer: Send + Sync {
    /// Open or renew a session
    ///
    /// `origin` is None when an application prepares a session it will own,
    /// or the owning system when the origin enlists a participant.
    fn prepare(
        &self,
        session: SessionId,
        origin: Option<SystemId>,
        systems: Vec<SystemId>,
    ) -> PlexusResult<Lease>;

    /// Submit preferences (on the origin) or commit an offer (on a
    /// participant); returns the resulting pointer, terminal on failure
    fn setup(&self, pointer: Pointer, state: AssemblyState) -> PlexusResult<Pointer>;

    /// Final assembly of a fully resolved session
    fn configure(&self, session: SessionId) -> PlexusResult<Assembly>;

    /// Assembly produced under a pointer
    fn retrieve(&self, pointer: &Pointer) -> PlexusResult<Assembly>;

    /// Tear a session down, everywhere or on one system
    fn remove(&self, session: SessionId, system: Option<SystemId>) -> PlexusResult<()>;

    /// Resolve the subtree rooted at `contract` for the origin `system`
    ///
    /// Returns at once; the outcome arrives later through `report`.
    fn resolve(
        &self,
        session: SessionId,
        phase: u64,
        pointer: Pointer,
        system: SystemId,
        contract: Contract,
        is_final: bool,
    ) -> PlexusResult<Delivery>;

    /// Deliver the outcome of a delegated resolution; None means failure
    fn report(
        &self,
        session: SessionId,
        phase: u64,
        pointer: Pointer,
        assembly: Option<Assembly>,
    ) -> PlexusResult<Delivery>;

    /// Release whatever this system holds under the caller's pointer
    fn release(&self, session: SessionId, phase: u64, pointer: Pointer) -> PlexusResult<Delivery>;

    /// Offers of this system's container for `demand`
    fn offers(&self, session: SessionId, demand: &Contract) -> PlexusResult<Vec<Offer>>;
}

/// Finds the peer for a system id
pub trait Transport: Send + Sync {
    /// Peer of `system`
    ///
    /// # Errors
    /// `RemoteUnavailable` if the system cannot be reached.
    fn peer(&self, system: &SystemId) -> PlexusResult<Arc<dyn Peer>>;
}

/// In-process transport
#[derive(Default)]
pub struct LoopbackTransport {
    peers: RwLock<HashMap<SystemId, Weak<dyn Peer>>>,
    unreachable: RwLock<HashSet<SystemId>>,
}

impl LoopbackTransport {
    /// Empty transport
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `peer` reachable as `system`
    pub fn register<P: Peer + 'static>(&self, system: SystemId, peer: &Arc<P>) {
        let peer: Arc<dyn Peer> = peer.clone();
        debug!(target: "plexus::assembler", system = %system, "Peer registered");
        self.peers.write().insert(system, Arc::downgrade(&peer));
    }

    /// Forget a system
    pub fn unregister(&self, system: &SystemId) -> bool {
        self.peers.write().remove(system).is_some()
    }

    /// Cut (false) or restore (true) the link to a system
    pub fn set_reachable(&self, system: &SystemId, reachable: bool) {
        let mut unreachable = self.unreachable.write();
        if reachable {
            unreachable.remove(system);
        } else {
            unreachable.insert(system.clone());
        }
    }

    /// Registered systems
    pub fn systems(&self) -> Vec<SystemId> {
        let mut systems: Vec<SystemId> = self.peers.read().keys().cloned().collect();
        systems.sort();
        systems
    }
}

impl Transport for LoopbackTransport {
    fn peer(&self, system: &SystemId) -> PlexusResult<Arc<dyn Peer>> {
        if self.unreachable.read().contains(system) {
            return Err(PlexusError::unavailable(system, "link down"));
        }
        self.peers
            .read()
            .get(system)
            .and_then(Weak::upgrade)
            .ok_or_else(|| PlexusError::unavailable(system, "not registered"))
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("systems", &self.systems())
            .finish()
    }
}
