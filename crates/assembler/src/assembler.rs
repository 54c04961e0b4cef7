//! The assembler service
//!
//! One `Assembler` runs on every system, next to its container. It plays two
//! roles at once:
//!
//! - **Origin** for sessions prepared by local applications: it stores the
//!   preferences, runs the resolver and hands out the final assembly.
//! - **Participant** for sessions owned elsewhere: it answers offer queries,
//!   commits offers under the origin's pointers, and (peer-to-peer) resolves
//!   delegated subtrees on a worker thread, reporting back asynchronously.
//!
//! ## Phases
//!
//! Messages about one pointer carry a phase. A participant applies `resolve`,
//! `release` and commits only if their phase is newer than any it applied for
//! that pointer; the origin applies a `report` only if it answers the phase
//! currently awaited. Stale messages are answered with `Delivery::Ignored`.
//!
//! ## Teardown
//!
//! `remove`, lease expiry and protocol failures all end in the same
//! teardown: bindings are released children first, remote parts through
//! `release`, and participants are told to drop the session. A session being
//! resolved is only flagged; the resolver notices between steps and the
//! teardown happens on its thread.

use dashmap::DashMap;
use parking_lot::Mutex;
use plexus_container::{Container, Offer};
use plexus_core::{Contract, ContractType, ElementId, PlexusError, PlexusResult, SessionId, SystemId};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::assembly::Assembly;
use crate::binding::{BindingInfo, BindingState, Placement};
use crate::config::{AssemblerConfig, Strategy};
use crate::lease::{deadline_after, Lease, LeaseTable};
use crate::pointer::{NodeKey, Pointer, Target};
use crate::ranking::{PreferReuse, SetupRanker};
use crate::resolver::{assembly_for, Resolver};
use crate::session::{InboundEntry, InboundState, Session, SessionHandle};
use crate::transport::{AssemblyState, Delivery, Peer, Transport};

/// Assembler of one system
pub struct Assembler {
    config: AssemblerConfig,
    container: Arc<Container>,
    transport: Arc<dyn Transport>,
    ranker: Box<dyn SetupRanker>,
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    leases: Mutex<LeaseTable>,
    this: Weak<Assembler>,
}

impl Assembler {
    /// Create an assembler ranking offers with `PreferReuse`
    ///
    /// # Errors
    /// `InvalidConfig` if the configuration is invalid or names another
    /// system than the container.
    pub fn new(
        config: AssemblerConfig,
        container: Arc<Container>,
        transport: Arc<dyn Transport>,
    ) -> PlexusResult<Arc<Self>> {
        Self::with_ranker(config, container, transport, Box::new(PreferReuse))
    }

    /// Create an assembler with a custom ranking
    pub fn with_ranker(
        config: AssemblerConfig,
        container: Arc<Container>,
        transport: Arc<dyn Transport>,
        ranker: Box<dyn SetupRanker>,
    ) -> PlexusResult<Arc<Self>> {
        config.validate()?;
        if &config.system != container.system() {
            return Err(PlexusError::InvalidConfig(format!(
                "assembler system {} does not match container system {}",
                config.system,
                container.system()
            )));
        }
        info!(
            target: "plexus::assembler",
            system = %config.system,
            strategy = %config.strategy,
            "Assembler started"
        );
        Ok(Arc::new_cyclic(|this| Self {
            config,
            container,
            transport,
            ranker,
            sessions: DashMap::new(),
            leases: Mutex::new(LeaseTable::new()),
            this: this.clone(),
        }))
    }

    /// Hosting system
    pub fn system(&self) -> &SystemId {
        &self.config.system
    }

    /// Configuration
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Local container
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub(crate) fn ranker(&self) -> &dyn SetupRanker {
        self.ranker.as_ref()
    }

    pub(crate) fn peer(&self, system: &SystemId) -> PlexusResult<Arc<dyn Peer>> {
        self.transport.peer(system)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    fn lookup(&self, session: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&session).map(|e| Arc::clone(e.value()))
    }

    /// Live session, tearing it down first if its lease ran out
    fn handle(&self, session: SessionId) -> PlexusResult<Arc<SessionHandle>> {
        let handle = self
            .lookup(session)
            .ok_or(PlexusError::UnknownSession(session))?;
        if self.leases.lock().is_expired(&session, Instant::now()) {
            warn!(target: "plexus::lease", session = %session, "Lease expired");
            self.cancel_or_teardown(session, true);
            return Err(PlexusError::LeaseExpired(session));
        }
        Ok(handle)
    }

    fn renew_lease(&self, handle: &SessionHandle, session: SessionId) -> Lease {
        let duration = self.config.lease_duration();
        self.leases
            .lock()
            .renew(session, deadline_after(Instant::now(), duration));
        let lease = Lease::starting_now(session, duration);
        handle.state.lock().lease = Some(lease.clone());
        lease
    }

    /// Sessions known here
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        sessions.sort();
        sessions
    }

    /// Lease currently granted to a session
    pub fn lease(&self, session: SessionId) -> Option<Lease> {
        self.lookup(session)
            .and_then(|handle| handle.state.lock().lease.clone())
    }

    /// Bindings of a session, in arena order
    pub fn bindings(&self, session: SessionId) -> PlexusResult<Vec<BindingInfo>> {
        let handle = self
            .lookup(session)
            .ok_or(PlexusError::UnknownSession(session))?;
        let state = handle.state.lock();
        Ok(state.arena.iter().map(|(_, b)| b.info()).collect())
    }

    /// Sessions owned here whose tree uses `element`
    pub fn sessions_using(&self, element: ElementId) -> Vec<SessionId> {
        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.iter().map(|e| Arc::clone(e.value())).collect();
        let mut sessions: Vec<SessionId> = handles
            .iter()
            .filter_map(|handle| {
                let state = handle.state.lock();
                (state.is_owner() && state.uses_element(element)).then_some(state.id)
            })
            .collect();
        sessions.sort();
        sessions
    }

    // =========================================================================
    // Leases
    // =========================================================================

    /// Tear down every session whose lease ran out at `now`
    ///
    /// Returns the number of sessions expired.
    pub fn expire_leases(&self, now: Instant) -> usize {
        let expired = self.leases.lock().find_expired(now);
        for session in &expired {
            warn!(target: "plexus::lease", session = %session, "Lease expired");
            self.cancel_or_teardown(*session, true);
        }
        expired.len()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    fn setup_preferences(
        &self,
        pointer: Pointer,
        preferences: Vec<Contract>,
    ) -> PlexusResult<Pointer> {
        if &pointer.system != self.system() || !pointer.is_session() {
            return Err(PlexusError::InvalidPointer(format!(
                "preferences must be sent to the session pointer on {}, got {}",
                self.system(),
                pointer
            )));
        }
        if preferences.is_empty() {
            return Err(PlexusError::InvalidPayload(
                "no preferences given".to_string(),
            ));
        }
        for preference in &preferences {
            if !matches!(
                preference.kind(),
                ContractType::InstanceDemand | ContractType::ResourceDemand
            ) {
                return Err(PlexusError::InvalidPayload(format!(
                    "preference '{}' is a {}, not a demand",
                    preference.name(),
                    preference.kind()
                )));
            }
            preference.validate()?;
        }

        let session = pointer.session;
        let handle = self.handle(session)?;
        {
            let mut state = handle.state.lock();
            self.claim(&mut state)?;
            state.preferences = preferences;
        }
        self.run_assembly(session, &handle)
    }

    /// Mark an owned, idle session busy
    fn claim(&self, state: &mut Session) -> PlexusResult<()> {
        if state.closing {
            return Err(PlexusError::SessionCancelled(state.id));
        }
        if !state.is_owner() || state.busy {
            return Err(PlexusError::SessionExists(state.id));
        }
        state.busy = true;
        state.configured = false;
        Ok(())
    }

    fn run_assembly(&self, session: SessionId, handle: &SessionHandle) -> PlexusResult<Pointer> {
        let remotes = handle.state.lock().candidates.clone();
        let outcome = Resolver::new(self, handle, self.config.strategy, remotes).assemble();
        self.end_round(session, handle, outcome)
    }

    /// Step one resolved node of an owned session to its next offer
    fn advance_node(&self, pointer: Pointer) -> PlexusResult<Pointer> {
        let session = pointer.session;
        let key = match (pointer.node_key(), &pointer.system == self.system()) {
            (Some(key), true) => key,
            _ => {
                return Err(PlexusError::InvalidPointer(format!(
                    "only a node pointer on {} can be advanced, got {}",
                    self.system(),
                    pointer
                )))
            }
        };
        let handle = self.handle(session)?;
        {
            let mut state = handle.state.lock();
            let binding = state.binding(key)?;
            if binding.state != BindingState::Resolved {
                return Err(PlexusError::NotResolved {
                    session,
                    reason: format!("demand '{}' is {}", binding.demand.name(), binding.state),
                });
            }
            self.claim(&mut state)?;
        }
        debug!(target: "plexus::assembler", pointer = %pointer, "Advancing node");
        let remotes = handle.state.lock().candidates.clone();
        let outcome = Resolver::new(self, &handle, self.config.strategy, remotes)
            .advance(key)
            .map(|advanced| advanced.then_some(key));
        self.end_round(session, &handle, outcome)
    }

    /// Clear the busy flag and turn a round's outcome into a pointer
    ///
    /// A failed round tears the session down.
    fn end_round(
        &self,
        session: SessionId,
        handle: &SessionHandle,
        outcome: PlexusResult<Option<NodeKey>>,
    ) -> PlexusResult<Pointer> {
        let cancelled = {
            let mut state = handle.state.lock();
            state.busy = false;
            state.cancelled
        };
        // A remove that arrived during the last step still wins
        let outcome = match outcome {
            Ok(_) if cancelled => Err(PlexusError::SessionCancelled(session)),
            outcome => outcome,
        };
        match outcome {
            Ok(Some(key)) => Ok(Pointer::node(session, self.system().clone(), key)),
            Ok(None) => {
                info!(
                    target: "plexus::assembler",
                    session = %session,
                    "No candidate left"
                );
                Ok(Pointer::terminal(session, self.system().clone()))
            }
            Err(e) => {
                warn!(
                    target: "plexus::assembler",
                    session = %session,
                    error = %e,
                    "Resolution aborted, tearing session down"
                );
                self.teardown(session, true);
                Err(e)
            }
        }
    }

    /// Re-resolve a session with its last preferences
    ///
    /// Every node whose elements are still running and whose setup still
    /// satisfies its demand is kept; the rest is resolved anew.
    ///
    /// # Errors
    /// `UnknownSession`; `SessionExists` if the session is owned elsewhere or
    /// already being resolved; protocol errors as for `setup`.
    pub fn repair(&self, session: SessionId) -> PlexusResult<Pointer> {
        let handle = self.handle(session)?;
        {
            let mut state = handle.state.lock();
            if state.preferences.is_empty() {
                return Err(PlexusError::NotResolved {
                    session,
                    reason: "no preferences to repair from".to_string(),
                });
            }
            self.claim(&mut state)?;
        }
        info!(target: "plexus::assembler", session = %session, "Repairing session");
        self.run_assembly(session, &handle)
    }

    // =========================================================================
    // Participant side
    // =========================================================================

    fn commit_inbound(
        &self,
        pointer: Pointer,
        phase: u64,
        demand: String,
        offer: Offer,
        children: Vec<Assembly>,
    ) -> PlexusResult<Pointer> {
        let session = pointer.session;
        let terminal = Pointer::terminal(session, self.system().clone());
        if &pointer.system == self.system() {
            return Err(PlexusError::InvalidPointer(format!(
                "commit for local pointer {}",
                pointer
            )));
        }
        if &offer.system != self.system() {
            return Err(PlexusError::InvalidPayload(format!(
                "offer of {} committed on {}",
                offer.system,
                self.system()
            )));
        }
        let handle = self.handle(session)?;
        let previous = {
            let mut state = handle.state.lock();
            if state.closing {
                return Err(PlexusError::SessionCancelled(session));
            }
            let entry = state
                .inbound
                .entry(pointer.clone())
                .or_insert_with(InboundEntry::new);
            if phase <= entry.applied_phase {
                warn!(
                    target: "plexus::assembler",
                    pointer = %pointer,
                    phase,
                    applied = entry.applied_phase,
                    "Stale commit ignored"
                );
                return Ok(terminal);
            }
            entry.applied_phase = phase;
            std::mem::replace(&mut entry.state, InboundState::Pending)
        };
        self.release_inbound(&handle, previous);

        let dependencies = children.iter().map(Assembly::as_dependency).collect();
        let element = match self.container.commit(&offer, dependencies) {
            Ok(Some(element)) => element,
            Ok(None) => {
                self.settle_inbound(&handle, &pointer, phase);
                return Ok(terminal);
            }
            Err(e) if e.is_element() => {
                warn!(
                    target: "plexus::assembler",
                    pointer = %pointer,
                    error = %e,
                    "Commit for remote origin failed"
                );
                self.settle_inbound(&handle, &pointer, phase);
                return Ok(terminal);
            }
            Err(e) => return Err(e),
        };

        let assembly = assembly_for(
            pointer.clone(),
            &demand,
            self.system().clone(),
            &offer,
            element,
            children,
        );
        let current = {
            let mut state = handle.state.lock();
            match state.inbound.get_mut(&pointer) {
                Some(entry) if entry.applied_phase == phase => {
                    entry.state = InboundState::Committed { element, assembly };
                    true
                }
                _ => false,
            }
        };
        if !current {
            self.release_element(element);
            return Ok(terminal);
        }
        debug!(
            target: "plexus::assembler",
            pointer = %pointer,
            element = %element,
            "Committed for remote origin"
        );
        Ok(pointer)
    }

    /// Mark a pending inbound entry released if `phase` is still current
    fn settle_inbound(&self, handle: &SessionHandle, pointer: &Pointer, phase: u64) {
        let mut state = handle.state.lock();
        if let Some(entry) = state.inbound.get_mut(pointer) {
            if entry.applied_phase == phase {
                entry.state = InboundState::Released;
            }
        }
    }

    fn run_delegation(
        &self,
        session: SessionId,
        phase: u64,
        pointer: Pointer,
        origin: SystemId,
        contract: Contract,
        is_final: bool,
    ) {
        let Some(handle) = self.lookup(session) else {
            return;
        };
        // Only a final delegation may reach beyond this system
        let remotes = if is_final {
            handle.state.lock().candidates.clone()
        } else {
            Vec::new()
        };
        let outcome = Resolver::new(self, &handle, Strategy::Coordinated, remotes)
            .resolve_delegated(&contract);

        let resolved: Option<(NodeKey, Assembly)> = match outcome {
            Ok(Some(root)) => {
                let assembly = handle
                    .state
                    .lock()
                    .arena
                    .get(root)
                    .and_then(|b| b.assembly.clone());
                match assembly {
                    Some(assembly) => Some((root, assembly)),
                    None => {
                        self.release_subtree(&handle, root, &HashSet::new());
                        None
                    }
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    target: "plexus::assembler",
                    session = %session,
                    error = %e,
                    "Delegated resolution aborted"
                );
                None
            }
        };

        let current = {
            let mut state = handle.state.lock();
            let cancelled = state.cancelled;
            match state.inbound.get_mut(&pointer) {
                Some(entry) if entry.applied_phase == phase && !cancelled => {
                    entry.state = match &resolved {
                        Some((root, assembly)) => InboundState::Delegated {
                            root: *root,
                            assembly: assembly.clone(),
                        },
                        None => InboundState::Released,
                    };
                    true
                }
                _ => false,
            }
        };
        if !current {
            debug!(
                target: "plexus::assembler",
                pointer = %pointer,
                phase,
                "Delegation superseded"
            );
            if let Some((root, _)) = resolved {
                self.release_subtree(&handle, root, &HashSet::new());
            }
            return;
        }

        let assembly = resolved.map(|(_, assembly)| assembly);
        let resolved = assembly.is_some();
        let delivered = self
            .peer(&origin)
            .and_then(|peer| peer.report(session, phase, pointer.clone(), assembly));
        match delivered {
            Ok(Delivery::Applied) => {
                info!(
                    target: "plexus::assembler",
                    session = %session,
                    origin = %origin,
                    phase,
                    resolved,
                    "Delegated subtree reported"
                );
            }
            outcome => {
                if let Err(e) = &outcome {
                    warn!(target: "plexus::assembler", origin = %origin, error = %e, "Report failed");
                } else {
                    debug!(target: "plexus::assembler", pointer = %pointer, phase, "Report ignored");
                }
                let dropped = {
                    let mut state = handle.state.lock();
                    match state.inbound.get_mut(&pointer) {
                        Some(entry) if entry.applied_phase == phase => {
                            std::mem::replace(&mut entry.state, InboundState::Released)
                        }
                        _ => InboundState::Released,
                    }
                };
                self.release_inbound(&handle, dropped);
            }
        }
    }

    // =========================================================================
    // Release and teardown
    // =========================================================================

    fn release_element(&self, element: ElementId) {
        if let Err(e) = self.container.release_element(element) {
            warn!(target: "plexus::assembler", element = %element, error = %e, "Release failed");
        }
    }

    /// Release one binding; its children must already be gone
    pub(crate) fn release_binding(&self, handle: &SessionHandle, key: NodeKey) {
        let Some(parent) = self.release_placement(handle, key) else {
            return;
        };

        let mut state = handle.state.lock();
        let pointer = state.arena.get(key).map(|b| b.pointer.clone());
        state.arena.remove(key);
        if let Some(parent) = parent.and_then(|p| state.arena.get_mut(p)) {
            parent.children.retain(|c| *c != key);
        }
        if state.root == Some(key) {
            state.root = None;
        }
        if let Some(pointer) = pointer {
            debug!(target: "plexus::assembler", pointer = %pointer, "Binding released");
        }
    }

    /// Let go of whatever answers a binding, leaving it RELEASING in the arena
    ///
    /// Returns the binding's parent, or None if it is gone or already being
    /// released.
    pub(crate) fn release_placement(
        &self,
        handle: &SessionHandle,
        key: NodeKey,
    ) -> Option<Option<NodeKey>> {
        let (session, placement, pointer, phase, parent) = {
            let mut state = handle.state.lock();
            let session = state.id;
            let binding = state.arena.get_mut(key)?;
            if binding.state == BindingState::Releasing {
                return None;
            }
            binding.state = BindingState::Releasing;
            let remote = !matches!(
                binding.placement,
                Placement::Local { .. } | Placement::Unplaced
            );
            let phase = if remote {
                binding.next_phase()
            } else {
                binding.phase
            };
            (
                session,
                binding.placement.clone(),
                binding.pointer.clone(),
                phase,
                binding.parent,
            )
        };

        match &placement {
            Placement::Local { element } => self.release_element(*element),
            Placement::Remote { system }
            | Placement::Awaiting { system, .. }
            | Placement::Delegated { system } => {
                match self
                    .peer(system)
                    .and_then(|peer| peer.release(session, phase, pointer.clone()))
                {
                    Ok(Delivery::Applied) => {}
                    Ok(Delivery::Ignored) => {
                        debug!(target: "plexus::assembler", pointer = %pointer, phase, "Release ignored");
                    }
                    Err(e) => {
                        warn!(
                            target: "plexus::assembler",
                            pointer = %pointer,
                            system = %system,
                            error = %e,
                            "Remote release failed"
                        );
                    }
                }
            }
            Placement::Unplaced => {}
        }
        Some(parent)
    }

    /// Release a subtree children first, leaving the members of `skip` (and
    /// everything under them) untouched
    pub(crate) fn release_subtree(
        &self,
        handle: &SessionHandle,
        root: NodeKey,
        skip: &HashSet<NodeKey>,
    ) {
        let keys = handle.state.lock().subtree_split(root, skip).0;
        for key in keys.into_iter().rev() {
            self.release_binding(handle, key);
        }
    }

    fn release_inbound(&self, handle: &SessionHandle, state: InboundState) {
        match state {
            InboundState::Committed { element, .. } => self.release_element(element),
            InboundState::Delegated { root, .. } => {
                self.release_subtree(handle, root, &HashSet::new())
            }
            InboundState::Pending | InboundState::Released => {}
        }
    }

    /// Flag a busy session for cancellation, or tear an idle one down
    fn cancel_or_teardown(&self, session: SessionId, forward: bool) -> bool {
        let Some(handle) = self.lookup(session) else {
            self.leases.lock().remove(&session);
            return false;
        };
        {
            let mut state = handle.state.lock();
            if state.busy {
                state.cancelled = true;
                drop(state);
                self.leases.lock().remove(&session);
                handle.reported.notify_all();
                info!(target: "plexus::assembler", session = %session, "Cancelling session");
                return true;
            }
        }
        self.teardown(session, forward);
        true
    }

    /// Release everything a session holds here and forget it
    ///
    /// The session stays in the table until its bindings are gone: a
    /// participant releasing a delegated subtree may call back into this
    /// system for children it committed here, and those must be stopped
    /// before the participant stops their parent.
    fn teardown(&self, session: SessionId, forward: bool) {
        let Some(handle) = self.lookup(session) else {
            return;
        };
        self.leases.lock().remove(&session);

        let (keys, candidates, owner) = {
            let mut state = handle.state.lock();
            if state.closing {
                return;
            }
            state.closing = true;
            state.cancelled = true;
            state.configured = false;
            (
                state.leaves_first(),
                state.candidates.clone(),
                state.is_owner(),
            )
        };
        handle.reported.notify_all();

        for key in keys {
            self.release_binding(&handle, key);
        }
        // Whatever the origin did not release itself
        let inbound: Vec<InboundState> = handle
            .state
            .lock()
            .inbound
            .drain()
            .map(|(_, entry)| entry.state)
            .collect();
        for state in inbound {
            self.release_inbound(&handle, state);
        }
        self.sessions
            .remove_if(&session, |_, current| Arc::ptr_eq(current, &handle));
        if forward && owner {
            for system in candidates {
                if let Err(e) = self
                    .peer(&system)
                    .and_then(|peer| peer.remove(session, Some(system.clone())))
                {
                    debug!(
                        target: "plexus::assembler",
                        session = %session,
                        system = %system,
                        error = %e,
                        "Participant cleanup failed"
                    );
                }
            }
        }
        info!(target: "plexus::assembler", session = %session, "Session removed");
    }
}

// =============================================================================
// Peer surface
// =============================================================================

impl Peer for Assembler {
    fn prepare(
        &self,
        session: SessionId,
        origin: Option<SystemId>,
        systems: Vec<SystemId>,
    ) -> PlexusResult<Lease> {
        let mut candidates: Vec<SystemId> = Vec::new();
        for system in systems.iter() {
            if system != self.system() && !candidates.contains(system) {
                candidates.push(system.clone());
            }
        }

        let handle = match self.lookup(session) {
            Some(handle) => {
                let state = handle.state.lock();
                if state.origin != origin {
                    return Err(PlexusError::SessionExists(session));
                }
                if state.closing {
                    return Err(PlexusError::SessionCancelled(session));
                }
                drop(state);
                handle
            }
            None => {
                let handle = Arc::new(SessionHandle::new(Session::new(
                    session,
                    origin.clone(),
                    candidates.clone(),
                )));
                Arc::clone(
                    self.sessions
                        .entry(session)
                        .or_insert_with(|| handle)
                        .value(),
                )
            }
        };

        if origin.is_none() {
            // Enlist (or renew) the participants; unreachable ones drop out
            let mut reachable = Vec::with_capacity(candidates.len());
            for system in candidates {
                match self
                    .peer(&system)
                    .and_then(|peer| peer.prepare(session, Some(self.system().clone()), systems.clone()))
                {
                    Ok(_) => reachable.push(system),
                    Err(e) => warn!(
                        target: "plexus::assembler",
                        session = %session,
                        system = %system,
                        error = %e,
                        "Participant unavailable"
                    ),
                }
            }
            handle.state.lock().candidates = reachable;
        } else {
            handle.state.lock().candidates = candidates;
        }

        let lease = self.renew_lease(&handle, session);
        debug!(
            target: "plexus::lease",
            session = %session,
            expires_at = %lease.expires_at,
            "Lease granted"
        );
        Ok(lease)
    }

    fn setup(&self, pointer: Pointer, state: AssemblyState) -> PlexusResult<Pointer> {
        match state {
            AssemblyState::Preferences(preferences) => self.setup_preferences(pointer, preferences),
            AssemblyState::Advance => self.advance_node(pointer),
            AssemblyState::Commit {
                phase,
                demand,
                offer,
                children,
            } => self.commit_inbound(pointer, phase, demand, offer, children),
        }
    }

    fn configure(&self, session: SessionId) -> PlexusResult<Assembly> {
        let handle = self.handle(session)?;
        let mut state = handle.state.lock();
        if !state.is_owner() {
            return Err(PlexusError::NotResolved {
                session,
                reason: "session is owned by another system".to_string(),
            });
        }
        if state.busy {
            return Err(PlexusError::NotResolved {
                session,
                reason: "resolution in progress".to_string(),
            });
        }
        let root = state
            .check_resolved()
            .map_err(|reason| PlexusError::NotResolved { session, reason })?;
        let assembly = state
            .binding(root)?
            .assembly
            .clone()
            .ok_or_else(|| PlexusError::Internal("resolved root without assembly".to_string()))?;
        state.configured = true;
        info!(
            target: "plexus::assembler",
            session = %session,
            nodes = assembly.size(),
            "Session configured"
        );
        Ok(assembly)
    }

    fn retrieve(&self, pointer: &Pointer) -> PlexusResult<Assembly> {
        let session = pointer.session;
        let handle = self.handle(session)?;

        if &pointer.system == self.system() {
            let state = handle.state.lock();
            let key = match pointer.target {
                Target::Session => state.root.ok_or_else(|| PlexusError::NotResolved {
                    session,
                    reason: "no binding tree".to_string(),
                })?,
                Target::Node(key) => key,
                Target::Terminal => {
                    return Err(PlexusError::InvalidPointer(format!(
                        "terminal pointer {}",
                        pointer
                    )))
                }
            };
            let binding = state.binding(key)?;
            return binding
                .assembly
                .clone()
                .filter(|_| binding.state == BindingState::Resolved)
                .ok_or_else(|| PlexusError::NotResolved {
                    session,
                    reason: format!("demand '{}' is {}", binding.demand.name(), binding.state),
                });
        }

        let assembly = handle
            .state
            .lock()
            .inbound
            .get(pointer)
            .and_then(|entry| entry.assembly().cloned())
            .ok_or_else(|| PlexusError::InvalidPointer(format!("nothing held for {}", pointer)))?;
        let gone = assembly
            .iter()
            .into_iter()
            .find(|a| a.system() == self.system() && !self.container.is_running(a.element()))
            .map(|a| a.element());
        match gone {
            Some(element) => Err(PlexusError::NotResolved {
                session,
                reason: format!("element {} is no longer running", element),
            }),
            None => Ok(assembly),
        }
    }

    fn remove(&self, session: SessionId, system: Option<SystemId>) -> PlexusResult<()> {
        if let Some(target) = system.as_ref().filter(|s| *s != self.system()) {
            return self.peer(target)?.remove(session, Some(target.clone()));
        }
        if self.lookup(session).is_none() {
            return Err(PlexusError::UnknownSession(session));
        }
        info!(target: "plexus::assembler", session = %session, "Removing session");
        self.cancel_or_teardown(session, system.is_none());
        Ok(())
    }

    fn resolve(
        &self,
        session: SessionId,
        phase: u64,
        pointer: Pointer,
        system: SystemId,
        contract: Contract,
        is_final: bool,
    ) -> PlexusResult<Delivery> {
        if &pointer.system == self.system() {
            return Err(PlexusError::InvalidPointer(format!(
                "resolve for local pointer {}",
                pointer
            )));
        }
        contract.validate()?;
        let handle = self.handle(session)?;
        let previous = {
            let mut state = handle.state.lock();
            if state.origin.as_ref() != Some(&system) {
                return Err(PlexusError::SessionExists(session));
            }
            if state.closing {
                return Err(PlexusError::SessionCancelled(session));
            }
            let entry = state
                .inbound
                .entry(pointer.clone())
                .or_insert_with(InboundEntry::new);
            if phase <= entry.applied_phase {
                warn!(
                    target: "plexus::assembler",
                    pointer = %pointer,
                    phase,
                    applied = entry.applied_phase,
                    "Stale resolve ignored"
                );
                return Ok(Delivery::Ignored);
            }
            entry.applied_phase = phase;
            std::mem::replace(&mut entry.state, InboundState::Pending)
        };
        self.release_inbound(&handle, previous);

        let this = self
            .this
            .upgrade()
            .ok_or_else(|| PlexusError::Internal("assembler is shutting down".to_string()))?;
        debug!(
            target: "plexus::assembler",
            pointer = %pointer,
            phase,
            is_final,
            "Resolving delegated subtree"
        );
        std::thread::Builder::new()
            .name("plexus-resolve".to_string())
            .spawn(move || this.run_delegation(session, phase, pointer, system, contract, is_final))?;
        Ok(Delivery::Applied)
    }

    fn report(
        &self,
        session: SessionId,
        phase: u64,
        pointer: Pointer,
        assembly: Option<Assembly>,
    ) -> PlexusResult<Delivery> {
        let key = match (pointer.node_key(), &pointer.system == self.system()) {
            (Some(key), true) => key,
            _ => {
                return Err(PlexusError::InvalidPointer(format!(
                    "report for foreign pointer {}",
                    pointer
                )))
            }
        };
        let handle = self.handle(session)?;
        let mut state = handle.state.lock();
        let Some(binding) = state.arena.get_mut(key) else {
            warn!(target: "plexus::assembler", pointer = %pointer, phase, "Report for released node");
            return Ok(Delivery::Ignored);
        };
        let awaited = matches!(
            binding.placement,
            Placement::Awaiting { phase: awaited, .. } if awaited == phase
        );
        if !awaited || phase <= binding.applied_report {
            warn!(
                target: "plexus::assembler",
                pointer = %pointer,
                phase,
                current = binding.phase,
                "Stale report ignored"
            );
            return Ok(Delivery::Ignored);
        }
        binding.report = Some(assembly);
        binding.applied_report = phase;
        drop(state);
        handle.reported.notify_all();
        Ok(Delivery::Applied)
    }

    fn release(&self, session: SessionId, phase: u64, pointer: Pointer) -> PlexusResult<Delivery> {
        if &pointer.system == self.system() {
            return Err(PlexusError::InvalidPointer(format!(
                "release for local pointer {}",
                pointer
            )));
        }
        let handle = self.handle(session)?;
        let previous = {
            let mut state = handle.state.lock();
            let entry = state
                .inbound
                .entry(pointer.clone())
                .or_insert_with(InboundEntry::new);
            if phase <= entry.applied_phase {
                warn!(
                    target: "plexus::assembler",
                    pointer = %pointer,
                    phase,
                    applied = entry.applied_phase,
                    "Stale release ignored"
                );
                return Ok(Delivery::Ignored);
            }
            entry.applied_phase = phase;
            std::mem::replace(&mut entry.state, InboundState::Released)
        };
        self.release_inbound(&handle, previous);
        debug!(target: "plexus::assembler", pointer = %pointer, phase, "Released for remote origin");
        Ok(Delivery::Applied)
    }

    fn offers(&self, session: SessionId, demand: &Contract) -> PlexusResult<Vec<Offer>> {
        self.handle(session)?;
        Ok(self.container.derive_setups(demand))
    }
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler")
            .field("system", self.system())
            .field("strategy", &self.config.strategy)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
