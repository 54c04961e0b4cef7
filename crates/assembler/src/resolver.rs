//! The resolution engine
//!
//! One `Resolver` runs one negotiation round over one session: either the
//! origin assembling its preferences, or a participant resolving a subtree
//! delegated to it.
//!
//! ## Algorithm
//!
//! Preferences are tried in rank order, each from scratch. For every demand
//! node:
//!
//! 1. If the previous tree had a RESOLVED node at the same position whose
//!    setup still satisfies the demand and whose elements are all still
//!    running, that node is adopted as-is (`reuse`); nothing is restarted.
//! 2. Otherwise offers are gathered (local container, plus remote containers
//!    under the coordinated strategy), ranked, and tried in order: the
//!    setup's nested demands are resolved depth-first, then the offer is
//!    committed. A failed offer releases what it built and the next offer is
//!    tried.
//! 3. Under the peer-to-peer strategy a demand no local offer can answer is
//!    delegated to each candidate system in turn with `resolve`, and the
//!    resolver waits for the matching `report`.
//!
//! A demand nobody can answer fails its parent's offer, and ultimately the
//! preference. Protocol errors abort the round; the caller tears the session
//! down.
//!
//! The session lock is only held for bookkeeping. Container and peer calls
//! run unlocked, so a peer may call back into this system while a round is
//! in progress.

use plexus_container::Offer;
use plexus_core::{Contract, ElementId, PlexusError, PlexusResult, SessionId, SystemId};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::assembler::Assembler;
use crate::assembly::Assembly;
use crate::binding::{Binding, BindingState, OfferKey, Placement};
use crate::config::Strategy;
use crate::lease::deadline_after;
use crate::pointer::{NodeKey, Pointer};
use crate::session::{DemandPath, SessionHandle};
use crate::transport::{AssemblyState, Delivery};

pub(crate) struct Resolver<'a> {
    assembler: &'a Assembler,
    handle: &'a SessionHandle,
    session: SessionId,
    strategy: Strategy,
    remotes: Vec<SystemId>,
    /// Nodes of the previous tree by position
    previous: HashMap<DemandPath, NodeKey>,
    /// Previous nodes adopted in the current attempt, with their new parent
    adopted: HashMap<NodeKey, Option<NodeKey>>,
    /// Nodes created in this round, in creation order
    created: Vec<NodeKey>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        assembler: &'a Assembler,
        handle: &'a SessionHandle,
        strategy: Strategy,
        remotes: Vec<SystemId>,
    ) -> Self {
        let session = handle.state.lock().id;
        Self {
            assembler,
            handle,
            session,
            strategy,
            remotes,
            previous: HashMap::new(),
            adopted: HashMap::new(),
            created: Vec::new(),
        }
    }

    fn system(&self) -> &SystemId {
        self.assembler.system()
    }

    // =========================================================================
    // Rounds
    // =========================================================================

    /// Assemble the session's preferences, reusing the current tree
    ///
    /// Returns the new root, or None if no preference could be resolved (the
    /// previous tree is released in that case).
    pub(crate) fn assemble(&mut self) -> PlexusResult<Option<NodeKey>> {
        let (old_root, preferences) = {
            let session = self.handle.state.lock();
            self.previous = session
                .root
                .map(|root| session.paths(root))
                .unwrap_or_default();
            (session.root, session.preferences.clone())
        };

        for (index, preference) in preferences.iter().enumerate() {
            self.adopted.clear();
            let path = vec![(preference.kind(), preference.name().to_string())];
            match self.resolve_node(None, path, preference) {
                Ok(Some(root)) => {
                    self.finish(old_root, root)?;
                    info!(
                        target: "plexus::assembler",
                        session = %self.session,
                        preference = index,
                        reused = self.adopted.len(),
                        "Preference resolved"
                    );
                    return Ok(Some(root));
                }
                Ok(None) => {
                    debug!(
                        target: "plexus::assembler",
                        session = %self.session,
                        preference = index,
                        "Preference failed"
                    );
                }
                Err(e) => {
                    self.abandon();
                    return Err(e);
                }
            }
        }

        if let Some(old) = old_root {
            self.assembler
                .release_subtree(self.handle, old, &HashSet::new());
            self.handle.state.lock().root = None;
        }
        Ok(None)
    }

    /// Resolve a subtree delegated by another system
    pub(crate) fn resolve_delegated(&mut self, demand: &Contract) -> PlexusResult<Option<NodeKey>> {
        let path = vec![(demand.kind(), demand.name().to_string())];
        match self.resolve_node(None, path, demand) {
            Err(e) => {
                self.abandon();
                Err(e)
            }
            outcome => outcome,
        }
    }

    /// Move a resolved node on to its next untried offer
    ///
    /// What answers the node now is released first, children before the
    /// node. Returns false, leaving the node RESOLVING, when no untried offer
    /// remains. Ancestors keep their elements; their assemblies are updated
    /// to name the new answer.
    pub(crate) fn advance(&mut self, key: NodeKey) -> PlexusResult<bool> {
        let (demand, path, children, released) = {
            let session = self.handle.state.lock();
            let binding = session.binding(key)?;
            (
                binding.demand.clone(),
                session.path_of(key),
                binding.children.clone(),
                binding.assembly.as_ref().map(Assembly::element),
            )
        };
        for child in children.into_iter().rev() {
            self.assembler
                .release_subtree(self.handle, child, &HashSet::new());
        }
        self.assembler.release_placement(self.handle, key);
        let tried = {
            let mut session = self.handle.state.lock();
            let binding = session.binding_mut(key)?;
            binding.state = BindingState::Resolving;
            binding.placement = Placement::Unplaced;
            binding.assembly = None;
            binding.reuse = false;
            binding.children.clear();
            binding.tried.clone()
        };

        let offers: Vec<Offer> = self
            .gather_offers(&demand)?
            .into_iter()
            .filter(|offer| offer.existing.is_none() || offer.existing != released)
            .filter(|offer| !tried.contains(&OfferKey::of(offer)))
            .collect();
        for offer in offers {
            self.check_cancelled()?;
            self.handle
                .state
                .lock()
                .binding_mut(key)?
                .tried
                .push(OfferKey::of(&offer));
            match self.try_offer(key, &path, &demand, &offer) {
                Ok(true) => {
                    self.refresh_ancestors(key)?;
                    info!(
                        target: "plexus::assembler",
                        session = %self.session,
                        demand = %demand.name(),
                        system = %offer.system,
                        "Node advanced"
                    );
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => {
                    self.abandon();
                    return Err(e);
                }
            }
        }
        debug!(
            target: "plexus::assembler",
            session = %self.session,
            demand = %demand.name(),
            "No untried offer left"
        );
        Ok(false)
    }

    /// Put the assembly of `key` into every ancestor's assembly
    fn refresh_ancestors(&self, key: NodeKey) -> PlexusResult<()> {
        let mut session = self.handle.state.lock();
        let mut current = key;
        while let Some(parent) = session.binding(current)?.parent {
            let child = session.binding(current)?.assembly.clone().ok_or_else(|| {
                PlexusError::Internal(format!("node {} resolved without assembly", current))
            })?;
            if let Some(assembly) = session.binding_mut(parent)?.assembly.as_mut() {
                assembly.replace_child(child);
            }
            current = parent;
        }
        Ok(())
    }

    fn finish(&mut self, old_root: Option<NodeKey>, root: NodeKey) -> PlexusResult<()> {
        {
            let mut session = self.handle.state.lock();
            for (key, parent) in &self.adopted {
                session.binding_mut(*key)?.parent = *parent;
            }
            session.root = Some(root);
        }
        if let Some(old) = old_root.filter(|old| *old != root) {
            let skip: HashSet<NodeKey> = self.adopted.keys().copied().collect();
            self.assembler.release_subtree(self.handle, old, &skip);
        }
        Ok(())
    }

    /// Undo an aborted round: release what it built, give adopted nodes back
    fn abandon(&mut self) {
        let adopted: Vec<NodeKey> = self.adopted.keys().copied().collect();
        for key in adopted {
            self.unadopt(key);
        }
        for key in std::mem::take(&mut self.created).into_iter().rev() {
            self.assembler.release_binding(self.handle, key);
        }
    }

    fn check_cancelled(&self) -> PlexusResult<()> {
        if self.handle.state.lock().cancelled {
            return Err(PlexusError::SessionCancelled(self.session));
        }
        Ok(())
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    fn resolve_node(
        &mut self,
        parent: Option<NodeKey>,
        path: DemandPath,
        demand: &Contract,
    ) -> PlexusResult<Option<NodeKey>> {
        self.check_cancelled()?;
        if let Some(key) = self.try_reuse(&path, demand, parent)? {
            return Ok(Some(key));
        }

        let key = {
            let mut session = self.handle.state.lock();
            let placeholder = Pointer::session(self.session, self.system().clone());
            let key = session
                .arena
                .insert(Binding::new(placeholder, parent, demand.clone()));
            session.binding_mut(key)?.pointer =
                Pointer::node(self.session, self.system().clone(), key);
            key
        };
        self.created.push(key);
        debug!(
            target: "plexus::assembler",
            session = %self.session,
            demand = %demand.name(),
            node = %key,
            "Resolving demand"
        );

        for offer in self.gather_offers(demand)? {
            self.check_cancelled()?;
            self.handle
                .state
                .lock()
                .binding_mut(key)?
                .tried
                .push(OfferKey::of(&offer));
            if self.try_offer(key, &path, demand, &offer)? {
                return Ok(Some(key));
            }
        }

        if self.strategy == Strategy::PeerToPeer {
            let remotes = self.remotes.clone();
            for (index, system) in remotes.iter().enumerate() {
                self.check_cancelled()?;
                if self.delegate(key, system, demand, index + 1 == remotes.len())? {
                    return Ok(Some(key));
                }
            }
        }

        debug!(
            target: "plexus::assembler",
            session = %self.session,
            demand = %demand.name(),
            "Demand exhausted"
        );
        self.handle.state.lock().arena.remove(key);
        self.created.retain(|k| *k != key);
        Ok(None)
    }

    fn gather_offers(&self, demand: &Contract) -> PlexusResult<Vec<Offer>> {
        let mut offers = self.assembler.container().derive_setups(demand);
        if self.strategy == Strategy::Coordinated {
            for system in &self.remotes {
                let remote = self.assembler.peer(system)?.offers(self.session, demand)?;
                offers.extend(remote);
            }
        }
        self.assembler.ranker().rank(self.system(), &mut offers);
        Ok(offers)
    }

    /// Resolve the offer's nested demands and commit it
    fn try_offer(
        &mut self,
        key: NodeKey,
        path: &DemandPath,
        demand: &Contract,
        offer: &Offer,
    ) -> PlexusResult<bool> {
        let mut children = Vec::new();
        // A running shared element keeps the dependencies it was started with
        if !offer.is_existing() {
            for nested in offer.setup.demands() {
                let mut child_path = path.clone();
                child_path.push((nested.kind(), nested.name().to_string()));
                match self.resolve_node(Some(key), child_path, nested)? {
                    Some(child) => children.push(child),
                    None => {
                        self.discard_all(&children);
                        return Ok(false);
                    }
                }
            }
        }

        let (pointer, child_assemblies) = {
            let session = self.handle.state.lock();
            let mut assemblies = Vec::with_capacity(children.len());
            for child in &children {
                let assembly = session.binding(*child)?.assembly.clone().ok_or_else(|| {
                    PlexusError::Internal(format!("child {} resolved without assembly", child))
                })?;
                assemblies.push(assembly);
            }
            (session.binding(key)?.pointer.clone(), assemblies)
        };

        let committed = if &offer.system == self.system() {
            self.commit_local(pointer, demand, offer, child_assemblies)?
        } else {
            self.commit_remote(key, pointer, demand, offer, child_assemblies)?
        };
        let Some((placement, assembly)) = committed else {
            self.discard_all(&children);
            return Ok(false);
        };

        let mut session = self.handle.state.lock();
        let binding = session.binding_mut(key)?;
        binding.children = children;
        binding.placement = placement;
        binding.assembly = Some(assembly);
        binding.state = BindingState::Resolved;
        debug!(
            target: "plexus::assembler",
            session = %self.session,
            demand = %demand.name(),
            system = %offer.system,
            "Demand resolved"
        );
        Ok(true)
    }

    fn commit_local(
        &self,
        pointer: Pointer,
        demand: &Contract,
        offer: &Offer,
        children: Vec<Assembly>,
    ) -> PlexusResult<Option<(Placement, Assembly)>> {
        let dependencies = children.iter().map(Assembly::as_dependency).collect();
        match self.assembler.container().commit(offer, dependencies) {
            Ok(Some(element)) => {
                let assembly = assembly_for(
                    pointer,
                    demand.name(),
                    self.system().clone(),
                    offer,
                    element,
                    children,
                );
                Ok(Some((Placement::Local { element }, assembly)))
            }
            Ok(None) => {
                debug!(
                    target: "plexus::assembler",
                    setup = %offer.setup.name(),
                    "Offer can no longer be honoured"
                );
                Ok(None)
            }
            Err(e) if e.is_element() => {
                warn!(
                    target: "plexus::assembler",
                    setup = %offer.setup.name(),
                    error = %e,
                    "Commit failed, trying next offer"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn commit_remote(
        &self,
        key: NodeKey,
        pointer: Pointer,
        demand: &Contract,
        offer: &Offer,
        children: Vec<Assembly>,
    ) -> PlexusResult<Option<(Placement, Assembly)>> {
        let phase = self.handle.state.lock().binding_mut(key)?.next_phase();
        let peer = self.assembler.peer(&offer.system)?;
        let state = AssemblyState::Commit {
            phase,
            demand: demand.name().to_string(),
            offer: offer.clone(),
            children,
        };
        if peer.setup(pointer.clone(), state)?.is_terminal() {
            debug!(
                target: "plexus::assembler",
                system = %offer.system,
                setup = %offer.setup.name(),
                "Remote commit refused"
            );
            return Ok(None);
        }
        let assembly = peer.retrieve(&pointer)?;
        Ok(Some((
            Placement::Remote {
                system: offer.system.clone(),
            },
            assembly,
        )))
    }

    // =========================================================================
    // Delegation
    // =========================================================================

    fn delegate(
        &mut self,
        key: NodeKey,
        system: &SystemId,
        demand: &Contract,
        is_final: bool,
    ) -> PlexusResult<bool> {
        let (phase, pointer) = {
            let mut session = self.handle.state.lock();
            let binding = session.binding_mut(key)?;
            let phase = binding.next_phase();
            binding.placement = Placement::Awaiting {
                system: system.clone(),
                phase,
            };
            binding.report = None;
            (phase, binding.pointer.clone())
        };
        debug!(
            target: "plexus::assembler",
            session = %self.session,
            demand = %demand.name(),
            system = %system,
            phase,
            "Delegating demand"
        );

        let peer = self.assembler.peer(system)?;
        let delivery = peer.resolve(
            self.session,
            phase,
            pointer,
            self.system().clone(),
            demand.clone(),
            is_final,
        )?;
        if delivery == Delivery::Ignored {
            self.handle.state.lock().binding_mut(key)?.placement = Placement::Unplaced;
            return Ok(false);
        }

        let report = self.wait_report(key, system)?;
        let mut session = self.handle.state.lock();
        let binding = session.binding_mut(key)?;
        match report {
            Some(assembly) => {
                binding.placement = Placement::Delegated {
                    system: system.clone(),
                };
                binding.assembly = Some(assembly);
                binding.state = BindingState::Resolved;
                Ok(true)
            }
            None => {
                binding.placement = Placement::Unplaced;
                Ok(false)
            }
        }
    }

    fn wait_report(&self, key: NodeKey, system: &SystemId) -> PlexusResult<Option<Assembly>> {
        let deadline = deadline_after(Instant::now(), self.assembler.config().report_timeout());
        let mut session = self.handle.state.lock();
        loop {
            if session.cancelled {
                return Err(PlexusError::SessionCancelled(self.session));
            }
            if let Some(report) = session.binding_mut(key)?.report.take() {
                return Ok(report);
            }
            if self
                .handle
                .reported
                .wait_until(&mut session, deadline)
                .timed_out()
            {
                if let Some(report) = session.binding_mut(key)?.report.take() {
                    return Ok(report);
                }
                warn!(
                    target: "plexus::assembler",
                    session = %self.session,
                    system = %system,
                    "Delegated report timed out"
                );
                return Err(PlexusError::RemoteTimeout(system.clone()));
            }
        }
    }

    // =========================================================================
    // Reuse
    // =========================================================================

    fn try_reuse(
        &mut self,
        path: &DemandPath,
        demand: &Contract,
        parent: Option<NodeKey>,
    ) -> PlexusResult<Option<NodeKey>> {
        let Some(&old) = self.previous.get(path) else {
            return Ok(None);
        };
        if self.adopted.contains_key(&old) {
            return Ok(None);
        }

        let members: Vec<(Placement, Pointer)> = {
            let session = self.handle.state.lock();
            let Some(binding) = session.arena.get(old) else {
                return Ok(None);
            };
            let matches = binding.state == BindingState::Resolved
                && binding
                    .assembly
                    .as_ref()
                    .map(|a| demand.matches(a.contract(), true))
                    .unwrap_or(false);
            if !matches {
                return Ok(None);
            }
            session
                .subtree(old)
                .into_iter()
                .filter_map(|k| session.arena.get(k))
                .map(|b| (b.placement.clone(), b.pointer.clone()))
                .collect()
        };

        if !members.iter().all(|(placement, pointer)| self.is_alive(placement, pointer)) {
            debug!(
                target: "plexus::assembler",
                session = %self.session,
                demand = %demand.name(),
                "Previous node not reusable"
            );
            return Ok(None);
        }

        {
            let mut session = self.handle.state.lock();
            for key in session.subtree(old) {
                let binding = session.binding_mut(key)?;
                binding.reuse = true;
                if let Some(assembly) = binding.assembly.as_mut() {
                    assembly.mark_reused();
                }
            }
        }
        self.adopted.insert(old, parent);
        debug!(
            target: "plexus::assembler",
            session = %self.session,
            demand = %demand.name(),
            node = %old,
            "Reusing previous node"
        );
        Ok(Some(old))
    }

    fn is_alive(&self, placement: &Placement, pointer: &Pointer) -> bool {
        match placement {
            Placement::Local { element } => self.assembler.container().is_running(*element),
            Placement::Remote { system } | Placement::Delegated { system } => self
                .assembler
                .peer(system)
                .and_then(|peer| peer.retrieve(pointer))
                .is_ok(),
            Placement::Unplaced | Placement::Awaiting { .. } => false,
        }
    }

    fn unadopt(&mut self, key: NodeKey) {
        self.adopted.remove(&key);
        let mut session = self.handle.state.lock();
        for member in session.subtree(key) {
            if let Some(binding) = session.arena.get_mut(member) {
                binding.reuse = false;
                if let Some(assembly) = binding.assembly.as_mut() {
                    assembly.clear_reused();
                }
            }
        }
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    fn discard_all(&mut self, keys: &[NodeKey]) {
        for key in keys.iter().rev() {
            self.discard(*key);
        }
    }

    /// Give up a node built (or adopted) for a failed offer
    fn discard(&mut self, key: NodeKey) {
        if self.adopted.contains_key(&key) {
            self.unadopt(key);
            return;
        }
        let skip: HashSet<NodeKey> = self.adopted.keys().copied().collect();
        let skipped = self.handle.state.lock().subtree_split(key, &skip).1;
        for adopted in skipped {
            self.unadopt(adopted);
        }
        self.assembler.release_subtree(self.handle, key, &skip);
        let session = self.handle.state.lock();
        self.created.retain(|k| session.arena.contains(*k));
    }
}

/// Assembly for an offer committed as `element`
pub(crate) fn assembly_for(
    pointer: Pointer,
    demand: &str,
    system: SystemId,
    offer: &Offer,
    element: ElementId,
    children: Vec<Assembly>,
) -> Assembly {
    Assembly::new(
        pointer,
        demand,
        offer.setup.element_kind(),
        system,
        offer.source,
        element,
        offer.setup.template().clone(),
        children,
    )
}

