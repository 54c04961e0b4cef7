//! Per-session negotiation state
//!
//! A session lives on every system taking part in it. On the origin it owns
//! the binding tree built from the preferences; on a participant it holds
//! the elements committed for the origin (`inbound`) and the subtrees the
//! participant resolved on the origin's behalf.

use parking_lot::{Condvar, Mutex};
use plexus_core::{Contract, ContractType, ElementId, PlexusError, PlexusResult, SessionId, SystemId};
use std::collections::{HashMap, HashSet};

use crate::assembly::Assembly;
use crate::binding::{Binding, BindingState, Placement};
use crate::lease::Lease;
use crate::pointer::{Arena, NodeKey, Pointer};

/// Position of a demand in a binding tree: (kind, name) from the root down
pub(crate) type DemandPath = Vec<(ContractType, String)>;

/// What a participant holds for one pointer of the origin
#[derive(Debug, Clone)]
pub(crate) enum InboundState {
    /// A delegated resolution is running
    Pending,
    /// An element committed through `setup`
    Committed { element: ElementId, assembly: Assembly },
    /// A subtree resolved through `resolve`
    Delegated { root: NodeKey, assembly: Assembly },
    /// Released, or superseded before anything was built
    Released,
}

#[derive(Debug, Clone)]
pub(crate) struct InboundEntry {
    /// Newest phase accepted for the pointer
    pub(crate) applied_phase: u64,
    pub(crate) state: InboundState,
}

impl InboundEntry {
    pub(crate) fn new() -> Self {
        Self {
            applied_phase: 0,
            state: InboundState::Released,
        }
    }

    pub(crate) fn assembly(&self) -> Option<&Assembly> {
        match &self.state {
            InboundState::Committed { assembly, .. } | InboundState::Delegated { assembly, .. } => {
                Some(assembly)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) id: SessionId,
    /// None when this system owns the session
    pub(crate) origin: Option<SystemId>,
    /// Other systems taking part
    pub(crate) candidates: Vec<SystemId>,
    pub(crate) lease: Option<Lease>,
    pub(crate) preferences: Vec<Contract>,
    pub(crate) arena: Arena<Binding>,
    pub(crate) root: Option<NodeKey>,
    pub(crate) inbound: HashMap<Pointer, InboundEntry>,
    pub(crate) busy: bool,
    pub(crate) cancelled: bool,
    /// Teardown in progress; the session stays reachable until it ends
    pub(crate) closing: bool,
    pub(crate) configured: bool,
}

impl Session {
    pub(crate) fn new(id: SessionId, origin: Option<SystemId>, candidates: Vec<SystemId>) -> Self {
        Self {
            id,
            origin,
            candidates,
            lease: None,
            preferences: Vec::new(),
            arena: Arena::new(),
            root: None,
            inbound: HashMap::new(),
            busy: false,
            cancelled: false,
            closing: false,
            configured: false,
        }
    }

    pub(crate) fn is_owner(&self) -> bool {
        self.origin.is_none()
    }

    pub(crate) fn binding(&self, key: NodeKey) -> PlexusResult<&Binding> {
        self.arena
            .get(key)
            .ok_or_else(|| PlexusError::InvalidPointer(format!("stale node {} in {}", key, self.id)))
    }

    pub(crate) fn binding_mut(&mut self, key: NodeKey) -> PlexusResult<&mut Binding> {
        let id = self.id;
        self.arena
            .get_mut(key)
            .ok_or_else(|| PlexusError::InvalidPointer(format!("stale node {} in {}", key, id)))
    }

    /// Keys of a subtree in pre-order
    pub(crate) fn subtree(&self, root: NodeKey) -> Vec<NodeKey> {
        self.subtree_split(root, &HashSet::new()).0
    }

    /// Keys of a subtree in pre-order, not descending into `skip`
    ///
    /// Returns the visited keys and the members of `skip` that were met.
    pub(crate) fn subtree_split(
        &self,
        root: NodeKey,
        skip: &HashSet<NodeKey>,
    ) -> (Vec<NodeKey>, Vec<NodeKey>) {
        let mut keys = Vec::new();
        let mut skipped = Vec::new();
        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            if skip.contains(&key) {
                skipped.push(key);
                continue;
            }
            if let Some(binding) = self.arena.get(key) {
                keys.push(key);
                stack.extend(binding.children.iter().rev().copied());
            }
        }
        (keys, skipped)
    }

    /// Demand path of every node under `root`
    pub(crate) fn paths(&self, root: NodeKey) -> HashMap<DemandPath, NodeKey> {
        let mut paths = HashMap::new();
        let mut stack: Vec<(NodeKey, DemandPath)> = Vec::new();
        if let Some(binding) = self.arena.get(root) {
            stack.push((
                root,
                vec![(binding.demand.kind(), binding.demand.name().to_string())],
            ));
        }
        while let Some((key, path)) = stack.pop() {
            let Some(binding) = self.arena.get(key) else {
                continue;
            };
            for child in &binding.children {
                if let Some(c) = self.arena.get(*child) {
                    let mut child_path = path.clone();
                    child_path.push((c.demand.kind(), c.demand.name().to_string()));
                    stack.push((*child, child_path));
                }
            }
            paths.insert(path, key);
        }
        paths
    }

    /// Demand path from the root down to `key`
    pub(crate) fn path_of(&self, key: NodeKey) -> DemandPath {
        let mut path = Vec::new();
        let mut current = Some(key);
        while let Some(binding) = current.and_then(|k| self.arena.get(k)) {
            path.push((binding.demand.kind(), binding.demand.name().to_string()));
            current = binding.parent;
        }
        path.reverse();
        path
    }

    /// Every node, children before their parents
    pub(crate) fn leaves_first(&self) -> Vec<NodeKey> {
        let mut keyed: Vec<(usize, NodeKey)> = self
            .arena
            .iter()
            .map(|(key, _)| (self.depth(key), key))
            .collect();
        keyed.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        keyed.into_iter().map(|(_, key)| key).collect()
    }

    fn depth(&self, key: NodeKey) -> usize {
        let mut depth = 0;
        let mut current = self.arena.get(key).and_then(|b| b.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.arena.get(parent).and_then(|b| b.parent);
        }
        depth
    }

    /// Err with a reason unless every node under the root is RESOLVED
    pub(crate) fn check_resolved(&self) -> Result<NodeKey, String> {
        let root = self.root.ok_or_else(|| "no binding tree".to_string())?;
        for key in self.subtree(root) {
            let binding = self.binding(key).map_err(|e| e.to_string())?;
            if binding.state != BindingState::Resolved || binding.assembly.is_none() {
                return Err(format!(
                    "demand '{}' is {}",
                    binding.demand.name(),
                    binding.state
                ));
            }
        }
        Ok(root)
    }

    /// Whether the owned tree or the inbound state references `element`
    pub(crate) fn uses_element(&self, element: ElementId) -> bool {
        let in_tree = self.arena.iter().any(|(_, b)| {
            matches!(b.placement, Placement::Local { element: e } if e == element)
                || b.assembly
                    .as_ref()
                    .map(|a| a.contains_element(element))
                    .unwrap_or(false)
        });
        in_tree
            || self.inbound.values().any(|entry| {
                entry
                    .assembly()
                    .map(|a| a.contains_element(element))
                    .unwrap_or(false)
            })
    }
}

/// A session behind its lock, plus the condition variable report waiters
/// sleep on
#[derive(Debug)]
pub(crate) struct SessionHandle {
    pub(crate) state: Mutex<Session>,
    pub(crate) reported: Condvar,
}

impl SessionHandle {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            state: Mutex::new(session),
            reported: Condvar::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand(name: &str) -> Contract {
        Contract::new(ContractType::InstanceDemand, name).unwrap()
    }

    fn add(session: &mut Session, parent: Option<NodeKey>, name: &str) -> NodeKey {
        let system = SystemId::new("a");
        let key = session
            .arena
            .insert(Binding::new(Pointer::session(session.id, system.clone()), parent, demand(name)));
        session.arena.get_mut(key).unwrap().pointer = Pointer::node(session.id, system, key);
        if let Some(p) = parent {
            session.arena.get_mut(p).unwrap().children.push(key);
        }
        key
    }

    #[test]
    fn test_paths_and_order() {
        let mut session = Session::new(SessionId::new(), None, Vec::new());
        let root = add(&mut session, None, "printer");
        let spooler = add(&mut session, Some(root), "spooler");
        let queue = add(&mut session, Some(spooler), "queue");
        session.root = Some(root);

        let paths = session.paths(root);
        assert_eq!(paths.len(), 3);
        let path = vec![
            (ContractType::InstanceDemand, "printer".to_string()),
            (ContractType::InstanceDemand, "spooler".to_string()),
            (ContractType::InstanceDemand, "queue".to_string()),
        ];
        assert_eq!(paths.get(&path), Some(&queue));
        assert_eq!(session.path_of(queue), path);

        assert_eq!(session.subtree(root), vec![root, spooler, queue]);
        assert_eq!(session.leaves_first(), vec![queue, spooler, root]);

        let skip: HashSet<NodeKey> = [spooler].into_iter().collect();
        let (kept, skipped) = session.subtree_split(root, &skip);
        assert_eq!(kept, vec![root]);
        assert_eq!(skipped, vec![spooler]);
    }

    #[test]
    fn test_check_resolved_reports_pending_node() {
        let mut session = Session::new(SessionId::new(), None, Vec::new());
        assert!(session.check_resolved().is_err());
        let root = add(&mut session, None, "printer");
        session.root = Some(root);
        let reason = session.check_resolved().unwrap_err();
        assert!(reason.contains("RESOLVING"));
    }
}
