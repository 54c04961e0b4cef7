//! Assemblies: the outcome of a negotiation
//!
//! An `Assembly` records which element on which system answers one demand,
//! under which negotiated setup, and the assemblies of the setup's nested
//! demands. It is a plain value: once built it is never modified, only
//! replaced by a later negotiation.

use plexus_container::{Dependency, ElementKind};
use plexus_core::{Contract, ElementId, SystemId};
use serde::{Deserialize, Serialize};

use crate::pointer::Pointer;

/// Which element answers a demand, and with what
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembly {
    pointer: Pointer,
    demand: String,
    kind: ElementKind,
    system: SystemId,
    source: ElementId,
    element: ElementId,
    contract: Contract,
    reused: bool,
    children: Vec<Assembly>,
}

impl Assembly {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pointer: Pointer,
        demand: impl Into<String>,
        kind: ElementKind,
        system: SystemId,
        source: ElementId,
        element: ElementId,
        contract: Contract,
        children: Vec<Assembly>,
    ) -> Self {
        Self {
            pointer,
            demand: demand.into(),
            kind,
            system,
            source,
            element,
            contract,
            reused: false,
            children,
        }
    }

    /// Negotiation node the assembly was produced by
    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    /// Name of the demand the assembly answers
    pub fn demand(&self) -> &str {
        &self.demand
    }

    /// Instance or resource
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// System hosting the element
    pub fn system(&self) -> &SystemId {
        &self.system
    }

    /// Factory or allocator the element came from
    pub fn source(&self) -> ElementId {
        self.source
    }

    /// The answering element
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// Negotiated setup template
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Whether the element was carried over from an earlier negotiation
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Assemblies of the nested demands, in setup order
    pub fn children(&self) -> &[Assembly] {
        &self.children
    }

    /// Child answering the nested demand `demand`
    pub fn child(&self, demand: &str) -> Option<&Assembly> {
        self.children.iter().find(|c| c.demand == demand)
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Assembly::size).sum::<usize>()
    }

    /// Nodes in pre-order
    pub fn iter(&self) -> Vec<&Assembly> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.iter());
        }
        nodes
    }

    /// Whether `element` appears anywhere in the tree
    pub fn contains_element(&self, element: ElementId) -> bool {
        self.element == element || self.children.iter().any(|c| c.contains_element(element))
    }

    /// Dependency record handed to an instance for this assembly
    pub fn as_dependency(&self) -> Dependency {
        Dependency {
            demand: self.demand.clone(),
            system: self.system.clone(),
            element: self.element,
        }
    }

    /// Swap in a new assembly for the nested demand `child` answers
    pub(crate) fn replace_child(&mut self, child: Assembly) {
        if let Some(slot) = self.children.iter_mut().find(|c| c.demand == child.demand) {
            *slot = child;
        }
    }

    pub(crate) fn mark_reused(&mut self) {
        self.reused = true;
        for child in &mut self.children {
            child.mark_reused();
        }
    }

    pub(crate) fn clear_reused(&mut self) {
        self.reused = false;
        for child in &mut self.children {
            child.clear_reused();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{ContractType, SessionId};

    fn leaf(demand: &str) -> Assembly {
        let session = SessionId::new();
        let system = SystemId::new("a");
        Assembly::new(
            Pointer::session(session, system.clone()),
            demand,
            ElementKind::Resource,
            system,
            ElementId::new(),
            ElementId::new(),
            Contract::new(ContractType::ResourceTemplate, demand).unwrap(),
            Vec::new(),
        )
    }

    #[test]
    fn test_tree_queries() {
        let memory = leaf("memory");
        let memory_element = memory.element();
        let root = Assembly::new(
            Pointer::session(SessionId::new(), SystemId::new("a")),
            "printer",
            ElementKind::Instance,
            SystemId::new("a"),
            ElementId::new(),
            ElementId::new(),
            Contract::new(ContractType::InstanceTemplate, "driver").unwrap(),
            vec![memory, leaf("disk")],
        );
        assert_eq!(root.size(), 3);
        assert!(root.contains_element(memory_element));
        assert_eq!(root.child("disk").unwrap().demand(), "disk");
        assert_eq!(root.iter().len(), 3);
        assert_eq!(root.as_dependency().demand, "printer");
    }

    #[test]
    fn test_reuse_flag_covers_subtree() {
        let mut root = leaf("root");
        root.children.push(leaf("child"));
        root.mark_reused();
        assert!(root.iter().iter().all(|a| a.is_reused()));
        root.clear_reused();
        assert!(!root.children()[0].is_reused());
    }

    #[test]
    fn test_serde_roundtrip() {
        let assembly = leaf("memory");
        let json = serde_json::to_string(&assembly).unwrap();
        let back: Assembly = serde_json::from_str(&json).unwrap();
        assert_eq!(assembly, back);
    }
}
