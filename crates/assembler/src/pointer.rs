//! Pointers into negotiation state
//!
//! A `Pointer` names a session, a negotiation node inside it, or nothing at
//! all (the terminal pointer). Nodes live in an `Arena` whose keys carry a
//! generation: once a node is removed its key never resolves again, even
//! after the slot is recycled.

use plexus_core::{SessionId, SystemId};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// NodeKey
// =============================================================================

/// Generation-tagged index of a node in an `Arena`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    slot: u32,
    generation: u32,
}

impl NodeKey {
    /// Slot index
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Generation the slot had when the key was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.slot, self.generation)
    }
}

// =============================================================================
// Pointer
// =============================================================================

/// What a pointer designates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// The session as a whole
    Session,
    /// One negotiation node
    Node(NodeKey),
    /// Nothing; returned when a negotiation failed
    Terminal,
}

/// Opaque handle to negotiation state on one system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    /// Session the pointer belongs to
    pub session: SessionId,
    /// System holding the state
    pub system: SystemId,
    /// What is designated
    pub target: Target,
}

impl Pointer {
    /// Pointer to a whole session
    pub fn session(session: SessionId, system: SystemId) -> Self {
        Self {
            session,
            system,
            target: Target::Session,
        }
    }

    /// Pointer to a negotiation node
    pub fn node(session: SessionId, system: SystemId, key: NodeKey) -> Self {
        Self {
            session,
            system,
            target: Target::Node(key),
        }
    }

    /// The terminal pointer of a session
    pub fn terminal(session: SessionId, system: SystemId) -> Self {
        Self {
            session,
            system,
            target: Target::Terminal,
        }
    }

    /// Whether this is the terminal pointer
    pub fn is_terminal(&self) -> bool {
        self.target == Target::Terminal
    }

    /// Whether the pointer designates a whole session
    pub fn is_session(&self) -> bool {
        self.target == Target::Session
    }

    /// Node key, if the pointer designates a node
    pub fn node_key(&self) -> Option<NodeKey> {
        match self.target {
            Target::Node(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Target::Session => write!(f, "{}@{}", self.session, self.system),
            Target::Node(key) => write!(f, "{}@{}/{}", self.session, self.system, key),
            Target::Terminal => write!(f, "{}@{}/-", self.session, self.system),
        }
    }
}

// =============================================================================
// Arena
// =============================================================================

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slab of nodes addressed by generation-tagged keys
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Empty arena
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store a value and return its key
    pub fn insert(&mut self, value: T) -> NodeKey {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.value = Some(value);
            return NodeKey {
                slot,
                generation: entry.generation,
            };
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        NodeKey {
            slot,
            generation: 0,
        }
    }

    /// Value behind a live key
    pub fn get(&self, key: NodeKey) -> Option<&T> {
        self.slots
            .get(key.slot as usize)
            .filter(|s| s.generation == key.generation)
            .and_then(|s| s.value.as_ref())
    }

    /// Mutable value behind a live key
    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.slot as usize)
            .filter(|s| s.generation == key.generation)
            .and_then(|s| s.value.as_mut())
    }

    /// Whether the key still designates a value
    pub fn contains(&self, key: NodeKey) -> bool {
        self.get(key).is_some()
    }

    /// Remove a value; the key (and every copy of it) becomes stale
    pub fn remove(&mut self, key: NodeKey) -> Option<T> {
        let entry = self
            .slots
            .get_mut(key.slot as usize)
            .filter(|s| s.generation == key.generation)?;
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(key.slot);
        self.len -= 1;
        Some(value)
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no values
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live keys in slot order
    pub fn keys(&self) -> Vec<NodeKey> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value.as_ref().map(|v| {
                (
                    NodeKey {
                        slot: i as u32,
                        generation: s.generation,
                    },
                    v,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(a), Some("a"));
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_key_after_slot_reuse() {
        let mut arena = Arena::new();
        let old = arena.insert(1);
        arena.remove(old);
        let new = arena.insert(2);
        assert_eq!(old.slot(), new.slot());
        assert_ne!(old, new);
        assert!(arena.get(old).is_none());
        assert!(arena.remove(old).is_none());
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn test_iter_skips_removed() {
        let mut arena = Arena::new();
        let keys: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
        arena.remove(keys[1]);
        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 3]);
        assert_eq!(arena.keys().len(), 3);
    }

    #[test]
    fn test_pointer_kinds() {
        let session = SessionId::new();
        let system = SystemId::new("a");
        assert!(Pointer::session(session, system.clone()).is_session());
        assert!(Pointer::terminal(session, system.clone()).is_terminal());
        let mut arena = Arena::new();
        let key = arena.insert(());
        let ptr = Pointer::node(session, system, key);
        assert_eq!(ptr.node_key(), Some(key));
        assert!(ptr.to_string().ends_with("/0.0"));
    }
}
