//! Lockable templates
//!
//! A `Template` is the mutable contract tree an element publishes (its
//! instance or allocator template). Every access goes through one exclusive
//! lock per template:
//!
//! - `read()` returns a guard with readers over the committed tree
//! - `write()` returns a `TemplateWriter` over a private working copy
//!
//! Changes made through a writer are invisible until `commit()`. A commit
//! swaps the working copy in and bumps the revision; the matching
//! `TemplateEvent` is delivered once the writer releases the lock, so
//! subscribers that re-read the template never observe a half-updated tree
//! and never deadlock against the committer.
//!
//! Committing without an intervening mutation is a no-op and emits nothing.
//!
//! A caller that commits while holding a lock of its own wraps the call in
//! `hold_events()`; signals are then queued and delivered when the last hold
//! is dropped.

use super::{AllocatorLevel, InstanceLevel, Reader, ResourceLevel, Writer};
use crate::contract::Contract;
use crate::error::{PlexusError, PlexusResult};
use crate::events::{EventBus, SubscriptionId};
use parking_lot::{Mutex, MutexGuard};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::debug;

/// Signal emitted after a commit changed a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEvent {
    /// Root name of the template
    pub name: String,
    /// Revision after the commit
    pub revision: u64,
}

struct TemplateState {
    committed: Contract,
    revision: u64,
}

struct TemplateInner {
    state: Mutex<TemplateState>,
    events: EventBus<TemplateEvent>,
    held: Mutex<HeldEvents>,
}

#[derive(Default)]
struct HeldEvents {
    holds: usize,
    queued: Vec<TemplateEvent>,
}

impl TemplateInner {
    fn deliver(&self, event: TemplateEvent) {
        {
            let mut held = self.held.lock();
            if held.holds > 0 {
                held.queued.push(event);
                return;
            }
        }
        self.events.publish(&event);
    }
}

/// A shared, lock-protected template tree
///
/// Cloning yields another handle to the same template.
#[derive(Clone)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

impl Template {
    /// Wrap a template tree
    ///
    /// # Errors
    /// `InvalidPayload` if the root is not a template kind; any validation
    /// error of the tree.
    pub fn new(root: Contract) -> PlexusResult<Self> {
        if !root.kind().is_template() {
            return Err(PlexusError::InvalidPayload(format!(
                "{} '{}' is not a template",
                root.kind(),
                root.name()
            )));
        }
        root.validate()?;
        Ok(Self {
            inner: Arc::new(TemplateInner {
                state: Mutex::new(TemplateState {
                    committed: root,
                    revision: 0,
                }),
                events: EventBus::new(),
                held: Mutex::new(HeldEvents::default()),
            }),
        })
    }

    /// Lock for reading
    pub fn read(&self) -> TemplateReadGuard<'_> {
        TemplateReadGuard {
            guard: self.inner.state.lock(),
        }
    }

    /// Lock for writing
    ///
    /// The writer operates on a copy of the committed tree and holds the
    /// template lock until dropped.
    pub fn write(&self) -> TemplateWriter<'_> {
        let guard = self.inner.state.lock();
        let working = guard.committed.clone();
        TemplateWriter {
            guard: Some(guard),
            working,
            dirty: false,
            pending: Vec::new(),
            inner: &self.inner,
        }
    }

    /// Queue commit signals until the returned guard is dropped
    pub fn hold_events(&self) -> EventHold<'_> {
        self.inner.held.lock().holds += 1;
        EventHold { inner: &self.inner }
    }

    /// Copy of the committed tree
    pub fn snapshot(&self) -> Contract {
        self.inner.state.lock().committed.clone()
    }

    /// Number of effective commits so far
    pub fn revision(&self) -> u64 {
        self.inner.state.lock().revision
    }

    /// Subscribe to commit signals over a channel
    pub fn subscribe(&self) -> (SubscriptionId, Receiver<TemplateEvent>) {
        self.inner.events.subscribe()
    }

    /// Subscribe to commit signals with a callback
    pub fn subscribe_fn(
        &self,
        callback: impl Fn(&TemplateEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.events.subscribe_fn(callback)
    }

    /// End a subscription
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Whether two handles refer to the same template
    pub fn ptr_eq(&self, other: &Template) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Template")
            .field("name", &state.committed.name())
            .field("revision", &state.revision)
            .finish()
    }
}

/// Read access to a committed template, holding its lock
pub struct TemplateReadGuard<'a> {
    guard: MutexGuard<'a, TemplateState>,
}

impl<'a> TemplateReadGuard<'a> {
    /// Revision being read
    pub fn revision(&self) -> u64 {
        self.guard.revision
    }

    /// Name of the template root
    pub fn name(&self) -> &str {
        self.guard.committed.name()
    }

    /// Reader for an instance template
    pub fn instance(&self) -> Option<Reader<'_, InstanceLevel>> {
        Reader::new(&self.guard.committed)
    }

    /// Reader for a resource template
    pub fn resource(&self) -> Option<Reader<'_, ResourceLevel>> {
        Reader::new(&self.guard.committed)
    }

    /// Reader for an allocator template
    pub fn allocator(&self) -> Option<Reader<'_, AllocatorLevel>> {
        Reader::new(&self.guard.committed)
    }
}

/// Exclusive write access to a template
pub struct TemplateWriter<'a> {
    guard: Option<MutexGuard<'a, TemplateState>>,
    working: Contract,
    dirty: bool,
    pending: Vec<TemplateEvent>,
    inner: &'a TemplateInner,
}

impl<'a> TemplateWriter<'a> {
    /// Writer for an instance template
    pub fn instance(&mut self) -> Option<Writer<'_, InstanceLevel>> {
        Writer::new(&mut self.working, &mut self.dirty)
    }

    /// Writer for a resource template
    pub fn resource(&mut self) -> Option<Writer<'_, ResourceLevel>> {
        Writer::new(&mut self.working, &mut self.dirty)
    }

    /// Writer for an allocator template
    pub fn allocator(&mut self) -> Option<Writer<'_, AllocatorLevel>> {
        Writer::new(&mut self.working, &mut self.dirty)
    }

    /// Whether there are uncommitted changes
    pub fn has_changes(&self) -> bool {
        self.dirty
    }

    /// Publish the working copy
    ///
    /// Returns true if there was anything to commit. The re-evaluation
    /// signal is delivered when the writer is dropped.
    pub fn commit(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        let Some(state) = self.guard.as_mut() else {
            return false;
        };
        state.committed = self.working.clone();
        state.revision += 1;
        self.dirty = false;
        debug!(
            target: "plexus::contract",
            template = %state.committed.name(),
            revision = state.revision,
            "Template committed"
        );
        self.pending.push(TemplateEvent {
            name: state.committed.name().to_string(),
            revision: state.revision,
        });
        true
    }
}

impl Drop for TemplateWriter<'_> {
    fn drop(&mut self) {
        // Unlock first so subscribers can read the new revision
        self.guard.take();
        for event in self.pending.drain(..) {
            self.inner.deliver(event);
        }
    }
}

/// Guard returned by `Template::hold_events`
pub struct EventHold<'a> {
    inner: &'a TemplateInner,
}

impl Drop for EventHold<'_> {
    fn drop(&mut self) {
        let queued = {
            let mut held = self.inner.held.lock();
            held.holds = held.holds.saturating_sub(1);
            if held.holds > 0 {
                return;
            }
            std::mem::take(&mut held.queued)
        };
        for event in queued {
            self.inner.events.publish(&event);
        }
    }
}
