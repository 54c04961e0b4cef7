//! The container service
//!
//! One `Container` per system manages the factories and allocators the host
//! registers and every instance and resource they produce.
//!
//! ## Concurrency
//!
//! - Registries are `DashMap`s; entries are `Arc`s cloned out before any
//!   element code runs, so no map shard is locked across a callback.
//! - Each instance/resource has its own mutex serializing its transitions.
//! - Each allocator sits behind its own mutex, so no two resource-lifecycle
//!   calls for the same allocator run concurrently.
//!
//! ## Sharing
//!
//! Elements are reference counted. `commit` of a fresh setup starts the
//! element with one reference; committing an offer for an existing element
//! adds one. `release_element` drops one and tears the element down when the
//! last is gone.

use dashmap::DashMap;
use parking_lot::Mutex;
use plexus_core::{
    Contract, ContractType, ElementId, EventBus, PlexusError, PlexusResult, SubscriptionId,
    SystemId, Template,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::allocator::Allocator;
use crate::element::{ElementKind, ElementState, ElementStatus};
use crate::events::ContainerEvent;
use crate::factory::Factory;
use crate::instance::{Dependency, Instance, InstanceContext};
use crate::setup::{Offer, Setup};

struct FactoryEntry {
    seq: u64,
    factory: Arc<dyn Factory>,
}

struct AllocatorEntry {
    seq: u64,
    template: Template,
    allocator: Mutex<Box<dyn Allocator>>,
}

struct ElementRecord {
    seq: u64,
    kind: ElementKind,
    source: ElementId,
    setup: Setup,
    state: ElementState,
    refs: usize,
    instance: Option<Box<dyn Instance>>,
}

/// Local manager of factories, allocators and their elements
pub struct Container {
    system: SystemId,
    next_seq: AtomicU64,
    factories: DashMap<ElementId, Arc<FactoryEntry>>,
    allocators: DashMap<ElementId, Arc<AllocatorEntry>>,
    elements: DashMap<ElementId, Arc<Mutex<ElementRecord>>>,
    templates: Mutex<HashMap<ElementId, (Template, SubscriptionId)>>,
    events: Arc<EventBus<ContainerEvent>>,
}

impl Container {
    /// Create an empty container for `system`
    pub fn new(system: SystemId) -> Self {
        Self {
            system,
            next_seq: AtomicU64::new(0),
            factories: DashMap::new(),
            allocators: DashMap::new(),
            elements: DashMap::new(),
            templates: Mutex::new(HashMap::new()),
            events: Arc::new(EventBus::new()),
        }
    }

    /// System this container runs on
    pub fn system(&self) -> &SystemId {
        &self.system
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribe to container events over a channel
    pub fn subscribe(&self) -> (SubscriptionId, Receiver<ContainerEvent>) {
        self.events.subscribe()
    }

    /// Subscribe to container events with a callback
    pub fn subscribe_fn(
        &self,
        callback: impl Fn(&ContainerEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.events.subscribe_fn(callback)
    }

    /// End a subscription
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Forward commits of `template` as `TemplateChanged` events for `element`
    ///
    /// Registering again for the same element replaces the previous template.
    pub fn register_template(&self, element: ElementId, template: Template) {
        let events = Arc::clone(&self.events);
        let subscription = template.subscribe_fn(move |event| {
            events.publish(&ContainerEvent::TemplateChanged {
                element,
                revision: event.revision,
            });
        });
        let previous = self
            .templates
            .lock()
            .insert(element, (template, subscription));
        if let Some((old, old_subscription)) = previous {
            old.unsubscribe(old_subscription);
        }
    }

    /// Stop forwarding the template of `element`
    pub fn unregister_template(&self, element: ElementId) -> bool {
        match self.templates.lock().remove(&element) {
            Some((template, subscription)) => {
                template.unsubscribe(subscription);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Factories and allocators
    // =========================================================================

    /// Register a factory
    pub fn add_factory(&self, factory: Arc<dyn Factory>) -> ElementId {
        let id = ElementId::new();
        let template = factory.template().clone();
        self.factories.insert(
            id,
            Arc::new(FactoryEntry {
                seq: self.next_seq(),
                factory,
            }),
        );
        self.register_template(id, template);
        info!(target: "plexus::container", system = %self.system, factory = %id, "Factory added");
        self.events.publish(&ContainerEvent::ElementStarted {
            element: id,
            kind: ElementKind::Factory,
        });
        id
    }

    /// Register an allocator
    pub fn add_allocator(&self, allocator: Box<dyn Allocator>) -> ElementId {
        let id = ElementId::new();
        let template = allocator.template().clone();
        self.allocators.insert(
            id,
            Arc::new(AllocatorEntry {
                seq: self.next_seq(),
                template: template.clone(),
                allocator: Mutex::new(allocator),
            }),
        );
        self.register_template(id, template);
        info!(target: "plexus::container", system = %self.system, allocator = %id, "Allocator added");
        self.events.publish(&ContainerEvent::ElementStarted {
            element: id,
            kind: ElementKind::Allocator,
        });
        id
    }

    fn has_dependents(&self, source: ElementId) -> bool {
        self.element_records()
            .iter()
            .any(|(_, record)| record.lock().source == source)
    }

    /// Unregister a factory with no live instances
    ///
    /// # Errors
    /// - `UnknownElement` if `id` is not a registered factory
    /// - `ElementInUse` while instances it created are alive
    pub fn remove_factory(&self, id: ElementId) -> PlexusResult<()> {
        if !self.factories.contains_key(&id) {
            return Err(PlexusError::UnknownElement(id));
        }
        if self.has_dependents(id) {
            return Err(PlexusError::ElementInUse(id));
        }
        self.factories.remove(&id);
        self.unregister_template(id);
        info!(target: "plexus::container", factory = %id, "Factory removed");
        self.events.publish(&ContainerEvent::ElementStopped {
            element: id,
            kind: ElementKind::Factory,
        });
        Ok(())
    }

    /// Unregister an allocator with no live resources
    ///
    /// # Errors
    /// - `UnknownElement` if `id` is not a registered allocator
    /// - `ElementInUse` while resources it created are alive
    pub fn remove_allocator(&self, id: ElementId) -> PlexusResult<()> {
        if !self.allocators.contains_key(&id) {
            return Err(PlexusError::UnknownElement(id));
        }
        if self.has_dependents(id) {
            return Err(PlexusError::ElementInUse(id));
        }
        self.allocators.remove(&id);
        self.unregister_template(id);
        info!(target: "plexus::container", allocator = %id, "Allocator removed");
        self.events.publish(&ContainerEvent::ElementStopped {
            element: id,
            kind: ElementKind::Allocator,
        });
        Ok(())
    }

    /// Free capacity of an allocator
    pub fn free_resources(&self, allocator: ElementId) -> Option<Vec<i64>> {
        let entry = self.allocators.get(&allocator).map(|e| Arc::clone(e.value()))?;
        let free = entry.allocator.lock().free_resources();
        Some(free)
    }

    /// Total capacity of an allocator
    pub fn total_resources(&self, allocator: ElementId) -> Option<Vec<i64>> {
        let entry = self.allocators.get(&allocator).map(|e| Arc::clone(e.value()))?;
        let total = entry.allocator.lock().total_resources();
        Some(total)
    }

    // =========================================================================
    // Negotiation surface
    // =========================================================================

    fn sorted_factories(&self) -> Vec<(ElementId, Arc<FactoryEntry>)> {
        let mut entries: Vec<_> = self
            .factories
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries
    }

    fn sorted_allocators(&self) -> Vec<(ElementId, Arc<AllocatorEntry>)> {
        let mut entries: Vec<_> = self
            .allocators
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries
    }

    fn element_records(&self) -> Vec<(ElementId, Arc<Mutex<ElementRecord>>)> {
        self.elements
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect()
    }

    /// Offers of every local factory/allocator for `demand`, in registration
    /// order
    ///
    /// Shareable factories first offer their running instances whose setup
    /// still satisfies the demand.
    pub fn derive_setups(&self, demand: &Contract) -> Vec<Offer> {
        let mut offers = Vec::new();
        match demand.kind() {
            ContractType::InstanceDemand => {
                let records = self.element_records();
                for (factory_id, entry) in self.sorted_factories() {
                    if entry.factory.shareable() {
                        let mut existing: Vec<(u64, Offer)> = records
                            .iter()
                            .filter_map(|(id, record)| {
                                let record = record.lock();
                                (record.source == factory_id
                                    && record.state.is_live()
                                    && record.setup.satisfies(demand, true))
                                .then(|| {
                                    (
                                        record.seq,
                                        Offer {
                                            system: self.system.clone(),
                                            source: factory_id,
                                            setup: record.setup.copy_setup(),
                                            existing: Some(*id),
                                        },
                                    )
                                })
                            })
                            .collect();
                        existing.sort_by_key(|(seq, _)| *seq);
                        offers.extend(existing.into_iter().map(|(_, offer)| offer));
                    }
                    if let Some(setups) = entry.factory.derive_setups(demand) {
                        offers.extend(setups.into_iter().map(|setup| Offer {
                            system: self.system.clone(),
                            source: factory_id,
                            setup,
                            existing: None,
                        }));
                    }
                }
            }
            ContractType::ResourceDemand => {
                for (allocator_id, entry) in self.sorted_allocators() {
                    let setups = entry.allocator.lock().derive_setups(demand);
                    if let Some(setups) = setups {
                        offers.extend(setups.into_iter().map(|setup| Offer {
                            system: self.system.clone(),
                            source: allocator_id,
                            setup,
                            existing: None,
                        }));
                    }
                }
            }
            _ => {}
        }
        debug!(
            target: "plexus::container",
            system = %self.system,
            demand = %demand.name(),
            offers = offers.len(),
            "Derived setups"
        );
        offers
    }

    /// Accept an offer
    ///
    /// Returns the element now serving the offer, or None if the offer can no
    /// longer be honoured (capacity gone, shared element stopped); the caller
    /// moves on to its next alternative.
    ///
    /// # Errors
    /// Element failures while creating or starting; `UnknownElement` if the
    /// offering factory/allocator is gone.
    pub fn commit(
        &self,
        offer: &Offer,
        dependencies: Vec<Dependency>,
    ) -> PlexusResult<Option<ElementId>> {
        if offer.system != self.system {
            return Err(PlexusError::Internal(format!(
                "offer from {} committed on {}",
                offer.system, self.system
            )));
        }
        if let Some(existing) = offer.existing {
            return Ok(self.acquire(existing)?.then_some(existing));
        }
        match offer.setup.element_kind() {
            ElementKind::Resource => self.commit_resource(offer.source, offer.setup.copy_setup()),
            _ => self
                .commit_instance(offer.source, offer.setup.copy_setup(), dependencies)
                .map(Some),
        }
    }

    /// Create, bind and start an instance
    pub fn commit_instance(
        &self,
        factory: ElementId,
        setup: Setup,
        dependencies: Vec<Dependency>,
    ) -> PlexusResult<ElementId> {
        self.spawn_instance(factory, setup, dependencies, None)
    }

    /// Create an instance equivalent to a checkpointed one
    ///
    /// The image is loaded between bind and start.
    pub fn restore_instance(
        &self,
        factory: ElementId,
        setup: Setup,
        image: &[u8],
        dependencies: Vec<Dependency>,
    ) -> PlexusResult<ElementId> {
        self.spawn_instance(factory, setup, dependencies, Some(image))
    }

    fn spawn_instance(
        &self,
        factory: ElementId,
        setup: Setup,
        dependencies: Vec<Dependency>,
        image: Option<&[u8]>,
    ) -> PlexusResult<ElementId> {
        let entry = self
            .factories
            .get(&factory)
            .map(|e| Arc::clone(e.value()))
            .ok_or(PlexusError::UnknownElement(factory))?;

        let id = ElementId::new();
        let mut state = ElementState::Created;
        let mut instance = entry
            .factory
            .create_instance(&setup)
            .map_err(|e| e.into_plexus(id))?;

        let context = InstanceContext {
            element: id,
            system: self.system.clone(),
            setup: setup.copy_setup(),
            dependencies,
        };
        let bound = instance.bind_context(&context).and_then(|()| match image {
            Some(image) => instance.load_checkpoint(image),
            None => Ok(()),
        });
        if let Err(e) = bound {
            warn!(target: "plexus::container", element = %id, error = %e, "Instance rejected its context");
            instance.unbind_context();
            return Err(e.into_plexus(id));
        }
        state.transition(id, ElementState::ContextBound)?;

        if let Err(e) = instance.start() {
            warn!(target: "plexus::container", element = %id, error = %e, "Instance failed to start");
            instance.unbind_context();
            return Err(e.into_plexus(id));
        }
        state.transition(id, ElementState::Started)?;

        self.elements.insert(
            id,
            Arc::new(Mutex::new(ElementRecord {
                seq: self.next_seq(),
                kind: ElementKind::Instance,
                source: factory,
                setup,
                state,
                refs: 1,
                instance: Some(instance),
            })),
        );
        info!(
            target: "plexus::container",
            system = %self.system,
            element = %id,
            factory = %factory,
            restored = image.is_some(),
            "Instance started"
        );
        self.events.publish(&ContainerEvent::ElementStarted {
            element: id,
            kind: ElementKind::Instance,
        });
        Ok(id)
    }

    /// Reserve a resource
    ///
    /// Returns None if the allocator lacks capacity.
    pub fn commit_resource(
        &self,
        allocator: ElementId,
        setup: Setup,
    ) -> PlexusResult<Option<ElementId>> {
        let entry = self
            .allocators
            .get(&allocator)
            .map(|e| Arc::clone(e.value()))
            .ok_or(PlexusError::UnknownElement(allocator))?;

        let id = ElementId::new();
        let (started, free) = {
            // Capacity signals go out after the allocator is unlocked
            let _hold = entry.template.hold_events();
            let mut alloc = entry.allocator.lock();
            let started = alloc
                .start_resource(id, &setup)
                .map_err(|e| e.into_plexus(id))?;
            (started, alloc.free_resources())
        };
        if !started {
            debug!(target: "plexus::container", allocator = %allocator, "Resource start refused");
            return Ok(None);
        }

        let mut state = ElementState::Created;
        state.transition(id, ElementState::ContextBound)?;
        state.transition(id, ElementState::Started)?;
        self.elements.insert(
            id,
            Arc::new(Mutex::new(ElementRecord {
                seq: self.next_seq(),
                kind: ElementKind::Resource,
                source: allocator,
                setup,
                state,
                refs: 1,
                instance: None,
            })),
        );
        info!(
            target: "plexus::container",
            system = %self.system,
            element = %id,
            allocator = %allocator,
            "Resource started"
        );
        self.events.publish(&ContainerEvent::ElementStarted {
            element: id,
            kind: ElementKind::Resource,
        });
        self.events.publish(&ContainerEvent::CapacityChanged { allocator, free });
        Ok(Some(id))
    }

    // =========================================================================
    // Element lifecycle
    // =========================================================================

    fn record(&self, id: ElementId) -> PlexusResult<Arc<Mutex<ElementRecord>>> {
        self.elements
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(PlexusError::UnknownElement(id))
    }

    /// Add a reference to a live element
    ///
    /// Returns false if the element exists but is no longer live.
    pub fn acquire(&self, id: ElementId) -> PlexusResult<bool> {
        let record = self.record(id)?;
        let mut record = record.lock();
        if !record.state.is_live() {
            return Ok(false);
        }
        record.refs += 1;
        Ok(true)
    }

    /// Drop a reference; the last one stops the element
    ///
    /// Returns true if the element was stopped.
    pub fn release_element(&self, id: ElementId) -> PlexusResult<bool> {
        let remaining = {
            let record = self.record(id)?;
            let mut record = record.lock();
            record.refs = record.refs.saturating_sub(1);
            record.refs
        };
        if remaining > 0 {
            debug!(target: "plexus::container", element = %id, remaining, "Element still shared");
            return Ok(false);
        }
        self.stop_instance(id)?;
        Ok(true)
    }

    /// Tear an instance or resource down regardless of references
    ///
    /// Runs stop, unbind and discard. The element is gone afterwards even if
    /// its stop hook failed; the failure is reported as an element error.
    pub fn stop_instance(&self, id: ElementId) -> PlexusResult<()> {
        let (_, record) = self
            .elements
            .remove(&id)
            .ok_or(PlexusError::UnknownElement(id))?;
        let mut record = record.lock();
        let outcome = self.teardown(id, &mut record);
        match &outcome {
            Ok(()) => {
                info!(target: "plexus::container", element = %id, kind = %record.kind, "Element stopped");
                self.events.publish(&ContainerEvent::ElementStopped {
                    element: id,
                    kind: record.kind,
                });
            }
            Err(e) => {
                error!(target: "plexus::container", element = %id, error = %e, "Element failed to stop");
                self.events.publish(&ContainerEvent::ElementFailed {
                    element: id,
                    reason: e.to_string(),
                });
            }
        }
        outcome
    }

    fn teardown(&self, id: ElementId, record: &mut ElementRecord) -> PlexusResult<()> {
        let mut failure = None;
        if record.state.is_live() {
            let stopped = match record.kind {
                ElementKind::Resource => self.stop_resource(record.source, id),
                _ => match record.instance.as_mut() {
                    Some(instance) => instance.stop().map_err(|e| e.into_plexus(id)),
                    None => Ok(()),
                },
            };
            if let Err(e) = stopped {
                failure = Some(e);
            }
            record.state.transition(id, ElementState::Stopped)?;
        }
        if let Some(instance) = record.instance.as_mut() {
            instance.unbind_context();
        }
        if record.state.can_transition_to(ElementState::ContextUnbound) {
            record.state.transition(id, ElementState::ContextUnbound)?;
        }
        record.state.transition(id, ElementState::Discarded)?;
        record.instance = None;
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn stop_resource(&self, allocator: ElementId, id: ElementId) -> PlexusResult<()> {
        let entry = self
            .allocators
            .get(&allocator)
            .map(|e| Arc::clone(e.value()))
            .ok_or(PlexusError::UnknownElement(allocator))?;
        let free = {
            let _hold = entry.template.hold_events();
            let mut alloc = entry.allocator.lock();
            alloc.stop_resource(id).map_err(|e| e.into_plexus(id))?;
            alloc.free_resources()
        };
        self.events
            .publish(&ContainerEvent::CapacityChanged { allocator, free });
        Ok(())
    }

    /// Pause a started element
    pub fn pause_element(&self, id: ElementId) -> PlexusResult<()> {
        let record = self.record(id)?;
        let mut record = record.lock();
        if !record.state.can_transition_to(ElementState::Paused) {
            return record.state.transition(id, ElementState::Paused);
        }
        match record.kind {
            ElementKind::Resource => {
                let entry = self
                    .allocators
                    .get(&record.source)
                    .map(|e| Arc::clone(e.value()))
                    .ok_or(PlexusError::UnknownElement(record.source))?;
                let paused = entry.allocator.lock().pause_resource(id);
                paused.map_err(|e| e.into_plexus(id))?;
            }
            _ => {
                if let Some(instance) = record.instance.as_mut() {
                    instance.pause().map_err(|e| e.into_plexus(id))?;
                }
            }
        }
        record.state.transition(id, ElementState::Paused)?;
        debug!(target: "plexus::container", element = %id, "Element paused");
        Ok(())
    }

    /// Resume a paused element
    pub fn resume_element(&self, id: ElementId) -> PlexusResult<()> {
        let record = self.record(id)?;
        let mut record = record.lock();
        if record.state != ElementState::Paused {
            return Err(PlexusError::InvalidTransition {
                element: id,
                from: record.state.name().to_string(),
                to: ElementState::Started.name().to_string(),
            });
        }
        match record.kind {
            ElementKind::Resource => {
                let entry = self
                    .allocators
                    .get(&record.source)
                    .map(|e| Arc::clone(e.value()))
                    .ok_or(PlexusError::UnknownElement(record.source))?;
                let resumed = entry.allocator.lock().resume_resource(id);
                resumed.map_err(|e| e.into_plexus(id))?;
            }
            _ => {
                if let Some(instance) = record.instance.as_mut() {
                    instance.start().map_err(|e| e.into_plexus(id))?;
                }
            }
        }
        record.state.transition(id, ElementState::Started)?;
        debug!(target: "plexus::container", element = %id, "Element resumed");
        Ok(())
    }

    /// Host-reported loss of an element
    ///
    /// The element is torn down best-effort and discarded; an
    /// `ElementFailed` event tells assemblies using it to repair.
    pub fn fail_element(&self, id: ElementId, reason: &str) -> PlexusResult<()> {
        let (_, record) = self
            .elements
            .remove(&id)
            .ok_or(PlexusError::UnknownElement(id))?;
        {
            let mut record = record.lock();
            if let Err(e) = self.teardown(id, &mut record) {
                debug!(target: "plexus::container", element = %id, error = %e, "Teardown of failed element");
            }
        }
        error!(target: "plexus::container", element = %id, reason, "Element failed");
        self.events.publish(&ContainerEvent::ElementFailed {
            element: id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Checkpoint image of an instance
    ///
    /// Resources and stateless instances return None.
    pub fn checkpoint(&self, id: ElementId) -> PlexusResult<Option<Vec<u8>>> {
        let record = self.record(id)?;
        let record = record.lock();
        Ok(record
            .instance
            .as_ref()
            .and_then(|instance| instance.store_checkpoint()))
    }

    /// Stop every instance and resource, oldest first
    pub fn shutdown(&self) {
        let mut records = self.element_records();
        records.sort_by_key(|(_, record)| record.lock().seq);
        for (id, _) in records {
            if let Err(e) = self.stop_instance(id) {
                warn!(target: "plexus::container", element = %id, error = %e, "Shutdown stop failed");
            }
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Whether an instance/resource is running or paused
    pub fn is_running(&self, id: ElementId) -> bool {
        self.elements
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .map(|record| record.lock().state.is_live())
            .unwrap_or(false)
    }

    /// Status of any element
    pub fn status(&self, id: ElementId) -> Option<ElementStatus> {
        if let Some(record) = self.elements.get(&id).map(|e| Arc::clone(e.value())) {
            let record = record.lock();
            return Some(ElementStatus {
                id,
                kind: record.kind,
                state: record.state,
                name: record.setup.name().to_string(),
                source: Some(record.source),
                refs: record.refs,
                contract: record.setup.template().clone(),
            });
        }
        if let Some(entry) = self.factories.get(&id).map(|e| Arc::clone(e.value())) {
            return Some(registered_status(
                id,
                ElementKind::Factory,
                entry.factory.template(),
            ));
        }
        let entry = self.allocators.get(&id).map(|e| Arc::clone(e.value()))?;
        Some(registered_status(id, ElementKind::Allocator, &entry.template))
    }

    /// Status of every element, factories and allocators first
    pub fn elements(&self) -> Vec<ElementStatus> {
        let mut ids: Vec<(u64, ElementId)> = Vec::new();
        ids.extend(self.sorted_factories().into_iter().map(|(id, e)| (e.seq, id)));
        ids.extend(self.sorted_allocators().into_iter().map(|(id, e)| (e.seq, id)));
        let mut live: Vec<(u64, ElementId)> = self
            .element_records()
            .into_iter()
            .map(|(id, record)| (record.lock().seq, id))
            .collect();
        live.sort();
        ids.sort();
        ids.extend(live);
        ids.into_iter().filter_map(|(_, id)| self.status(id)).collect()
    }
}

fn registered_status(id: ElementId, kind: ElementKind, template: &Template) -> ElementStatus {
    let contract = template.snapshot();
    ElementStatus {
        id,
        kind,
        state: ElementState::Started,
        name: contract.name().to_string(),
        source: None,
        refs: 0,
        contract,
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("system", &self.system)
            .field("factories", &self.factories.len())
            .field("allocators", &self.allocators.len())
            .field("elements", &self.elements.len())
            .finish()
    }
}
