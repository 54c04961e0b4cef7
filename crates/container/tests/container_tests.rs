//! Container integration tests
//!
//! Exercise the container through its public surface only:
//!
//! 1. **Lifecycle** - commit, pause/resume, stop, hook ordering
//! 2. **Sharing** - reference counting and existing-element offers
//! 3. **Resources** - capacity accounting through the container
//! 4. **Failures** - element failures stay local to the element
//! 5. **Checkpoints** - store and restore
//! 6. **Events** - status-change notifications
//! 7. **Concurrency** - parallel commits against one allocator

use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;

use plexus_container::{
    CapacityAllocator, Container, ContainerEvent, ElementError, ElementKind, ElementState,
    Instance, InstanceContext, TemplateFactory,
};
use plexus_core::{
    Comparator, Contract, ContractBuilder, ContractType, FeatureDemand, FeatureProvision,
    PlexusError, SystemId, Template,
};

// ============================================================================
// Test Helpers
// ============================================================================

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    log: Log,
    fail_start: bool,
    state: Vec<u8>,
}

impl Instance for Recorder {
    fn bind_context(&mut self, context: &InstanceContext) -> Result<(), ElementError> {
        self.log.lock().push(format!("bind:{}", context.setup.name()));
        Ok(())
    }
    fn start(&mut self) -> Result<(), ElementError> {
        self.log.lock().push("start".into());
        if self.fail_start {
            return Err(ElementError::Start("refused".into()));
        }
        Ok(())
    }
    fn pause(&mut self) -> Result<(), ElementError> {
        self.log.lock().push("pause".into());
        Ok(())
    }
    fn stop(&mut self) -> Result<(), ElementError> {
        self.log.lock().push("stop".into());
        Ok(())
    }
    fn unbind_context(&mut self) {
        self.log.lock().push("unbind".into());
    }
    fn store_checkpoint(&self) -> Option<Vec<u8>> {
        Some(self.state.clone())
    }
    fn load_checkpoint(&mut self, image: &[u8]) -> Result<(), ElementError> {
        self.log.lock().push(format!("load:{}", image.len()));
        self.state = image.to_vec();
        Ok(())
    }
}

fn printer_template(location: &str) -> Template {
    let provision = ContractBuilder::new(ContractType::InstanceProvision, "driver")
        .interface("Printer")
        .feature("Printer", "Location", "LOCATION", FeatureProvision::value_of(location))
        .build()
        .unwrap();
    Template::new(
        Contract::new(ContractType::InstanceTemplate, "driver")
            .unwrap()
            .with(provision)
            .unwrap(),
    )
    .unwrap()
}

fn printer_factory(location: &str, log: &Log, fail_start: bool) -> TemplateFactory {
    let log = Arc::clone(log);
    TemplateFactory::new(printer_template(location), move |_| {
        Ok(Box::new(Recorder {
            log: Arc::clone(&log),
            fail_start,
            state: vec![1, 2, 3],
        }))
    })
    .unwrap()
}

fn printer_demand(location: &str) -> Contract {
    ContractBuilder::new(ContractType::InstanceDemand, "printer")
        .interface("Printer")
        .feature(
            "Printer",
            "Location",
            "LOCATION",
            FeatureDemand::simple(Comparator::Equal, location).unwrap(),
        )
        .build()
        .unwrap()
}

fn memory_demand(amount: i32) -> Contract {
    ContractBuilder::new(ContractType::ResourceDemand, "memory")
        .dimension_feature(
            "Capacity",
            "MEMORY",
            FeatureDemand::simple(Comparator::GreaterEqual, amount).unwrap(),
        )
        .build()
        .unwrap()
}

fn container() -> Container {
    Container::new(SystemId::new("node-a"))
}

// ============================================================================
// SECTION 1: Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_commit_runs_hooks_in_order() {
        let log = Log::default();
        let c = container();
        c.add_factory(Arc::new(printer_factory("A", &log, false)));

        let offers = c.derive_setups(&printer_demand("A"));
        assert_eq!(offers.len(), 1);
        let id = c.commit(&offers[0], Vec::new()).unwrap().unwrap();
        assert!(c.is_running(id));
        assert_eq!(*log.lock(), vec!["bind:driver", "start"]);

        c.stop_instance(id).unwrap();
        assert!(!c.is_running(id));
        assert_eq!(*log.lock(), vec!["bind:driver", "start", "stop", "unbind"]);
        assert!(c.status(id).is_none());
    }

    #[test]
    fn test_no_offer_for_mismatch() {
        let log = Log::default();
        let c = container();
        c.add_factory(Arc::new(printer_factory("B", &log, false)));
        assert!(c.derive_setups(&printer_demand("A")).is_empty());
    }

    #[test]
    fn test_pause_resume() {
        let log = Log::default();
        let c = container();
        c.add_factory(Arc::new(printer_factory("A", &log, false)));
        let offer = c.derive_setups(&printer_demand("A")).pop().unwrap();
        let id = c.commit(&offer, Vec::new()).unwrap().unwrap();

        c.pause_element(id).unwrap();
        assert_eq!(c.status(id).unwrap().state, ElementState::Paused);
        assert!(c.is_running(id));
        assert!(c.pause_element(id).is_err());

        c.resume_element(id).unwrap();
        assert_eq!(c.status(id).unwrap().state, ElementState::Started);
        assert!(c.resume_element(id).is_err());
    }

    #[test]
    fn test_offers_follow_registration_order() {
        let log = Log::default();
        let c = container();
        let first = c.add_factory(Arc::new(printer_factory("A", &log, false)));
        let second = c.add_factory(Arc::new(printer_factory("A", &log, false)));
        let offers = c.derive_setups(&printer_demand("A"));
        let sources: Vec<_> = offers.iter().map(|o| o.source).collect();
        assert_eq!(sources, vec![first, second]);
    }

    #[test]
    fn test_remove_factory_in_use() {
        let log = Log::default();
        let c = container();
        let factory = c.add_factory(Arc::new(printer_factory("A", &log, false)));
        let offer = c.derive_setups(&printer_demand("A")).pop().unwrap();
        let id = c.commit(&offer, Vec::new()).unwrap().unwrap();

        assert!(matches!(
            c.remove_factory(factory),
            Err(PlexusError::ElementInUse(_))
        ));
        c.stop_instance(id).unwrap();
        c.remove_factory(factory).unwrap();
        assert!(c.derive_setups(&printer_demand("A")).is_empty());
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let log = Log::default();
        let c = container();
        c.add_factory(Arc::new(printer_factory("A", &log, false)));
        for _ in 0..3 {
            let offer = c.derive_setups(&printer_demand("A")).pop().unwrap();
            c.commit(&offer, Vec::new()).unwrap();
        }
        c.shutdown();
        let live = c
            .elements()
            .into_iter()
            .filter(|s| s.kind == ElementKind::Instance)
            .count();
        assert_eq!(live, 0);
        assert_eq!(log.lock().iter().filter(|l| *l == "stop").count(), 3);
    }
}

// ============================================================================
// SECTION 2: Sharing
// ============================================================================

mod sharing {
    use super::*;

    #[test]
    fn test_shareable_factory_offers_running_instance_first() {
        let log = Log::default();
        let c = container();
        c.add_factory(Arc::new(printer_factory("A", &log, false).shared()));

        let fresh = c.derive_setups(&printer_demand("A")).pop().unwrap();
        let id = c.commit(&fresh, Vec::new()).unwrap().unwrap();

        let offers = c.derive_setups(&printer_demand("A"));
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].existing, Some(id));
        assert!(offers[1].existing.is_none());

        // Committing the existing offer shares the instance
        assert_eq!(c.commit(&offers[0], Vec::new()).unwrap(), Some(id));
        assert_eq!(c.status(id).unwrap().refs, 2);

        assert!(!c.release_element(id).unwrap());
        assert!(c.is_running(id));
        assert!(c.release_element(id).unwrap());
        assert!(!c.is_running(id));
        assert_eq!(log.lock().iter().filter(|l| *l == "stop").count(), 1);
    }

    #[test]
    fn test_unshared_factory_never_offers_existing() {
        let log = Log::default();
        let c = container();
        c.add_factory(Arc::new(printer_factory("A", &log, false)));
        let fresh = c.derive_setups(&printer_demand("A")).pop().unwrap();
        c.commit(&fresh, Vec::new()).unwrap();
        assert!(c
            .derive_setups(&printer_demand("A"))
            .iter()
            .all(|o| o.existing.is_none()));
    }

    #[test]
    fn test_existing_offer_for_stopped_element_is_refused() {
        let log = Log::default();
        let c = container();
        c.add_factory(Arc::new(printer_factory("A", &log, false).shared()));
        let fresh = c.derive_setups(&printer_demand("A")).pop().unwrap();
        let id = c.commit(&fresh, Vec::new()).unwrap().unwrap();
        let existing = c.derive_setups(&printer_demand("A")).remove(0);
        c.stop_instance(id).unwrap();
        assert!(matches!(
            c.commit(&existing, Vec::new()),
            Err(PlexusError::UnknownElement(_))
        ));
    }
}

// ============================================================================
// SECTION 3: Resources
// ============================================================================

mod resources {
    use super::*;

    fn ram() -> Box<CapacityAllocator> {
        Box::new(CapacityAllocator::new("ram", "memory", "Capacity", &[("MEMORY", 128)]).unwrap())
    }

    #[test]
    fn test_commit_and_release_resource() {
        let c = container();
        let alloc = c.add_allocator(ram());
        let offer = c.derive_setups(&memory_demand(100)).pop().unwrap();
        let id = c.commit(&offer, Vec::new()).unwrap().unwrap();
        assert_eq!(c.status(id).unwrap().kind, ElementKind::Resource);
        assert_eq!(c.free_resources(alloc), Some(vec![28]));
        assert_eq!(c.total_resources(alloc), Some(vec![128]));

        // No second 100 fits
        assert!(c.derive_setups(&memory_demand(100)).is_empty());

        c.release_element(id).unwrap();
        assert_eq!(c.free_resources(alloc), Some(vec![128]));
    }

    #[test]
    fn test_stale_offer_returns_none() {
        let c = container();
        c.add_allocator(ram());
        let a = c.derive_setups(&memory_demand(100)).pop().unwrap();
        let b = c.derive_setups(&memory_demand(100)).pop().unwrap();
        assert!(c.commit(&a, Vec::new()).unwrap().is_some());
        assert!(c.commit(&b, Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_remove_allocator_in_use() {
        let c = container();
        let alloc = c.add_allocator(ram());
        let offer = c.derive_setups(&memory_demand(1)).pop().unwrap();
        let id = c.commit(&offer, Vec::new()).unwrap().unwrap();
        assert!(c.remove_allocator(alloc).is_err());
        c.stop_instance(id).unwrap();
        c.remove_allocator(alloc).unwrap();
        assert_eq!(c.free_resources(alloc), None);
    }
}

// ============================================================================
// SECTION 4: Failures
// ============================================================================

mod failures {
    use super::*;

    #[test]
    fn test_start_failure_is_element_error() {
        let log = Log::default();
        let c = container();
        c.add_factory(Arc::new(printer_factory("A", &log, true)));
        let offer = c.derive_setups(&printer_demand("A")).pop().unwrap();
        let err = c.commit(&offer, Vec::new()).unwrap_err();
        assert!(matches!(err, PlexusError::Element { .. }));
        assert_eq!(*log.lock(), vec!["bind:driver", "start", "unbind"]);
        assert!(c
            .elements()
            .iter()
            .all(|s| s.kind != ElementKind::Instance));
    }

    #[test]
    fn test_fail_element_leaves_siblings_running() {
        let log = Log::default();
        let c = container();
        c.add_factory(Arc::new(printer_factory("A", &log, false)));
        let a = c
            .commit(&c.derive_setups(&printer_demand("A")).pop().unwrap(), Vec::new())
            .unwrap()
            .unwrap();
        let b = c
            .commit(&c.derive_setups(&printer_demand("A")).pop().unwrap(), Vec::new())
            .unwrap()
            .unwrap();
        let (_sub, rx) = c.subscribe();

        c.fail_element(a, "device unplugged").unwrap();
        assert!(!c.is_running(a));
        assert!(c.is_running(b));
        let failed: Vec<_> = rx
            .try_iter()
            .filter(|e| matches!(e, ContainerEvent::ElementFailed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].element(), a);
    }

    #[test]
    fn test_unknown_element() {
        let c = container();
        let id = plexus_core::ElementId::new();
        assert!(matches!(
            c.stop_instance(id),
            Err(PlexusError::UnknownElement(_))
        ));
        assert!(matches!(
            c.fail_element(id, "x"),
            Err(PlexusError::UnknownElement(_))
        ));
        assert!(!c.is_running(id));
    }
}

// ============================================================================
// SECTION 5: Checkpoints
// ============================================================================

mod checkpoints {
    use super::*;

    #[test]
    fn test_checkpoint_and_restore() {
        let log = Log::default();
        let c = container();
        let factory = c.add_factory(Arc::new(printer_factory("A", &log, false)));
        let offer = c.derive_setups(&printer_demand("A")).pop().unwrap();
        let id = c.commit(&offer, Vec::new()).unwrap().unwrap();

        let image = c.checkpoint(id).unwrap().unwrap();
        assert_eq!(image, vec![1, 2, 3]);
        c.stop_instance(id).unwrap();
        log.lock().clear();

        let restored = c
            .restore_instance(factory, offer.setup.clone(), &image, Vec::new())
            .unwrap();
        assert_ne!(restored, id);
        assert_eq!(*log.lock(), vec!["bind:driver", "load:3", "start"]);
    }
}

// ============================================================================
// SECTION 6: Events
// ============================================================================

mod events {
    use super::*;

    #[test]
    fn test_template_commit_is_forwarded() {
        let log = Log::default();
        let c = container();
        let factory = printer_factory("A", &log, false);
        let template = plexus_container::Factory::template(&factory).clone();
        let id = c.add_factory(Arc::new(factory));
        let (sub, rx) = c.subscribe();

        {
            let mut writer = template.write();
            writer
                .instance()
                .unwrap()
                .create_resource_demand("memory")
                .unwrap();
            writer.commit();
        }
        let changes: Vec<_> = rx
            .try_iter()
            .filter(|e| matches!(e, ContainerEvent::TemplateChanged { .. }))
            .collect();
        assert_eq!(
            changes,
            vec![ContainerEvent::TemplateChanged {
                element: id,
                revision: 1
            }]
        );

        // Nothing after unsubscribing
        assert!(c.unsubscribe(sub));
        {
            let mut writer = template.write();
            writer.instance().unwrap().remove_resource_demand("memory");
            writer.commit();
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_capacity_change_events() {
        let c = container();
        let alloc = c.add_allocator(Box::new(
            CapacityAllocator::new("ram", "memory", "Capacity", &[("MEMORY", 10)]).unwrap(),
        ));
        let (_sub, rx) = c.subscribe();
        let offer = c.derive_setups(&memory_demand(4)).pop().unwrap();
        let id = c.commit(&offer, Vec::new()).unwrap().unwrap();
        c.release_element(id).unwrap();

        let free: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                ContainerEvent::CapacityChanged { allocator, free } if allocator == alloc => {
                    Some(free)
                }
                _ => None,
            })
            .collect();
        assert_eq!(free, vec![vec![6], vec![10]]);
    }

    #[test]
    fn test_subscriber_may_read_capacity_on_template_change() {
        let c = Arc::new(container());
        let alloc = c.add_allocator(Box::new(
            CapacityAllocator::new("ram", "memory", "Capacity", &[("MEMORY", 10)]).unwrap(),
        ));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let weak = Arc::downgrade(&c);
        c.subscribe_fn(move |event| {
            if let ContainerEvent::TemplateChanged { element, .. } = event {
                if let Some(free) = weak.upgrade().and_then(|c| c.free_resources(*element)) {
                    seen_cb.lock().push(free);
                }
            }
        });

        let offer = c.derive_setups(&memory_demand(4)).pop().unwrap();
        let id = c.commit(&offer, Vec::new()).unwrap().unwrap();
        c.release_element(id).unwrap();

        assert_eq!(*seen.lock(), vec![vec![6], vec![10]]);
        assert_eq!(c.free_resources(alloc), Some(vec![10]));
    }
}

// ============================================================================
// SECTION 7: Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    #[test]
    fn test_parallel_commits_never_overbook() {
        let c = Arc::new(container());
        let alloc = c.add_allocator(Box::new(
            CapacityAllocator::new("ram", "memory", "Capacity", &[("MEMORY", 50)]).unwrap(),
        ));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let c = Arc::clone(&c);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    match c.derive_setups(&memory_demand(10)).pop() {
                        Some(offer) => c.commit(&offer, Vec::new()).unwrap().is_some(),
                        None => false,
                    }
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert!(granted <= 5);
        assert_eq!(
            c.free_resources(alloc),
            Some(vec![50 - 10 * granted as i64])
        );
    }
}
