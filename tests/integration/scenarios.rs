//! Single-Node Scenarios
//!
//! An application on one node asks for a printer at a location, optionally
//! backed by a spooler and memory.

use crate::common::*;
use plexus::CapacityAllocator;
use std::sync::Arc;
use tempfile::TempDir;

fn open(name: &str) -> (Arc<LoopbackTransport>, Node) {
    let transport = LoopbackTransport::new();
    let node = Node::open_loopback(NodeConfig::new(AssemblerConfig::new(name)), &transport).unwrap();
    (transport, node)
}

#[test]
fn test_printer_at_location_is_assembled() {
    let (_transport, node) = open("home");
    let log = Log::default();
    let driver = node
        .container()
        .add_factory(Arc::new(factory("driver", "Printer", Some("A"), vec![], &log)));

    let (session, assembly) = node.submit(vec![printer_demand("A")], vec![]).unwrap();
    assert_eq!(assembly.source(), driver);
    assert_eq!(assembly.system().as_str(), "home");
    assert_eq!(assembly.demand(), "printer");
    assert!(node.container().is_running(assembly.element()));
    assert_eq!(node.sessions(), vec![session]);
    assert_eq!(entries(&log, "start:"), vec!["start:driver"]);
}

#[test]
fn test_printer_at_other_location_is_not_found() {
    let (_transport, node) = open("home");
    let log = Log::default();
    node.container()
        .add_factory(Arc::new(factory("driver", "Printer", Some("B"), vec![], &log)));

    let result = node.submit(vec![printer_demand("A")], vec![]);
    assert!(matches!(result, Err(PlexusError::NoMatchingPreference(_))));
    assert!(node.sessions().is_empty());
    assert!(log.lock().is_empty());
}

#[test]
fn test_printer_with_spooler_and_memory() {
    let (_transport, node) = open("home");
    let log = Log::default();
    node.container().add_factory(Arc::new(factory(
        "driver",
        "Printer",
        Some("A"),
        vec![spooler_demand()],
        &log,
    )));
    node.container().add_factory(Arc::new(factory(
        "spooler",
        "Spooler",
        None,
        vec![memory_demand(64)],
        &log,
    )));
    node.container().add_allocator(Box::new(
        CapacityAllocator::new("ram", "memory", "Capacity", &[("MEMORY", 100)]).unwrap(),
    ));

    let (_session, assembly) = node.submit(vec![printer_demand("A")], vec![]).unwrap();
    assert_eq!(assembly.size(), 3);
    let spooler = assembly.child("spooler").unwrap();
    assert!(spooler.child("memory").is_some());
    // Dependencies come up before their dependents
    assert_eq!(entries(&log, "start:"), vec!["start:spooler", "start:driver"]);

    // Only 36 left: a second session cannot get its memory
    let second = node.submit(vec![printer_demand("A")], vec![]);
    assert!(matches!(second, Err(PlexusError::NoMatchingPreference(_))));
}

#[test]
fn test_release_stops_dependencies_first() {
    let (_transport, node) = open("home");
    let log = Log::default();
    node.container().add_factory(Arc::new(factory(
        "driver",
        "Printer",
        Some("A"),
        vec![spooler_demand()],
        &log,
    )));
    node.container()
        .add_factory(Arc::new(factory("spooler", "Spooler", None, vec![], &log)));

    let (session, assembly) = node.submit(vec![printer_demand("A")], vec![]).unwrap();
    node.release(session).unwrap();
    assert!(!node.container().is_running(assembly.element()));
    assert_eq!(entries(&log, "stop:"), vec!["stop:spooler", "stop:driver"]);
    assert!(node.sessions().is_empty());
}

#[test]
fn test_node_from_directory() {
    let dir = TempDir::new().unwrap();
    let node = Node::open_path(dir.path().join("plexus")).unwrap();
    assert!(dir.path().join("plexus").join(plexus::CONFIG_FILE_NAME).exists());

    let log = Log::default();
    node.container()
        .add_factory(Arc::new(factory("driver", "Printer", None, vec![], &log)));
    let (session, _) = node.submit(vec![any_printer()], vec![]).unwrap();
    node.shutdown();
    assert_eq!(entries(&log, "stop:"), vec!["stop:driver"]);
    assert!(matches!(
        node.assembly(session),
        Err(PlexusError::UnknownSession(_))
    ));
}
