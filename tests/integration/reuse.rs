//! Reuse Across Reconfiguration
//!
//! When a session gets a new demand tree, every node whose previous element
//! still satisfies the new demand keeps running untouched.

use crate::common::*;
use std::sync::Arc;
use std::time::Duration;

fn printer_with_spooler(node: &Node, log: &Log) {
    node.container().add_factory(Arc::new(factory(
        "driver",
        "Printer",
        Some("A"),
        vec![spooler_demand()],
        log,
    )));
    node.container()
        .add_factory(Arc::new(factory("spooler", "Spooler", None, vec![], log)));
}

fn open(name: &str) -> (Arc<LoopbackTransport>, Node) {
    let transport = LoopbackTransport::new();
    let config = NodeConfig::new(AssemblerConfig::new(name)).with_repair_on_failure(false);
    let node = Node::open_loopback(config, &transport).unwrap();
    (transport, node)
}

#[test]
fn test_weaker_demand_keeps_running_tree() {
    let (_transport, node) = open("home");
    let log = Log::default();
    printer_with_spooler(&node, &log);

    let (session, before) = node.submit(vec![printer_demand("A")], vec![]).unwrap();
    let after = node.reconfigure(session, vec![any_printer()]).unwrap();

    assert_eq!(after.element(), before.element());
    assert!(after.iter().iter().all(|n| n.is_reused()));
    assert!(entries(&log, "stop:").is_empty());
    assert_eq!(entries(&log, "start:"), vec!["start:spooler", "start:driver"]);
    assert!(node
        .assembler()
        .bindings(session)
        .unwrap()
        .iter()
        .all(|b| b.reused));
}

#[test]
fn test_fallback_preference_reuses_current_element() {
    let (_transport, node) = open("home");
    let log = Log::default();
    let a = node
        .container()
        .add_factory(Arc::new(factory("driver", "Printer", Some("A"), vec![], &log)));

    let (session, before) = node.submit(vec![printer_demand("A")], vec![]).unwrap();

    // No printer at B: the second preference adopts the running one
    let after = node
        .reconfigure(session, vec![printer_demand("B"), any_printer()])
        .unwrap();
    assert_eq!(after.source(), a);
    assert_eq!(after.element(), before.element());
    assert!(after.is_reused());
    assert!(entries(&log, "stop:").is_empty());
}

#[test]
fn test_repair_after_failure_keeps_healthy_dependency() {
    let transport = LoopbackTransport::new();
    let node = Node::open_loopback(NodeConfig::new(AssemblerConfig::new("home")), &transport)
        .unwrap();
    let log = Log::default();
    printer_with_spooler(&node, &log);

    let (session, before) = node.submit(vec![printer_demand("A")], vec![]).unwrap();
    let spooler = before.child("spooler").unwrap().element();
    node.container()
        .fail_element(before.element(), "paper jam")
        .unwrap();

    // The node's repair worker picks the failure up on its own
    assert!(wait_until(Duration::from_secs(5), || node.repairs() >= 1));
    assert!(wait_until(Duration::from_secs(5), || node
        .assembly(session)
        .map(|a| a.element() != before.element())
        .unwrap_or(false)));

    let after = node.assembly(session).unwrap();
    assert_eq!(after.child("spooler").unwrap().element(), spooler);
    assert!(after.child("spooler").unwrap().is_reused());
    assert!(entries(&log, "stop:spooler").is_empty());
    assert_eq!(entries(&log, "start:driver").len(), 2);
}
