//! Lease Expiry
//!
//! Sessions submitted through a node are kept alive by it. A session
//! prepared directly on the assembler is not, and the reaper tears it down
//! once its lease runs out.

use crate::common::*;
use plexus::{AssemblyState, Peer, Pointer, SessionId};
use std::sync::Arc;
use std::time::Duration;

fn short_lived(name: &str) -> (Arc<LoopbackTransport>, Node, Log) {
    let transport = LoopbackTransport::new();
    let config = NodeConfig::new(
        AssemblerConfig::new(name).with_lease_duration(Duration::from_millis(150)),
    )
    .with_reaper_interval(Duration::from_millis(20));
    let node = Node::open_loopback(config, &transport).unwrap();
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
    (transport, node, log)
}

#[test]
fn test_unrenewed_session_is_torn_down() {
    let (_transport, node, log) = short_lived("home");
    let assembler = node.assembler();

    let session = SessionId::new();
    assembler.prepare(session, None, vec![]).unwrap();
    let root = assembler
        .setup(
            Pointer::session(session, node.system().clone()),
            AssemblyState::Preferences(vec![printer_demand("A")]),
        )
        .unwrap();
    assert!(!root.is_terminal());
    let assembly = assembler.configure(session).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        assembler.lease(session).is_none() && entries(&log, "stop:").len() == 2
    }));
    assert!(!node.container().is_running(assembly.element()));
    assert_eq!(entries(&log, "stop:"), vec!["stop:spooler", "stop:driver"]);
    assert!(node.sessions().is_empty());
}

#[test]
fn test_submitted_session_outlives_its_lease() {
    let (_transport, node, log) = short_lived("home");

    let (session, assembly) = node.submit(vec![printer_demand("A")], vec![]).unwrap();
    std::thread::sleep(Duration::from_millis(600));

    assert!(node.assembler().lease(session).is_some());
    assert_eq!(node.assembly(session).unwrap().element(), assembly.element());
    assert!(entries(&log, "stop:").is_empty());
}
