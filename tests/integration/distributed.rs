//! Distributed Assembly
//!
//! A home of three nodes on one transport: the application runs in the
//! living room, printers and spoolers live elsewhere.

use crate::common::*;
use std::sync::Arc;

const ROOMS: [&str; 3] = ["living", "office", "study"];

// ============================================================================
// Coordinated
// ============================================================================

#[test]
fn test_printer_in_other_room() {
    let home = Home::new(&ROOMS, Strategy::Coordinated);
    let log = Log::default();
    let driver = home
        .node("office")
        .container()
        .add_factory(Arc::new(factory("driver", "Printer", Some("office"), vec![], &log)));

    let living = home.node("living");
    let (session, assembly) = living
        .submit(vec![printer_demand("office")], home.others("living"))
        .unwrap();
    assert_eq!(assembly.system().as_str(), "office");
    assert_eq!(assembly.source(), driver);
    assert!(home.node("office").container().is_running(assembly.element()));

    living.release(session).unwrap();
    assert!(!home.node("office").container().is_running(assembly.element()));
    assert_eq!(entries(&log, "stop:"), vec!["stop:driver"]);
}

#[test]
fn test_dependency_spans_rooms() {
    let home = Home::new(&ROOMS, Strategy::Coordinated);
    let office = Log::default();
    let study = Log::default();
    home.node("office").container().add_factory(Arc::new(factory(
        "driver",
        "Printer",
        Some("office"),
        vec![spooler_demand()],
        &office,
    )));
    home.node("study")
        .container()
        .add_factory(Arc::new(factory("spooler", "Spooler", None, vec![], &study)));

    let living = home.node("living");
    let (session, assembly) = living
        .submit(vec![printer_demand("office")], home.others("living"))
        .unwrap();
    assert_eq!(assembly.system().as_str(), "office");
    assert_eq!(assembly.child("spooler").unwrap().system().as_str(), "study");

    living.release(session).unwrap();
    assert_eq!(entries(&study, "stop:"), vec!["stop:spooler"]);
    assert_eq!(entries(&office, "stop:"), vec!["stop:driver"]);
}

#[test]
fn test_unlisted_room_is_not_used() {
    let home = Home::new(&ROOMS, Strategy::Coordinated);
    let log = Log::default();
    home.node("study")
        .container()
        .add_factory(Arc::new(factory("driver", "Printer", None, vec![], &log)));

    let result = home
        .node("living")
        .submit(vec![any_printer()], vec![SystemId::new("office")]);
    assert!(matches!(result, Err(PlexusError::NoMatchingPreference(_))));
    assert!(log.lock().is_empty());
}

// ============================================================================
// Peer-to-peer
// ============================================================================

#[test]
fn test_subtree_delegated_to_room() {
    let home = Home::new(&ROOMS, Strategy::PeerToPeer);
    let log = Log::default();
    let study = home.node("study");
    study.container().add_factory(Arc::new(factory(
        "driver",
        "Printer",
        Some("study"),
        vec![spooler_demand()],
        &log,
    )));
    study
        .container()
        .add_factory(Arc::new(factory("spooler", "Spooler", None, vec![], &log)));

    let living = home.node("living");
    let (session, assembly) = living
        .submit(vec![printer_demand("study")], home.others("living"))
        .unwrap();
    assert_eq!(assembly.system().as_str(), "study");
    assert_eq!(assembly.child("spooler").unwrap().system().as_str(), "study");
    assert_eq!(entries(&log, "start:"), vec!["start:spooler", "start:driver"]);

    living.release(session).unwrap();
    assert_eq!(entries(&log, "stop:"), vec!["stop:spooler", "stop:driver"]);
    assert!(!study.container().is_running(assembly.element()));
}

#[test]
fn test_first_room_that_resolves_wins() {
    let home = Home::new(&ROOMS, Strategy::PeerToPeer);
    let log = Log::default();
    home.node("office")
        .container()
        .add_factory(Arc::new(factory("driver", "Printer", Some("office"), vec![], &log)));

    let living = home.node("living");
    let (_session, assembly) = living
        .submit(
            vec![printer_demand("cellar"), printer_demand("office")],
            home.others("living"),
        )
        .unwrap();
    assert_eq!(assembly.system().as_str(), "office");
    assert_eq!(entries(&log, "start:"), vec!["start:driver"]);
}
