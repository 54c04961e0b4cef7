//! Shared test utilities for the integration suites.
//!
//! Import via `mod common;` from a test's main.rs.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub use plexus::{
    AssemblerConfig, Comparator, Contract, ContractBuilder, ContractType, ElementError,
    FeatureDemand, FeatureProvision, Instance, LoopbackTransport, Node, NodeConfig, PlexusError,
    Strategy, SystemId, Template, TemplateFactory,
};

// ============================================================================
// Instances
// ============================================================================

/// Shared record of instance hooks, as `start:<name>` / `stop:<name>`
pub type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: String,
    log: Log,
}

impl Instance for Recorder {
    fn start(&mut self) -> Result<(), ElementError> {
        self.log.lock().push(format!("start:{}", self.name));
        Ok(())
    }
    fn stop(&mut self) -> Result<(), ElementError> {
        self.log.lock().push(format!("stop:{}", self.name));
        Ok(())
    }
}

/// Entries of `log` starting with `prefix`
pub fn entries(log: &Log, prefix: &str) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|e| e.starts_with(prefix))
        .cloned()
        .collect()
}

// ============================================================================
// Contracts
// ============================================================================

/// Factory for `name` providing `interface`, optionally at a location, with
/// nested demands
pub fn factory(
    name: &str,
    interface: &str,
    location: Option<&str>,
    nested: Vec<Contract>,
    log: &Log,
) -> TemplateFactory {
    let mut provision =
        ContractBuilder::new(ContractType::InstanceProvision, name).interface(interface);
    if let Some(location) = location {
        provision = provision.feature(
            interface,
            "Location",
            "LOCATION",
            FeatureProvision::value_of(location),
        );
    }
    let mut root = Contract::new(ContractType::InstanceTemplate, name)
        .unwrap()
        .with(provision.build().unwrap())
        .unwrap();
    for demand in nested {
        root = root.with(demand).unwrap();
    }
    let log = Arc::clone(log);
    let tag = name.to_string();
    TemplateFactory::new(Template::new(root).unwrap(), move |_| {
        Ok(Box::new(Recorder {
            name: tag.clone(),
            log: Arc::clone(&log),
        }))
    })
    .unwrap()
}

/// A printer at `location`
pub fn printer_demand(location: &str) -> Contract {
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

/// Any printer
pub fn any_printer() -> Contract {
    ContractBuilder::new(ContractType::InstanceDemand, "printer")
        .interface("Printer")
        .build()
        .unwrap()
}

/// A spooler
pub fn spooler_demand() -> Contract {
    ContractBuilder::new(ContractType::InstanceDemand, "spooler")
        .interface("Spooler")
        .build()
        .unwrap()
}

/// At least `amount` of memory
pub fn memory_demand(amount: i32) -> Contract {
    ContractBuilder::new(ContractType::ResourceDemand, "memory")
        .dimension_feature(
            "Capacity",
            "MEMORY",
            FeatureDemand::simple(Comparator::GreaterEqual, amount).unwrap(),
        )
        .build()
        .unwrap()
}

// ============================================================================
// Systems
// ============================================================================

/// Several nodes sharing one in-process transport
pub struct Home {
    pub transport: Arc<LoopbackTransport>,
    pub nodes: Vec<Node>,
}

impl Home {
    /// One node per name, all using `strategy`
    pub fn new(names: &[&str], strategy: Strategy) -> Self {
        let transport = LoopbackTransport::new();
        let nodes = names
            .iter()
            .map(|name| {
                let config =
                    NodeConfig::new(AssemblerConfig::new(*name).with_strategy(strategy));
                Node::open_loopback(config, &transport).unwrap()
            })
            .collect();
        Self { transport, nodes }
    }

    /// Node by system name
    pub fn node(&self, name: &str) -> &Node {
        self.nodes
            .iter()
            .find(|n| n.system().as_str() == name)
            .unwrap()
    }

    /// Every system but `name`
    pub fn others(&self, name: &str) -> Vec<SystemId> {
        self.nodes
            .iter()
            .map(|n| n.system().clone())
            .filter(|s| s.as_str() != name)
            .collect()
    }
}

/// Poll `done` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}
