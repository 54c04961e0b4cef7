//! Plexus - component middleware for pervasive systems
//!
//! Applications describe what they need as demand trees; Plexus finds
//! factories and allocators on the systems around it whose provisions match,
//! starts the instances and resources, and hands back an immutable
//! `Assembly` naming which element on which system answers each demand.
//!
//! # Quick Start
//!
//! ```ignore
//! use plexus::{Node, ContractBuilder, ContractType, Comparator, FeatureDemand};
//!
//! let node = Node::open_path("./plexus-data")?;
//! node.container().add_factory(Arc::new(printer_factory));
//!
//! let demand = ContractBuilder::new(ContractType::InstanceDemand, "printer")
//!     .interface("Printer")
//!     .feature("Printer", "Location", "LOCATION",
//!              FeatureDemand::simple(Comparator::Equal, "A")?)
//!     .build()?;
//! let (session, assembly) = node.submit(vec![demand], vec![])?;
//! ```
//!
//! # Architecture
//!
//! - `plexus-core`: contract trees, matching, views, events, identifiers
//! - `plexus-container`: element lifecycle, factories, allocators
//! - `plexus-assembler`: the distributed assembly protocol
//! - `plexus-engine`: `Node`, configuration and background workers
//!
//! The types applications and element authors need are re-exported here.

pub use plexus_core::{
    matches, matches_template, Comparator, Constraint, Contract, ContractBuilder, ContractType,
    ElementId, EventBus, Feature, FeatureDemand, FeatureProvision, FeatureType, FeatureValue,
    PlexusError, PlexusResult, Reader, SessionId, SubscriptionId, SystemId, Template,
    TemplateEvent, Writer, ATTR_REQUIRED,
};

pub use plexus_container::{
    Allocator, CapacityAllocator, Container, ContainerEvent, Dependency, ElementError,
    ElementKind, ElementState, ElementStatus, Extension, Factory, Instance, InstanceContext,
    Offer, Setup, TemplateFactory,
};

pub use plexus_assembler::{
    Assembler, AssemblerConfig, Assembly, AssemblyState, BindingInfo, BindingState, Delivery,
    FewestDependencies, Lease, LeaseReaper, LoopbackTransport, Peer, Pointer, PreferReuse,
    SetupRanker, Strategy, Transport,
};

pub use plexus_engine::{init_logging, Node, NodeConfig, CONFIG_FILE_NAME};
