//! Element lifecycle for Plexus
//!
//! The container is the local negotiation surface of one system. It hosts
//! factories (which create instances) and allocators (which create
//! resources), answers demands with offers, and drives every element through
//! its lifecycle.
//!
//! ## Module Structure
//!
//! - `element`: element kinds, lifecycle states and status snapshots
//! - `setup`: `Setup`, `Offer` and the `Extension` demand mapping helper
//! - `instance`: the `Instance` trait and its context
//! - `factory`: the `Factory` trait and `TemplateFactory`
//! - `allocator`: the `Allocator` trait and `CapacityAllocator`
//! - `container`: the `Container` service
//! - `events`: `ContainerEvent`
//! - `error`: `ElementError`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod container;
pub mod element;
pub mod error;
pub mod events;
pub mod factory;
pub mod instance;
pub mod setup;

pub use allocator::{Allocator, CapacityAllocator};
pub use container::Container;
pub use element::{ElementKind, ElementState, ElementStatus};
pub use error::ElementError;
pub use events::ContainerEvent;
pub use factory::{Factory, TemplateFactory};
pub use instance::{Dependency, Instance, InstanceContext};
pub use setup::{Extension, Offer, Setup};
