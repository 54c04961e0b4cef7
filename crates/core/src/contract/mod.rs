//! Contract trees
//!
//! Contracts describe what components need (demands) and what they offer
//! (provisions) as ordered, named, typed trees:
//!
//! ```text
//! Template → {Instance | Resource | Allocator} Demand/Provision
//!          → Interface/Event type → Dimension → Feature
//! ```
//!
//! ## Module Structure
//!
//! - `kind`: the fixed node kinds and the parent/child schema
//! - `feature`: typed values, comparators and feature payloads
//! - `node`: the `Contract` tree node
//! - `builder`: shorthand constructors for common shapes

pub mod builder;
pub mod feature;
pub mod kind;
pub mod node;

// Re-exports
pub use builder::ContractBuilder;
pub use feature::{
    Comparator, Constraint, Feature, FeatureDemand, FeatureProvision, FeatureType, FeatureValue,
};
pub use kind::ContractType;
pub use node::{Contract, ATTR_REQUIRED};
