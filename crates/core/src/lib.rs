//! Core types for Plexus
//!
//! This crate defines the vocabulary shared by the container and the
//! assembler:
//! - Contract trees: `Contract`, `ContractType`, feature payloads and comparators
//! - Matching: `matches` decides whether a provision satisfies a demand
//! - Views: level-scoped `Reader`/`Writer` lenses and the lockable `Template`
//! - Events: `EventBus`, a typed subscription registry
//! - Identifiers: `SystemId`, `SessionId`, `ElementId`
//! - Errors: `PlexusError` and `PlexusResult`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod error;
pub mod events;
pub mod matching;
pub mod types;
pub mod view;

pub use contract::{
    Comparator, Constraint, Contract, ContractBuilder, ContractType, Feature, FeatureDemand,
    FeatureProvision, FeatureType, FeatureValue, ATTR_REQUIRED,
};
pub use error::{PlexusError, PlexusResult};
pub use events::{EventBus, SubscriptionId};
pub use matching::{matches, matches_template};
pub use types::{ElementId, SessionId, SystemId};
pub use view::{Reader, Template, TemplateEvent, Writer};
