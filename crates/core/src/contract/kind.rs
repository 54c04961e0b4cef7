//! Contract node kinds
//!
//! Every node of a contract tree carries one of a fixed set of kinds. The kind
//! decides which children a node may have and which node it is matched against.
//!
//! ## Tree Shape
//!
//! | Parent | Allowed children |
//! |--------|------------------|
//! | AllocatorTemplate | ResourceTemplate |
//! | ResourceTemplate | ResourceProvision, ResourceDemand |
//! | ResourceDemand | DimensionDemand |
//! | ResourceProvision | DimensionProvision |
//! | InstanceTemplate | InstanceProvision, InstanceDemand, ResourceDemand |
//! | InstanceDemand | InterfaceDemand, EventDemand |
//! | InstanceProvision | InterfaceProvision, EventProvision |
//! | InterfaceDemand, EventDemand | DimensionDemand |
//! | InterfaceProvision, EventProvision | DimensionProvision |
//! | DimensionDemand | FeatureDemand |
//! | DimensionProvision | FeatureProvision |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a contract node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContractType {
    /// Everything an allocator can hand out
    AllocatorTemplate,
    /// A demand for a resource
    ResourceDemand,
    /// One kind of resource an allocator offers, with its nested demands
    ResourceTemplate,
    /// What a resource provides
    ResourceProvision,
    /// A component: what it provides plus what it needs
    InstanceTemplate,
    /// A demand for another instance
    InstanceDemand,
    /// What an instance provides
    InstanceProvision,
    /// A required interface
    InterfaceDemand,
    /// A provided interface
    InterfaceProvision,
    /// A required event type
    EventDemand,
    /// A provided event type
    EventProvision,
    /// Constraints on one non-functional dimension
    DimensionDemand,
    /// Properties of one non-functional dimension
    DimensionProvision,
    /// A constraint on one feature
    FeatureDemand,
    /// The value of one feature
    FeatureProvision,
}

impl ContractType {
    /// All kinds (for iteration)
    pub const ALL: [ContractType; 15] = [
        ContractType::AllocatorTemplate,
        ContractType::ResourceDemand,
        ContractType::ResourceTemplate,
        ContractType::ResourceProvision,
        ContractType::InstanceTemplate,
        ContractType::InstanceDemand,
        ContractType::InstanceProvision,
        ContractType::InterfaceDemand,
        ContractType::InterfaceProvision,
        ContractType::EventDemand,
        ContractType::EventProvision,
        ContractType::DimensionDemand,
        ContractType::DimensionProvision,
        ContractType::FeatureDemand,
        ContractType::FeatureProvision,
    ];

    /// Display name
    pub const fn name(&self) -> &'static str {
        match self {
            ContractType::AllocatorTemplate => "AllocatorTemplate",
            ContractType::ResourceDemand => "ResourceDemand",
            ContractType::ResourceTemplate => "ResourceTemplate",
            ContractType::ResourceProvision => "ResourceProvision",
            ContractType::InstanceTemplate => "InstanceTemplate",
            ContractType::InstanceDemand => "InstanceDemand",
            ContractType::InstanceProvision => "InstanceProvision",
            ContractType::InterfaceDemand => "InterfaceDemand",
            ContractType::InterfaceProvision => "InterfaceProvision",
            ContractType::EventDemand => "EventDemand",
            ContractType::EventProvision => "EventProvision",
            ContractType::DimensionDemand => "DimensionDemand",
            ContractType::DimensionProvision => "DimensionProvision",
            ContractType::FeatureDemand => "FeatureDemand",
            ContractType::FeatureProvision => "FeatureProvision",
        }
    }

    /// Parse from the display name
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == s)
    }

    /// Whether this kind expresses a requirement
    pub const fn is_demand(&self) -> bool {
        matches!(
            self,
            ContractType::ResourceDemand
                | ContractType::InstanceDemand
                | ContractType::InterfaceDemand
                | ContractType::EventDemand
                | ContractType::DimensionDemand
                | ContractType::FeatureDemand
        )
    }

    /// Whether this kind expresses an offer
    pub const fn is_provision(&self) -> bool {
        matches!(
            self,
            ContractType::ResourceProvision
                | ContractType::InstanceProvision
                | ContractType::InterfaceProvision
                | ContractType::EventProvision
                | ContractType::DimensionProvision
                | ContractType::FeatureProvision
        )
    }

    /// Whether this kind is a template (provision plus nested demands)
    pub const fn is_template(&self) -> bool {
        matches!(
            self,
            ContractType::AllocatorTemplate
                | ContractType::ResourceTemplate
                | ContractType::InstanceTemplate
        )
    }

    /// The provision kind a demand kind is matched against
    ///
    /// Returns None for kinds that are not demands.
    pub const fn counterpart(&self) -> Option<ContractType> {
        match self {
            ContractType::ResourceDemand => Some(ContractType::ResourceProvision),
            ContractType::InstanceDemand => Some(ContractType::InstanceProvision),
            ContractType::InterfaceDemand => Some(ContractType::InterfaceProvision),
            ContractType::EventDemand => Some(ContractType::EventProvision),
            ContractType::DimensionDemand => Some(ContractType::DimensionProvision),
            ContractType::FeatureDemand => Some(ContractType::FeatureProvision),
            _ => None,
        }
    }

    /// The template kind that answers a demand kind
    ///
    /// Instance demands are answered by instance templates (from factories),
    /// resource demands by resource templates (from allocators).
    pub const fn template_for(&self) -> Option<ContractType> {
        match self {
            ContractType::InstanceDemand => Some(ContractType::InstanceTemplate),
            ContractType::ResourceDemand => Some(ContractType::ResourceTemplate),
            _ => None,
        }
    }

    /// Kinds allowed directly below this kind
    pub const fn allowed_children(&self) -> &'static [ContractType] {
        match self {
            ContractType::AllocatorTemplate => &[ContractType::ResourceTemplate],
            ContractType::ResourceTemplate => &[
                ContractType::ResourceProvision,
                ContractType::ResourceDemand,
            ],
            ContractType::ResourceDemand => &[ContractType::DimensionDemand],
            ContractType::ResourceProvision => &[ContractType::DimensionProvision],
            ContractType::InstanceTemplate => &[
                ContractType::InstanceProvision,
                ContractType::InstanceDemand,
                ContractType::ResourceDemand,
            ],
            ContractType::InstanceDemand => &[
                ContractType::InterfaceDemand,
                ContractType::EventDemand,
            ],
            ContractType::InstanceProvision => &[
                ContractType::InterfaceProvision,
                ContractType::EventProvision,
            ],
            ContractType::InterfaceDemand | ContractType::EventDemand => {
                &[ContractType::DimensionDemand]
            }
            ContractType::InterfaceProvision | ContractType::EventProvision => {
                &[ContractType::DimensionProvision]
            }
            ContractType::DimensionDemand => &[ContractType::FeatureDemand],
            ContractType::DimensionProvision => &[ContractType::FeatureProvision],
            ContractType::FeatureDemand | ContractType::FeatureProvision => &[],
        }
    }

    /// Whether `child` may be added below this kind
    pub fn allows_child(&self, child: ContractType) -> bool {
        self.allowed_children().contains(&child)
    }

    /// Whether nodes of this kind carry a feature payload
    pub const fn is_feature(&self) -> bool {
        matches!(
            self,
            ContractType::FeatureDemand | ContractType::FeatureProvision
        )
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
