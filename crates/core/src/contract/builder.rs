//! Shorthand construction of contract trees
//!
//! Building trees node by node with `add_contract` is verbose. The builder
//! creates intermediate type and dimension nodes on demand and defers error
//! reporting to `build()`.
//!
//! ```
//! use plexus_core::contract::{Comparator, ContractBuilder, ContractType, FeatureDemand};
//!
//! let demand = ContractBuilder::new(ContractType::InstanceDemand, "printer")
//!     .interface("Printer")
//!     .feature("Printer", "Location", "LOCATION",
//!              FeatureDemand::simple(Comparator::Equal, "A").unwrap())
//!     .build()
//!     .unwrap();
//! assert_eq!(demand.size(), 4);
//! ```

use super::feature::{Feature, FeatureDemand, FeatureProvision};
use super::kind::ContractType;
use super::node::Contract;
use crate::error::{PlexusError, PlexusResult};

/// Fluent builder for a contract subtree
#[derive(Debug)]
pub struct ContractBuilder {
    root: Contract,
    error: Option<PlexusError>,
}

impl ContractBuilder {
    /// Start a tree at a structural node
    pub fn new(kind: ContractType, name: impl Into<String>) -> Self {
        match Contract::new(kind, name) {
            Ok(root) => Self { root, error: None },
            Err(e) => Self {
                root: Contract::feature_provision("", FeatureProvision::value_of(false)),
                error: Some(e),
            },
        }
    }

    fn record(&mut self, result: PlexusResult<()>) {
        if let Err(e) = result {
            if self.error.is_none() {
                self.error = Some(e);
            }
        }
    }

    fn side_kind(&self, demand: ContractType, provision: ContractType) -> ContractType {
        if self.root.kind().is_demand() {
            demand
        } else {
            provision
        }
    }

    /// Add an interface type (demand or provision side follows the root)
    pub fn interface(mut self, name: &str) -> Self {
        let kind = self.side_kind(ContractType::InterfaceDemand, ContractType::InterfaceProvision);
        let result = Contract::new(kind, name).and_then(|c| self.root.add_contract(c));
        self.record(result);
        self
    }

    /// Add an event type (demand or provision side follows the root)
    pub fn event(mut self, name: &str) -> Self {
        let kind = self.side_kind(ContractType::EventDemand, ContractType::EventProvision);
        let result = Contract::new(kind, name).and_then(|c| self.root.add_contract(c));
        self.record(result);
        self
    }

    /// Add a feature below `type_name/dimension`, creating the dimension
    ///
    /// `type_name` must already be added as an interface or event.
    pub fn feature(
        mut self,
        type_name: &str,
        dimension: &str,
        feature: &str,
        payload: impl Into<Feature>,
    ) -> Self {
        let result = self.add_feature(Some(type_name), dimension, feature, payload.into());
        self.record(result);
        self
    }

    /// Add a feature below `dimension` directly (resource demands/provisions)
    pub fn dimension_feature(
        mut self,
        dimension: &str,
        feature: &str,
        payload: impl Into<Feature>,
    ) -> Self {
        let result = self.add_feature(None, dimension, feature, payload.into());
        self.record(result);
        self
    }

    /// Add an arbitrary child
    pub fn child(mut self, child: Contract) -> Self {
        let result = self.root.add_contract(child);
        self.record(result);
        self
    }

    /// Set an attribute on the root
    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.root.set_attribute(key, value);
        self
    }

    /// Finish, reporting the first error encountered
    pub fn build(self) -> PlexusResult<Contract> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.root),
        }
    }

    fn add_feature(
        &mut self,
        type_name: Option<&str>,
        dimension: &str,
        feature: &str,
        payload: Feature,
    ) -> PlexusResult<()> {
        let demand_side = self.root.kind().is_demand();
        let (dim_kind, leaf) = match (&payload, demand_side) {
            (Feature::Demand(d), true) => (
                ContractType::DimensionDemand,
                Contract::feature_demand(feature, d.clone()),
            ),
            (Feature::Provision(p), false) => (
                ContractType::DimensionProvision,
                Contract::feature_provision(feature, p.clone()),
            ),
            _ => {
                return Err(PlexusError::InvalidPayload(format!(
                    "feature '{}' is on the wrong side of {} '{}'",
                    feature,
                    self.root.kind(),
                    self.root.name()
                )))
            }
        };

        let parent = match type_name {
            None => &mut self.root,
            Some(type_name) => {
                let kinds = if demand_side {
                    [ContractType::InterfaceDemand, ContractType::EventDemand]
                } else {
                    [ContractType::InterfaceProvision, ContractType::EventProvision]
                };
                let kind = kinds
                    .into_iter()
                    .find(|k| self.root.get_contract(*k, type_name).is_some())
                    .ok_or_else(|| {
                        PlexusError::InvalidPayload(format!("no type '{}' to attach to", type_name))
                    })?;
                self.root
                    .get_contract_mut(kind, type_name)
                    .ok_or_else(|| PlexusError::Internal("type vanished".into()))?
            }
        };

        if parent.get_contract(dim_kind, dimension).is_none() {
            parent.add_contract(Contract::new(dim_kind, dimension)?)?;
        }
        parent
            .get_contract_mut(dim_kind, dimension)
            .ok_or_else(|| PlexusError::Internal("dimension vanished".into()))?
            .add_contract(leaf)
    }
}

impl From<FeatureDemand> for Feature {
    fn from(d: FeatureDemand) -> Self {
        Feature::Demand(d)
    }
}

impl From<FeatureProvision> for Feature {
    fn from(p: FeatureProvision) -> Self {
        Feature::Provision(p)
    }
}
