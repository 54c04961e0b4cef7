//! The contract tree node
//!
//! A `Contract` is one node of an ordered, named, typed tree. Templates
//! (mutable, what is wanted) and statuses (read-only, what exists) share this
//! representation; the difference is who holds it and through which view.
//!
//! ## Invariants
//!
//! - Children respect the schema of `ContractType::allowed_children`
//! - `(kind, name)` is unique among siblings
//! - Feature nodes, and only feature nodes, carry a `Feature` payload whose
//!   side (demand/provision) matches the node kind
//!
//! Every mutator checks these and rejects the change with a configuration
//! error, so a tree that exists is a well-formed tree.

use super::feature::{Feature, FeatureDemand, FeatureProvision};
use super::kind::ContractType;
use crate::error::{PlexusError, PlexusResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute key marking a demand as optional
pub const ATTR_REQUIRED: &str = "required";

/// One node of a contract tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    kind: ContractType,
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feature: Option<Feature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Contract>,
}

impl Contract {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a structural (non-feature) node
    ///
    /// # Errors
    /// `InvalidPayload` if `kind` is a feature kind; use `feature_demand` or
    /// `feature_provision` for those.
    pub fn new(kind: ContractType, name: impl Into<String>) -> PlexusResult<Self> {
        if kind.is_feature() {
            return Err(PlexusError::InvalidPayload(format!(
                "{} nodes need a feature payload",
                kind
            )));
        }
        Ok(Self::bare(kind, name.into()))
    }

    fn bare(kind: ContractType, name: String) -> Self {
        Self {
            kind,
            name,
            attributes: BTreeMap::new(),
            feature: None,
            children: Vec::new(),
        }
    }

    /// Create a feature demand leaf
    pub fn feature_demand(name: impl Into<String>, demand: FeatureDemand) -> Self {
        let mut node = Self::bare(ContractType::FeatureDemand, name.into());
        node.feature = Some(Feature::Demand(demand));
        node
    }

    /// Create a feature provision leaf
    pub fn feature_provision(name: impl Into<String>, provision: FeatureProvision) -> Self {
        let mut node = Self::bare(ContractType::FeatureProvision, name.into());
        node.feature = Some(Feature::Provision(provision));
        node
    }

    /// Builder-style `add_contract`
    pub fn with(mut self, child: Contract) -> PlexusResult<Self> {
        self.add_contract(child)?;
        Ok(self)
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Mark a demand as optional: its absence in a provision is not a failure
    pub fn optional(self) -> Self {
        self.with_attribute(ATTR_REQUIRED, "false")
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Node kind
    pub fn kind(&self) -> ContractType {
        self.kind
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// All attributes
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Set an attribute, returning the previous value
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Whether a demand must be present in a matching provision
    pub fn is_required(&self) -> bool {
        self.attribute(ATTR_REQUIRED) != Some("false")
    }

    /// Feature payload (feature nodes only)
    pub fn feature(&self) -> Option<&Feature> {
        self.feature.as_ref()
    }

    /// Feature demand payload
    pub fn as_feature_demand(&self) -> Option<&FeatureDemand> {
        match &self.feature {
            Some(Feature::Demand(d)) => Some(d),
            _ => None,
        }
    }

    /// Feature provision payload
    pub fn as_feature_provision(&self) -> Option<&FeatureProvision> {
        match &self.feature {
            Some(Feature::Provision(p)) => Some(p),
            _ => None,
        }
    }

    /// Replace the provision payload of a feature provision node
    ///
    /// # Errors
    /// `InvalidChild` if this is not a feature provision node.
    pub fn set_feature_provision(&mut self, provision: FeatureProvision) -> PlexusResult<()> {
        if self.kind != ContractType::FeatureProvision {
            return Err(PlexusError::InvalidChild {
                parent: self.kind,
                child: ContractType::FeatureProvision,
            });
        }
        self.feature = Some(Feature::Provision(provision));
        Ok(())
    }

    /// All children in insertion order
    pub fn children(&self) -> &[Contract] {
        &self.children
    }

    // =========================================================================
    // Child operations
    // =========================================================================

    /// Child of the given kind and name
    pub fn get_contract(&self, kind: ContractType, name: &str) -> Option<&Contract> {
        self.children
            .iter()
            .find(|c| c.kind == kind && c.name == name)
    }

    /// Mutable child of the given kind and name
    pub fn get_contract_mut(&mut self, kind: ContractType, name: &str) -> Option<&mut Contract> {
        self.children
            .iter_mut()
            .find(|c| c.kind == kind && c.name == name)
    }

    /// First child of the given kind
    pub fn first_contract(&self, kind: ContractType) -> Option<&Contract> {
        self.children.iter().find(|c| c.kind == kind)
    }

    /// All children of the given kind
    pub fn get_contracts(&self, kind: ContractType) -> impl Iterator<Item = &Contract> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    /// Add a child
    ///
    /// # Errors
    /// - `InvalidChild` if the schema forbids the child kind here
    /// - `DuplicateContract` if a sibling with the same kind and name exists
    pub fn add_contract(&mut self, child: Contract) -> PlexusResult<()> {
        self.check_child(&child)?;
        if self.get_contract(child.kind, &child.name).is_some() {
            return Err(PlexusError::DuplicateContract {
                kind: child.kind,
                name: child.name,
            });
        }
        self.children.push(child);
        Ok(())
    }

    /// Add a child, replacing a same-kind same-name sibling
    ///
    /// Returns the replaced node. The replacement keeps the position of the
    /// node it replaces.
    pub fn replace_contract(&mut self, child: Contract) -> PlexusResult<Option<Contract>> {
        self.check_child(&child)?;
        match self
            .children
            .iter()
            .position(|c| c.kind == child.kind && c.name == child.name)
        {
            Some(idx) => Ok(Some(std::mem::replace(&mut self.children[idx], child))),
            None => {
                self.children.push(child);
                Ok(None)
            }
        }
    }

    /// Remove and return the child of the given kind and name
    pub fn remove_contract(&mut self, kind: ContractType, name: &str) -> Option<Contract> {
        let idx = self
            .children
            .iter()
            .position(|c| c.kind == kind && c.name == name)?;
        Some(self.children.remove(idx))
    }

    fn check_child(&self, child: &Contract) -> PlexusResult<()> {
        if !self.kind.allows_child(child.kind) {
            return Err(PlexusError::InvalidChild {
                parent: self.kind,
                child: child.kind,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check the whole subtree against the tree invariants
    ///
    /// Mutators already enforce these; this is for trees that arrive through
    /// deserialization.
    pub fn validate(&self) -> PlexusResult<()> {
        match (&self.kind, &self.feature) {
            (ContractType::FeatureDemand, Some(Feature::Demand(d))) => d.validate()?,
            (ContractType::FeatureProvision, Some(Feature::Provision(p))) => p.validate()?,
            (kind, None) if !kind.is_feature() => {}
            (kind, _) => {
                return Err(PlexusError::InvalidPayload(format!(
                    "{} '{}' has a payload that does not fit its kind",
                    kind, self.name
                )))
            }
        }
        for (i, child) in self.children.iter().enumerate() {
            self.check_child(child)?;
            if self.children[..i]
                .iter()
                .any(|c| c.kind == child.kind && c.name == child.name)
            {
                return Err(PlexusError::DuplicateContract {
                    kind: child.kind,
                    name: child.name.clone(),
                });
            }
            child.validate()?;
        }
        Ok(())
    }

    /// Number of nodes in this subtree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Contract::size).sum::<usize>()
    }
}
