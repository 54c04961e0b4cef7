//! Setups, offers and the demand mapping helper
//!
//! A `Setup` is the detachable answer of a factory or allocator to one
//! demand: a template-shaped tree holding the provision the element would
//! offer plus the nested demands it needs resolved first.
//!
//! An `Offer` ties a setup to where it came from (system, factory/allocator)
//! and, for shared elements, to the running element that would be reused.

use plexus_core::{Contract, ContractType, ElementId, PlexusError, PlexusResult, SystemId};
use serde::{Deserialize, Serialize};

use crate::element::ElementKind;

// =============================================================================
// Setup
// =============================================================================

/// Candidate provision plus nested demands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setup {
    template: Contract,
}

impl Setup {
    /// Wrap an instance or resource template
    ///
    /// # Errors
    /// `InvalidPayload` if the tree is not an instance/resource template or
    /// has no provision.
    pub fn new(template: Contract) -> PlexusResult<Self> {
        let provision = match template.kind() {
            ContractType::InstanceTemplate => ContractType::InstanceProvision,
            ContractType::ResourceTemplate => ContractType::ResourceProvision,
            other => {
                return Err(PlexusError::InvalidPayload(format!(
                    "a setup needs an instance or resource template, got {}",
                    other
                )))
            }
        };
        if template.first_contract(provision).is_none() {
            return Err(PlexusError::InvalidPayload(format!(
                "setup '{}' has no provision",
                template.name()
            )));
        }
        Ok(Self { template })
    }

    /// Name of the setup (its template name)
    pub fn name(&self) -> &str {
        self.template.name()
    }

    /// Kind of element the setup creates
    pub fn element_kind(&self) -> ElementKind {
        if self.template.kind() == ContractType::ResourceTemplate {
            ElementKind::Resource
        } else {
            ElementKind::Instance
        }
    }

    /// The offered provision
    pub fn provision(&self) -> Option<&Contract> {
        let kind = match self.element_kind() {
            ElementKind::Resource => ContractType::ResourceProvision,
            _ => ContractType::InstanceProvision,
        };
        self.template.first_contract(kind)
    }

    /// Nested instance and resource demands, in template order
    pub fn demands(&self) -> impl Iterator<Item = &Contract> {
        self.template.children().iter().filter(|c| {
            matches!(
                c.kind(),
                ContractType::InstanceDemand | ContractType::ResourceDemand
            )
        })
    }

    /// Nested demand by kind and name
    pub fn demand(&self, kind: ContractType, name: &str) -> Option<&Contract> {
        self.template.get_contract(kind, name)
    }

    /// The whole tree
    pub fn template(&self) -> &Contract {
        &self.template
    }

    /// The whole tree, mutable
    ///
    /// Mutators keep the tree well formed; the root kind cannot change.
    pub fn template_mut(&mut self) -> &mut Contract {
        &mut self.template
    }

    /// Unwrap into the tree
    pub fn into_template(self) -> Contract {
        self.template
    }

    /// Deep copy, detached from this setup
    pub fn copy_setup(&self) -> Setup {
        Setup {
            template: self.template.clone(),
        }
    }

    /// Whether the setup's provision satisfies `demand`
    pub fn satisfies(&self, demand: &Contract, check_provision: bool) -> bool {
        demand.matches(&self.template, check_provision)
    }
}

// =============================================================================
// Extension
// =============================================================================

/// Copies selected dimension/feature pairs from a demand into nested demands
///
/// Factories use this to push constraints of the incoming demand down to the
/// demands of their dependencies (e.g. a printer driver forwarding the
/// requested `Location/LOCATION` to the spooler it needs). Pairs not listed
/// are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extension {
    pairs: Vec<(String, String)>,
}

impl Extension {
    /// Empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `dimension/feature` pair to copy
    pub fn map(mut self, dimension: impl Into<String>, feature: impl Into<String>) -> Self {
        self.pairs.push((dimension.into(), feature.into()));
        self
    }

    /// Whether nothing is mapped
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Copy the mapped features of `source` into `target`
    ///
    /// Features below an interface/event of `source` are placed below the
    /// same-named type of `target` when it has one; features directly below a
    /// dimension (resource demands) are placed below the same dimension of a
    /// resource `target`. Returns the number of features copied.
    pub fn apply(&self, source: &Contract, target: &mut Contract) -> PlexusResult<usize> {
        let mut copied = 0;
        for (dimension, feature) in &self.pairs {
            for (owner, leaf) in find_features(source, dimension, feature) {
                let parent = match (owner, target.kind()) {
                    (None, ContractType::ResourceDemand) => Some(&mut *target),
                    (Some(name), ContractType::InstanceDemand) => {
                        let kind = [ContractType::InterfaceDemand, ContractType::EventDemand]
                            .into_iter()
                            .find(|k| target.get_contract(*k, name).is_some());
                        match kind {
                            Some(kind) => target.get_contract_mut(kind, name),
                            None => None,
                        }
                    }
                    _ => None,
                };
                if let Some(parent) = parent {
                    place(parent, dimension, leaf.clone())?;
                    copied += 1;
                }
            }
        }
        Ok(copied)
    }
}

/// Feature demands named `dimension/feature` in `source`, with the name of
/// the type they sit below (None for resource dimensions)
fn find_features<'a>(
    source: &'a Contract,
    dimension: &str,
    feature: &str,
) -> Vec<(Option<&'a str>, &'a Contract)> {
    let lookup = |node: &'a Contract| {
        node.get_contract(ContractType::DimensionDemand, dimension)
            .and_then(|d| d.get_contract(ContractType::FeatureDemand, feature))
    };
    let mut found = Vec::new();
    if let Some(leaf) = lookup(source) {
        found.push((None, leaf));
    }
    for ty in source.children().iter().filter(|c| {
        matches!(
            c.kind(),
            ContractType::InterfaceDemand | ContractType::EventDemand
        )
    }) {
        if let Some(leaf) = lookup(ty) {
            found.push((Some(ty.name()), leaf));
        }
    }
    found
}

fn place(parent: &mut Contract, dimension: &str, leaf: Contract) -> PlexusResult<()> {
    if parent
        .get_contract(ContractType::DimensionDemand, dimension)
        .is_none()
    {
        parent.add_contract(Contract::new(ContractType::DimensionDemand, dimension)?)?;
    }
    match parent.get_contract_mut(ContractType::DimensionDemand, dimension) {
        Some(dim) => dim.replace_contract(leaf).map(|_| ()),
        None => Err(PlexusError::Internal(format!(
            "dimension '{}' missing after insert",
            dimension
        ))),
    }
}

// =============================================================================
// Offer
// =============================================================================

/// A setup proposed by one factory or allocator on one system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// System hosting the factory/allocator
    pub system: SystemId,
    /// Factory or allocator that produced the setup
    pub source: ElementId,
    /// The proposed setup
    pub setup: Setup,
    /// Running element that would be shared instead of creating a new one
    pub existing: Option<ElementId>,
}

impl Offer {
    /// Whether accepting the offer reuses a running element
    pub fn is_existing(&self) -> bool {
        self.existing.is_some()
    }

    /// Number of nested demands the offer brings along
    pub fn dependency_count(&self) -> usize {
        self.setup.demands().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{Comparator, ContractBuilder, FeatureDemand, FeatureProvision};

    fn driver_setup() -> Setup {
        let provision = ContractBuilder::new(ContractType::InstanceProvision, "driver")
            .interface("Printer")
            .feature("Printer", "Location", "LOCATION", FeatureProvision::value_of("A"))
            .build()
            .unwrap();
        let spooler = ContractBuilder::new(ContractType::InstanceDemand, "spooler")
            .interface("Spooler")
            .build()
            .unwrap();
        let template = Contract::new(ContractType::InstanceTemplate, "driver")
            .unwrap()
            .with(provision)
            .unwrap()
            .with(spooler)
            .unwrap();
        Setup::new(template).unwrap()
    }

    fn printer_demand(location: &str) -> Contract {
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

    #[test]
    fn test_setup_requires_provision() {
        let bare = Contract::new(ContractType::InstanceTemplate, "driver").unwrap();
        assert!(Setup::new(bare).is_err());
        let demand = Contract::new(ContractType::InstanceDemand, "driver").unwrap();
        assert!(Setup::new(demand).is_err());
    }

    #[test]
    fn test_setup_accessors() {
        let setup = driver_setup();
        assert_eq!(setup.element_kind(), ElementKind::Instance);
        assert_eq!(setup.demands().count(), 1);
        assert!(setup.provision().is_some());
        assert!(setup.satisfies(&printer_demand("A"), true));
        assert!(!setup.satisfies(&printer_demand("B"), true));
    }

    #[test]
    fn test_copy_is_detached() {
        let original = driver_setup();
        let mut copy = original.copy_setup();
        copy.template_mut()
            .remove_contract(ContractType::InstanceDemand, "spooler");
        assert_eq!(original.demands().count(), 1);
        assert_eq!(copy.demands().count(), 0);
    }

    #[test]
    fn test_extension_copies_listed_pairs_only() {
        let source = ContractBuilder::new(ContractType::InstanceDemand, "printer")
            .interface("Printer")
            .feature(
                "Printer",
                "Location",
                "LOCATION",
                FeatureDemand::simple(Comparator::Equal, "A").unwrap(),
            )
            .feature(
                "Printer",
                "Quality",
                "DPI",
                FeatureDemand::simple(Comparator::GreaterEqual, 600).unwrap(),
            )
            .build()
            .unwrap();
        let mut target = ContractBuilder::new(ContractType::InstanceDemand, "spooler")
            .interface("Printer")
            .build()
            .unwrap();

        let copied = Extension::new()
            .map("Location", "LOCATION")
            .apply(&source, &mut target)
            .unwrap();
        assert_eq!(copied, 1);

        let ty = target
            .get_contract(ContractType::InterfaceDemand, "Printer")
            .unwrap();
        assert!(ty.get_contract(ContractType::DimensionDemand, "Location").is_some());
        assert!(ty.get_contract(ContractType::DimensionDemand, "Quality").is_none());
    }

    #[test]
    fn test_extension_resource_dimension() {
        let source = ContractBuilder::new(ContractType::ResourceDemand, "memory")
            .dimension_feature(
                "Capacity",
                "MEMORY",
                FeatureDemand::simple(Comparator::GreaterEqual, 64).unwrap(),
            )
            .build()
            .unwrap();
        let mut target = Contract::new(ContractType::ResourceDemand, "memory").unwrap();
        let copied = Extension::new()
            .map("Capacity", "MEMORY")
            .apply(&source, &mut target)
            .unwrap();
        assert_eq!(copied, 1);
        assert!(target.matches(
            &ContractBuilder::new(ContractType::ResourceProvision, "memory")
                .dimension_feature("Capacity", "MEMORY", FeatureProvision::value_of(64))
                .build()
                .unwrap(),
            true
        ));
    }

    #[test]
    fn test_extension_skips_missing_type() {
        let source = printer_demand("A");
        let mut target = ContractBuilder::new(ContractType::InstanceDemand, "spooler")
            .interface("Spooler")
            .build()
            .unwrap();
        let copied = Extension::new()
            .map("Location", "LOCATION")
            .apply(&source, &mut target)
            .unwrap();
        assert_eq!(copied, 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn comparator() -> impl Strategy<Value = Comparator> {
            prop::sample::select(vec![
                Comparator::GreaterThan,
                Comparator::GreaterEqual,
                Comparator::Equal,
                Comparator::LessEqual,
                Comparator::LessThan,
            ])
        }

        fn setup_with(values: &[(String, i32)]) -> Setup {
            let mut builder = ContractBuilder::new(ContractType::InstanceProvision, "svc")
                .interface("Svc");
            for (feature, value) in values {
                builder = builder.feature("Svc", "Quality", feature, FeatureProvision::value_of(*value));
            }
            let template = Contract::new(ContractType::InstanceTemplate, "svc")
                .unwrap()
                .with(builder.build().unwrap())
                .unwrap();
            Setup::new(template).unwrap()
        }

        proptest! {
            #[test]
            fn copy_matches_like_original(
                provided in prop::collection::btree_map("[a-d]", any::<i32>(), 0..4),
                demanded in prop::collection::vec(("[a-e]", comparator(), any::<i32>()), 0..4),
                check in any::<bool>(),
            ) {
                let values: Vec<_> = provided.into_iter().collect();
                let original = setup_with(&values);
                let copy = original.copy_setup();

                let mut builder = ContractBuilder::new(ContractType::InstanceDemand, "svc")
                    .interface("Svc");
                let mut seen = std::collections::BTreeSet::new();
                for (feature, cmp, value) in demanded {
                    if seen.insert(feature.clone()) {
                        builder = builder.feature(
                            "Svc",
                            "Quality",
                            &feature,
                            FeatureDemand::simple(cmp, value).unwrap(),
                        );
                    }
                }
                let demand = builder.build().unwrap();
                prop_assert_eq!(original.satisfies(&demand, check), copy.satisfies(&demand, check));
            }
        }
    }
}
