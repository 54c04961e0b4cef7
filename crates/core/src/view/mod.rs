//! Typed views over contract trees
//!
//! Element code never touches raw `Contract` nodes of a live template. It gets
//! a `Reader` (list/get children) or a `Writer` (reader plus create, replace
//! and remove) scoped to one tree level:
//!
//! | Level | Node kinds |
//! |-------|-----------|
//! | `AllocatorLevel` | AllocatorTemplate |
//! | `ResourceLevel` | ResourceTemplate, ResourceDemand, ResourceProvision |
//! | `InstanceLevel` | InstanceTemplate, InstanceDemand, InstanceProvision |
//! | `TypeLevel` | Interface/Event Demand/Provision |
//! | `DimensionLevel` | DimensionDemand, DimensionProvision |
//! | `FeatureLevel` | FeatureDemand, FeatureProvision |
//!
//! Writers only ever touch the working copy held by a `TemplateWriter`; the
//! changes become visible through `TemplateWriter::commit`.

pub mod template;

pub use template::{EventHold, Template, TemplateEvent, TemplateReadGuard, TemplateWriter};

use crate::contract::{Contract, ContractType, Feature, FeatureDemand, FeatureProvision};
use crate::error::{PlexusError, PlexusResult};
use std::marker::PhantomData;

/// A tree level a view can be scoped to
pub trait Level {
    /// Whether a node of `kind` belongs to this level
    fn accepts(kind: ContractType) -> bool;
}

/// Allocator templates
#[derive(Debug)]
pub enum AllocatorLevel {}
/// Resource templates, demands and provisions
#[derive(Debug)]
pub enum ResourceLevel {}
/// Instance templates, demands and provisions
#[derive(Debug)]
pub enum InstanceLevel {}
/// Interface and event types
#[derive(Debug)]
pub enum TypeLevel {}
/// Dimensions
#[derive(Debug)]
pub enum DimensionLevel {}
/// Features
#[derive(Debug)]
pub enum FeatureLevel {}

impl Level for AllocatorLevel {
    fn accepts(kind: ContractType) -> bool {
        kind == ContractType::AllocatorTemplate
    }
}

impl Level for ResourceLevel {
    fn accepts(kind: ContractType) -> bool {
        matches!(
            kind,
            ContractType::ResourceTemplate
                | ContractType::ResourceDemand
                | ContractType::ResourceProvision
        )
    }
}

impl Level for InstanceLevel {
    fn accepts(kind: ContractType) -> bool {
        matches!(
            kind,
            ContractType::InstanceTemplate
                | ContractType::InstanceDemand
                | ContractType::InstanceProvision
        )
    }
}

impl Level for TypeLevel {
    fn accepts(kind: ContractType) -> bool {
        matches!(
            kind,
            ContractType::InterfaceDemand
                | ContractType::InterfaceProvision
                | ContractType::EventDemand
                | ContractType::EventProvision
        )
    }
}

impl Level for DimensionLevel {
    fn accepts(kind: ContractType) -> bool {
        matches!(
            kind,
            ContractType::DimensionDemand | ContractType::DimensionProvision
        )
    }
}

impl Level for FeatureLevel {
    fn accepts(kind: ContractType) -> bool {
        kind.is_feature()
    }
}

fn side(node: &Contract, demand: ContractType, provision: ContractType) -> ContractType {
    if node.kind().is_demand() {
        demand
    } else {
        provision
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Read-only view of one node
#[derive(Debug)]
pub struct Reader<'a, L> {
    node: &'a Contract,
    _level: PhantomData<L>,
}

impl<'a, L> Clone for Reader<'a, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, L> Copy for Reader<'a, L> {}

impl<'a, L: Level> Reader<'a, L> {
    /// View `node` at level `L`; None if the node belongs to another level
    pub fn new(node: &'a Contract) -> Option<Self> {
        if L::accepts(node.kind()) {
            Some(Self {
                node,
                _level: PhantomData,
            })
        } else {
            None
        }
    }

    /// Node name
    pub fn name(&self) -> &'a str {
        self.node.name()
    }

    /// Node kind
    pub fn kind(&self) -> ContractType {
        self.node.kind()
    }

    /// Attribute value
    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        self.node.attribute(key)
    }

    /// Detached deep copy of the viewed subtree
    pub fn to_contract(&self) -> Contract {
        self.node.clone()
    }

    /// Whether `status` satisfies the viewed demand
    pub fn matches(&self, status: &Contract, check_provision: bool) -> bool {
        self.node.matches(status, check_provision)
    }

    fn children_of<C: Level>(&self, kinds: &[ContractType]) -> Vec<Reader<'a, C>> {
        self.node
            .children()
            .iter()
            .filter(|c| kinds.contains(&c.kind()))
            .filter_map(Reader::new)
            .collect()
    }

    fn child_of<C: Level>(&self, kind: ContractType, name: &str) -> Option<Reader<'a, C>> {
        self.node.get_contract(kind, name).and_then(Reader::new)
    }
}

impl<'a> Reader<'a, AllocatorLevel> {
    /// Resource templates of the allocator
    pub fn resources(&self) -> Vec<Reader<'a, ResourceLevel>> {
        self.children_of(&[ContractType::ResourceTemplate])
    }

    /// Resource template by name
    pub fn resource(&self, name: &str) -> Option<Reader<'a, ResourceLevel>> {
        self.child_of(ContractType::ResourceTemplate, name)
    }
}

impl<'a> Reader<'a, ResourceLevel> {
    /// Provision of a resource template
    pub fn provision(&self) -> Option<Reader<'a, ResourceLevel>> {
        self.node
            .first_contract(ContractType::ResourceProvision)
            .and_then(Reader::new)
    }

    /// Nested resource demands of a resource template
    pub fn demands(&self) -> Vec<Reader<'a, ResourceLevel>> {
        self.children_of(&[ContractType::ResourceDemand])
    }

    /// Nested resource demand by name
    pub fn demand(&self, name: &str) -> Option<Reader<'a, ResourceLevel>> {
        self.child_of(ContractType::ResourceDemand, name)
    }

    /// Dimensions of a resource demand or provision
    pub fn dimensions(&self) -> Vec<Reader<'a, DimensionLevel>> {
        self.children_of(&[
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        ])
    }

    /// Dimension by name
    pub fn dimension(&self, name: &str) -> Option<Reader<'a, DimensionLevel>> {
        let kind = side(
            self.node,
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        );
        self.child_of(kind, name)
    }
}

impl<'a> Reader<'a, InstanceLevel> {
    /// Provision of an instance template
    pub fn provision(&self) -> Option<Reader<'a, InstanceLevel>> {
        self.node
            .first_contract(ContractType::InstanceProvision)
            .and_then(Reader::new)
    }

    /// Instance demands of a template
    pub fn instance_demands(&self) -> Vec<Reader<'a, InstanceLevel>> {
        self.children_of(&[ContractType::InstanceDemand])
    }

    /// Instance demand by name
    pub fn instance_demand(&self, name: &str) -> Option<Reader<'a, InstanceLevel>> {
        self.child_of(ContractType::InstanceDemand, name)
    }

    /// Resource demands of a template
    pub fn resource_demands(&self) -> Vec<Reader<'a, ResourceLevel>> {
        self.children_of(&[ContractType::ResourceDemand])
    }

    /// Resource demand by name
    pub fn resource_demand(&self, name: &str) -> Option<Reader<'a, ResourceLevel>> {
        self.child_of(ContractType::ResourceDemand, name)
    }

    /// Interfaces of a demand or provision
    pub fn interfaces(&self) -> Vec<Reader<'a, TypeLevel>> {
        self.children_of(&[
            ContractType::InterfaceDemand,
            ContractType::InterfaceProvision,
        ])
    }

    /// Interface by name
    pub fn interface(&self, name: &str) -> Option<Reader<'a, TypeLevel>> {
        let kind = side(
            self.node,
            ContractType::InterfaceDemand,
            ContractType::InterfaceProvision,
        );
        self.child_of(kind, name)
    }

    /// Events of a demand or provision
    pub fn events(&self) -> Vec<Reader<'a, TypeLevel>> {
        self.children_of(&[ContractType::EventDemand, ContractType::EventProvision])
    }

    /// Event by name
    pub fn event(&self, name: &str) -> Option<Reader<'a, TypeLevel>> {
        let kind = side(
            self.node,
            ContractType::EventDemand,
            ContractType::EventProvision,
        );
        self.child_of(kind, name)
    }
}

impl<'a> Reader<'a, TypeLevel> {
    /// Dimensions of the type
    pub fn dimensions(&self) -> Vec<Reader<'a, DimensionLevel>> {
        self.children_of(&[
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        ])
    }

    /// Dimension by name
    pub fn dimension(&self, name: &str) -> Option<Reader<'a, DimensionLevel>> {
        let kind = side(
            self.node,
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        );
        self.child_of(kind, name)
    }
}

impl<'a> Reader<'a, DimensionLevel> {
    /// Features of the dimension
    pub fn features(&self) -> Vec<Reader<'a, FeatureLevel>> {
        self.children_of(&[ContractType::FeatureDemand, ContractType::FeatureProvision])
    }

    /// Feature by name
    pub fn feature(&self, name: &str) -> Option<Reader<'a, FeatureLevel>> {
        let kind = side(
            self.node,
            ContractType::FeatureDemand,
            ContractType::FeatureProvision,
        );
        self.child_of(kind, name)
    }
}

impl<'a> Reader<'a, FeatureLevel> {
    /// Demand payload
    pub fn demand(&self) -> Option<&'a FeatureDemand> {
        self.node.as_feature_demand()
    }

    /// Provision payload
    pub fn provision(&self) -> Option<&'a FeatureProvision> {
        self.node.as_feature_provision()
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Read-write view of one node of a working copy
///
/// Every successful mutation marks the owning `TemplateWriter` dirty.
#[derive(Debug)]
pub struct Writer<'a, L> {
    node: &'a mut Contract,
    dirty: &'a mut bool,
    _level: PhantomData<L>,
}

impl<'a, L: Level> Writer<'a, L> {
    /// Edit `node` at level `L`, flagging `dirty` on every mutation
    ///
    /// None if the node belongs to another level.
    pub fn new(node: &'a mut Contract, dirty: &'a mut bool) -> Option<Self> {
        if L::accepts(node.kind()) {
            Some(Self {
                node,
                dirty,
                _level: PhantomData,
            })
        } else {
            None
        }
    }

    /// Read-only view of the same node
    pub fn reader(&self) -> Reader<'_, L> {
        Reader {
            node: &*self.node,
            _level: PhantomData,
        }
    }

    /// Node name
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// Set an attribute
    pub fn set_attribute(&mut self, key: &str, value: &str) -> Option<String> {
        *self.dirty = true;
        self.node.set_attribute(key, value)
    }

    fn create_child(&mut self, kind: ContractType, name: &str) -> PlexusResult<Option<Contract>> {
        let replaced = self.node.replace_contract(Contract::new(kind, name)?)?;
        *self.dirty = true;
        Ok(replaced)
    }

    fn child_mut<C: Level>(&mut self, kind: ContractType, name: &str) -> Option<Writer<'_, C>> {
        let node = self.node.get_contract_mut(kind, name)?;
        Writer::new(node, &mut *self.dirty)
    }

    fn remove_child(&mut self, kind: ContractType, name: &str) -> Option<Contract> {
        let removed = self.node.remove_contract(kind, name);
        if removed.is_some() {
            *self.dirty = true;
        }
        removed
    }

    fn side(&self, demand: ContractType, provision: ContractType) -> ContractType {
        side(self.node, demand, provision)
    }
}

impl<'a> Writer<'a, AllocatorLevel> {
    /// Create (or replace) a resource template
    pub fn create_resource(&mut self, name: &str) -> PlexusResult<Option<Contract>> {
        self.create_child(ContractType::ResourceTemplate, name)
    }

    /// Writer for a resource template
    pub fn resource_mut(&mut self, name: &str) -> Option<Writer<'_, ResourceLevel>> {
        self.child_mut(ContractType::ResourceTemplate, name)
    }

    /// Remove a resource template
    pub fn remove_resource(&mut self, name: &str) -> Option<Contract> {
        self.remove_child(ContractType::ResourceTemplate, name)
    }
}

impl<'a> Writer<'a, ResourceLevel> {
    /// Create (or replace) the provision of a resource template
    ///
    /// The provision is named after the template.
    pub fn create_provision(&mut self) -> PlexusResult<Option<Contract>> {
        let name = self.node.name().to_string();
        let existing = self
            .node
            .first_contract(ContractType::ResourceProvision)
            .map(|p| p.name().to_string());
        let replaced = existing
            .and_then(|old| self.node.remove_contract(ContractType::ResourceProvision, &old));
        self.create_child(ContractType::ResourceProvision, &name)?;
        Ok(replaced)
    }

    /// Writer for the provision of a resource template
    pub fn provision_mut(&mut self) -> Option<Writer<'_, ResourceLevel>> {
        let name = self
            .node
            .first_contract(ContractType::ResourceProvision)?
            .name()
            .to_string();
        self.child_mut(ContractType::ResourceProvision, &name)
    }

    /// Create (or replace) a nested resource demand
    pub fn create_demand(&mut self, name: &str) -> PlexusResult<Option<Contract>> {
        self.create_child(ContractType::ResourceDemand, name)
    }

    /// Writer for a nested resource demand
    pub fn demand_mut(&mut self, name: &str) -> Option<Writer<'_, ResourceLevel>> {
        self.child_mut(ContractType::ResourceDemand, name)
    }

    /// Remove a nested resource demand
    pub fn remove_demand(&mut self, name: &str) -> Option<Contract> {
        self.remove_child(ContractType::ResourceDemand, name)
    }

    /// Create (or replace) a dimension
    pub fn create_dimension(&mut self, name: &str) -> PlexusResult<Option<Contract>> {
        let kind = self.side(
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        );
        self.create_child(kind, name)
    }

    /// Writer for a dimension
    pub fn dimension_mut(&mut self, name: &str) -> Option<Writer<'_, DimensionLevel>> {
        let kind = self.side(
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        );
        self.child_mut(kind, name)
    }

    /// Remove a dimension
    pub fn remove_dimension(&mut self, name: &str) -> Option<Contract> {
        let kind = self.side(
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        );
        self.remove_child(kind, name)
    }
}

impl<'a> Writer<'a, InstanceLevel> {
    /// Create (or replace) the provision of an instance template
    pub fn create_provision(&mut self) -> PlexusResult<Option<Contract>> {
        let name = self.node.name().to_string();
        let existing = self
            .node
            .first_contract(ContractType::InstanceProvision)
            .map(|p| p.name().to_string());
        let replaced = existing
            .and_then(|old| self.node.remove_contract(ContractType::InstanceProvision, &old));
        self.create_child(ContractType::InstanceProvision, &name)?;
        Ok(replaced)
    }

    /// Writer for the provision of an instance template
    pub fn provision_mut(&mut self) -> Option<Writer<'_, InstanceLevel>> {
        let name = self
            .node
            .first_contract(ContractType::InstanceProvision)?
            .name()
            .to_string();
        self.child_mut(ContractType::InstanceProvision, &name)
    }

    /// Create (or replace) an instance demand
    pub fn create_instance_demand(&mut self, name: &str) -> PlexusResult<Option<Contract>> {
        self.create_child(ContractType::InstanceDemand, name)
    }

    /// Writer for an instance demand
    pub fn instance_demand_mut(&mut self, name: &str) -> Option<Writer<'_, InstanceLevel>> {
        self.child_mut(ContractType::InstanceDemand, name)
    }

    /// Remove an instance demand
    pub fn remove_instance_demand(&mut self, name: &str) -> Option<Contract> {
        self.remove_child(ContractType::InstanceDemand, name)
    }

    /// Create (or replace) a resource demand
    pub fn create_resource_demand(&mut self, name: &str) -> PlexusResult<Option<Contract>> {
        self.create_child(ContractType::ResourceDemand, name)
    }

    /// Writer for a resource demand
    pub fn resource_demand_mut(&mut self, name: &str) -> Option<Writer<'_, ResourceLevel>> {
        self.child_mut(ContractType::ResourceDemand, name)
    }

    /// Remove a resource demand
    pub fn remove_resource_demand(&mut self, name: &str) -> Option<Contract> {
        self.remove_child(ContractType::ResourceDemand, name)
    }

    /// Create (or replace) an interface
    pub fn create_interface(&mut self, name: &str) -> PlexusResult<Option<Contract>> {
        let kind = self.side(
            ContractType::InterfaceDemand,
            ContractType::InterfaceProvision,
        );
        self.create_child(kind, name)
    }

    /// Writer for an interface
    pub fn interface_mut(&mut self, name: &str) -> Option<Writer<'_, TypeLevel>> {
        let kind = self.side(
            ContractType::InterfaceDemand,
            ContractType::InterfaceProvision,
        );
        self.child_mut(kind, name)
    }

    /// Remove an interface
    pub fn remove_interface(&mut self, name: &str) -> Option<Contract> {
        let kind = self.side(
            ContractType::InterfaceDemand,
            ContractType::InterfaceProvision,
        );
        self.remove_child(kind, name)
    }

    /// Create (or replace) an event type
    pub fn create_event(&mut self, name: &str) -> PlexusResult<Option<Contract>> {
        let kind = self.side(ContractType::EventDemand, ContractType::EventProvision);
        self.create_child(kind, name)
    }

    /// Writer for an event type
    pub fn event_mut(&mut self, name: &str) -> Option<Writer<'_, TypeLevel>> {
        let kind = self.side(ContractType::EventDemand, ContractType::EventProvision);
        self.child_mut(kind, name)
    }

    /// Remove an event type
    pub fn remove_event(&mut self, name: &str) -> Option<Contract> {
        let kind = self.side(ContractType::EventDemand, ContractType::EventProvision);
        self.remove_child(kind, name)
    }
}

impl<'a> Writer<'a, TypeLevel> {
    /// Create (or replace) a dimension
    pub fn create_dimension(&mut self, name: &str) -> PlexusResult<Option<Contract>> {
        let kind = self.side(
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        );
        self.create_child(kind, name)
    }

    /// Writer for a dimension
    pub fn dimension_mut(&mut self, name: &str) -> Option<Writer<'_, DimensionLevel>> {
        let kind = self.side(
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        );
        self.child_mut(kind, name)
    }

    /// Remove a dimension
    pub fn remove_dimension(&mut self, name: &str) -> Option<Contract> {
        let kind = self.side(
            ContractType::DimensionDemand,
            ContractType::DimensionProvision,
        );
        self.remove_child(kind, name)
    }
}

impl<'a> Writer<'a, DimensionLevel> {
    /// Create (or replace) a feature
    ///
    /// # Errors
    /// `InvalidPayload` if a demand payload is put below a provision
    /// dimension or vice versa.
    pub fn create_feature(
        &mut self,
        name: &str,
        feature: impl Into<Feature>,
    ) -> PlexusResult<Option<Contract>> {
        let leaf = match (feature.into(), self.node.kind().is_demand()) {
            (Feature::Demand(d), true) => Contract::feature_demand(name, d),
            (Feature::Provision(p), false) => Contract::feature_provision(name, p),
            _ => {
                return Err(PlexusError::InvalidPayload(format!(
                    "feature '{}' does not fit {} '{}'",
                    name,
                    self.node.kind(),
                    self.node.name()
                )))
            }
        };
        let replaced = self.node.replace_contract(leaf)?;
        *self.dirty = true;
        Ok(replaced)
    }

    /// Writer for a feature
    pub fn feature_mut(&mut self, name: &str) -> Option<Writer<'_, FeatureLevel>> {
        let kind = self.side(ContractType::FeatureDemand, ContractType::FeatureProvision);
        self.child_mut(kind, name)
    }

    /// Remove a feature
    pub fn remove_feature(&mut self, name: &str) -> Option<Contract> {
        let kind = self.side(ContractType::FeatureDemand, ContractType::FeatureProvision);
        self.remove_child(kind, name)
    }
}

impl<'a> Writer<'a, FeatureLevel> {
    /// Replace the value of a feature provision
    pub fn set_provision(&mut self, provision: FeatureProvision) -> PlexusResult<()> {
        self.node.set_feature_provision(provision)?;
        *self.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Comparator, ContractBuilder};

    fn printer_demand() -> Contract {
        ContractBuilder::new(ContractType::InstanceDemand, "printer")
            .interface("Printer")
            .feature(
                "Printer",
                "Location",
                "LOCATION",
                FeatureDemand::simple(Comparator::Equal, "A").unwrap(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_reader_levels() {
        let demand = printer_demand();
        let reader = Reader::<InstanceLevel>::new(&demand).unwrap();
        let iface = reader.interface("Printer").unwrap();
        let dim = iface.dimension("Location").unwrap();
        let feature = dim.feature("LOCATION").unwrap();
        assert_eq!(feature.demand().unwrap().comparator(), Comparator::Equal);
        assert!(feature.provision().is_none());
        assert_eq!(reader.interfaces().len(), 1);
        assert!(reader.events().is_empty());
    }

    #[test]
    fn test_reader_rejects_wrong_level() {
        let demand = printer_demand();
        assert!(Reader::<TypeLevel>::new(&demand).is_none());
        assert!(Reader::<ResourceLevel>::new(&demand).is_none());
    }

    #[test]
    fn test_writer_create_replaces_and_marks_dirty() {
        let mut demand = printer_demand();
        let mut dirty = false;
        {
            let mut writer = Writer::<InstanceLevel>::new(&mut demand, &mut dirty).unwrap();
            let replaced = writer.create_interface("Printer").unwrap();
            assert!(replaced.is_some());
        }
        assert!(dirty);
        let iface = demand
            .get_contract(ContractType::InterfaceDemand, "Printer")
            .unwrap();
        assert!(iface.children().is_empty());
    }

    #[test]
    fn test_writer_nested_feature() {
        let mut provision = Contract::new(ContractType::InstanceProvision, "p").unwrap();
        let mut dirty = false;
        {
            let mut w = Writer::<InstanceLevel>::new(&mut provision, &mut dirty).unwrap();
            w.create_interface("Printer").unwrap();
            let mut iface = w.interface_mut("Printer").unwrap();
            iface.create_dimension("Location").unwrap();
            let mut dim = iface.dimension_mut("Location").unwrap();
            dim.create_feature("LOCATION", FeatureProvision::value_of("A"))
                .unwrap();
            let err = dim
                .create_feature(
                    "FLOOR",
                    FeatureDemand::simple(Comparator::Equal, 1).unwrap(),
                )
                .unwrap_err();
            assert!(matches!(err, PlexusError::InvalidPayload(_)));
        }
        assert!(printer_demand().matches(&provision, true));
    }

    #[test]
    fn test_remove_missing_child_leaves_clean() {
        let mut demand = printer_demand();
        let mut dirty = false;
        let mut w = Writer::<InstanceLevel>::new(&mut demand, &mut dirty).unwrap();
        assert!(w.remove_event("Nope").is_none());
        drop(w);
        assert!(!dirty);
    }

    #[test]
    fn test_template_provision_writer() {
        let mut template = Contract::new(ContractType::InstanceTemplate, "driver").unwrap();
        let mut dirty = false;
        let mut w = Writer::<InstanceLevel>::new(&mut template, &mut dirty).unwrap();
        assert!(w.create_provision().unwrap().is_none());
        w.provision_mut().unwrap().create_interface("Printer").unwrap();
        assert!(w.create_provision().unwrap().is_some());
        assert!(w.reader().provision().unwrap().interfaces().is_empty());
    }
}
