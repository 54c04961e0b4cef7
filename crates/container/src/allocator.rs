//! Allocators and the capacity-vector reference allocator
//!
//! An allocator answers resource demands and keeps the books for what it
//! hands out. Capacity is a fixed-length vector, one entry per resource axis
//! the allocator defines (e.g. `[MEMORY, CPU]`).
//!
//! The lifecycle methods take `&mut self`: the container serializes every
//! resource-lifecycle call for one allocator, so an implementation never sees
//! two of them at once.

use plexus_core::{
    Comparator, Constraint, Contract, ContractType, ElementId, FeatureProvision, PlexusError,
    PlexusResult, Template,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::ElementError;
use crate::setup::Setup;

/// Produces resources and accounts for their capacity
pub trait Allocator: Send {
    /// The allocator template describing what is available
    fn template(&self) -> &Template;

    /// Candidate setups for `demand`, or None if it cannot be served
    fn derive_setups(&self, demand: &Contract) -> Option<Vec<Setup>>;

    /// Capacity not reserved, one entry per axis
    fn free_resources(&self) -> Vec<i64>;

    /// Total capacity, one entry per axis
    fn total_resources(&self) -> Vec<i64>;

    /// Predicted consumption of a candidate setup template
    fn estimate_template(&self, template: &Contract) -> Vec<i64>;

    /// Reserve capacity for `resource`
    ///
    /// Returns false if capacity is insufficient; the caller moves on to the
    /// next alternative.
    fn start_resource(&mut self, resource: ElementId, setup: &Setup)
        -> Result<bool, ElementError>;

    /// Suspend a resource; its reservation is kept
    fn pause_resource(&mut self, resource: ElementId) -> Result<(), ElementError>;

    /// Resume a paused resource
    fn resume_resource(&mut self, _resource: ElementId) -> Result<(), ElementError> {
        Ok(())
    }

    /// Release the reservation of `resource`
    fn stop_resource(&mut self, resource: ElementId) -> Result<(), ElementError>;
}

// =============================================================================
// CapacityAllocator
// =============================================================================

/// Allocator of one resource with numeric capacity axes
///
/// The template publishes the current free amount of each axis as an
/// `Integer` feature of `<resource>/<dimension>`, so ordinary demands such as
/// `Capacity/MEMORY ge 64` match only while enough is left. A setup's
/// provision carries the amounts the demand asked for, which is also what
/// `estimate_template` reads back.
pub struct CapacityAllocator {
    template: Template,
    resource: String,
    dimension: String,
    axes: Vec<String>,
    total: Vec<i64>,
    free: Vec<i64>,
    reservations: HashMap<ElementId, Vec<i64>>,
    paused: HashSet<ElementId>,
}

impl CapacityAllocator {
    /// Create an allocator named `name` offering `resource`
    ///
    /// # Arguments
    /// * `dimension` - dimension holding the capacity features
    /// * `axes` - axis names and their total capacity
    ///
    /// # Errors
    /// `InvalidConfig` for negative totals or duplicate axes.
    pub fn new(
        name: &str,
        resource: &str,
        dimension: &str,
        axes: &[(&str, i64)],
    ) -> PlexusResult<Self> {
        let mut seen = HashSet::new();
        for (axis, total) in axes {
            if *total < 0 || !seen.insert(*axis) {
                return Err(PlexusError::InvalidConfig(format!(
                    "bad capacity axis '{}' of allocator '{}'",
                    axis, name
                )));
            }
        }
        let total: Vec<i64> = axes.iter().map(|(_, t)| *t).collect();
        let axis_names: Vec<String> = axes.iter().map(|(a, _)| a.to_string()).collect();

        let mut dim = Contract::new(ContractType::DimensionProvision, dimension)?;
        for (axis, amount) in axis_names.iter().zip(&total) {
            dim.add_contract(Contract::feature_provision(
                axis.as_str(),
                capacity_value(*amount),
            ))?;
        }
        let root = Contract::new(ContractType::AllocatorTemplate, name)?.with(
            Contract::new(ContractType::ResourceTemplate, resource)?
                .with(Contract::new(ContractType::ResourceProvision, resource)?.with(dim)?)?,
        )?;

        Ok(Self {
            template: Template::new(root)?,
            resource: resource.to_string(),
            dimension: dimension.to_string(),
            axes: axis_names,
            free: total.clone(),
            total,
            reservations: HashMap::new(),
            paused: HashSet::new(),
        })
    }

    /// Axis names, in vector order
    pub fn axes(&self) -> &[String] {
        &self.axes
    }

    /// Number of live reservations
    pub fn reservations(&self) -> usize {
        self.reservations.len()
    }

    /// Amount of `axis` a demand asks for
    fn requested(&self, demand: &Contract, axis: &str) -> i64 {
        let feature = demand
            .get_contract(ContractType::DimensionDemand, &self.dimension)
            .and_then(|d| d.get_contract(ContractType::FeatureDemand, axis))
            .and_then(|f| f.as_feature_demand());
        let Some(feature) = feature else {
            return 0;
        };
        match feature.constraint() {
            Constraint::Simple { comparator, value } => {
                let v = value.as_i64().unwrap_or(0);
                match comparator {
                    Comparator::GreaterEqual | Comparator::Equal => v,
                    Comparator::GreaterThan => v.saturating_add(1),
                    _ => 0,
                }
            }
            Constraint::Range {
                comparator: Comparator::InRange,
                min,
                ..
            } => min.as_i64().unwrap_or(0),
            Constraint::Range { .. } => 0,
        }
    }

    /// Publish the free vector through the template
    fn publish_free(&self) -> PlexusResult<()> {
        let mut writer = self.template.write();
        {
            let mut allocator = writer
                .allocator()
                .ok_or_else(|| PlexusError::Internal("allocator template lost its root".into()))?;
            let mut resource = allocator
                .resource_mut(&self.resource)
                .ok_or_else(|| PlexusError::Internal("resource template missing".into()))?;
            let mut provision = resource
                .provision_mut()
                .ok_or_else(|| PlexusError::Internal("resource provision missing".into()))?;
            let mut dim = provision
                .dimension_mut(&self.dimension)
                .ok_or_else(|| PlexusError::Internal("capacity dimension missing".into()))?;
            for (axis, amount) in self.axes.iter().zip(&self.free) {
                if let Some(mut feature) = dim.feature_mut(axis) {
                    feature.set_provision(capacity_value(*amount))?;
                }
            }
        }
        writer.commit();
        Ok(())
    }
}

fn capacity_value(amount: i64) -> FeatureProvision {
    let clamped = i32::try_from(amount).unwrap_or(if amount < 0 { i32::MIN } else { i32::MAX });
    FeatureProvision::value_of(clamped)
}

impl Allocator for CapacityAllocator {
    fn template(&self) -> &Template {
        &self.template
    }

    fn derive_setups(&self, demand: &Contract) -> Option<Vec<Setup>> {
        if demand.kind() != ContractType::ResourceDemand {
            return None;
        }
        let mut resource = {
            let guard = self.template.read();
            let allocator = guard.allocator()?;
            let resource = allocator.resource(&self.resource)?;
            if !demand.matches(&resource.to_contract(), true) {
                return None;
            }
            resource.to_contract()
        };

        let amounts: Vec<i64> = self
            .axes
            .iter()
            .map(|axis| self.requested(demand, axis))
            .collect();
        let provision = resource.get_contract_mut(ContractType::ResourceProvision, &self.resource)?;
        let dim = provision.get_contract_mut(ContractType::DimensionProvision, &self.dimension)?;
        for (axis, amount) in self.axes.iter().zip(&amounts) {
            let feature = dim.get_contract_mut(ContractType::FeatureProvision, axis)?;
            feature.set_feature_provision(capacity_value(*amount)).ok()?;
        }
        Setup::new(resource).ok().map(|setup| vec![setup])
    }

    fn free_resources(&self) -> Vec<i64> {
        self.free.clone()
    }

    fn total_resources(&self) -> Vec<i64> {
        self.total.clone()
    }

    fn estimate_template(&self, template: &Contract) -> Vec<i64> {
        let provision = if template.kind() == ContractType::ResourceProvision {
            Some(template)
        } else {
            template.first_contract(ContractType::ResourceProvision)
        };
        let dim =
            provision.and_then(|p| p.get_contract(ContractType::DimensionProvision, &self.dimension));
        self.axes
            .iter()
            .map(|axis| {
                dim.and_then(|d| d.get_contract(ContractType::FeatureProvision, axis))
                    .and_then(|f| f.as_feature_provision())
                    .and_then(|p| p.value())
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0)
                    .max(0)
            })
            .collect()
    }

    fn start_resource(
        &mut self,
        resource: ElementId,
        setup: &Setup,
    ) -> Result<bool, ElementError> {
        if self.reservations.contains_key(&resource) {
            return Ok(true);
        }
        let estimate = self.estimate_template(setup.template());
        if estimate.iter().zip(&self.free).any(|(want, free)| want > free) {
            debug!(
                target: "plexus::container",
                resource = %resource,
                ?estimate,
                free = ?self.free,
                "Insufficient capacity"
            );
            return Ok(false);
        }
        for (free, want) in self.free.iter_mut().zip(&estimate) {
            *free -= want;
        }
        self.reservations.insert(resource, estimate);
        self.publish_free()
            .map_err(|e| ElementError::Start(e.to_string()))?;
        Ok(true)
    }

    fn pause_resource(&mut self, resource: ElementId) -> Result<(), ElementError> {
        if !self.reservations.contains_key(&resource) {
            return Err(ElementError::Pause(format!("unknown resource {}", resource)));
        }
        self.paused.insert(resource);
        Ok(())
    }

    fn resume_resource(&mut self, resource: ElementId) -> Result<(), ElementError> {
        self.paused.remove(&resource);
        Ok(())
    }

    fn stop_resource(&mut self, resource: ElementId) -> Result<(), ElementError> {
        let reserved = self
            .reservations
            .remove(&resource)
            .ok_or_else(|| ElementError::Stop(format!("unknown resource {}", resource)))?;
        self.paused.remove(&resource);
        for (free, amount) in self.free.iter_mut().zip(&reserved) {
            *free += amount;
        }
        self.publish_free()
            .map_err(|e| ElementError::Stop(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{ContractBuilder, FeatureDemand};

    fn memory(amount: i32) -> Contract {
        ContractBuilder::new(ContractType::ResourceDemand, "memory")
            .dimension_feature(
                "Capacity",
                "MEMORY",
                FeatureDemand::simple(Comparator::GreaterEqual, amount).unwrap(),
            )
            .build()
            .unwrap()
    }

    fn allocator() -> CapacityAllocator {
        CapacityAllocator::new("ram", "memory", "Capacity", &[("MEMORY", 128), ("SLOTS", 4)])
            .unwrap()
    }

    #[test]
    fn test_rejects_bad_axes() {
        assert!(CapacityAllocator::new("x", "m", "C", &[("A", -1)]).is_err());
        assert!(CapacityAllocator::new("x", "m", "C", &[("A", 1), ("A", 2)]).is_err());
    }

    #[test]
    fn test_derive_and_estimate() {
        let alloc = allocator();
        let setup = alloc.derive_setups(&memory(64)).unwrap().pop().unwrap();
        assert_eq!(alloc.estimate_template(setup.template()), vec![64, 0]);
        assert!(setup.satisfies(&memory(64), true));
        assert!(!setup.satisfies(&memory(65), true));
    }

    #[test]
    fn test_too_large_demand_has_no_setup() {
        let alloc = allocator();
        assert!(alloc.derive_setups(&memory(256)).is_none());
    }

    #[test]
    fn test_start_and_stop_update_free_vector() {
        let mut alloc = allocator();
        let setup = alloc.derive_setups(&memory(100)).unwrap().pop().unwrap();
        let id = ElementId::new();

        assert!(alloc.start_resource(id, &setup).unwrap());
        assert_eq!(alloc.free_resources(), vec![28, 4]);
        assert_eq!(alloc.total_resources(), vec![128, 4]);
        // The published template now rejects what no longer fits
        assert!(alloc.derive_setups(&memory(64)).is_none());

        alloc.stop_resource(id).unwrap();
        assert_eq!(alloc.free_resources(), vec![128, 4]);
        assert!(alloc.derive_setups(&memory(64)).is_some());
    }

    #[test]
    fn test_start_fails_softly_when_capacity_runs_out() {
        let mut alloc = allocator();
        let big = alloc.derive_setups(&memory(100)).unwrap().pop().unwrap();
        // Derived before the first reservation, so it is stale by start time
        let stale = alloc.derive_setups(&memory(100)).unwrap().pop().unwrap();

        assert!(alloc.start_resource(ElementId::new(), &big).unwrap());
        assert!(!alloc.start_resource(ElementId::new(), &stale).unwrap());
        assert_eq!(alloc.reservations(), 1);
    }

    #[test]
    fn test_stop_unknown_resource() {
        let mut alloc = allocator();
        assert!(matches!(
            alloc.stop_resource(ElementId::new()),
            Err(ElementError::Stop(_))
        ));
    }

    #[test]
    fn test_pause_keeps_reservation() {
        let mut alloc = allocator();
        let setup = alloc.derive_setups(&memory(32)).unwrap().pop().unwrap();
        let id = ElementId::new();
        alloc.start_resource(id, &setup).unwrap();
        alloc.pause_resource(id).unwrap();
        assert_eq!(alloc.free_resources(), vec![96, 4]);
        alloc.resume_resource(id).unwrap();
        alloc.stop_resource(id).unwrap();
        assert_eq!(alloc.free_resources(), vec![128, 4]);
    }
}
