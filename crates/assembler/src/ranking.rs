//! Ranking of competing offers
//!
//! When several factories or allocators can answer a demand the resolver
//! tries their offers in the order a `SetupRanker` decides. Sorting is
//! stable, so offers that compare equal keep the container's registration
//! order.

use plexus_container::Offer;
use plexus_core::SystemId;

/// Orders the offers for one demand, best first
pub trait SetupRanker: Send + Sync {
    /// Sort `offers` in place; `local` is the system doing the resolution
    fn rank(&self, local: &SystemId, offers: &mut Vec<Offer>);
}

/// Running elements first, then offers of the local system
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferReuse;

impl SetupRanker for PreferReuse {
    fn rank(&self, local: &SystemId, offers: &mut Vec<Offer>) {
        offers.sort_by_key(|offer| (!offer.is_existing(), &offer.system != local));
    }
}

/// Running elements first, then the setups with the fewest nested demands
#[derive(Debug, Clone, Copy, Default)]
pub struct FewestDependencies;

impl SetupRanker for FewestDependencies {
    fn rank(&self, local: &SystemId, offers: &mut Vec<Offer>) {
        offers.sort_by_key(|offer| {
            (
                !offer.is_existing(),
                offer.dependency_count(),
                &offer.system != local,
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_container::Setup;
    use plexus_core::{Contract, ContractType, ElementId};

    fn offer(system: &str, existing: bool, nested: usize) -> Offer {
        let mut template = Contract::new(ContractType::InstanceTemplate, "driver")
            .unwrap()
            .with(Contract::new(ContractType::InstanceProvision, "driver").unwrap())
            .unwrap();
        for i in 0..nested {
            template
                .add_contract(
                    Contract::new(ContractType::InstanceDemand, format!("dep{}", i)).unwrap(),
                )
                .unwrap();
        }
        Offer {
            system: SystemId::new(system),
            source: ElementId::new(),
            setup: Setup::new(template).unwrap(),
            existing: existing.then(ElementId::new),
        }
    }

    #[test]
    fn test_prefer_reuse_order() {
        let local = SystemId::new("a");
        let mut offers = vec![
            offer("b", false, 0),
            offer("a", false, 2),
            offer("b", true, 0),
        ];
        PreferReuse.rank(&local, &mut offers);
        assert!(offers[0].is_existing());
        assert_eq!(offers[1].system, local);
        assert_eq!(offers[2].system, SystemId::new("b"));
    }

    #[test]
    fn test_fewest_dependencies_order() {
        let local = SystemId::new("a");
        let mut offers = vec![offer("a", false, 3), offer("b", false, 1), offer("a", false, 1)];
        FewestDependencies.rank(&local, &mut offers);
        assert_eq!(offers[0].dependency_count(), 1);
        assert_eq!(offers[0].system, local);
        assert_eq!(offers[1].system, SystemId::new("b"));
        assert_eq!(offers[2].dependency_count(), 3);
    }

    #[test]
    fn test_stable_for_equal_offers() {
        let local = SystemId::new("a");
        let offers = vec![offer("a", false, 0), offer("a", false, 0)];
        let sources: Vec<_> = offers.iter().map(|o| o.source).collect();
        let mut ranked = offers.clone();
        PreferReuse.rank(&local, &mut ranked);
        assert_eq!(ranked.iter().map(|o| o.source).collect::<Vec<_>>(), sources);
    }
}
