//! Contract matching engine
//!
//! Decides whether a provision subtree satisfies a demand subtree. Matching is
//! a total function: malformed input is impossible (trees are validated on
//! construction) and anything that does not line up is simply "no match".
//!
//! ## Rules
//!
//! A provision matches a demand when the provision has the demand's
//! counterpart kind and, for every child of the demand:
//!
//! 1. a same-named child of the counterpart kind exists in the provision and
//!    matches recursively, or
//! 2. the demanded child is optional, or
//! 3. the child is a dimension or feature and the caller turned provision
//!    checking off.
//!
//! Feature leaves evaluate `comparator(provided, demanded)`; dynamic
//! provisions accept every demand of their type.

use crate::contract::{Contract, ContractType};

/// Whether `provision` satisfies `demand`
///
/// # Arguments
/// * `demand` - a demand subtree (`InstanceDemand`, `InterfaceDemand`, ...)
/// * `provision` - a provision subtree of the counterpart kind
/// * `check_provision` - when false, dimensions and features the provision
///   does not mention are not counted as failures
pub fn matches(demand: &Contract, provision: &Contract, check_provision: bool) -> bool {
    if demand.kind().counterpart() != Some(provision.kind()) {
        return false;
    }

    if demand.kind() == ContractType::FeatureDemand {
        return match (demand.as_feature_demand(), provision.as_feature_provision()) {
            (Some(d), Some(p)) => d.accepts(p),
            _ => false,
        };
    }

    demand.children().iter().all(|wanted| {
        let counterpart = match wanted.kind().counterpart() {
            Some(kind) => kind,
            None => return false,
        };
        match provision.get_contract(counterpart, wanted.name()) {
            Some(offered) => matches(wanted, offered, check_provision),
            None => !wanted.is_required() || (!check_provision && is_tolerable(wanted.kind())),
        }
    })
}

fn is_tolerable(kind: ContractType) -> bool {
    matches!(
        kind,
        ContractType::DimensionDemand | ContractType::FeatureDemand
    )
}

/// Whether a template (instance or resource) satisfies a demand
///
/// Looks up the template's provision and matches against it. Templates
/// without a provision never match.
pub fn matches_template(demand: &Contract, template: &Contract, check_provision: bool) -> bool {
    let provision_kind = match demand.kind().counterpart() {
        Some(kind) => kind,
        None => return false,
    };
    template
        .first_contract(provision_kind)
        .map(|provision| matches(demand, provision, check_provision))
        .unwrap_or(false)
}

impl Contract {
    /// Whether `status` satisfies this demand
    ///
    /// `status` may be a provision of the counterpart kind or a template
    /// containing one.
    pub fn matches(&self, status: &Contract, check_provision: bool) -> bool {
        if status.kind().is_template() {
            matches_template(self, status, check_provision)
        } else {
            matches(self, status, check_provision)
        }
    }
}
