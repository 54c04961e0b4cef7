//! Factories and the template-driven reference factory
//!
//! A factory answers instance demands with setups and creates instances
//! from accepted setups.
//!
//! ## Setup derivation
//!
//! `TemplateFactory` derives at most one setup per demand:
//!
//! 1. The demand must be an instance demand whose every required interface,
//!    event, dimension and feature is supported by the factory's provision
//!    (strict matching; a partial match is a rejection).
//! 2. The setup starts as a copy of the whole template, so its provision is
//!    the strongest one the factory can offer.
//! 3. Dynamic features the demand pins with `eq` are fixed to the demanded
//!    value.
//! 4. Registered `Extension`s copy constraints of the demand into the
//!    template's nested demands.

use plexus_core::{
    Comparator, Constraint, Contract, ContractType, FeatureProvision, PlexusError, PlexusResult,
    Template,
};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ElementError;
use crate::instance::Instance;
use crate::setup::{Extension, Setup};

/// Produces instances
pub trait Factory: Send + Sync {
    /// The instance template describing what the factory provides
    fn template(&self) -> &Template;

    /// Candidate setups for `demand`, or None if the factory cannot serve it
    fn derive_setups(&self, demand: &Contract) -> Option<Vec<Setup>>;

    /// Create an instance for an accepted setup
    fn create_instance(&self, setup: &Setup) -> Result<Box<dyn Instance>, ElementError>;

    /// Whether running instances may serve several assemblies
    fn shareable(&self) -> bool {
        false
    }
}

type CreateFn = dyn Fn(&Setup) -> Result<Box<dyn Instance>, ElementError> + Send + Sync;

/// Factory whose offer is a lockable instance template
pub struct TemplateFactory {
    template: Template,
    extensions: BTreeMap<String, Extension>,
    create: Box<CreateFn>,
    shareable: bool,
}

impl TemplateFactory {
    /// Create from an instance template and an instance constructor
    ///
    /// # Errors
    /// `InvalidPayload` if the template is not an instance template with a
    /// provision.
    pub fn new(
        template: Template,
        create: impl Fn(&Setup) -> Result<Box<dyn Instance>, ElementError> + Send + Sync + 'static,
    ) -> PlexusResult<Self> {
        Setup::new(template.snapshot()).and_then(|setup| {
            if setup.template().kind() == ContractType::InstanceTemplate {
                Ok(())
            } else {
                Err(PlexusError::InvalidPayload(format!(
                    "factory '{}' needs an instance template",
                    setup.name()
                )))
            }
        })?;
        Ok(Self {
            template,
            extensions: BTreeMap::new(),
            create: Box::new(create),
            shareable: false,
        })
    }

    /// Let running instances be shared between assemblies
    pub fn shared(mut self) -> Self {
        self.shareable = true;
        self
    }

    /// Map constraints of incoming demands into the nested demand `nested`
    pub fn with_extension(mut self, nested: impl Into<String>, extension: Extension) -> Self {
        self.extensions.insert(nested.into(), extension);
        self
    }
}

impl Factory for TemplateFactory {
    fn template(&self) -> &Template {
        &self.template
    }

    fn derive_setups(&self, demand: &Contract) -> Option<Vec<Setup>> {
        if demand.kind() != ContractType::InstanceDemand {
            return None;
        }
        let mut template = {
            let guard = self.template.read();
            let reader = guard.instance()?;
            reader.provision()?;
            if !demand.matches(&reader.to_contract(), true) {
                return None;
            }
            reader.to_contract()
        };

        let provision_name = template
            .first_contract(ContractType::InstanceProvision)
            .map(|p| p.name().to_string());
        if let Some(name) = provision_name {
            if let Some(provision) =
                template.get_contract_mut(ContractType::InstanceProvision, &name)
            {
                let pinned = pin_dynamic_features(demand, provision);
                if pinned > 0 {
                    debug!(target: "plexus::container", pinned, "Pinned dynamic features");
                }
            }
        }

        for (nested, extension) in &self.extensions {
            for kind in [ContractType::InstanceDemand, ContractType::ResourceDemand] {
                if let Some(target) = template.get_contract_mut(kind, nested) {
                    if let Err(e) = extension.apply(demand, target) {
                        debug!(target: "plexus::container", error = %e, "Extension rejected");
                        return None;
                    }
                }
            }
        }

        Setup::new(template).ok().map(|setup| vec![setup])
    }

    fn create_instance(&self, setup: &Setup) -> Result<Box<dyn Instance>, ElementError> {
        (self.create)(setup)
    }

    fn shareable(&self) -> bool {
        self.shareable
    }
}

/// Fix dynamic provision features the demand pins with `eq`
///
/// Returns the number of features fixed.
pub(crate) fn pin_dynamic_features(demand: &Contract, provision: &mut Contract) -> usize {
    let mut pinned = 0;
    if demand.kind() == ContractType::FeatureDemand {
        let fixed = match (demand.as_feature_demand(), provision.as_feature_provision()) {
            (Some(d), Some(p)) if p.is_dynamic() => match d.constraint() {
                Constraint::Simple {
                    comparator: Comparator::Equal,
                    value,
                } => Some(value.clone()),
                _ => None,
            },
            _ => None,
        };
        if let Some(value) = fixed {
            if provision
                .set_feature_provision(FeatureProvision::value_of(value))
                .is_ok()
            {
                pinned += 1;
            }
        }
        return pinned;
    }
    for wanted in demand.children() {
        let Some(kind) = wanted.kind().counterpart() else {
            continue;
        };
        if let Some(offered) = provision.get_contract_mut(kind, wanted.name()) {
            pinned += pin_dynamic_features(wanted, offered);
        }
    }
    pinned
}
