//! The instance contract
//!
//! Instances are the running components a factory creates. The container
//! drives them through the lifecycle in `element`; every hook except
//! `start` and `stop` has a no-op default so simple components only
//! implement what they need.

use plexus_core::{ElementId, SystemId};

use crate::error::ElementError;
use crate::setup::Setup;

/// An element an instance depends on, resolved before it was started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Name of the nested demand the dependency answers
    pub demand: String,
    /// System hosting the dependency
    pub system: SystemId,
    /// The dependency element
    pub element: ElementId,
}

/// Everything an instance learns about itself when bound
#[derive(Debug, Clone)]
pub struct InstanceContext {
    /// The instance's own id
    pub element: ElementId,
    /// Hosting system
    pub system: SystemId,
    /// Setup the instance was created from
    pub setup: Setup,
    /// Elements resolved for the setup's nested demands
    pub dependencies: Vec<Dependency>,
}

impl InstanceContext {
    /// Dependency answering the nested demand `demand`
    pub fn dependency(&self, demand: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.demand == demand)
    }
}

/// A component instance
pub trait Instance: Send {
    /// Receive the context before start
    fn bind_context(&mut self, _context: &InstanceContext) -> Result<(), ElementError> {
        Ok(())
    }

    /// Start (or resume after a pause)
    fn start(&mut self) -> Result<(), ElementError>;

    /// Suspend
    fn pause(&mut self) -> Result<(), ElementError> {
        Ok(())
    }

    /// Stop for good
    fn stop(&mut self) -> Result<(), ElementError>;

    /// Release the context after stop
    fn unbind_context(&mut self) {}

    /// Externalize the state needed to recreate an equivalent instance
    ///
    /// Stateless instances return None.
    fn store_checkpoint(&self) -> Option<Vec<u8>> {
        None
    }

    /// Restore state from a checkpoint image, between bind and start
    fn load_checkpoint(&mut self, _image: &[u8]) -> Result<(), ElementError> {
        Ok(())
    }
}
