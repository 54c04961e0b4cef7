//! Distributed assembly for Plexus
//!
//! This crate turns ranked demand trees into running compositions:
//! - Pointers: `Pointer`, `NodeKey` and the generation-tagged `Arena`
//! - Leases: `Lease`, the `LeaseTable` expiry index and the `LeaseReaper`
//! - Negotiation state: bindings (`BindingState`, `BindingInfo`) and the
//!   immutable `Assembly` they produce
//! - Ranking: `SetupRanker`, `PreferReuse`, `FewestDependencies`
//! - Transport: the `Peer` surface, `Transport` and `LoopbackTransport`
//! - The `Assembler` service with coordinated and peer-to-peer strategies
//!
//! ## Protocol
//!
//! ```text
//! prepare(session, systems)           -> Lease
//! setup(session pointer, Preferences) -> root pointer | terminal
//! setup(node pointer, Advance)       -> node pointer | terminal
//! configure(session)                  -> Assembly
//! remove(session)
//! ```
//!
//! Between assemblers: `offers`, `setup(Commit)`, `retrieve`, and for the
//! peer-to-peer strategy the phased `resolve` / `report` / `release`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod assembly;
pub mod binding;
pub mod config;
pub mod lease;
pub mod pointer;
pub mod ranking;
pub mod reaper;
mod resolver;
mod session;
pub mod transport;

pub use assembler::Assembler;
pub use assembly::Assembly;
pub use binding::{BindingInfo, BindingState};
pub use config::{AssemblerConfig, Strategy};
pub use lease::{Lease, LeaseTable};
pub use pointer::{Arena, NodeKey, Pointer, Target};
pub use ranking::{FewestDependencies, PreferReuse, SetupRanker};
pub use reaper::LeaseReaper;
pub use transport::{AssemblyState, Delivery, LoopbackTransport, Peer, Transport};
