//! A running Plexus node
//!
//! `Node` wires one container and one assembler together and keeps them
//! healthy in the background:
//!
//! - the lease reaper collects expired sessions and, on each pass, renews
//!   the leases of the sessions this node submitted;
//! - a repair worker listens for `ElementFailed` events and re-resolves the
//!   owned sessions using the failed element, reusing everything still
//!   running.
//!
//! # Example
//!
//! ```ignore
//! let node = Node::open_path("/var/lib/plexus")?;
//! node.container().add_factory(Arc::new(printer_factory));
//! let (session, assembly) = node.submit(vec![printer_demand], vec![])?;
//! ```

use dashmap::DashMap;
use parking_lot::Mutex;
use plexus_assembler::{
    Assembler, Assembly, AssemblyState, LeaseReaper, LoopbackTransport, Peer, Pointer, Transport,
};
use plexus_container::{Container, ContainerEvent};
use plexus_core::{Contract, PlexusError, PlexusResult, SessionId, SubscriptionId, SystemId};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::{NodeConfig, CONFIG_FILE_NAME};

/// Sessions submitted through a node, with the systems they may use
type Owned = DashMap<SessionId, Vec<SystemId>>;

/// One system: container, assembler and their background workers
pub struct Node {
    config: NodeConfig,
    container: Arc<Container>,
    assembler: Arc<Assembler>,
    owned: Arc<Owned>,
    reaper: Arc<LeaseReaper>,
    subscription: Option<SubscriptionId>,
    repairer: Mutex<Option<JoinHandle<()>>>,
    repairs: Arc<AtomicU64>,
    closed: AtomicBool,
}

impl Node {
    /// Start a node talking to other systems through `transport`
    ///
    /// The caller makes the node reachable by registering `assembler()` with
    /// the transport; `open_loopback` does this for the in-process
    /// transport.
    ///
    /// # Errors
    /// `InvalidConfig` for invalid settings; `Io` if a background thread
    /// cannot be spawned.
    pub fn open(config: NodeConfig, transport: Arc<dyn Transport>) -> PlexusResult<Self> {
        config.validate()?;
        let container = Arc::new(Container::new(config.assembler.system.clone()));
        let assembler =
            Assembler::new(config.assembler.clone(), Arc::clone(&container), transport)?;
        let owned: Arc<Owned> = Arc::new(DashMap::new());

        let renewer = Arc::downgrade(&assembler);
        let renewed = Arc::clone(&owned);
        let reaper = Arc::new(
            LeaseReaper::new(&assembler, config.reaper.interval()).with_tick_hook(move || {
                if let Some(assembler) = renewer.upgrade() {
                    renew_leases(&assembler, &renewed);
                }
            }),
        );
        reaper.start()?;

        let repairs = Arc::new(AtomicU64::new(0));
        let (subscription, repairer) = if config.repair.on_failure {
            let (id, events) = container.subscribe();
            let handle = spawn_repairer(
                Arc::downgrade(&assembler),
                Arc::clone(&owned),
                Arc::clone(&repairs),
                events,
            )?;
            (Some(id), Some(handle))
        } else {
            (None, None)
        };

        info!(
            target: "plexus::engine",
            system = %config.assembler.system,
            strategy = %config.assembler.strategy,
            "Node opened"
        );
        Ok(Self {
            config,
            container,
            assembler,
            owned,
            reaper,
            subscription,
            repairer: Mutex::new(repairer),
            repairs,
            closed: AtomicBool::new(false),
        })
    }

    /// Start a node on an in-process transport and register it there
    pub fn open_loopback(config: NodeConfig, transport: &Arc<LoopbackTransport>) -> PlexusResult<Self> {
        let shared: Arc<dyn Transport> = transport.clone();
        let node = Self::open(config, shared)?;
        transport.register(node.system().clone(), &node.assembler);
        Ok(node)
    }

    /// Start a stand-alone node configured by `plexus.toml` in `dir`
    ///
    /// The directory and a default config file are created if missing.
    pub fn open_path(dir: impl AsRef<Path>) -> PlexusResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE_NAME);
        NodeConfig::write_default_if_missing(&path)?;
        let config = NodeConfig::from_file(&path)?;
        Self::open_loopback(config, &LoopbackTransport::new())
    }

    /// This node's system id
    pub fn system(&self) -> &SystemId {
        self.assembler.system()
    }

    /// Configuration the node was opened with
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Local container; register factories and allocators here
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Local assembler
    pub fn assembler(&self) -> &Arc<Assembler> {
        &self.assembler
    }

    /// Sessions submitted through this node
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self.owned.iter().map(|e| *e.key()).collect();
        sessions.sort();
        sessions
    }

    /// Sessions repaired after element failures so far
    pub fn repairs(&self) -> u64 {
        self.repairs.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> PlexusResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PlexusError::Internal(format!(
                "node {} is shut down",
                self.system()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Assemble the first resolvable preference
    ///
    /// `systems` are the other systems the session may use. On failure the
    /// session is removed everywhere.
    ///
    /// # Errors
    /// `NoMatchingPreference` if no preference could be resolved; protocol
    /// errors from the assembler.
    pub fn submit(
        &self,
        preferences: Vec<Contract>,
        systems: Vec<SystemId>,
    ) -> PlexusResult<(SessionId, Assembly)> {
        self.ensure_open()?;
        let session = SessionId::new();
        self.assembler.prepare(session, None, systems.clone())?;
        self.owned.insert(session, systems);

        match self.assemble(session, preferences) {
            Ok(assembly) => {
                info!(
                    target: "plexus::engine",
                    session = %session,
                    nodes = assembly.size(),
                    "Session submitted"
                );
                Ok((session, assembly))
            }
            Err(e) => {
                self.forget(session);
                Err(e)
            }
        }
    }

    /// Replace the preferences of a session
    ///
    /// Parts of the current assembly that still satisfy the new tree keep
    /// running.
    ///
    /// # Errors
    /// `UnknownSession` if the session was not submitted here;
    /// `NoMatchingPreference` if nothing could be resolved, in which case
    /// the session stays open without an assembly.
    pub fn reconfigure(&self, session: SessionId, preferences: Vec<Contract>) -> PlexusResult<Assembly> {
        self.ensure_open()?;
        if !self.owned.contains_key(&session) {
            return Err(PlexusError::UnknownSession(session));
        }
        self.assemble(session, preferences)
    }

    /// Current assembly of a session
    pub fn assembly(&self, session: SessionId) -> PlexusResult<Assembly> {
        self.assembler.configure(session)
    }

    /// Re-resolve a session now, reusing what still runs
    pub fn repair(&self, session: SessionId) -> PlexusResult<Assembly> {
        self.ensure_open()?;
        if self.assembler.repair(session)?.is_terminal() {
            return Err(PlexusError::NoMatchingPreference(session));
        }
        self.assembler.configure(session)
    }

    /// Tear a session down everywhere
    pub fn release(&self, session: SessionId) -> PlexusResult<()> {
        if self.owned.remove(&session).is_none() {
            return Err(PlexusError::UnknownSession(session));
        }
        self.assembler.remove(session, None)?;
        info!(target: "plexus::engine", session = %session, "Session released");
        Ok(())
    }

    fn assemble(&self, session: SessionId, preferences: Vec<Contract>) -> PlexusResult<Assembly> {
        let pointer = self.assembler.setup(
            Pointer::session(session, self.system().clone()),
            AssemblyState::Preferences(preferences),
        )?;
        if pointer.is_terminal() {
            return Err(PlexusError::NoMatchingPreference(session));
        }
        self.assembler.configure(session)
    }

    /// Drop a session this node gave up on
    fn forget(&self, session: SessionId) {
        self.owned.remove(&session);
        match self.assembler.remove(session, None) {
            Ok(()) | Err(PlexusError::UnknownSession(_)) => {}
            Err(e) => {
                warn!(target: "plexus::engine", session = %session, error = %e, "Cleanup failed");
            }
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop the background workers, release every session and stop every
    /// element
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reaper.shutdown();
        if let Some(id) = self.subscription {
            self.container.unsubscribe(id);
        }
        let repairer = self.repairer.lock().take();
        if let Some(handle) = repairer {
            // A panicked worker has nothing left to clean up
            let _ = handle.join();
        }
        for session in self.sessions() {
            self.forget(session);
        }
        self.container.shutdown();
        info!(target: "plexus::engine", system = %self.system(), "Node shut down");
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("system", self.system())
            .field("sessions", &self.owned.len())
            .field("repairs", &self.repairs())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

// =============================================================================
// Background work
// =============================================================================

/// Renew the lease of every owned session that still exists
fn renew_leases(assembler: &Assembler, owned: &Owned) {
    let sessions: Vec<(SessionId, Vec<SystemId>)> = owned
        .iter()
        .map(|e| (*e.key(), e.value().clone()))
        .collect();
    for (session, systems) in sessions {
        if assembler.lease(session).is_none() {
            owned.remove(&session);
            debug!(target: "plexus::engine", session = %session, "Session gone, lease no longer renewed");
            continue;
        }
        if let Err(e) = assembler.prepare(session, None, systems) {
            warn!(target: "plexus::engine", session = %session, error = %e, "Lease renewal failed");
        }
    }
}

fn spawn_repairer(
    assembler: Weak<Assembler>,
    owned: Arc<Owned>,
    repairs: Arc<AtomicU64>,
    events: Receiver<ContainerEvent>,
) -> PlexusResult<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("plexus-repair".to_string())
        .spawn(move || {
            // Ends when the node unsubscribes
            while let Ok(event) = events.recv() {
                let ContainerEvent::ElementFailed { element, reason } = event else {
                    continue;
                };
                let Some(assembler) = assembler.upgrade() else {
                    break;
                };
                for session in assembler.sessions_using(element) {
                    if !owned.contains_key(&session) {
                        continue;
                    }
                    warn!(
                        target: "plexus::engine",
                        session = %session,
                        element = %element,
                        reason = %reason,
                        "Element failed, repairing session"
                    );
                    match assembler.repair(session) {
                        Ok(pointer) if pointer.is_terminal() => {
                            warn!(target: "plexus::engine", session = %session, "Repair found no resolvable preference");
                        }
                        Ok(_) => {
                            info!(target: "plexus::engine", session = %session, "Session repaired");
                        }
                        Err(e) => {
                            warn!(target: "plexus::engine", session = %session, error = %e, "Repair failed");
                        }
                    }
                    repairs.fetch_add(1, Ordering::SeqCst);
                }
            }
            debug!(target: "plexus::engine", "Repair worker stopped");
        })?;
    Ok(handle)
}
