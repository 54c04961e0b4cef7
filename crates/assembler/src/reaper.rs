//! Background lease reaper
//!
//! Runs `Assembler::expire_leases` every interval so abandoned sessions are
//! released even when no protocol call touches them.
//!
//! # Thread Lifecycle
//!
//! - `start()` spawns the background thread
//! - `shutdown_flag: AtomicBool` signals the thread to stop
//! - `thread: JoinHandle` allows waiting for thread completion
//! - `Drop` implementation ensures clean shutdown

use parking_lot::{Condvar, Mutex};
use plexus_core::PlexusResult;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::assembler::Assembler;

type TickFn = dyn Fn() + Send + Sync;

/// Periodically expires leases of one assembler
pub struct LeaseReaper {
    assembler: Weak<Assembler>,
    interval: Duration,
    /// Runs before each expiry pass (lease renewal of the host)
    on_tick: Option<Box<TickFn>>,
    shutdown_flag: AtomicBool,
    signal: Arc<(Mutex<bool>, Condvar)>,
    thread: Mutex<Option<JoinHandle<()>>>,
    expired_total: AtomicU64,
}

impl LeaseReaper {
    /// Create a reaper; call `start()` to run it
    pub fn new(assembler: &Arc<Assembler>, interval: Duration) -> Self {
        Self {
            assembler: Arc::downgrade(assembler),
            interval,
            on_tick: None,
            shutdown_flag: AtomicBool::new(false),
            signal: Arc::new((Mutex::new(false), Condvar::new())),
            thread: Mutex::new(None),
            expired_total: AtomicU64::new(0),
        }
    }

    /// Run `hook` at the start of every pass
    pub fn with_tick_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_tick = Some(Box::new(hook));
        self
    }

    /// Spawn the background thread
    pub fn start(self: &Arc<Self>) -> PlexusResult<()> {
        let reaper = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("plexus-lease-reaper".to_string())
            .spawn(move || reaper.run_loop())?;
        *self.thread.lock() = Some(handle);
        info!(target: "plexus::lease", interval_ms = self.interval.as_millis() as u64, "Lease reaper started");
        Ok(())
    }

    fn run_loop(&self) {
        let (lock, cvar) = &*self.signal;
        loop {
            {
                let mut signaled = lock.lock();
                if !*signaled {
                    cvar.wait_for(&mut signaled, self.interval);
                }
                *signaled = false;
            }
            if self.shutdown_flag.load(Ordering::SeqCst) {
                break;
            }
            if self.tick().is_none() {
                // Assembler is gone; detach so a drop on this thread cannot
                // join itself
                self.thread.lock().take();
                break;
            }
        }
        debug!(target: "plexus::lease", "Lease reaper stopped");
    }

    /// Run one pass now
    ///
    /// Returns the number of sessions expired, or None once the assembler
    /// has been dropped.
    pub fn tick(&self) -> Option<usize> {
        let assembler = self.assembler.upgrade()?;
        if let Some(hook) = &self.on_tick {
            hook();
        }
        let expired = assembler.expire_leases(Instant::now());
        if expired > 0 {
            self.expired_total.fetch_add(expired as u64, Ordering::Relaxed);
            debug!(target: "plexus::lease", expired, "Reaper pass");
        }
        Some(expired)
    }

    /// Sessions expired by this reaper so far
    pub fn expired_total(&self) -> u64 {
        self.expired_total.load(Ordering::Relaxed)
    }

    /// Whether the background thread is running
    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn wake(&self) {
        let (lock, cvar) = &*self.signal;
        *lock.lock() = true;
        cvar.notify_one();
    }

    /// Stop the background thread and wait for it
    pub fn shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.wake();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            // A panicked reaper has nothing left to clean up
            let _ = handle.join();
        }
    }
}

impl Drop for LeaseReaper {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.wake();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for LeaseReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseReaper")
            .field("interval", &self.interval)
            .field("expired_total", &self.expired_total())
            .field("shutdown", &self.shutdown_flag.load(Ordering::Relaxed))
            .finish()
    }
}
