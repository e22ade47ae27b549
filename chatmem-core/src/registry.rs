//! Registry of per-subject memory systems.
//!
//! One [`MemoryRegistry`] is created by the application and passed to
//! whatever needs memory access. A subject's [`MemorySystem`] is loaded
//! lazily on first use and lives as long as the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ChatmemConfig;
use crate::error::Result;
use crate::persistence::PersistenceEngine;
use crate::system::MemorySystem;
use crate::types::{Clock, SubjectId, SystemClock};

/// Map of subject id to its memory system.
pub struct MemoryRegistry {
    systems: Mutex<HashMap<SubjectId, Arc<MemorySystem>>>,
    store: Arc<PersistenceEngine>,
    clock: Arc<dyn Clock>,
    config: Arc<ChatmemConfig>,
}

impl std::fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRegistry")
            .field("subjects", &self.systems.lock().len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl MemoryRegistry {
    /// Build a registry over an existing store and clock.
    #[must_use]
    pub fn new(store: Arc<PersistenceEngine>, clock: Arc<dyn Clock>, config: ChatmemConfig) -> Self {
        Self {
            systems: Mutex::new(HashMap::new()),
            store,
            clock,
            config: Arc::new(config),
        }
    }

    /// Open the configured database with the wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(config: ChatmemConfig) -> Result<Self> {
        let store = PersistenceEngine::open(&config.persistence.path, &config.persistence)?;
        Ok(Self::new(Arc::new(store), Arc::new(SystemClock::new()), config))
    }

    /// The subject's memory system, loading it on first use.
    pub fn get_system(&self, subject: impl Into<SubjectId>) -> Arc<MemorySystem> {
        let subject = subject.into();
        let mut systems = self.systems.lock();
        if let Some(system) = systems.get(&subject) {
            return Arc::clone(system);
        }

        debug!(subject = %subject, "Loading memory system");
        let system = Arc::new(MemorySystem::load(
            subject.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            Arc::clone(&self.config),
        ));
        systems.insert(subject, Arc::clone(&system));
        system
    }

    /// Subjects loaded so far, sorted.
    #[must_use]
    pub fn subjects(&self) -> Vec<SubjectId> {
        let mut subjects: Vec<SubjectId> = self.systems.lock().keys().cloned().collect();
        subjects.sort();
        subjects
    }

    /// Number of loaded subjects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.lock().len()
    }

    /// Whether no subject has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.lock().is_empty()
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &ChatmemConfig {
        &self.config
    }

    /// Run cleanup on every loaded subject. Returns the number of memories
    /// deleted.
    pub fn cleanup_all(&self) -> usize {
        let systems: Vec<Arc<MemorySystem>> = self.systems.lock().values().cloned().collect();
        let forgotten: usize = systems.iter().map(|s| s.cleanup_memories().len()).sum();
        info!(subjects = systems.len(), forgotten, "Cleanup sweep complete");
        forgotten
    }

    /// Start the periodic cleanup sweep at the configured interval.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.memory.cleanup_interval_secs.max(1));
        self.spawn_cleanup_task_every(period)
    }

    /// Start the periodic cleanup sweep every `period`. The first sweep runs
    /// one period from now; sweeps never overlap, and missed ticks are
    /// skipped rather than bunched up. Abort the handle to stop it.
    ///
    /// Each sweep writes snapshots synchronously, so it runs on the blocking
    /// pool rather than an async worker.
    #[must_use]
    pub fn spawn_cleanup_task_every(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let sweep = Arc::clone(&registry);
                if let Err(e) = tokio::task::spawn_blocking(move || sweep.cleanup_all()).await {
                    warn!(error = %e, "Cleanup sweep did not complete");
                }
            }
        })
    }
}
