//! Compiled plan caching using Moka.
//!
//! Plans are keyed by statement id and validated against the structure hash
//! on every lookup, so an edited structure is recompiled on its next use.
//! Readers holding an older `Arc` keep a consistent plan until they finish.

use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use demonstra_shared::types::StatementId;
use tracing::debug;

use super::compiled::{CompiledStatement, structure_hash};
use super::error::StructureError;
use super::types::StatementStructure;

/// Default cache capacity (number of statements).
const DEFAULT_CACHE_CAPACITY: u64 = 64;

/// Default idle expiry (1 hour).
const DEFAULT_IDLE_SECS: u64 = 3600;

/// Cache of compiled statements.
///
/// Thread-safe; clones share the same storage. Failed compilations are
/// never stored.
#[derive(Clone)]
pub struct PlanCache {
    cache: Cache<StatementId, Arc<CompiledStatement>>,
}

impl PlanCache {
    /// Creates a plan cache with default settings.
    ///
    /// Default: 64 statements, 1 hour idle expiry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CACHE_CAPACITY, DEFAULT_IDLE_SECS)
    }

    /// Creates a plan cache with custom configuration.
    ///
    /// # Arguments
    ///
    /// * `max_capacity` - Maximum number of statements to keep
    /// * `idle_secs` - Seconds an unused plan survives
    #[must_use]
    pub fn with_config(max_capacity: u64, idle_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(Duration::from_secs(idle_secs))
            .build();

        Self { cache }
    }

    /// Returns the compiled plan for a structure, compiling on a miss.
    ///
    /// The flag is `true` when the plan came from the cache. A stored plan
    /// whose hash differs from the structure's is replaced, not patched.
    ///
    /// # Errors
    ///
    /// Returns the `StructureError` from compilation. Nothing is cached.
    pub fn get_or_compile(
        &self,
        structure: &StatementStructure,
    ) -> Result<(Arc<CompiledStatement>, bool), StructureError> {
        let id = structure.statement_id;
        let hash = structure_hash(structure);

        if let Some(compiled) = self.cache.get(&id) {
            if compiled.structure_hash == hash {
                debug!(statement_id = %id, structure_hash = hash, "Plan cache hit");
                return Ok((compiled, true));
            }
            debug!(
                statement_id = %id,
                stale_hash = compiled.structure_hash,
                structure_hash = hash,
                "Structure changed, rebuilding plan"
            );
        }

        let compiled = Arc::new(CompiledStatement::compile(structure)?);
        debug!(
            statement_id = %id,
            structure_hash = hash,
            steps = compiled.plan.len(),
            "Plan built"
        );
        self.cache.insert(id, Arc::clone(&compiled));

        Ok((compiled, false))
    }

    /// Returns the cached plan without compiling.
    #[must_use]
    pub fn get(&self, id: StatementId) -> Option<Arc<CompiledStatement>> {
        self.cache.get(&id)
    }

    /// Drops the plan of one statement.
    pub fn invalidate(&self, id: StatementId) {
        self.cache.invalidate(&id);
    }

    /// Drops every plan.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Returns the number of plans currently cached.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs cache maintenance tasks.
    ///
    /// Moka does this lazily; calling it makes counts and evictions exact.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new()
    }
}
