//! Session-scoped memoization of loaders and pipelines.
//!
//! An [`AnalysisSession`] owns the timezone and fasting configuration for a
//! run and caches every load and pipeline result under a SHA-256 digest of
//! the operation name, the raw input bytes and those parameters. Uploading
//! the same export twice, or re-running a pipeline over unchanged files,
//! returns the cached value.

use std::collections::HashMap;
use std::sync::Arc;

use metabolic_core::error::Result;
use metabolic_core::models::{FastLogEntry, GlucoseSeries, MetabolicScores, SleepTable};
use metabolic_core::table::FeatureTable;
use metabolic_core::time_utils::TimezoneHandler;
use metabolic_data::analysis::{run_glucose_pipeline, run_metrics_pipeline, AnalysisResult};
use metabolic_data::fasting::{all_fasts_stats, FastingConfig};
use metabolic_data::reader;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 digest identifying one cached computation.
pub type CacheKey = [u8; 32];

// ── Cache statistics ──────────────────────────────────────────────────────────

/// Hit / miss counters across every cache in a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Values currently held.
    pub entries: usize,
}

// ── Memo ──────────────────────────────────────────────────────────────────────

struct Memo<T> {
    entries: HashMap<CacheKey, Arc<T>>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> Memo<T> {
    /// Return the cached value for `key`, computing and storing it on a miss.
    /// Failed computations are not cached.
    fn get_or_try_insert(
        &mut self,
        key: CacheKey,
        stats: &mut CacheStats,
        op: &'static str,
        compute: impl FnOnce() -> Result<T>,
    ) -> Result<Arc<T>> {
        if let Some(value) = self.entries.get(&key) {
            stats.hits += 1;
            tracing::debug!(op, "cache hit");
            return Ok(Arc::clone(value));
        }

        stats.misses += 1;
        tracing::debug!(op, "cache miss");
        let value = Arc::new(compute()?);
        self.entries.insert(key, Arc::clone(&value));
        Ok(value)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

// ── AnalysisSession ───────────────────────────────────────────────────────────

/// Memoizing front end to the loaders and pipelines.
///
/// # Example
/// ```no_run
/// use metabolic_runtime::session::AnalysisSession;
///
/// let mut session = AnalysisSession::new("Europe/Berlin", Default::default()).unwrap();
/// let sleep = std::fs::read("whoop.csv").unwrap();
/// let glucose = std::fs::read("librelink.csv").unwrap();
/// let result = session.glucose_analysis(&sleep, &glucose).unwrap();
/// println!("{} dates", result.metadata.dates);
/// ```
pub struct AnalysisSession {
    /// IANA timezone of the glucose device clock.
    timezone: String,
    fasting: FastingConfig,
    sleep: Memo<SleepTable>,
    glucose: Memo<GlucoseSeries>,
    scores: Memo<MetabolicScores>,
    fasts: Memo<Vec<FastLogEntry>>,
    fasting_tables: Memo<FeatureTable>,
    results: Memo<AnalysisResult>,
    stats: CacheStats,
}

impl AnalysisSession {
    /// Create a session. Unknown timezone names are rejected up front.
    pub fn new(timezone: &str, fasting: FastingConfig) -> Result<Self> {
        TimezoneHandler::new(timezone)?;
        Ok(Self {
            timezone: timezone.to_string(),
            fasting,
            sleep: Memo::default(),
            glucose: Memo::default(),
            scores: Memo::default(),
            fasts: Memo::default(),
            fasting_tables: Memo::default(),
            results: Memo::default(),
            stats: CacheStats::default(),
        })
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn fasting_config(&self) -> &FastingConfig {
        &self.fasting
    }

    /// Replace the fasting configuration. Results computed under the old
    /// configuration stay cached under their own keys.
    pub fn set_fasting_config(&mut self, fasting: FastingConfig) {
        self.fasting = fasting;
    }

    // ── Loaders ───────────────────────────────────────────────────────────

    pub fn load_sleep(&mut self, bytes: &[u8]) -> Result<Arc<SleepTable>> {
        let key = cache_key("load_sleep", &[bytes], &())?;
        self.sleep.get_or_try_insert(key, &mut self.stats, "load_sleep", || {
            reader::load_sleep_data(bytes)
        })
    }

    pub fn load_glucose(&mut self, bytes: &[u8]) -> Result<Arc<GlucoseSeries>> {
        let key = cache_key("load_glucose", &[bytes], &self.timezone)?;
        let timezone = &self.timezone;
        self.glucose.get_or_try_insert(key, &mut self.stats, "load_glucose", || {
            reader::load_glucose_data(bytes, timezone)
        })
    }

    pub fn load_metabolic_scores(&mut self, bytes: &[u8]) -> Result<Arc<MetabolicScores>> {
        let key = cache_key("load_metabolic_scores", &[bytes], &())?;
        self.scores.get_or_try_insert(key, &mut self.stats, "load_metabolic_scores", || {
            reader::load_metabolic_scores(bytes)
        })
    }

    pub fn load_fasts(&mut self, bytes: &[u8]) -> Result<Arc<Vec<FastLogEntry>>> {
        let key = cache_key("load_fasts", &[bytes], &())?;
        self.fasts.get_or_try_insert(key, &mut self.stats, "load_fasts", || {
            reader::load_fasting_data(bytes)
        })
    }

    // ── Derived tables ────────────────────────────────────────────────────

    /// Per-date fasting statistics for a Zero export.
    pub fn fasting_stats(&mut self, fasting_bytes: &[u8]) -> Result<Arc<FeatureTable>> {
        let fasts = self.load_fasts(fasting_bytes)?;
        let key = cache_key("fasting_stats", &[fasting_bytes], &self.fasting)?;
        let config = self.fasting;
        self.fasting_tables.get_or_try_insert(key, &mut self.stats, "fasting_stats", || {
            all_fasts_stats(&fasts, &config)
        })
    }

    /// Glucose pipeline over a sleep export and a glucose export.
    pub fn glucose_analysis(
        &mut self,
        sleep_bytes: &[u8],
        glucose_bytes: &[u8],
    ) -> Result<Arc<AnalysisResult>> {
        let sleep = self.load_sleep(sleep_bytes)?;
        let glucose = self.load_glucose(glucose_bytes)?;
        let key = cache_key(
            "glucose_analysis",
            &[sleep_bytes, glucose_bytes],
            &self.timezone,
        )?;
        self.results.get_or_try_insert(key, &mut self.stats, "glucose_analysis", || {
            run_glucose_pipeline(&sleep, &glucose)
        })
    }

    /// Metrics pipeline over sleep, metabolic score and fasting exports.
    pub fn metrics_analysis(
        &mut self,
        sleep_bytes: &[u8],
        levels_bytes: &[u8],
        fasting_bytes: &[u8],
    ) -> Result<Arc<AnalysisResult>> {
        let sleep = self.load_sleep(sleep_bytes)?;
        let scores = self.load_metabolic_scores(levels_bytes)?;
        let fasts = self.load_fasts(fasting_bytes)?;
        let key = cache_key(
            "metrics_analysis",
            &[sleep_bytes, levels_bytes, fasting_bytes],
            &self.fasting,
        )?;
        let config = self.fasting;
        self.results.get_or_try_insert(key, &mut self.stats, "metrics_analysis", || {
            run_metrics_pipeline(&sleep, &scores, &fasts, &config)
        })
    }

    // ── Cache management ──────────────────────────────────────────────────

    /// Drop every cached value. Counters are kept.
    pub fn invalidate_cache(&mut self) {
        self.sleep.clear();
        self.glucose.clear();
        self.scores.clear();
        self.fasts.clear();
        self.fasting_tables.clear();
        self.results.clear();
        tracing::debug!("cache invalidated");
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entries: self.sleep.len()
                + self.glucose.len()
                + self.scores.len()
                + self.fasts.len()
                + self.fasting_tables.len()
                + self.results.len(),
            ..self.stats
        }
    }
}

/// Digest of the operation name, each input (length-prefixed) and the
/// parameters the operation depends on.
fn cache_key(op: &str, inputs: &[&[u8]], params: &impl Serialize) -> Result<CacheKey> {
    let params = serde_json::to_vec(params)?;

    let mut hasher = Sha256::new();
    hasher.update(op.as_bytes());
    for input in inputs {
        hasher.update((input.len() as u64).to_le_bytes());
        hasher.update(input);
    }
    hasher.update(&params);
    Ok(hasher.finalize().into())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
