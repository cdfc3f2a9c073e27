//! Search quality metrics and error tracking.
//!
//! [`QualityMetrics`] is shared by every engine operation. Recording never
//! fails: the registry sits behind a non-poisoning lock and every method is
//! infallible. Each recorded error is also logged through `tracing`, at a
//! level chosen by its severity.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::search::SearchResult;

/// How many recent errors are kept for inspection.
const RECENT_ERRORS: usize = 100;

const LATENCY_BUCKETS_MS: &[f64] = &[
    1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];
const RESULT_COUNT_BUCKETS: &[f64] = &[0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0];
const SCORE_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.015, 0.02, 0.025, 0.03, 0.035, 0.05, 0.1, 0.5, 1.0,
];
const DIVERSITY_BUCKETS: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0, 7.0];
const COVERAGE_BUCKETS: &[f64] = &[0.0, 0.25, 0.5, 0.75, 1.0];

// ─────────────────────────────────────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────────────────────────────────────

/// Which retrieval methods produced a search's candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Vector,
    Keyword,
    Hybrid,
}

/// Subsystem an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Database,
    Embedding,
    VectorSearch,
    KeywordSearch,
    Validation,
}

/// How bad an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected noise, e.g. an empty query.
    Low,
    /// A degraded answer was returned.
    Medium,
    /// An operation failed.
    High,
    /// No answer could be produced.
    Critical,
}

// ─────────────────────────────────────────────────────────────────────────────
// Histogram
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Histogram {
    bounds: &'static [f64],
    /// One count per bound plus a final overflow bucket.
    counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl Histogram {
    fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            counts: vec![0; bounds.len() + 1],
            count: 0,
            sum: 0.0,
        }
    }

    fn observe(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let idx = self
            .bounds
            .iter()
            .position(|b| value <= *b)
            .unwrap_or(self.bounds.len());
        self.counts[idx] += 1;
        self.count += 1;
        self.sum += value;
    }

    fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self
                .bounds
                .iter()
                .zip(&self.counts)
                .map(|(le, count)| Bucket {
                    le: *le,
                    count: *count,
                })
                .collect(),
            overflow: self.counts.last().copied().unwrap_or(0),
            count: self.count,
            sum: self.sum,
            mean: if self.count == 0 {
                0.0
            } else {
                self.sum / self.count as f64
            },
        }
    }
}

/// One histogram bucket: observations `<= le` not counted in earlier buckets.
#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    pub le: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub buckets: Vec<Bucket>,
    /// Observations above the last bound.
    pub overflow: u64,
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// A recorded error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub at: DateTime<Utc>,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug)]
struct Registry {
    searches: BTreeMap<QueryType, u64>,
    latency: BTreeMap<QueryType, Histogram>,
    result_count: Histogram,
    top_score: Histogram,
    diversity: Histogram,
    coverage: Histogram,
    zero_results: u64,
    /// Searches where neither method produced a candidate list.
    unanswered: u64,
    empty_queries: u64,
    writes: u64,
    write_latency: Histogram,
    errors: BTreeMap<(ErrorCategory, Severity), u64>,
    recent_errors: VecDeque<ErrorEvent>,
}

impl Registry {
    fn new() -> Self {
        Self {
            searches: BTreeMap::new(),
            latency: BTreeMap::new(),
            result_count: Histogram::new(RESULT_COUNT_BUCKETS),
            top_score: Histogram::new(SCORE_BUCKETS),
            diversity: Histogram::new(DIVERSITY_BUCKETS),
            coverage: Histogram::new(COVERAGE_BUCKETS),
            zero_results: 0,
            unanswered: 0,
            empty_queries: 0,
            writes: 0,
            write_latency: Histogram::new(LATENCY_BUCKETS_MS),
            errors: BTreeMap::new(),
            recent_errors: VecDeque::with_capacity(RECENT_ERRORS),
        }
    }
}

/// Shared counters and histograms describing search quality.
#[derive(Debug)]
pub struct QualityMetrics {
    inner: Mutex<Registry>,
    diversity_top_n: usize,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self::new(5)
    }
}

impl QualityMetrics {
    /// Create a registry measuring diversity over the top `diversity_top_n` results.
    pub fn new(diversity_top_n: usize) -> Self {
        Self {
            inner: Mutex::new(Registry::new()),
            diversity_top_n: diversity_top_n.max(1),
        }
    }

    /// Record a search that returned at least one result.
    pub fn record_search(&self, query_type: QueryType, latency: Duration, results: &[SearchResult]) {
        let top_n = &results[..results.len().min(self.diversity_top_n)];
        let mut types: Vec<_> = top_n.iter().map(|r| r.content_type).collect();
        types.sort();
        types.dedup();

        let both = results.iter().filter(|r| r.found_by_both()).count();
        let coverage = if results.is_empty() {
            0.0
        } else {
            both as f64 / results.len() as f64
        };

        let mut inner = self.inner.lock();
        *inner.searches.entry(query_type).or_insert(0) += 1;
        inner
            .latency
            .entry(query_type)
            .or_insert_with(|| Histogram::new(LATENCY_BUCKETS_MS))
            .observe(latency.as_secs_f64() * 1000.0);
        inner.result_count.observe(results.len() as f64);
        if let Some(top) = results.first() {
            inner.top_score.observe(top.combined_score);
        }
        if !top_n.is_empty() {
            inner.diversity.observe(types.len() as f64);
        }
        inner.coverage.observe(coverage);
    }

    /// Record a search over a non-empty query that produced nothing.
    ///
    /// `None` means neither lookup answered; the search still counts towards
    /// the total so the zero-result rate stays a fraction.
    pub fn record_zero_results(&self, query_type: Option<QueryType>, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.zero_results += 1;
        inner.result_count.observe(0.0);
        match query_type {
            Some(query_type) => {
                *inner.searches.entry(query_type).or_insert(0) += 1;
                inner
                    .latency
                    .entry(query_type)
                    .or_insert_with(|| Histogram::new(LATENCY_BUCKETS_MS))
                    .observe(latency.as_secs_f64() * 1000.0);
            }
            None => inner.unanswered += 1,
        }
    }

    /// Record a query rejected for being empty. Not counted as a zero-result search.
    pub fn record_empty_query(&self) {
        self.inner.lock().empty_queries += 1;
    }

    /// Record a completed store, update or delete.
    pub fn record_write(&self, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.writes += 1;
        inner.write_latency.observe(latency.as_secs_f64() * 1000.0);
    }

    /// Count and log an error.
    pub fn record_error(&self, category: ErrorCategory, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Low => info!(?category, ?severity, "{}", message),
            Severity::Medium => warn!(?category, ?severity, "{}", message),
            Severity::High | Severity::Critical => error!(?category, ?severity, "{}", message),
        }

        let mut inner = self.inner.lock();
        *inner.errors.entry((category, severity)).or_insert(0) += 1;
        if inner.recent_errors.len() == RECENT_ERRORS {
            inner.recent_errors.pop_front();
        }
        inner.recent_errors.push_back(ErrorEvent {
            at: Utc::now(),
            category,
            severity,
            message,
        });
    }

    /// Total errors recorded under a category, across severities.
    pub fn error_count(&self, category: ErrorCategory) -> u64 {
        self.inner
            .lock()
            .errors
            .iter()
            .filter(|((c, _), _)| *c == category)
            .map(|(_, n)| n)
            .sum()
    }

    /// Number of zero-result searches so far.
    pub fn zero_results(&self) -> u64 {
        self.inner.lock().zero_results
    }

    /// Point-in-time copy of every metric.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        let total: u64 = inner.searches.values().sum::<u64>() + inner.unanswered;

        MetricsSnapshot {
            searches: inner.searches.iter().map(|(t, n)| (*t, *n)).collect(),
            unanswered_searches: inner.unanswered,
            total_searches: total,
            zero_results: inner.zero_results,
            zero_result_rate: if total == 0 {
                0.0
            } else {
                inner.zero_results as f64 / total as f64
            },
            empty_queries: inner.empty_queries,
            latency_ms: inner
                .latency
                .iter()
                .map(|(t, h)| (*t, h.snapshot()))
                .collect(),
            result_count: inner.result_count.snapshot(),
            top_score: inner.top_score.snapshot(),
            diversity: inner.diversity.snapshot(),
            hybrid_coverage: inner.coverage.snapshot(),
            writes: inner.writes,
            write_latency_ms: inner.write_latency.snapshot(),
            errors: inner
                .errors
                .iter()
                .map(|((category, severity), count)| ErrorCount {
                    category: *category,
                    severity: *severity,
                    count: *count,
                })
                .collect(),
            recent_errors: inner.recent_errors.iter().cloned().collect(),
        }
    }
}

/// Error count for one category and severity.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorCount {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub count: u64,
}

/// Serialisable copy of [`QualityMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub searches: BTreeMap<QueryType, u64>,
    /// Searches where every lookup failed or timed out.
    pub unanswered_searches: u64,
    pub total_searches: u64,
    pub zero_results: u64,
    pub zero_result_rate: f64,
    pub empty_queries: u64,
    pub latency_ms: BTreeMap<QueryType, HistogramSnapshot>,
    pub result_count: HistogramSnapshot,
    pub top_score: HistogramSnapshot,
    /// Distinct content types among the top results.
    pub diversity: HistogramSnapshot,
    /// Fraction of results found by both methods.
    pub hybrid_coverage: HistogramSnapshot,
    pub writes: u64,
    pub write_latency_ms: HistogramSnapshot,
    pub errors: Vec<ErrorCount>,
    pub recent_errors: Vec<ErrorEvent>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
