//! Test lifecycle orchestration.
//!
//! The engine owns a [`TestRepository`] and drives each test through
//! `draft -> running -> completed`, with `paused` and `cancelled` as side branches.
//! Every mutation of a test happens while holding that test's mutex, so concurrent
//! event recording never loses counter updates.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::model::{EventType, Payload, Test, TestConfig, TestDefaults, TestStatus, Variant};
use crate::stats::{StatisticalAnalyzer, EARLY_STOPPING_P_VALUE};

mod repository;
mod results;

pub use repository::{InMemoryRepository, SharedTest, TestRepository};
pub use results::{TestResults, VariantResult};

/// Stop reason when the deadline passes.
pub const MAX_DURATION_REACHED: &str = "max_duration_reached";
/// Stop reason when a variant clears [`EARLY_STOPPING_P_VALUE`].
pub const EARLY_STOPPING_SIGNIFICANCE: &str = "early_stopping_significance";
/// Default reason for an explicit stop.
pub const MANUAL_STOP: &str = "manual_stop";

/// Allowed deviation of the allocation sum from 1.0.
const ALLOCATION_TOLERANCE: f64 = 0.01;

/// Fraction of the minimum sample size required before stopping early.
const EARLY_STOPPING_SAMPLE_FRACTION: f64 = 0.5;

/// Orchestrates A/B tests held in a [`TestRepository`].
#[derive(Clone)]
pub struct ABTestEngine {
    repository: Arc<dyn TestRepository>,
    defaults: TestDefaults,
}

impl Default for ABTestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ABTestEngine {
    /// Engine over a fresh [`InMemoryRepository`].
    pub fn new() -> Self {
        Self::with_repository(Arc::new(InMemoryRepository::new()))
    }

    pub fn with_repository(repository: Arc<dyn TestRepository>) -> Self {
        Self {
            repository,
            defaults: TestDefaults::default(),
        }
    }

    /// Replace the parameters applied to configs that omit them.
    pub fn with_defaults(mut self, defaults: TestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &TestDefaults {
        &self.defaults
    }

    /// Create a test in `draft`.
    ///
    /// Only the variant count and the power-analysis inputs are checked here;
    /// allocations and dates are validated by [`ABTestEngine::start_test`].
    pub fn create_test(&self, config: TestConfig) -> Result<Test> {
        let variant_count = config.variants.len();
        if variant_count < 2 {
            return Err(EngineError::Configuration(format!(
                "at least 2 variants required, got {}",
                variant_count
            )));
        }

        let baseline_rate = config.baseline_rate.unwrap_or(self.defaults.baseline_rate);
        let minimum_effect_size = config
            .minimum_effect_size
            .unwrap_or(self.defaults.minimum_effect_size);
        let confidence_level = config
            .confidence_level
            .unwrap_or(self.defaults.confidence_level);
        let statistical_power = config
            .statistical_power
            .unwrap_or(self.defaults.statistical_power);

        let minimum_sample_size = StatisticalAnalyzer::calculate_sample_size(
            baseline_rate,
            minimum_effect_size,
            confidence_level,
            statistical_power,
        )?;

        // The first variant flagged as control wins; otherwise the first variant.
        let control_index = config
            .variants
            .iter()
            .position(|v| v.is_control == Some(true))
            .unwrap_or(0);
        let even_split = 1.0 / variant_count as f64;

        let variants = config
            .variants
            .into_iter()
            .enumerate()
            .map(|(index, vc)| {
                let mut variant = Variant::new(
                    format!("variant_{}", index),
                    vc.name,
                    vc.traffic_allocation.unwrap_or(even_split),
                    index == control_index,
                );
                variant.description = vc.description;
                variant.variant_data = vc.data;
                variant
            })
            .collect();

        let now = Utc::now();
        let test_id = format!("test_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let test = Test {
            test_id: test_id.clone(),
            name: config.name,
            description: config.description,
            test_type: config.test_type,
            primary_metric: config.primary_metric,
            secondary_metrics: config.secondary_metrics,
            variants,
            minimum_sample_size,
            minimum_effect_size,
            baseline_rate,
            confidence_level,
            statistical_power,
            start_date: config.start_date,
            end_date: config.end_date,
            max_duration_days: config
                .max_duration_days
                .unwrap_or(self.defaults.max_duration_days),
            status: TestStatus::Draft,
            stop_reason: None,
            winning_variant_id: None,
            test_results: None,
            recommendations: Vec::new(),
            created_by: config.created_by.unwrap_or_else(|| "system".to_string()),
            created_date: now,
            last_updated: now,
        };

        self.repository.insert(test.clone());
        info!(
            test_id = %test_id,
            name = %test.name,
            minimum_sample_size,
            "Created A/B test"
        );

        Ok(test)
    }

    /// Validate a draft test and move it to `running`. The start date is reset to now.
    pub fn start_test(&self, test_id: &str) -> Result<bool> {
        let shared = self.lookup(test_id)?;
        let mut test = shared.lock();

        if test.status != TestStatus::Draft {
            return Err(invalid_state(&test, "start"));
        }
        validate_test(&test)?;

        let now = Utc::now();
        test.status = TestStatus::Running;
        test.start_date = now;
        test.last_updated = now;

        info!(test_id = %test_id, name = %test.name, "Started A/B test");
        Ok(true)
    }

    /// Record one event against a running test's variant.
    ///
    /// Unknown tests, unknown variants and tests that are not running are ignored.
    /// After the counters change the test may complete on its own.
    pub fn record_event(
        &self,
        test_id: &str,
        variant_id: &str,
        event_type: EventType,
        event_data: Option<&Payload>,
    ) {
        let Some(shared) = self.repository.active(test_id) else {
            debug!(test_id, "Ignoring event for unknown or finished test");
            return;
        };

        let finished = {
            let mut test = shared.lock();
            if test.status != TestStatus::Running {
                debug!(test_id, status = %test.status, "Ignoring event for test that is not running");
                return;
            }
            let Some(variant) = test.variant_mut(variant_id) else {
                debug!(test_id, variant_id, "Ignoring event for unknown variant");
                return;
            };
            variant.record(event_type, event_data);
            test.last_updated = Utc::now();

            match completion_reason(&test) {
                Some(reason) => {
                    self.finish_locked(&mut test, TestStatus::Completed, reason);
                    true
                }
                None => false,
            }
        };

        if finished {
            self.repository.complete(test_id);
        }
    }

    /// Recompute rates, intervals, significance and the winner, and cache the result.
    ///
    /// Works on active and completed tests alike.
    pub fn analyze_test_results(&self, test_id: &str) -> Result<TestResults> {
        let shared = self.lookup(test_id)?;
        let mut test = shared.lock();
        Ok(self.analyze_locked(&mut test))
    }

    /// Complete a running test, run a final analysis and move it to the completed set.
    pub fn stop_test(&self, test_id: &str, reason: &str) -> Result<bool> {
        let shared = self.lookup(test_id)?;
        {
            let mut test = shared.lock();
            if test.status != TestStatus::Running {
                return Err(invalid_state(&test, "stop"));
            }
            self.finish_locked(&mut test, TestStatus::Completed, reason);
        }
        self.repository.complete(test_id);
        Ok(true)
    }

    /// Suspend a running test. Events are ignored until it resumes.
    pub fn pause_test(&self, test_id: &str, reason: &str) -> Result<bool> {
        let shared = self.lookup(test_id)?;
        let mut test = shared.lock();
        if test.status != TestStatus::Running {
            return Err(invalid_state(&test, "pause"));
        }
        test.status = TestStatus::Paused;
        test.stop_reason = Some(reason.to_string());
        test.last_updated = Utc::now();

        info!(test_id = %test_id, reason, "Paused A/B test");
        Ok(true)
    }

    pub fn resume_test(&self, test_id: &str) -> Result<bool> {
        let shared = self.lookup(test_id)?;
        let mut test = shared.lock();
        if test.status != TestStatus::Paused {
            return Err(invalid_state(&test, "resume"));
        }
        test.status = TestStatus::Running;
        test.stop_reason = None;
        test.last_updated = Utc::now();

        info!(test_id = %test_id, "Resumed A/B test");
        Ok(true)
    }

    /// Abandon a running or paused test. No winner is recorded.
    pub fn cancel_test(&self, test_id: &str, reason: &str) -> Result<bool> {
        let shared = self.lookup(test_id)?;
        {
            let mut test = shared.lock();
            if !matches!(test.status, TestStatus::Running | TestStatus::Paused) {
                return Err(invalid_state(&test, "cancel"));
            }
            self.finish_locked(&mut test, TestStatus::Cancelled, reason);
        }
        self.repository.complete(test_id);
        Ok(true)
    }

    /// Snapshot of a test, active or completed.
    pub fn get_test(&self, test_id: &str) -> Result<Test> {
        let shared = self.lookup(test_id)?;
        let test = shared.lock().clone();
        Ok(test)
    }

    /// Snapshot of one variant's counters and last analysis.
    pub fn get_variant(&self, test_id: &str, variant_id: &str) -> Result<Variant> {
        let shared = self.lookup(test_id)?;
        let test = shared.lock();
        test.variant(variant_id)
            .cloned()
            .ok_or_else(|| EngineError::VariantNotFound {
                test_id: test_id.to_string(),
                variant_id: variant_id.to_string(),
            })
    }

    pub fn active_tests(&self) -> Vec<Test> {
        snapshot(self.repository.list_active())
    }

    pub fn completed_tests(&self) -> Vec<Test> {
        snapshot(self.repository.list_completed())
    }

    /// Last cached analysis. Never recomputes.
    pub fn get_test_results(&self, test_id: &str) -> Option<TestResults> {
        self.repository.cached_results(test_id)
    }

    /// Deterministically map a user to a variant of a running test according to the
    /// traffic allocations. The same user always lands in the same variant.
    pub fn assign_variant(&self, test_id: &str, user_id: &str) -> Result<String> {
        let shared = self.lookup(test_id)?;
        let test = shared.lock();
        if test.status != TestStatus::Running {
            return Err(invalid_state(&test, "assign variants"));
        }

        let mut hasher = DefaultHasher::new();
        test_id.hash(&mut hasher);
        user_id.hash(&mut hasher);
        let bucket = (hasher.finish() % 10_000) as f64 / 10_000.0;

        let mut cumulative = 0.0;
        for variant in &test.variants {
            cumulative += variant.traffic_allocation;
            if bucket < cumulative {
                return Ok(variant.variant_id.clone());
            }
        }
        // Allocation sums slightly below 1.0 leave a sliver for the last variant.
        test.variants
            .last()
            .map(|v| v.variant_id.clone())
            .ok_or_else(|| EngineError::Configuration("test has no variants".to_string()))
    }

    fn lookup(&self, test_id: &str) -> Result<SharedTest> {
        self.repository
            .active(test_id)
            .or_else(|| self.repository.completed(test_id))
            .ok_or_else(|| EngineError::NotFound(test_id.to_string()))
    }

    /// Move a locked test into a terminal status and run the final analysis.
    /// The caller moves it to the completed set after releasing the lock.
    fn finish_locked(&self, test: &mut Test, status: TestStatus, reason: &str) -> TestResults {
        let now = Utc::now();
        test.status = status;
        test.end_date = now;
        test.stop_reason = Some(reason.to_string());
        test.last_updated = now;

        let results = self.analyze_locked(test);
        info!(
            test_id = %test.test_id,
            name = %test.name,
            status = %status,
            reason,
            winner = ?results.winner,
            "Finished A/B test"
        );
        results
    }

    fn analyze_locked(&self, test: &mut Test) -> TestResults {
        let metric = test.primary_metric;
        let confidence_level = test.confidence_level;
        let control_index = test.control_index();
        let mut comparisons = vec![None; test.variants.len()];

        for variant in test.variants.iter_mut() {
            variant.update_rates();
            variant.confidence_interval =
                StatisticalAnalyzer::calculate_confidence_interval(variant, metric, confidence_level);
        }

        if let Some(c) = control_index {
            let control = test.variants[c].clone();
            for (index, variant) in test.variants.iter_mut().enumerate() {
                if index == c {
                    continue;
                }
                if let Ok(significance) =
                    StatisticalAnalyzer::calculate_statistical_significance(&control, variant, metric)
                {
                    variant.statistical_significance = 1.0 - significance.p_value;
                    comparisons[index] = Some(significance);
                }
            }
        }

        // Clear earlier marks so repeated analysis never leaves two winners.
        for variant in test.variants.iter_mut() {
            variant.is_winner = false;
        }
        let winner = results::determine_winner(test);
        test.winning_variant_id = None;
        if let Some(w) = winner {
            test.variants[w].is_winner = true;
            test.winning_variant_id = Some(test.variants[w].variant_id.clone());
        }

        let recommendations = results::generate_recommendations(test, winner);
        let now = Utc::now();

        let results = TestResults {
            test_id: test.test_id.clone(),
            test_name: test.name.clone(),
            status: test.status,
            primary_metric: metric,
            confidence_level,
            minimum_sample_size: test.minimum_sample_size,
            total_impressions: test.total_impressions(),
            variants: test
                .variants
                .iter()
                .zip(comparisons)
                .map(|(variant, significance)| VariantResult::from_variant(variant, significance))
                .collect(),
            winner: test.winning_variant_id.clone(),
            recommendations: recommendations.clone(),
            analyzed_at: now,
        };

        test.recommendations = recommendations;
        test.test_results = Some(results.clone());
        test.last_updated = now;
        self.repository.cache_results(results.clone());

        results
    }
}

fn invalid_state(test: &Test, operation: &'static str) -> EngineError {
    EngineError::InvalidState {
        test_id: test.test_id.clone(),
        status: test.status,
        operation,
    }
}

fn validate_test(test: &Test) -> Result<()> {
    if test.variants.len() < 2 {
        return Err(EngineError::Configuration(format!(
            "at least 2 variants required, got {}",
            test.variants.len()
        )));
    }

    if let Some(bad) = test
        .variants
        .iter()
        .find(|v| !(0.0..=1.0).contains(&v.traffic_allocation))
    {
        return Err(EngineError::Configuration(format!(
            "traffic allocation of {} must be in [0, 1], got {}",
            bad.variant_id, bad.traffic_allocation
        )));
    }

    let total = test.total_allocation();
    if (total - 1.0).abs() > ALLOCATION_TOLERANCE {
        return Err(EngineError::Configuration(format!(
            "traffic allocations sum to {:.4}, expected 1.0",
            total
        )));
    }

    if test.end_date <= test.start_date {
        return Err(EngineError::Configuration(format!(
            "end_date {} must be after start_date {}",
            test.end_date, test.start_date
        )));
    }

    Ok(())
}

/// Why a running test should complete now, if it should.
fn completion_reason(test: &Test) -> Option<&'static str> {
    let total = test.total_impressions();
    if total < test.minimum_sample_size {
        return None;
    }

    if Utc::now() >= test.deadline() {
        return Some(MAX_DURATION_REACHED);
    }

    let c = test.control_index()?;
    let control = &test.variants[c];
    let floor = test.minimum_sample_size as f64 * EARLY_STOPPING_SAMPLE_FRACTION;

    let decisive = test
        .variants
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != c)
        .any(|(_, variant)| {
            match StatisticalAnalyzer::calculate_statistical_significance(
                control,
                variant,
                test.primary_metric,
            ) {
                Ok(s) => s.is_significant && s.p_value < EARLY_STOPPING_P_VALUE && total as f64 >= floor,
                Err(_) => false,
            }
        });

    if decisive {
        debug!(test_id = %test.test_id, total, "Early stopping threshold reached");
        Some(EARLY_STOPPING_SIGNIFICANCE)
    } else {
        None
    }
}

fn snapshot(tests: Vec<SharedTest>) -> Vec<Test> {
    let mut tests: Vec<Test> = tests.iter().map(|t| t.lock().clone()).collect();
    tests.sort_by(|a, b| {
        a.created_date
            .cmp(&b.created_date)
            .then_with(|| a.test_id.cmp(&b.test_id))
    });
    tests
}
