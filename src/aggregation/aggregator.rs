//! Query/aggregation logic turning raw experiment counters into derived views.
//!
//! Key layout consumed from the metrics store (flat string-map hashes):
//! - `ab:test:{id}`              test record (name, status, dates, stats)
//! - `ab:variation:{id}:{vid}`   per-variation counters; `profile:{name}`
//!   fields carry per-psychographic-profile conversion rates
//! - `ab:psych:{id}:{profile}`   per-profile counters for the whole test
//! - `ab:revenue:{id}`           revenue rollup fields
//! - `ab:perf:{id}`              performance rollup fields
//!
//! Every public operation is cache-wrapped with a key derived from the
//! operation name plus the serialized filters, so distinct filter
//! combinations never collide and never share cached work. Store failures
//! surface as `DataSource` errors and are also published on the event bus as
//! `AnalyticsError`; per-field corruption is absorbed by the lenient parsers.

use crate::aggregation::cache::TtlCache;
use crate::core::config::{CacheConfig, StoreConfig};
use crate::core::types::{
    lenient, ExecutiveSummary, PerformanceMetrics, ProfileInsight, PsychographicInsights,
    PsychographicMetrics, RealTimeMetrics, RevenueAttribution, RevenueMetrics, SegmentLift,
    TestFilters, TestMetrics, TestRevenue, TestStatus, VariationMetrics,
};
use crate::core::{AbPulseError, Result};
use crate::events::{AnalyticsEvent, EventBus};
use crate::store::MetricsStore;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

const VARIATION_PREFIX: &str = "ab:variation:";
const PSYCH_PREFIX: &str = "ab:psych:";
const REVENUE_PREFIX: &str = "ab:revenue:";
const PERF_PREFIX: &str = "ab:perf:";

/// Significance level at which a test counts toward the success rate.
const SUCCESS_SIGNIFICANCE: f64 = 0.95;

/// Computes derived experiment views from the metrics store, memoized through
/// TTL caches.
pub struct MetricsAggregator {
    store: Arc<dyn MetricsStore>,
    events: Arc<EventBus>,
    store_config: StoreConfig,
    test_cache: TtlCache<Option<TestMetrics>>,
    list_cache: TtlCache<Vec<TestMetrics>>,
    summary_cache: TtlCache<ExecutiveSummary>,
    psych_cache: TtlCache<PsychographicInsights>,
    revenue_cache: TtlCache<RevenueAttribution>,
}

impl MetricsAggregator {
    /// Create an aggregator reading from `store` and reporting failures on
    /// `events`.
    pub fn new(
        store: Arc<dyn MetricsStore>,
        events: Arc<EventBus>,
        store_config: StoreConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            store,
            events,
            store_config,
            test_cache: TtlCache::new(cache_config.ttl),
            list_cache: TtlCache::new(cache_config.ttl),
            summary_cache: TtlCache::new(cache_config.ttl),
            psych_cache: TtlCache::new(cache_config.ttl),
            revenue_cache: TtlCache::new(cache_config.ttl),
        }
    }

    /// Drop every cached aggregation result.
    pub fn clear_cache(&self) {
        self.test_cache.clear();
        self.list_cache.clear();
        self.summary_cache.clear();
        self.psych_cache.clear();
        self.revenue_cache.clear();
        self.events.publish(AnalyticsEvent::MetricsUpdated);
    }

    /// Derived metrics for one test. `Ok(None)` when the test is absent.
    pub async fn get_test_metrics(&self, test_id: &str) -> Result<Option<TestMetrics>> {
        let cache_key = format!("test_metrics:{}", test_id);
        if let Some(hit) = self.test_cache.get(&cache_key) {
            return Ok(hit);
        }

        let computed = self
            .guarded("get_test_metrics", self.compute_test_metrics(test_id))
            .await?;
        self.test_cache.set(&cache_key, computed.clone());
        Ok(computed)
    }

    /// Filtered test list, sorted by start date descending (stable).
    pub async fn get_test_list(&self, filters: &TestFilters) -> Result<Vec<TestMetrics>> {
        let cache_key = format!("test_list:{}", serde_json::to_string(filters)?);
        if let Some(hit) = self.list_cache.get(&cache_key) {
            return Ok(hit);
        }

        let list = self
            .guarded("get_test_list", self.compute_test_list(filters))
            .await?;
        self.list_cache.set(&cache_key, list.clone());
        Ok(list)
    }

    /// Cross-test executive rollup over the filtered test list.
    pub async fn get_executive_summary(&self, filters: &TestFilters) -> Result<ExecutiveSummary> {
        let cache_key = format!("executive_summary:{}", serde_json::to_string(filters)?);
        if let Some(hit) = self.summary_cache.get(&cache_key) {
            return Ok(hit);
        }

        let tests = self.get_test_list(filters).await?;
        let summary = build_executive_summary(&tests);
        self.summary_cache.set(&cache_key, summary.clone());
        Ok(summary)
    }

    /// Psychographic profile rollup over the filtered test list.
    pub async fn get_psychographic_insights(
        &self,
        filters: &TestFilters,
    ) -> Result<PsychographicInsights> {
        let cache_key = format!("psychographic_insights:{}", serde_json::to_string(filters)?);
        if let Some(hit) = self.psych_cache.get(&cache_key) {
            return Ok(hit);
        }

        let tests = self.get_test_list(filters).await?;
        let insights = build_psychographic_insights(&tests);
        self.psych_cache.set(&cache_key, insights.clone());
        Ok(insights)
    }

    /// Revenue attribution for one test, or across active+completed tests
    /// when no test id is given. `Ok(None)` when a requested test is absent.
    pub async fn get_revenue_attribution(
        &self,
        test_id: Option<&str>,
    ) -> Result<Option<RevenueAttribution>> {
        // A test id could legally be any string, so the cross-test entry gets
        // a key shape no single-test entry can produce.
        let cache_key = match test_id {
            Some(id) => format!("revenue_attribution:test:{}", id),
            None => "revenue_attribution:*".to_string(),
        };
        if let Some(hit) = self.revenue_cache.get(&cache_key) {
            return Ok(Some(hit));
        }

        let attribution = match test_id {
            Some(id) => match self.get_test_metrics(id).await? {
                Some(test) => build_revenue_attribution(Some(id), &[test]),
                None => return Ok(None),
            },
            None => {
                let filters = TestFilters {
                    statuses: Some(vec![TestStatus::Active, TestStatus::Completed]),
                    ..Default::default()
                };
                let tests = self.get_test_list(&filters).await?;
                build_revenue_attribution(None, &tests)
            },
        };

        self.revenue_cache.set(&cache_key, attribution.clone());
        Ok(Some(attribution))
    }

    /// Lightweight snapshot for real-time subscribers. Built on the
    /// cache-backed active-test list, so it can lag the store by up to one
    /// cache TTL.
    pub async fn get_real_time_metrics(
        &self,
        unacknowledged_alerts: usize,
    ) -> Result<RealTimeMetrics> {
        let filters = TestFilters {
            statuses: Some(vec![TestStatus::Active]),
            ..Default::default()
        };
        let active = self.get_test_list(&filters).await?;

        let total_visitors: u64 = active.iter().map(|t| t.total_visitors).sum();
        let total_conversions: u64 = active.iter().map(|t| t.total_conversions).sum();

        Ok(RealTimeMetrics {
            active_tests: active.len(),
            total_visitors,
            total_conversions,
            conversion_rate: VariationMetrics::rate(total_visitors, total_conversions),
            unacknowledged_alerts,
            timestamp: Utc::now(),
        })
    }

    /// Run a store-touching computation under the configured timeout,
    /// reporting any failure as an `AnalyticsError` event.
    async fn guarded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.store_config.call_timeout;
        let outcome = match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => AbPulseError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
        };

        tracing::warn!(operation, error = %outcome, "aggregation operation failed");
        self.events.publish(AnalyticsEvent::AnalyticsError {
            operation: operation.to_string(),
            message: outcome.to_string(),
        });
        Err(AbPulseError::data_source(format!("{}: {}", operation, outcome)))
    }

    async fn compute_test_list(&self, filters: &TestFilters) -> Result<Vec<TestMetrics>> {
        let prefix = &self.store_config.test_key_prefix;
        let keys = self.store.scan_keys(prefix).await?;

        let mut tests = Vec::with_capacity(keys.len());
        for key in &keys {
            let test_id = key.strip_prefix(prefix.as_str()).unwrap_or(key);
            if let Some(test) = self.compute_test_metrics(test_id).await? {
                if filters.matches(&test) {
                    tests.push(test);
                }
            }
        }

        // Stable sort: ties keep original scan order; missing dates sort last.
        tests.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(tests)
    }

    async fn compute_test_metrics(&self, test_id: &str) -> Result<Option<TestMetrics>> {
        let test_key = format!("{}{}", self.store_config.test_key_prefix, test_id);
        let Some(record) = self.store.hash_get_all(&test_key).await? else {
            return Ok(None);
        };

        let variations = self.load_variations(test_id).await?;
        let psychographics = self.load_psychographics(test_id).await?;
        let revenue = self.load_revenue(test_id).await?;
        let performance = self.load_performance(test_id).await?;

        let total_visitors: u64 = variations.iter().map(|v| v.visitors).sum();
        let total_conversions: u64 = variations.iter().map(|v| v.conversions).sum();

        Ok(Some(TestMetrics {
            id: test_id.to_string(),
            name: lenient::string(&record, "name").unwrap_or_else(|| test_id.to_string()),
            status: TestStatus::parse_lenient(
                record.get("status").map(String::as_str).unwrap_or(""),
            ),
            start_date: lenient::date(&record, "start_date"),
            end_date: lenient::date(&record, "end_date"),
            variations,
            total_visitors,
            total_conversions,
            conversion_rate: VariationMetrics::rate(total_visitors, total_conversions),
            statistical_significance: lenient::float(&record, "significance"),
            confidence: lenient::float(&record, "confidence"),
            winner: lenient::string(&record, "winner"),
            psychographics,
            revenue,
            performance,
        }))
    }

    async fn load_variations(&self, test_id: &str) -> Result<Vec<VariationMetrics>> {
        let prefix = format!("{}{}:", VARIATION_PREFIX, test_id);
        let keys = self.store.scan_keys(&prefix).await?;

        let mut variations = Vec::with_capacity(keys.len());
        for key in &keys {
            let Some(record) = self.store.hash_get_all(key).await? else {
                continue;
            };
            let variation_id = key.strip_prefix(prefix.as_str()).unwrap_or(key);
            let visitors = lenient::int(&record, "visitors");
            let conversions = lenient::int(&record, "conversions");

            let profile_performance: HashMap<String, f64> = record
                .iter()
                .filter_map(|(field, _)| {
                    field.strip_prefix("profile:").map(|profile| {
                        (profile.to_string(), lenient::float(&record, field))
                    })
                })
                .collect();

            variations.push(VariationMetrics {
                id: variation_id.to_string(),
                name: lenient::string(&record, "name").unwrap_or_else(|| variation_id.to_string()),
                visitors,
                conversions,
                revenue: lenient::float(&record, "revenue"),
                is_control: lenient::boolean(&record, "is_control"),
                conversion_rate: VariationMetrics::rate(visitors, conversions),
                lift: 0.0,
                profile_performance,
            });
        }

        apply_lift(&mut variations);
        Ok(variations)
    }

    async fn load_psychographics(&self, test_id: &str) -> Result<Vec<PsychographicMetrics>> {
        let prefix = format!("{}{}:", PSYCH_PREFIX, test_id);
        let keys = self.store.scan_keys(&prefix).await?;

        let mut profiles = Vec::with_capacity(keys.len());
        for key in &keys {
            let Some(record) = self.store.hash_get_all(key).await? else {
                continue;
            };
            let profile = key.strip_prefix(prefix.as_str()).unwrap_or(key);
            let visitors = lenient::int(&record, "visitors");
            let conversions = lenient::int(&record, "conversions");
            profiles.push(PsychographicMetrics {
                profile: profile.to_string(),
                visitors,
                conversions,
                conversion_rate: VariationMetrics::rate(visitors, conversions),
            });
        }
        Ok(profiles)
    }

    async fn load_revenue(&self, test_id: &str) -> Result<RevenueMetrics> {
        let key = format!("{}{}", REVENUE_PREFIX, test_id);
        let Some(record) = self.store.hash_get_all(&key).await? else {
            return Ok(RevenueMetrics::default());
        };
        Ok(RevenueMetrics {
            total_revenue: lenient::float(&record, "total_revenue"),
            incremental_revenue: lenient::float(&record, "incremental_revenue"),
            revenue_per_visitor: lenient::float(&record, "revenue_per_visitor"),
        })
    }

    async fn load_performance(&self, test_id: &str) -> Result<PerformanceMetrics> {
        let key = format!("{}{}", PERF_PREFIX, test_id);
        let Some(record) = self.store.hash_get_all(&key).await? else {
            return Ok(PerformanceMetrics::default());
        };
        Ok(PerformanceMetrics {
            avg_load_time_ms: lenient::float(&record, "avg_load_time_ms"),
            bounce_rate: lenient::float(&record, "bounce_rate"),
            engagement_score: lenient::float(&record, "engagement_score"),
        })
    }
}

/// Fill in each variation's lift versus the first control arm. Variations
/// without a positive control rate keep a lift of 0.
fn apply_lift(variations: &mut [VariationMetrics]) {
    let control_rate = variations
        .iter()
        .find(|v| v.is_control)
        .map(|v| v.conversion_rate)
        .unwrap_or(0.0);

    if control_rate <= 0.0 {
        return;
    }
    for variation in variations.iter_mut() {
        if !variation.is_control {
            variation.lift = (variation.conversion_rate - control_rate) / control_rate;
        }
    }
}

fn build_executive_summary(tests: &[TestMetrics]) -> ExecutiveSummary {
    let active_tests = tests.iter().filter(|t| t.status == TestStatus::Active).count();
    let completed: Vec<&TestMetrics> = tests
        .iter()
        .filter(|t| t.status == TestStatus::Completed)
        .collect();

    // Mean over completed tests of (best non-control rate - control rate) /
    // control rate. A test without a positive control rate contributes 0
    // rather than being excluded, which can understate the overall lift.
    let overall_lift = if completed.is_empty() {
        0.0
    } else {
        let sum: f64 = completed.iter().map(|t| best_lift(t)).sum();
        sum / completed.len() as f64
    };

    let total_incremental_revenue: f64 =
        tests.iter().map(|t| t.revenue.incremental_revenue).sum();

    let durations: Vec<f64> = tests
        .iter()
        .filter_map(|t| match (t.start_date, t.end_date) {
            (Some(start), Some(end)) => Some((end - start).num_seconds() as f64 / 86_400.0),
            _ => None,
        })
        .collect();
    let avg_test_duration_days = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    let successes = tests
        .iter()
        .filter(|t| t.statistical_significance >= SUCCESS_SIGNIFICANCE && t.winner.is_some())
        .count();
    let success_rate = if tests.is_empty() {
        0.0
    } else {
        successes as f64 / tests.len() as f64
    };

    let top_segments = top_segments(tests, 5);

    let mut insights = vec![format!(
        "{} of {} tests completed; {} currently active",
        completed.len(),
        tests.len(),
        active_tests
    )];
    if overall_lift > 0.0 {
        insights.push(format!(
            "Completed tests average a {:.1}% lift over control",
            overall_lift * 100.0
        ));
    }
    if let Some(top) = top_segments.first() {
        insights.push(format!(
            "Segment '{}' responds best, averaging {:.1}% lift",
            top.segment,
            top.avg_lift * 100.0
        ));
    }

    let mut recommendations = Vec::new();
    if success_rate < 0.5 {
        recommendations.push(
            "Run tests longer to reach significance before declaring winners".to_string(),
        );
    }
    if total_incremental_revenue > 0.0 {
        recommendations.push(
            "Roll out winning variations to capture the measured incremental revenue".to_string(),
        );
    }

    ExecutiveSummary {
        total_tests: tests.len(),
        active_tests,
        completed_tests: completed.len(),
        overall_lift,
        total_incremental_revenue,
        avg_test_duration_days,
        success_rate,
        top_segments,
        insights,
        recommendations,
        generated_at: Utc::now(),
    }
}

/// Lift of the best non-control variation versus control, 0 when the control
/// rate is not positive.
fn best_lift(test: &TestMetrics) -> f64 {
    let control_rate = test.control().map(|c| c.conversion_rate).unwrap_or(0.0);
    if control_rate <= 0.0 {
        return 0.0;
    }
    test.treatments()
        .map(|v| (v.conversion_rate - control_rate) / control_rate)
        .fold(0.0, f64::max)
}

/// Top `limit` psychographic segments ranked by average lift of treatment
/// profile performance versus the control's, across all tests that carry
/// per-profile rates.
fn top_segments(tests: &[TestMetrics], limit: usize) -> Vec<SegmentLift> {
    struct Acc {
        lift_sum: f64,
        samples: usize,
        tests: std::collections::HashSet<String>,
    }
    let mut by_segment: HashMap<String, Acc> = HashMap::new();

    for test in tests {
        let Some(control) = test.control() else { continue };
        for treatment in test.treatments() {
            for (profile, rate) in &treatment.profile_performance {
                let Some(control_rate) = control.profile_performance.get(profile) else {
                    continue;
                };
                if *control_rate <= 0.0 {
                    continue;
                }
                let acc = by_segment.entry(profile.clone()).or_insert_with(|| Acc {
                    lift_sum: 0.0,
                    samples: 0,
                    tests: Default::default(),
                });
                acc.lift_sum += (rate - control_rate) / control_rate;
                acc.samples += 1;
                acc.tests.insert(test.id.clone());
            }
        }
    }

    let mut segments: Vec<SegmentLift> = by_segment
        .into_iter()
        .map(|(segment, acc)| SegmentLift {
            segment,
            avg_lift: acc.lift_sum / acc.samples as f64,
            test_count: acc.tests.len(),
        })
        .collect();
    segments.sort_by(|a, b| {
        b.avg_lift
            .partial_cmp(&a.avg_lift)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.segment.cmp(&b.segment))
    });
    segments.truncate(limit);
    segments
}

fn build_psychographic_insights(tests: &[TestMetrics]) -> PsychographicInsights {
    struct Acc {
        visitors: u64,
        conversions: u64,
        lift_sum: f64,
        lift_samples: usize,
        best: Option<(String, f64)>,
    }
    let mut by_profile: HashMap<String, Acc> = HashMap::new();

    for test in tests {
        for pm in &test.psychographics {
            let acc = by_profile.entry(pm.profile.clone()).or_insert_with(|| Acc {
                visitors: 0,
                conversions: 0,
                lift_sum: 0.0,
                lift_samples: 0,
                best: None,
            });
            acc.visitors += pm.visitors;
            acc.conversions += pm.conversions;
        }

        let Some(control) = test.control() else { continue };
        for treatment in test.treatments() {
            for (profile, rate) in &treatment.profile_performance {
                let Some(control_rate) = control.profile_performance.get(profile) else {
                    continue;
                };
                if *control_rate <= 0.0 {
                    continue;
                }
                let lift = (rate - control_rate) / control_rate;
                let acc = by_profile.entry(profile.clone()).or_insert_with(|| Acc {
                    visitors: 0,
                    conversions: 0,
                    lift_sum: 0.0,
                    lift_samples: 0,
                    best: None,
                });
                acc.lift_sum += lift;
                acc.lift_samples += 1;
                match &acc.best {
                    Some((_, best_lift)) if *best_lift >= lift => {},
                    _ => acc.best = Some((test.id.clone(), lift)),
                }
            }
        }
    }

    let mut profiles: Vec<ProfileInsight> = by_profile
        .into_iter()
        .map(|(profile, acc)| ProfileInsight {
            profile,
            total_visitors: acc.visitors,
            total_conversions: acc.conversions,
            conversion_rate: VariationMetrics::rate(acc.visitors, acc.conversions),
            avg_lift: if acc.lift_samples == 0 {
                0.0
            } else {
                acc.lift_sum / acc.lift_samples as f64
            },
            best_test: acc.best.map(|(id, _)| id),
        })
        .collect();
    profiles.sort_by(|a, b| a.profile.cmp(&b.profile));

    PsychographicInsights {
        profiles,
        generated_at: Utc::now(),
    }
}

fn build_revenue_attribution(test_id: Option<&str>, tests: &[TestMetrics]) -> RevenueAttribution {
    let by_test: Vec<TestRevenue> = tests
        .iter()
        .map(|t| TestRevenue {
            test_id: t.id.clone(),
            name: t.name.clone(),
            total_revenue: t.revenue.total_revenue,
            incremental_revenue: t.revenue.incremental_revenue,
        })
        .collect();

    let total_revenue: f64 = tests.iter().map(|t| t.revenue.total_revenue).sum();
    let incremental_revenue: f64 = tests.iter().map(|t| t.revenue.incremental_revenue).sum();
    let total_visitors: u64 = tests.iter().map(|t| t.total_visitors).sum();

    RevenueAttribution {
        test_id: test_id.map(str::to_string),
        total_revenue,
        incremental_revenue,
        revenue_per_visitor: if total_visitors == 0 {
            0.0
        } else {
            total_revenue / total_visitors as f64
        },
        by_test,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variation(id: &str, visitors: u64, conversions: u64, is_control: bool) -> VariationMetrics {
        VariationMetrics {
            id: id.to_string(),
            name: id.to_string(),
            visitors,
            conversions,
            revenue: 0.0,
            is_control,
            conversion_rate: VariationMetrics::rate(visitors, conversions),
            lift: 0.0,
            profile_performance: HashMap::new(),
        }
    }

    #[test]
    fn test_apply_lift_against_control() {
        let mut variations = vec![
            variation("control", 500, 25, true),
            variation("treatment", 480, 36, false),
        ];
        apply_lift(&mut variations);

        assert_eq!(variations[0].lift, 0.0);
        assert!((variations[1].lift - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_apply_lift_zero_control_rate_stays_zero() {
        let mut variations = vec![
            variation("control", 0, 0, true),
            variation("treatment", 100, 10, false),
        ];
        apply_lift(&mut variations);
        assert_eq!(variations[1].lift, 0.0);
    }

    #[test]
    fn test_best_lift_ignores_tests_without_positive_control() {
        let test = TestMetrics {
            id: "t".into(),
            name: "t".into(),
            status: TestStatus::Completed,
            start_date: None,
            end_date: None,
            variations: vec![variation("c", 0, 0, true), variation("v", 100, 50, false)],
            total_visitors: 100,
            total_conversions: 50,
            conversion_rate: 0.5,
            statistical_significance: 0.99,
            confidence: 99.0,
            winner: Some("v".into()),
            psychographics: vec![],
            revenue: RevenueMetrics::default(),
            performance: PerformanceMetrics::default(),
        };
        assert_eq!(best_lift(&test), 0.0);
    }

    #[test]
    fn test_summary_success_rate() {
        let mut winner = TestMetrics {
            id: "t1".into(),
            name: "t1".into(),
            status: TestStatus::Completed,
            start_date: None,
            end_date: None,
            variations: vec![variation("c", 500, 25, true), variation("v", 480, 36, false)],
            total_visitors: 980,
            total_conversions: 61,
            conversion_rate: 61.0 / 980.0,
            statistical_significance: 0.97,
            confidence: 97.0,
            winner: Some("v".into()),
            psychographics: vec![],
            revenue: RevenueMetrics::default(),
            performance: PerformanceMetrics::default(),
        };
        apply_lift(&mut winner.variations);

        let mut inconclusive = winner.clone();
        inconclusive.id = "t2".into();
        inconclusive.statistical_significance = 0.6;
        inconclusive.winner = None;

        let summary = build_executive_summary(&[winner, inconclusive]);
        assert_eq!(summary.total_tests, 2);
        assert_eq!(summary.completed_tests, 2);
        assert_eq!(summary.success_rate, 0.5);
        assert!((summary.overall_lift - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_top_segments_ranked_and_capped() {
        let mut control = variation("c", 1000, 50, true);
        let mut treatment = variation("v", 1000, 60, false);
        for (profile, c_rate, t_rate) in [
            ("explorers", 0.05, 0.10),
            ("skeptics", 0.05, 0.04),
            ("loyalists", 0.10, 0.13),
        ] {
            control
                .profile_performance
                .insert(profile.to_string(), c_rate);
            treatment
                .profile_performance
                .insert(profile.to_string(), t_rate);
        }

        let test = TestMetrics {
            id: "t1".into(),
            name: "t1".into(),
            status: TestStatus::Completed,
            start_date: None,
            end_date: None,
            variations: vec![control, treatment],
            total_visitors: 2000,
            total_conversions: 110,
            conversion_rate: 0.055,
            statistical_significance: 0.9,
            confidence: 90.0,
            winner: None,
            psychographics: vec![],
            revenue: RevenueMetrics::default(),
            performance: PerformanceMetrics::default(),
        };

        let segments = top_segments(&[test], 2);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].segment, "explorers");
        assert!((segments[0].avg_lift - 1.0).abs() < 1e-9);
        assert_eq!(segments[1].segment, "loyalists");
    }

    #[test]
    fn test_revenue_attribution_per_visitor() {
        let mut test = TestMetrics {
            id: "t1".into(),
            name: "t1".into(),
            status: TestStatus::Active,
            start_date: None,
            end_date: None,
            variations: vec![],
            total_visitors: 1000,
            total_conversions: 100,
            conversion_rate: 0.1,
            statistical_significance: 0.0,
            confidence: 0.0,
            winner: None,
            psychographics: vec![],
            revenue: RevenueMetrics {
                total_revenue: 5000.0,
                incremental_revenue: 800.0,
                revenue_per_visitor: 5.0,
            },
            performance: PerformanceMetrics::default(),
        };

        let attribution = build_revenue_attribution(Some("t1"), std::slice::from_ref(&test));
        assert_eq!(attribution.total_revenue, 5000.0);
        assert_eq!(attribution.revenue_per_visitor, 5.0);
        assert_eq!(attribution.by_test.len(), 1);

        test.total_visitors = 0;
        let attribution = build_revenue_attribution(Some("t1"), &[test]);
        assert_eq!(attribution.revenue_per_visitor, 0.0);
    }
}
