//! Domain model for experiment analytics.
//!
//! Every aggregation read produces a fresh immutable snapshot of these types;
//! nothing here is mutated in place after construction. Numeric fields coming
//! out of the metrics store are parsed leniently (bad data reads as 0) via the
//! [`lenient`] helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl TestStatus {
    /// Parse a status string from the store; unknown values read as draft.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw {
            "active" => TestStatus::Active,
            "paused" => TestStatus::Paused,
            "completed" => TestStatus::Completed,
            _ => TestStatus::Draft,
        }
    }
}

/// Metrics for one arm of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationMetrics {
    pub id: String,
    pub name: String,
    pub visitors: u64,
    pub conversions: u64,
    pub revenue: f64,
    pub is_control: bool,
    /// Conversions / visitors, 0 when there are no visitors.
    pub conversion_rate: f64,
    /// Relative conversion-rate delta versus the control arm.
    pub lift: f64,
    /// Per psychographic-profile conversion rate for this variation.
    pub profile_performance: HashMap<String, f64>,
}

impl VariationMetrics {
    /// Conversion rate for the given counters, 0 when visitors is 0.
    pub fn rate(visitors: u64, conversions: u64) -> f64 {
        if visitors == 0 {
            0.0
        } else {
            conversions as f64 / visitors as f64
        }
    }
}

/// Per psychographic-profile slice of a test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsychographicMetrics {
    pub profile: String,
    pub visitors: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
}

/// Revenue rollup for a test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueMetrics {
    pub total_revenue: f64,
    pub incremental_revenue: f64,
    pub revenue_per_visitor: f64,
}

/// Page-performance rollup for a test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub avg_load_time_ms: f64,
    pub bounce_rate: f64,
    pub engagement_score: f64,
}

/// Derived view of one experiment. Immutable snapshot per aggregation read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMetrics {
    pub id: String,
    pub name: String,
    pub status: TestStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub variations: Vec<VariationMetrics>,
    pub total_visitors: u64,
    pub total_conversions: u64,
    pub conversion_rate: f64,
    /// Externally supplied; literal range from the store is preserved.
    pub statistical_significance: f64,
    /// Externally supplied; literal range from the store is preserved.
    pub confidence: f64,
    pub winner: Option<String>,
    pub psychographics: Vec<PsychographicMetrics>,
    pub revenue: RevenueMetrics,
    pub performance: PerformanceMetrics,
}

impl TestMetrics {
    /// The first control variation, if any. Exactly-one-control is a consumer
    /// invariant and is not enforced here.
    pub fn control(&self) -> Option<&VariationMetrics> {
        self.variations.iter().find(|v| v.is_control)
    }

    /// Non-control variations in declaration order.
    pub fn treatments(&self) -> impl Iterator<Item = &VariationMetrics> {
        self.variations.iter().filter(|v| !v.is_control)
    }
}

/// Filters applied to test-list queries. Also serialized into cache keys, so
/// field order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestFilters {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub statuses: Option<Vec<TestStatus>>,
    pub min_revenue: Option<f64>,
    pub min_significance: Option<f64>,
}

impl TestFilters {
    /// Whether the given test passes every configured filter.
    pub fn matches(&self, test: &TestMetrics) -> bool {
        if let Some(from) = self.date_from {
            match test.start_date {
                Some(start) if start >= from => {},
                _ => return false,
            }
        }
        if let Some(to) = self.date_to {
            match test.start_date {
                Some(start) if start <= to => {},
                _ => return false,
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&test.status) {
                return false;
            }
        }
        if let Some(min) = self.min_revenue {
            if test.revenue.total_revenue < min {
                return false;
            }
        }
        if let Some(min) = self.min_significance {
            if test.statistical_significance < min {
                return false;
            }
        }
        true
    }
}

/// Average lift of a psychographic segment across tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentLift {
    pub segment: String,
    pub avg_lift: f64,
    pub test_count: usize,
}

/// Cross-test executive rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutiveSummary {
    pub total_tests: usize,
    pub active_tests: usize,
    pub completed_tests: usize,
    pub overall_lift: f64,
    pub total_incremental_revenue: f64,
    pub avg_test_duration_days: f64,
    /// Fraction of tests with significance >= 0.95 and a declared winner.
    pub success_rate: f64,
    pub top_segments: Vec<SegmentLift>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Aggregate view of one psychographic profile across tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInsight {
    pub profile: String,
    pub total_visitors: u64,
    pub total_conversions: u64,
    pub conversion_rate: f64,
    pub avg_lift: f64,
    pub best_test: Option<String>,
}

/// Psychographic rollup across the filtered test list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsychographicInsights {
    pub profiles: Vec<ProfileInsight>,
    pub generated_at: DateTime<Utc>,
}

/// Per-test revenue contribution within an attribution report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRevenue {
    pub test_id: String,
    pub name: String,
    pub total_revenue: f64,
    pub incremental_revenue: f64,
}

/// Revenue attribution, either for one test or across active+completed tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueAttribution {
    pub test_id: Option<String>,
    pub total_revenue: f64,
    pub incremental_revenue: f64,
    pub revenue_per_visitor: f64,
    pub by_test: Vec<TestRevenue>,
    pub generated_at: DateTime<Utc>,
}

/// Lightweight snapshot pushed to real-time subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeMetrics {
    pub active_tests: usize,
    pub total_visitors: u64,
    pub total_conversions: u64,
    pub conversion_rate: f64,
    pub unacknowledged_alerts: usize,
    pub timestamp: DateTime<Utc>,
}

/// What triggered an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    WinnerDetected,
    Underperforming,
    SignificanceAchieved,
    Anomaly,
    BudgetAlert,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A threshold-triggered alert. Held in process memory for the life of the
/// process; `acknowledged` is the only field that mutates, set exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeAlert {
    pub id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub test_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub action_required: bool,
    pub recommended_actions: Vec<String>,
}

/// Defensive parsing of flat string maps coming out of the metrics store.
///
/// Per-field corruption must not fail a whole aggregation read, so every
/// helper returns a typed default instead of an error.
pub mod lenient {
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;

    /// Parse a float field; missing or malformed reads as 0.0.
    pub fn float(record: &HashMap<String, String>, key: &str) -> f64 {
        record
            .get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    /// Parse an unsigned integer field; missing or malformed reads as 0.
    pub fn int(record: &HashMap<String, String>, key: &str) -> u64 {
        record
            .get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// Parse a boolean field; anything other than "true"/"1" reads as false.
    pub fn boolean(record: &HashMap<String, String>, key: &str) -> bool {
        matches!(record.get(key).map(String::as_str), Some("true") | Some("1"))
    }

    /// Parse an RFC 3339 timestamp field; malformed reads as None.
    pub fn date(record: &HashMap<String, String>, key: &str) -> Option<DateTime<Utc>> {
        record
            .get(key)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    /// A non-empty string field, or None.
    pub fn string(record: &HashMap<String, String>, key: &str) -> Option<String> {
        record.get(key).filter(|v| !v.is_empty()).cloned()
    }
}
