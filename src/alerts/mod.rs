//! Threshold-triggered alerting over aggregated experiment metrics.
//!
//! The engine polls the active-test list on a fixed interval and evaluates
//! three rules per test: significance reached, winner detected, and
//! underperformance. The active-test list is cache-backed, so rule evaluation
//! can observe data up to one cache TTL old. Alerts live in an in-memory
//! table for the life of the process; nothing is persisted or evicted.

use crate::aggregation::MetricsAggregator;
use crate::core::config::AlertsConfig;
use crate::core::types::{AlertKind, AlertSeverity, RealTimeAlert, TestFilters, TestMetrics, TestStatus};
use crate::core::Result;
use crate::events::{AnalyticsEvent, EventBus};
use chrono::Utc;
use dashmap::DashMap;
use rand::RngCore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::interval;

/// Evaluates alert rules and owns the in-memory alert table.
pub struct AlertEngine {
    aggregator: Arc<MetricsAggregator>,
    events: Arc<EventBus>,
    config: AlertsConfig,
    alerts: DashMap<String, RealTimeAlert>,
    shutdown: Arc<AtomicBool>,
}

impl AlertEngine {
    /// Create an engine over the given aggregator and event bus.
    pub fn new(
        aggregator: Arc<MetricsAggregator>,
        events: Arc<EventBus>,
        config: AlertsConfig,
    ) -> Self {
        Self {
            aggregator,
            events,
            config,
            alerts: DashMap::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the evaluation loop in the background.
    pub fn start(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let period = self.config.evaluation_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            while !shutdown.load(Ordering::Relaxed) {
                ticker.tick().await;
                match engine.evaluate().await {
                    Ok(fired) if fired > 0 => {
                        tracing::info!(fired, "alert evaluation cycle produced alerts");
                    },
                    Ok(_) => {},
                    Err(e) => {
                        // Data-source failures are reported on the bus by the
                        // aggregator; the loop itself keeps running.
                        tracing::warn!(error = %e, "alert evaluation cycle failed");
                    },
                }
            }
        });
    }

    /// Stop the evaluation loop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Run one evaluation cycle over the current active-test list. Returns
    /// the number of alerts fired. Public so tests can drive cycles directly.
    pub async fn evaluate(&self) -> Result<usize> {
        let filters = TestFilters {
            statuses: Some(vec![TestStatus::Active]),
            ..Default::default()
        };
        let active = self.aggregator.get_test_list(&filters).await?;

        let mut fired = 0;
        for test in &active {
            fired += self.evaluate_test(test);
        }
        Ok(fired)
    }

    fn evaluate_test(&self, test: &TestMetrics) -> usize {
        let mut fired = 0;

        if test.statistical_significance >= self.config.significance_threshold
            && test.winner.is_none()
        {
            fired += self.fire(
                AlertKind::SignificanceAchieved,
                AlertSeverity::Medium,
                test,
                format!(
                    "Test '{}' reached {:.0}% significance without a declared winner",
                    test.name,
                    test.statistical_significance * 100.0
                ),
                true,
                vec!["Review results and declare a winner".to_string()],
            );
        }

        if let Some(best) = test
            .treatments()
            .filter(|v| v.lift > self.config.winner_lift_threshold)
            .max_by(|a, b| a.lift.partial_cmp(&b.lift).unwrap_or(std::cmp::Ordering::Equal))
        {
            fired += self.fire(
                AlertKind::WinnerDetected,
                AlertSeverity::High,
                test,
                format!(
                    "Variation '{}' of test '{}' is up {:.1}% over control",
                    best.name,
                    test.name,
                    best.lift * 100.0
                ),
                true,
                vec![format!("Consider rolling out variation '{}'", best.name)],
            );
        }

        let losers: Vec<&str> = test
            .treatments()
            .filter(|v| v.lift < self.config.underperform_lift_threshold)
            .map(|v| v.name.as_str())
            .collect();
        if !losers.is_empty() {
            fired += self.fire(
                AlertKind::Underperforming,
                AlertSeverity::Medium,
                test,
                format!(
                    "Test '{}' has underperforming variations: {}",
                    test.name,
                    losers.join(", ")
                ),
                false,
                vec!["Pause or revise the underperforming variations".to_string()],
            );
        }

        fired
    }

    /// Append an alert unless de-duplication suppresses it. With
    /// de-duplication on, a rule re-fires for a test only after the previous
    /// alert of the same kind was acknowledged.
    fn fire(
        &self,
        kind: AlertKind,
        severity: AlertSeverity,
        test: &TestMetrics,
        message: String,
        action_required: bool,
        recommended_actions: Vec<String>,
    ) -> usize {
        if self.config.deduplicate {
            let duplicate = self
                .alerts
                .iter()
                .any(|a| a.kind == kind && a.test_id == test.id && !a.acknowledged);
            if duplicate {
                return 0;
            }
        }

        let alert = RealTimeAlert {
            id: new_alert_id(),
            kind,
            severity,
            test_id: test.id.clone(),
            message,
            created_at: Utc::now(),
            acknowledged: false,
            action_required,
            recommended_actions,
        };

        tracing::info!(alert_id = %alert.id, test_id = %alert.test_id, ?kind, "alert fired");
        self.alerts.insert(alert.id.clone(), alert.clone());
        self.events.publish(AnalyticsEvent::NewAlert(alert));
        1
    }

    /// Acknowledge an alert. Unknown or already-acknowledged ids are a silent
    /// no-op; returns whether the flag transitioned.
    pub fn acknowledge(&self, alert_id: &str) -> bool {
        let Some(mut entry) = self.alerts.get_mut(alert_id) else {
            return false;
        };
        if entry.acknowledged {
            return false;
        }
        entry.acknowledged = true;
        let alert = entry.clone();
        drop(entry);

        self.events.publish(AnalyticsEvent::AlertAcknowledged(alert));
        true
    }

    /// All alerts, oldest first.
    pub fn alerts(&self) -> Vec<RealTimeAlert> {
        let mut all: Vec<RealTimeAlert> = self.alerts.iter().map(|a| a.clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Number of alerts not yet acknowledged.
    pub fn unacknowledged_count(&self) -> usize {
        self.alerts.iter().filter(|a| !a.acknowledged).count()
    }
}

fn new_alert_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("alert-{}", hex::encode(bytes))
}
