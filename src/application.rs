//! Application wiring and lifecycle.

use crate::aggregation::MetricsAggregator;
use crate::alerts::AlertEngine;
use crate::api;
use crate::core::{Config, Result};
use crate::events::EventBus;
use crate::realtime::RealtimeServer;
use crate::store::{MemoryMetricsStore, MetricsStore};
use std::sync::Arc;

/// Coordinates the analytics components and the HTTP server.
pub struct Application {
    config: Config,
    aggregator: Arc<MetricsAggregator>,
    alerts: Arc<AlertEngine>,
    realtime: Arc<RealtimeServer>,
    events: Arc<EventBus>,
}

impl Application {
    /// Wire the components over the given metrics store.
    pub fn new(config: Config, store: Arc<dyn MetricsStore>) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventBus::new());
        let aggregator = Arc::new(MetricsAggregator::new(
            store,
            Arc::clone(&events),
            config.store.clone(),
            config.cache.clone(),
        ));
        let alerts = Arc::new(AlertEngine::new(
            Arc::clone(&aggregator),
            Arc::clone(&events),
            config.alerts.clone(),
        ));
        let realtime = Arc::new(RealtimeServer::new(
            config.realtime.clone(),
            config.auth.clone(),
            Arc::clone(&aggregator),
            Arc::clone(&alerts),
            Arc::clone(&events),
        ));

        Ok(Self {
            config,
            aggregator,
            alerts,
            realtime,
            events,
        })
    }

    /// Wire the components over a fresh in-memory store.
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::new(config, Arc::new(MemoryMetricsStore::new()))
    }

    /// Start the background loops and serve HTTP until ctrl-c.
    pub async fn run(self) -> Result<()> {
        tracing::info!("starting abpulse");

        self.alerts.start();
        self.realtime.start();

        let app = api::router(
            Arc::clone(&self.aggregator),
            Arc::clone(&self.alerts),
            Arc::clone(&self.events),
            Arc::clone(&self.realtime),
        );

        let result = api::serve(
            app,
            self.config.server.bind_address,
            self.config.server.http_port,
            async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
            },
        )
        .await;

        self.alerts.stop();
        self.realtime.stop();
        result
    }

    /// The aggregation engine.
    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    /// The alert engine.
    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    /// The real-time broadcast server.
    pub fn realtime(&self) -> &Arc<RealtimeServer> {
        &self.realtime
    }

    /// The shared event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}

/// Seed an in-memory store with a small demo experiment so the endpoints and
/// the WebSocket stream have something to show.
pub fn seed_demo_data(store: &MemoryMetricsStore) {
    store.put_hash(
        "ab:test:checkout-copy",
        &[
            ("name", "Checkout copy"),
            ("status", "active"),
            ("start_date", "2026-08-01T00:00:00Z"),
            ("significance", "0.97"),
            ("confidence", "97"),
        ],
    );
    store.put_hash(
        "ab:variation:checkout-copy:control",
        &[
            ("name", "Control"),
            ("visitors", "500"),
            ("conversions", "25"),
            ("is_control", "true"),
            ("profile:impulsive", "0.08"),
            ("profile:analytical", "0.04"),
        ],
    );
    store.put_hash(
        "ab:variation:checkout-copy:bold",
        &[
            ("name", "Bold headline"),
            ("visitors", "480"),
            ("conversions", "36"),
            ("profile:impulsive", "0.12"),
            ("profile:analytical", "0.05"),
        ],
    );
    store.put_hash(
        "ab:psych:checkout-copy:impulsive",
        &[("visitors", "400"), ("conversions", "40")],
    );
    store.put_hash(
        "ab:psych:checkout-copy:analytical",
        &[("visitors", "580"), ("conversions", "21")],
    );
    store.put_hash(
        "ab:revenue:checkout-copy",
        &[
            ("total_revenue", "5230.0"),
            ("incremental_revenue", "1030.0"),
            ("revenue_per_visitor", "5.34"),
        ],
    );
    store.put_hash(
        "ab:perf:checkout-copy",
        &[
            ("avg_load_time_ms", "240"),
            ("bounce_rate", "0.31"),
            ("engagement_score", "0.64"),
        ],
    );

    store.put_hash(
        "ab:test:pricing-page",
        &[
            ("name", "Pricing page layout"),
            ("status", "completed"),
            ("start_date", "2026-06-01T00:00:00Z"),
            ("end_date", "2026-07-01T00:00:00Z"),
            ("significance", "0.99"),
            ("confidence", "99"),
            ("winner", "Simplified tiers"),
        ],
    );
    store.put_hash(
        "ab:variation:pricing-page:control",
        &[
            ("name", "Control"),
            ("visitors", "2000"),
            ("conversions", "120"),
            ("is_control", "true"),
        ],
    );
    store.put_hash(
        "ab:variation:pricing-page:simple",
        &[("name", "Simplified tiers"), ("visitors", "2000"), ("conversions", "168")],
    );
    store.put_hash(
        "ab:revenue:pricing-page",
        &[
            ("total_revenue", "28400.0"),
            ("incremental_revenue", "4800.0"),
            ("revenue_per_visitor", "7.10"),
        ],
    );
}
