//! Metrics collection for observability
//!
//! Prometheus collectors on a private registry, so several ledgers can live
//! in one process.
//!
//! # Metrics
//!
//! - `market_ledger_operations_total{operation, outcome}` - Operations by result code
//! - `market_ledger_operation_duration_seconds{operation}` - Operation latency
//! - `market_ledger_liquidations_total` - Liquidations committed
//! - `market_ledger_bad_debt_total` - Liquidations that realized bad debt
//! - `market_ledger_markets_created_total` - Markets created

use crate::Result as LedgerResult;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Operations by name and outcome
    pub operations: IntCounterVec,

    /// Operation latency by name
    pub operation_duration: HistogramVec,

    /// Liquidations committed
    pub liquidations: IntCounter,

    /// Liquidations that wrote off debt
    pub bad_debt: IntCounter,

    /// Markets created
    pub markets_created: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations = IntCounterVec::new(
            Opts::new("market_ledger_operations_total", "Ledger operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "market_ledger_operation_duration_seconds",
                "Histogram of operation latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let liquidations = IntCounter::new("market_ledger_liquidations_total", "Liquidations committed")?;
        registry.register(Box::new(liquidations.clone()))?;

        let bad_debt = IntCounter::new("market_ledger_bad_debt_total", "Liquidations that realized bad debt")?;
        registry.register(Box::new(bad_debt.clone()))?;

        let markets_created = IntCounter::new("market_ledger_markets_created_total", "Markets created")?;
        registry.register(Box::new(markets_created.clone()))?;

        Ok(Self {
            operations,
            operation_duration,
            liquidations,
            bad_debt,
            markets_created,
            registry,
        })
    }

    /// Record an operation result and its latency
    pub fn record_operation<T>(&self, operation: &str, result: &LedgerResult<T>, elapsed: Duration) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(err) => err.code(),
        };
        self.operations.with_label_values(&[operation, outcome]).inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Record a committed liquidation
    pub fn record_liquidation(&self, bad_debt: bool) {
        self.liquidations.inc();
        if bad_debt {
            self.bad_debt.inc();
        }
    }

    /// Record market creation
    pub fn record_market_created(&self) {
        self.markets_created.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("liquidations", &self.liquidations.get())
            .field("markets_created", &self.markets_created.get())
            .finish_non_exhaustive()
    }
}
