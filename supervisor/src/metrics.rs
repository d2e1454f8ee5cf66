use std::sync::Arc;

use client::MetricsSink;
use common::metrics::NetworkMetric;
use service::Store;

/// Persists one metric per beacon HTTP exchange. Writes happen off the
/// request path.
pub struct StoreMetricsSink {
    store: Arc<dyn Store>,
}

impl StoreMetricsSink {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl MetricsSink for StoreMetricsSink {
    fn record(&self, metric: NetworkMetric) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(err) = store.add_metric(&metric).await {
                log::debug!("Failed to persist network metric: {err:#}");
            }
        });
    }
}
