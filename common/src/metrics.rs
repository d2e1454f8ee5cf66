use serde::{Deserialize, Serialize};

use crate::util::now_millis;

/// One observed HTTP exchange against a beacon node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetric {
    pub url: String,
    pub code: u16,
    pub latency: i64,
    pub time: i64,
}

/// Success (< 400) vs error (>= 400) response counts for charting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponsePartition {
    pub success: u64,
    pub error: u64,
}

const RETENTION_MILLIS: i64 = 25 * 60 * 60 * 1000;

/// Rolling window of network metrics for a single beacon. Pruned to the last
/// 25 hours on every insert.
#[derive(Debug, Clone, Default)]
pub struct NetworkMetrics {
    records: Vec<NetworkMetric>,
}

impl NetworkMetrics {
    pub fn new(records: Vec<NetworkMetric>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[NetworkMetric] {
        &self.records
    }

    pub fn add_record(&mut self, record: NetworkMetric) {
        self.add_record_at(record, now_millis());
    }

    fn add_record_at(&mut self, record: NetworkMetric, now: i64) {
        self.records.push(record);
        let cutoff = now - RETENTION_MILLIS;
        self.records.retain(|record| record.time >= cutoff);
    }

    pub fn records_in_range(&self, from: i64, to: i64) -> Vec<NetworkMetric> {
        self.records
            .iter()
            .filter(|record| record.time > from && record.time < to)
            .cloned()
            .collect()
    }

    pub fn average_latency(&self, from: i64, to: i64) -> Option<f64> {
        let records = self.records_in_range(from, to);
        if records.is_empty() {
            return None;
        }
        let total: i64 = records.iter().map(|record| record.latency).sum();
        Some(total as f64 / records.len() as f64)
    }

    pub fn response_partition(&self) -> ResponsePartition {
        let mut partition = ResponsePartition::default();
        for record in &self.records {
            if record.code < 400 {
                partition.success += 1;
            } else {
                partition.error += 1;
            }
        }
        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(time: i64, code: u16, latency: i64) -> NetworkMetric {
        NetworkMetric {
            url: "http://localhost:5052".to_string(),
            code,
            latency,
            time,
        }
    }

    #[test]
    fn prune_keeps_25h_boundary_and_drops_older() {
        let now = 100 * 60 * 60 * 1000;
        let mut metrics = NetworkMetrics::default();
        metrics.add_record_at(record(now - 26 * 60 * 60 * 1000, 200, 10), now);
        metrics.add_record_at(record(now - RETENTION_MILLIS, 200, 20), now);
        metrics.add_record_at(record(now, 200, 30), now);

        let times = metrics.records().iter().map(|r| r.time).collect::<Vec<_>>();
        assert_eq!(times, vec![now - RETENTION_MILLIS, now]);
    }

    #[test]
    fn average_latency_over_range() {
        let mut metrics = NetworkMetrics::default();
        metrics.add_record_at(record(10, 200, 100), 1000);
        metrics.add_record_at(record(20, 200, 200), 1000);
        metrics.add_record_at(record(30, 200, 900), 1000);
        assert_eq!(metrics.average_latency(5, 25), Some(150.0));
        assert_eq!(metrics.average_latency(40, 50), None);
    }

    #[test]
    fn range_bounds_are_exclusive() {
        let mut metrics = NetworkMetrics::default();
        metrics.add_record_at(record(10, 200, 1), 1000);
        metrics.add_record_at(record(20, 200, 1), 1000);
        assert_eq!(metrics.records_in_range(10, 20).len(), 0);
        assert_eq!(metrics.records_in_range(9, 21).len(), 2);
    }

    #[test]
    fn response_partition_buckets_by_status_code() {
        let mut metrics = NetworkMetrics::default();
        metrics.add_record_at(record(1, 200, 1), 1000);
        metrics.add_record_at(record(2, 399, 1), 1000);
        metrics.add_record_at(record(3, 400, 1), 1000);
        metrics.add_record_at(record(4, 503, 1), 1000);
        let partition = metrics.response_partition();
        assert_eq!(partition.success, 2);
        assert_eq!(partition.error, 2);
    }
}
