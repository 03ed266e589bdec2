//! Metric history
//!
//! Append-only, per-subject storage of canonical metrics. The predictor only
//! needs two operations from it: insert and a time-range read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::VitalsError;
use crate::types::CanonicalMetric;

/// Persistence collaborator keyed by subject identifier
pub trait MetricStore: Send + Sync {
    /// Append one metric to the subject's history
    fn append(&self, subject: &str, metric: CanonicalMetric) -> Result<(), VitalsError>;

    /// Metrics recorded in `[since, until]`, oldest first
    fn range(
        &self,
        subject: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CanonicalMetric>, VitalsError>;

    /// Append several metrics; stops at the first failure
    fn append_all(&self, subject: &str, metrics: Vec<CanonicalMetric>) -> Result<(), VitalsError> {
        for metric in metrics {
            self.append(subject, metric)?;
        }
        Ok(())
    }
}

/// Fields are public, so rows built in code are re-checked on append
fn check_row(metric: &CanonicalMetric) -> Result<(), VitalsError> {
    CanonicalMetric::new(
        metric.metric_type,
        metric.value,
        &metric.unit,
        metric.recorded_at,
        metric.source.as_str(),
    )
    .map(|_| ())
}

/// Serialized form of the store
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistorySnapshot {
    subjects: BTreeMap<String, Vec<CanonicalMetric>>,
}

/// Process-local store; many concurrent readers, one writer at a time
#[derive(Debug, Default)]
pub struct InMemoryMetricStore {
    subjects: RwLock<HashMap<String, Vec<CanonicalMetric>>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of metrics stored for a subject
    pub fn len(&self, subject: &str) -> Result<usize, VitalsError> {
        let subjects = self.read()?;
        Ok(subjects.get(subject).map_or(0, Vec::len))
    }

    pub fn is_empty(&self, subject: &str) -> Result<bool, VitalsError> {
        Ok(self.len(subject)? == 0)
    }

    /// Subject identifiers with at least one metric, sorted
    pub fn subjects(&self) -> Result<Vec<String>, VitalsError> {
        let subjects = self.read()?;
        let mut ids: Vec<String> = subjects.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Load a store from a JSON snapshot
    pub fn from_json(json: &str) -> Result<Self, VitalsError> {
        let snapshot: HistorySnapshot = serde_json::from_str(json)?;
        let mut subjects = HashMap::with_capacity(snapshot.subjects.len());
        for (subject, mut metrics) in snapshot.subjects {
            metrics.sort_by_key(|m| m.recorded_at);
            subjects.insert(subject, metrics);
        }
        Ok(Self {
            subjects: RwLock::new(subjects),
        })
    }

    /// Replace the current contents with a JSON snapshot; on error nothing changes
    pub fn restore(&self, json: &str) -> Result<(), VitalsError> {
        let loaded = Self::from_json(json)?;
        let loaded = loaded
            .subjects
            .into_inner()
            .map_err(|_| VitalsError::Storage("metric history lock poisoned".to_string()))?;
        let mut subjects = self
            .subjects
            .write()
            .map_err(|_| VitalsError::Storage("metric history lock poisoned".to_string()))?;
        *subjects = loaded;
        Ok(())
    }

    /// Serialize the whole store to JSON
    pub fn to_json(&self) -> Result<String, VitalsError> {
        let subjects = self.read()?;
        let snapshot = HistorySnapshot {
            subjects: subjects
                .iter()
                .map(|(subject, metrics)| (subject.clone(), metrics.clone()))
                .collect(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Vec<CanonicalMetric>>>, VitalsError>
    {
        self.subjects
            .read()
            .map_err(|_| VitalsError::Storage("metric history lock poisoned".to_string()))
    }
}

impl MetricStore for InMemoryMetricStore {
    fn append(&self, subject: &str, metric: CanonicalMetric) -> Result<(), VitalsError> {
        check_row(&metric)?;
        let mut subjects = self
            .subjects
            .write()
            .map_err(|_| VitalsError::Storage("metric history lock poisoned".to_string()))?;
        let history = subjects.entry(subject.to_string()).or_default();

        // Keep time order; equal timestamps stay in arrival order
        let at = history.partition_point(|m| m.recorded_at <= metric.recorded_at);
        history.insert(at, metric);
        Ok(())
    }

    fn range(
        &self,
        subject: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CanonicalMetric>, VitalsError> {
        let subjects = self.read()?;
        let Some(history) = subjects.get(subject) else {
            return Ok(Vec::new());
        };
        let start = history.partition_point(|m| m.recorded_at < since);
        let end = history.partition_point(|m| m.recorded_at <= until);
        Ok(history.get(start..end).map(<[_]>::to_vec).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricType;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn hr(value: f64, hour: u32) -> CanonicalMetric {
        CanonicalMetric::canonical(MetricType::HeartRate, value, at(hour), "test").unwrap()
    }

    #[test]
    fn test_range_is_time_ordered_and_inclusive() {
        let store = InMemoryMetricStore::new();
        store.append("alice", hr(70.0, 10)).unwrap();
        store.append("alice", hr(72.0, 8)).unwrap();
        store.append("alice", hr(74.0, 12)).unwrap();

        let values: Vec<f64> = store
            .range("alice", at(8), at(10))
            .unwrap()
            .iter()
            .map(|m| m.value)
            .collect();
        assert_eq!(values, vec![72.0, 70.0]);
    }

    #[test]
    fn test_subjects_are_isolated() {
        let store = InMemoryMetricStore::new();
        store.append("alice", hr(70.0, 9)).unwrap();
        store.append("bob", hr(90.0, 9)).unwrap();

        let bob = store.range("bob", at(0), at(23)).unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].value, 90.0);
        assert!(store.range("carol", at(0), at(23)).unwrap().is_empty());
        assert_eq!(store.subjects().unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_invalid_row_rejected() {
        let store = InMemoryMetricStore::new();
        let mut metric = hr(70.0, 9);
        metric.unit = "Hz".to_string();
        assert!(matches!(
            store.append("alice", metric),
            Err(VitalsError::Validation(_))
        ));
        assert!(store.is_empty("alice").unwrap());
    }

    #[test]
    fn test_json_snapshot() {
        let store = InMemoryMetricStore::new();
        store
            .append_all("alice", vec![hr(70.0, 9), hr(71.0, 11)])
            .unwrap();

        let json = store.to_json().unwrap();
        let restored = InMemoryMetricStore::from_json(&json).unwrap();
        assert_eq!(restored.len("alice").unwrap(), 2);
        assert_eq!(
            restored.range("alice", at(0), at(23)).unwrap(),
            store.range("alice", at(0), at(23)).unwrap()
        );

        let tampered = json.replace("\"bpm\"", "\"kg\"");
        assert!(InMemoryMetricStore::from_json(&tampered).is_err());
        assert!(restored.restore(&tampered).is_err());
        assert_eq!(restored.len("alice").unwrap(), 2);

        let empty = InMemoryMetricStore::new();
        empty.restore(&json).unwrap();
        assert_eq!(empty.len("alice").unwrap(), 2);
    }

    #[test]
    fn test_concurrent_readers() {
        let store = Arc::new(InMemoryMetricStore::new());
        for hour in 0..12 {
            store.append("alice", hr(60.0 + f64::from(hour), hour)).unwrap();
        }

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .range("alice", at(0), at(0) + Duration::hours(5))
                        .unwrap()
                        .len()
                })
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), 6);
        }
    }
}
