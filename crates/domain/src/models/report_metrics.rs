//! Per-job generation metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Performance and quality figures for one report job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportMetrics {
    pub job_id: Uuid,
    pub query_time_ms: u64,
    pub processing_time_ms: u64,
    pub export_time_ms: u64,
    pub memory_usage_mb: Option<f64>,
    pub cpu_time_ms: Option<u64>,
    pub rows_processed: u64,
    pub columns_included: u32,
    pub data_completeness_percent: f64,
    pub error_count: u32,
    pub warning_count: u32,
    pub download_count: u64,
    pub last_downloaded: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Timing breakdown of a generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationTimings {
    pub query_ms: u64,
    pub processing_ms: u64,
    pub export_ms: u64,
}

impl ReportMetrics {
    pub fn new(job_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            query_time_ms: 0,
            processing_time_ms: 0,
            export_time_ms: 0,
            memory_usage_mb: None,
            cpu_time_ms: None,
            rows_processed: 0,
            columns_included: 0,
            data_completeness_percent: 0.0,
            error_count: 0,
            warning_count: 0,
            download_count: 0,
            last_downloaded: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_timings(&mut self, timings: GenerationTimings, now: DateTime<Utc>) {
        self.query_time_ms = timings.query_ms;
        self.processing_time_ms = timings.processing_ms;
        self.export_time_ms = timings.export_ms;
        self.updated_at = now;
    }

    /// Records row statistics. Completeness is clamped to `0..=100`.
    pub fn record_rows(&mut self, rows: u64, columns: u32, completeness_percent: f64, now: DateTime<Utc>) {
        self.rows_processed = rows;
        self.columns_included = columns;
        self.data_completeness_percent = if completeness_percent.is_finite() {
            completeness_percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.updated_at = now;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.error_count += 1;
        self.updated_at = now;
    }

    pub fn add_warnings(&mut self, count: u32, now: DateTime<Utc>) {
        if count > 0 {
            self.warning_count += count;
            self.updated_at = now;
        }
    }

    pub fn record_download(&mut self, now: DateTime<Utc>) {
        self.download_count += 1;
        self.last_downloaded = Some(now);
        self.updated_at = now;
    }

    /// Rows processed per second of total generation time.
    pub fn throughput(&self) -> Option<f64> {
        let total_ms = self.query_time_ms + self.processing_time_ms + self.export_time_ms;
        if total_ms == 0 {
            None
        } else {
            Some(self.rows_processed as f64 * 1000.0 / total_ms as f64)
        }
    }
}
