//! Export strategies: one algorithm per [`ExportFormat`].
//!
//! A strategy pulls rows from a [`ReportAdapter`] one at a time and writes
//! them to the supplied writer, reporting progress every
//! `progress_interval_rows` rows. Strategies never see where the artifact
//! ends up; the coordinator hands them a staged [`ArtifactWriter`] and only
//! commits it on success.
//!
//! [`ArtifactWriter`]: crate::services::storage::ArtifactWriter

mod delimited;
mod document;
mod spreadsheet;
mod structured;

pub use delimited::DelimitedTextStrategy;
pub use document::PaginatedDocumentStrategy;
pub use spreadsheet::SpreadsheetStrategy;
pub use structured::StructuredDataStrategy;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::error::ReportError;
use crate::models::{ExportFormat, ReportParameters, ReportType};
use crate::services::adapter::{AdapterError, CellValue, ColumnDef, ReportAdapter};
use crate::services::storage::StorageError;

/// Default number of rows between progress reports.
pub const DEFAULT_PROGRESS_INTERVAL_ROWS: u64 = 100;

/// Default row cap for paginated documents.
pub const DEFAULT_DOCUMENT_ROW_LIMIT: u64 = 1000;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Job details a strategy needs besides the rows.
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub job_id: Uuid,
    pub title: String,
    pub report_type: ReportType,
    pub parameters: ReportParameters,
    pub generated_at: DateTime<Utc>,
    pub progress_interval_rows: u64,
    pub document_row_limit: u64,
}

impl ExportContext {
    pub fn new(job_id: Uuid, title: impl Into<String>, report_type: ReportType, parameters: ReportParameters) -> Self {
        Self {
            job_id,
            title: title.into(),
            report_type,
            parameters,
            generated_at: Utc::now(),
            progress_interval_rows: DEFAULT_PROGRESS_INTERVAL_ROWS,
            document_row_limit: DEFAULT_DOCUMENT_ROW_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub rows: u64,
}

impl ProgressUpdate {
    pub fn message(&self) -> String {
        format!("Exported {} rows", self.rows)
    }
}

/// Turns row counts into progress percentages.
///
/// With an estimate, progress is the processed share scaled into `5..=95`.
/// Without one, each checkpoint advances a fixed step up to 95.
#[derive(Debug)]
pub struct ProgressTracker {
    interval: u64,
    estimate: Option<u64>,
    rows: u64,
    percent: u8,
}

const PROGRESS_FLOOR: u64 = 5;
const PROGRESS_CEILING: u64 = 95;
const PROGRESS_STEP: u64 = 5;

impl ProgressTracker {
    pub fn new(interval: u64, estimate: Option<u64>) -> Self {
        Self {
            interval: interval.max(1),
            estimate: estimate.filter(|e| *e > 0),
            rows: 0,
            percent: 0,
        }
    }

    /// Counts one row. Returns an update every `interval` rows.
    pub fn row_done(&mut self) -> Option<ProgressUpdate> {
        self.rows += 1;
        if self.rows % self.interval != 0 {
            return None;
        }
        let percent = match self.estimate {
            Some(estimate) => {
                let done = self.rows.min(estimate);
                PROGRESS_FLOOR + done * (PROGRESS_CEILING - PROGRESS_FLOOR) / estimate
            }
            None => (u64::from(self.percent).max(PROGRESS_FLOOR) + PROGRESS_STEP).min(PROGRESS_CEILING),
        };
        self.percent = self.percent.max(percent as u8);
        Some(ProgressUpdate {
            percent: self.percent,
            rows: self.rows,
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

/// Result of a finished export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportOutcome {
    /// Data rows written to the artifact.
    pub rows_written: u64,
    pub columns: u32,
    pub non_empty_cells: u64,
    pub total_cells: u64,
    /// The source had more rows than the strategy wrote.
    pub truncated: bool,
    pub query_time: Duration,
    pub processing_time: Duration,
}

impl ExportOutcome {
    /// Share of non-empty cells, 100 for an empty report.
    pub fn completeness(&self) -> f64 {
        if self.total_cells == 0 {
            100.0
        } else {
            self.non_empty_cells as f64 * 100.0 / self.total_cells as f64
        }
    }

    pub fn warnings(&self) -> u32 {
        u32::from(self.truncated)
    }
}

pub type ProgressFn<'a> = dyn FnMut(ProgressUpdate) + Send + 'a;

pub trait ExportStrategy: Send + Sync {
    fn format(&self) -> ExportFormat;

    fn export(
        &self,
        adapter: &dyn ReportAdapter,
        ctx: &ExportContext,
        out: &mut dyn Write,
        progress: &mut ProgressFn<'_>,
    ) -> Result<ExportOutcome, ExportError>;
}

/// Pulls rows from `adapter` and hands each to `write_row`, timing the
/// adapter separately from the writing. Stops after `limit` rows and peeks
/// one more to detect truncation.
pub(crate) fn drive_rows(
    adapter: &dyn ReportAdapter,
    ctx: &ExportContext,
    limit: Option<u64>,
    progress: &mut ProgressFn<'_>,
    mut write_row: impl FnMut(&[ColumnDef], &[CellValue]) -> Result<(), ExportError>,
) -> Result<ExportOutcome, ExportError> {
    let columns = adapter.columns();
    let mut outcome = ExportOutcome {
        columns: columns.len() as u32,
        ..Default::default()
    };

    let started = Instant::now();
    let estimate = adapter.estimate_rows(&ctx.parameters)?;
    let mut cursor = adapter.rows(&ctx.parameters)?;
    outcome.query_time += started.elapsed();

    let estimate = match (estimate, limit) {
        (Some(e), Some(l)) => Some(e.min(l)),
        (e, _) => e,
    };
    let mut tracker = ProgressTracker::new(ctx.progress_interval_rows, estimate);

    loop {
        if let Some(limit) = limit {
            if outcome.rows_written >= limit {
                let peek = Instant::now();
                outcome.truncated = cursor.next().is_some();
                outcome.query_time += peek.elapsed();
                if outcome.truncated {
                    debug!(job_id = %ctx.job_id, limit, "Row limit reached, output truncated");
                }
                break;
            }
        }

        let fetch = Instant::now();
        let next = cursor.next().transpose()?;
        outcome.query_time += fetch.elapsed();
        let Some(row) = next else {
            break;
        };

        let write = Instant::now();
        outcome.total_cells += row.len() as u64;
        outcome.non_empty_cells += row.iter().filter(|c| !c.is_empty()).count() as u64;
        write_row(&columns[..], &row[..])?;
        outcome.rows_written += 1;
        outcome.processing_time += write.elapsed();

        if let Some(update) = tracker.row_done() {
            progress(update);
        }
    }

    Ok(outcome)
}

/// Maps export formats to strategies. Bound once at start-up.
#[derive(Clone, Default)]
pub struct StrategyFactory {
    strategies: HashMap<ExportFormat, Arc<dyn ExportStrategy>>,
}

impl StrategyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with every built-in strategy.
    pub fn with_defaults() -> Self {
        Self::with_formats(&ExportFormat::ALL)
    }

    /// Factory limited to `formats`.
    pub fn with_formats(formats: &[ExportFormat]) -> Self {
        let mut factory = Self::new();
        for format in formats {
            let strategy: Arc<dyn ExportStrategy> = match format {
                ExportFormat::DelimitedText => Arc::new(DelimitedTextStrategy),
                ExportFormat::Spreadsheet => Arc::new(SpreadsheetStrategy),
                ExportFormat::PaginatedDocument => Arc::new(PaginatedDocumentStrategy),
                ExportFormat::StructuredData => Arc::new(StructuredDataStrategy),
            };
            factory.register(strategy);
        }
        factory
    }

    pub fn register(&mut self, strategy: Arc<dyn ExportStrategy>) {
        self.strategies.insert(strategy.format(), strategy);
    }

    pub fn strategy_for(&self, format: ExportFormat) -> Result<Arc<dyn ExportStrategy>, ReportError> {
        self.strategies.get(&format).cloned().ok_or_else(|| {
            ReportError::Configuration(format!("Export format {} is not supported", format))
        })
    }

    pub fn supported_formats(&self) -> Vec<ExportFormat> {
        let mut formats: Vec<_> = self.strategies.keys().copied().collect();
        formats.sort_by_key(|f| f.as_str());
        formats
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::*;
    use crate::services::adapter::{ColumnType, RecordAdapter};
    use crate::services::data_source::RecordIter;

    /// Adapter yielding `rows` numbered rows, optionally failing at a row.
    pub struct NumberedAdapter {
        pub rows: u64,
        pub fail_at: Option<u64>,
        pub estimate: bool,
    }

    impl NumberedAdapter {
        pub fn new(rows: u64) -> Self {
            Self {
                rows,
                fail_at: None,
                estimate: true,
            }
        }
    }

    impl RecordAdapter for NumberedAdapter {
        type Record = u64;

        fn report_type(&self) -> ReportType {
            ReportType::Summary
        }

        fn columns(&self) -> Vec<ColumnDef> {
            vec![
                ColumnDef::new("n", "Number", ColumnType::Integer),
                ColumnDef::new("label", "Label, quoted", ColumnType::Text),
                ColumnDef::new("ratio", "Ratio", ColumnType::Percentage),
            ]
        }

        fn estimate_rows(&self, _params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
            Ok(self.estimate.then_some(self.rows))
        }

        fn iterate_rows<'a>(
            &'a self,
            _params: &'a ReportParameters,
        ) -> Result<RecordIter<'a, u64>, AdapterError> {
            let fail_at = self.fail_at;
            Ok(Box::new((1..=self.rows).map(move |n| {
                if Some(n) == fail_at {
                    Err(AdapterError::Source(format!("row {} unavailable", n)))
                } else {
                    Ok(n)
                }
            })))
        }

        fn format_row(&self, n: &u64) -> Vec<CellValue> {
            vec![
                CellValue::Integer(*n as i64),
                if n % 2 == 0 {
                    CellValue::text(format!("row \"{}\"", n))
                } else {
                    CellValue::Null
                },
                CellValue::Percentage(*n as f64),
            ]
        }
    }

    pub fn context() -> ExportContext {
        let mut ctx = ExportContext::new(
            uuid::Uuid::new_v4(),
            "Numbers",
            ReportType::Summary,
            ReportParameters::default(),
        );
        ctx.progress_interval_rows = 10;
        ctx
    }

    pub fn run(
        strategy: &dyn ExportStrategy,
        adapter: NumberedAdapter,
        ctx: &ExportContext,
    ) -> (Result<ExportOutcome, ExportError>, Vec<u8>, Vec<ProgressUpdate>) {
        let adapter: Arc<dyn ReportAdapter> = Arc::new(adapter);
        let mut out = Vec::new();
        let mut updates = Vec::new();
        let result = strategy.export(adapter.as_ref(), ctx, &mut out, &mut |u| updates.push(u));
        (result, out, updates)
    }
}
