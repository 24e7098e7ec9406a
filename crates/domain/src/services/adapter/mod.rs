//! Report adapters: per report type suppliers of columns and rows.
//!
//! Adapters are written against [`RecordAdapter`], which works with a typed
//! record. The blanket implementation erases the record type so strategies
//! and the coordinator only deal with [`ReportAdapter`] trait objects.

mod event_performance;
mod role_assignment;
mod summary;
mod venue_utilization;
mod volunteer_detail;

pub use event_performance::EventPerformanceAdapter;
pub use role_assignment::RoleAssignmentAdapter;
pub use summary::SummaryAdapter;
pub use venue_utilization::VenueUtilizationAdapter;
pub use volunteer_detail::VolunteerDetailAdapter;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::error::ReportError;
use crate::models::{ReportParameters, ReportType};
use crate::services::data_source::{RecordIter, VolunteerDataSource};

/// Failure while producing report rows.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("data source error: {0}")]
    Source(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Decimal,
    Percentage,
    Date,
    DateTime,
    Boolean,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Percentage => "percentage",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Boolean => "boolean",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::Decimal | ColumnType::Percentage
        )
    }
}

/// Column definition. `key` names the field in structured output and
/// `label` is the human readable header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub key: &'static str,
    pub label: &'static str,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub const fn new(key: &'static str, label: &'static str, column_type: ColumnType) -> Self {
        Self {
            key,
            label,
            column_type,
        }
    }
}

/// A single formatted cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Percentage(f64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Boolean(bool),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn optional_text(value: Option<impl Into<String>>) -> Self {
        value.map_or(CellValue::Null, |v| CellValue::Text(v.into()))
    }

    /// Ratio `part / whole` as a percentage, `Null` when `whole` is zero.
    pub fn ratio(part: f64, whole: f64) -> Self {
        if whole > 0.0 {
            CellValue::Percentage(part * 100.0 / whole)
        } else {
            CellValue::Null
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn to_plain_string(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Decimal(d) => format!("{:.2}", d),
            CellValue::Percentage(p) => format!("{:.1}", p),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::DateTime(dt) => dt.to_rfc3339(),
            CellValue::Boolean(b) => b.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Integer(i) => Value::from(*i),
            CellValue::Decimal(d) | CellValue::Percentage(d) => {
                let rounded = (d * 100.0).round() / 100.0;
                serde_json::Number::from_f64(rounded).map_or(Value::Null, Value::Number)
            }
            CellValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            CellValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            CellValue::Boolean(b) => Value::Bool(*b),
        }
    }
}

/// Lazy, finite, non-restartable sequence of formatted rows.
pub type RowCursor<'a> = Box<dyn Iterator<Item = Result<Vec<CellValue>, AdapterError>> + Send + 'a>;

/// Object-safe adapter consumed by export strategies.
pub trait ReportAdapter: Send + Sync {
    fn report_type(&self) -> ReportType;

    fn columns(&self) -> Vec<ColumnDef>;

    /// Expected number of rows, when cheaply known.
    fn estimate_rows(&self, params: &ReportParameters) -> Result<Option<u64>, AdapterError>;

    fn rows<'a>(&'a self, params: &'a ReportParameters) -> Result<RowCursor<'a>, AdapterError>;
}

/// Adapter over a typed record.
pub trait RecordAdapter: Send + Sync {
    type Record: Send;

    fn report_type(&self) -> ReportType;

    fn columns(&self) -> Vec<ColumnDef>;

    fn estimate_rows(&self, _params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        Ok(None)
    }

    fn iterate_rows<'a>(
        &'a self,
        params: &'a ReportParameters,
    ) -> Result<RecordIter<'a, Self::Record>, AdapterError>;

    /// Cells for `record`, in column order.
    fn format_row(&self, record: &Self::Record) -> Vec<CellValue>;
}

impl<T: RecordAdapter> ReportAdapter for T {
    fn report_type(&self) -> ReportType {
        RecordAdapter::report_type(self)
    }

    fn columns(&self) -> Vec<ColumnDef> {
        RecordAdapter::columns(self)
    }

    fn estimate_rows(&self, params: &ReportParameters) -> Result<Option<u64>, AdapterError> {
        RecordAdapter::estimate_rows(self, params)
    }

    fn rows<'a>(&'a self, params: &'a ReportParameters) -> Result<RowCursor<'a>, AdapterError> {
        let records = self.iterate_rows(params)?;
        Ok(Box::new(
            records.map(move |record| record.map(|r| self.format_row(&r))),
        ))
    }
}

/// Adapters keyed by report type.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ReportType, Arc<dyn ReportAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapter for every report type.
    pub fn with_defaults(source: Arc<dyn VolunteerDataSource>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SummaryAdapter::new(source.clone())));
        registry.register(Arc::new(VolunteerDetailAdapter::new(source.clone())));
        registry.register(Arc::new(EventPerformanceAdapter::new(source.clone())));
        registry.register(Arc::new(VenueUtilizationAdapter::new(source.clone())));
        registry.register(Arc::new(RoleAssignmentAdapter::new(source)));
        registry
    }

    /// Registers `adapter`, replacing any adapter for the same report type.
    pub fn register(&mut self, adapter: Arc<dyn ReportAdapter>) {
        self.adapters.insert(adapter.report_type(), adapter);
    }

    pub fn get(&self, report_type: ReportType) -> Result<Arc<dyn ReportAdapter>, ReportError> {
        self.adapters.get(&report_type).cloned().ok_or_else(|| {
            ReportError::Configuration(format!("No adapter registered for report type {}", report_type))
        })
    }

    pub fn supports(&self, report_type: ReportType) -> bool {
        self.adapters.contains_key(&report_type)
    }
}

/// Drains a record iterator, stopping at the first error.
pub(crate) fn collect_records<T>(iter: RecordIter<'_, T>) -> Result<Vec<T>, AdapterError> {
    iter.collect()
}

/// Parameters limited to the event/venue/role scope, used for lookups that
/// must not apply the date or status filters of the main query.
pub(crate) fn lookup_scope(params: &ReportParameters) -> ReportParameters {
    ReportParameters {
        event_id: params.event_id,
        venue_id: params.venue_id,
        role_id: params.role_id,
        include_inactive: Some(true),
        ..Default::default()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::data_source::InMemoryDataSource;

    #[test]
    fn test_cell_plain_strings() {
        assert_eq!(CellValue::Null.to_plain_string(), "");
        assert_eq!(CellValue::Decimal(2.0).to_plain_string(), "2.00");
        assert_eq!(CellValue::Percentage(66.666).to_plain_string(), "66.7");
        assert_eq!(
            CellValue::Date(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()).to_plain_string(),
            "2026-01-02"
        );
    }

    #[test]
    fn test_cell_json() {
        assert_eq!(CellValue::Integer(4).to_json(), serde_json::json!(4));
        assert_eq!(CellValue::Decimal(1.005).to_json(), serde_json::json!(1.0));
        assert_eq!(CellValue::Decimal(f64::NAN).to_json(), Value::Null);
        assert_eq!(CellValue::Boolean(true).to_json(), Value::Bool(true));
    }

    #[test]
    fn test_ratio_handles_zero_whole() {
        assert_eq!(CellValue::ratio(1.0, 0.0), CellValue::Null);
        assert_eq!(CellValue::ratio(1.0, 4.0), CellValue::Percentage(25.0));
    }

    #[test]
    fn test_empty_cells() {
        assert!(CellValue::Null.is_empty());
        assert!(CellValue::text("  ").is_empty());
        assert!(!CellValue::Integer(0).is_empty());
    }

    #[test]
    fn test_registry_defaults_cover_all_types() {
        let registry = AdapterRegistry::with_defaults(Arc::new(InMemoryDataSource::new()));
        for report_type in ReportType::ALL {
            let adapter = registry.get(report_type).unwrap();
            assert_eq!(adapter.report_type(), report_type);
            assert!(!adapter.columns().is_empty());
        }
    }

    #[test]
    fn test_registry_miss_is_configuration_error() {
        let registry = AdapterRegistry::new();
        let err = registry.get(ReportType::Summary).err().unwrap();
        assert!(matches!(err, ReportError::Configuration(_)));
    }

    #[test]
    fn test_row_width_matches_columns() {
        let sample = fixtures::sample();
        let registry = AdapterRegistry::with_defaults(Arc::new(sample.source));
        let params = ReportParameters {
            include_inactive: Some(true),
            ..Default::default()
        };
        for report_type in ReportType::ALL {
            let adapter = registry.get(report_type).unwrap();
            let width = adapter.columns().len();
            for row in adapter.rows(&params).unwrap() {
                assert_eq!(row.unwrap().len(), width, "{}", report_type);
            }
        }
    }
}
