//! Domain services for volunteer reports.
//!
//! Adapters and export strategies are pure, synchronous building blocks.
//! Orchestration (the generation coordinator, scheduling, sharing and
//! retention) lives in the api crate on top of the store traits defined here.

pub mod adapter;
pub mod data_source;
pub mod export;
pub mod storage;
pub mod store;

pub use adapter::{
    AdapterError, AdapterRegistry, CellValue, ColumnDef, ColumnType, RecordAdapter, ReportAdapter,
    RowCursor,
};
pub use data_source::{InMemoryDataSource, RecordIter, RecordKind, VolunteerDataSource};
pub use export::{
    ExportContext, ExportError, ExportOutcome, ExportStrategy, ProgressTracker, ProgressUpdate,
    StrategyFactory,
};
pub use storage::{artifact_path, ArtifactStorage, ArtifactWriter, StorageError};
pub use store::{
    ExpiryCursor, ReportJobStore, ReportMetricsStore, ReportScheduleStore, ReportShareStore, ReportStores,
    ReportTemplateStore, StoreError,
};
