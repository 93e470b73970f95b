//! Projections of finished jobs: JSON/CSV/PDF exports and dashboard stats.

pub mod csv;
pub mod export;
pub mod pdf;
pub mod summary;

pub use export::{assemble, ExportDocument, ExportFormat, JobExport};
pub use pdf::PdfReport;
pub use summary::{stats_summary, stats_throughput, SeveritySummary, ThroughputPoint};
