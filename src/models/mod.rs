pub mod library;
pub mod loaders;
pub mod report;
pub mod sample;
pub mod session;
pub mod work;

pub use library::{derive_progress, ReconciledLibraryEntry};
pub use loaders::{export_files_from_config, load_export_files, ExportFile, LoadedExport};
pub use report::{
    FallbackSource, ImportOutcome, ImportReport, LoadReport, RejectedBatch, ScrapeOutcome,
    SourceReport,
};
pub use session::{AuthSession, SessionToken};
pub use work::{Origin, ReadingStatus, WorkRecord};
