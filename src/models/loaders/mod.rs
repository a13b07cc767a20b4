pub mod export_loader;

pub use export_loader::{export_files_from_config, load_export_file, load_export_files, ExportFile, LoadedExport};
