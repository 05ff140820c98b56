//! Подготовка датасета к replay: чтение/запись CSV, разбор timestamp'ов,
//! вычисление задержек между событиями, rebase и split по дате.

use std::path::{Path, PathBuf};

mod csv;
mod delay;
mod error;
mod timestamp;
mod transform;

pub use csv::{load_csv, read_csv, save_csv, write_csv};
pub use delay::derive;
pub use error::DatasetError;
pub use timestamp::{format_timestamp, parse_timestamp};
pub use transform::{rebase, split_by_cutoff};

/// `data/events.csv` → `data/events_processed.csv`.
pub fn processed_path(path: &Path) -> PathBuf {
    suffixed_path(path, "processed")
}

/// `data/events.csv` → (`data/events_historic.csv`, `data/events_new.csv`).
pub fn split_paths(path: &Path) -> (PathBuf, PathBuf) {
    (suffixed_path(path, "historic"), suffixed_path(path, "new"))
}

fn suffixed_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    path.with_file_name(name)
}
