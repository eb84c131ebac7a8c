//! Shared helpers: file system operations, scoped temporary directories and
//! progress indicators.

pub mod fs;
pub mod progress;
pub mod temp;

pub use fs::{atomic_write, copy_dir_all, ensure_dir, list_files, remove_dir_all, sha256_file};
pub use progress::ProgressBar;
pub use temp::TempDir;
