//! Cross-platform utilities: file system helpers and progress display.

pub mod fs;
pub mod progress;

pub use fs::{
    atomic_write, ensure_dir, join_normalized, normalize_path_for_storage, remove_dir_all,
    write_if_changed,
};
pub use progress::TaskProgress;
