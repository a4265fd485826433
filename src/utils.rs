// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for simscan

use std::path::{Path, PathBuf};

/// The name of the data directory
pub const DATA_DIR: &str = ".simscan";

/// File name of the vector index container inside the data directory
pub const INDEX_FILE: &str = "vectors.idx";

/// Find the nearest .simscan directory by walking up from the given path.
/// Returns None if no .simscan directory is found.
pub fn find_data_root(start: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start.as_ref().to_path_buf();

    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    loop {
        let data_path = current.join(DATA_DIR);
        if data_path.is_dir() {
            return Some(data_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Get the data directory for a path, walking up to find parent repositories.
/// Falls back to `.simscan` under the given path.
pub fn get_data_dir(path: impl AsRef<Path>) -> PathBuf {
    find_data_root(&path).unwrap_or_else(|| path.as_ref().join(DATA_DIR))
}

/// Path of the vector index container inside a data directory.
pub fn index_file(data_dir: &Path) -> PathBuf {
    data_dir.join(INDEX_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_data_root_in_current_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(DATA_DIR)).unwrap();

        let found = find_data_root(dir.path()).unwrap();
        assert_eq!(found, dir.path().canonicalize().unwrap().join(DATA_DIR));
    }

    #[test]
    fn find_data_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(DATA_DIR)).unwrap();
        let subdir = dir.path().join("essays");
        fs::create_dir(&subdir).unwrap();

        let found = find_data_root(&subdir).unwrap();
        assert_eq!(found, dir.path().canonicalize().unwrap().join(DATA_DIR));
    }

    #[test]
    fn get_data_dir_fallback() {
        let dir = TempDir::new().unwrap();
        assert_eq!(get_data_dir(dir.path()), dir.path().join(DATA_DIR));
        assert_eq!(
            index_file(&get_data_dir(dir.path())),
            dir.path().join(DATA_DIR).join(INDEX_FILE)
        );
    }
}
