//! Acquisition directory and registry name generation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use regex::Regex;

use crate::error_handling::types::AcquisitionError;

/// Returns the next free `<prefix>_<N>` name under `root`, creating `root` if needed.
///
/// N is one more than the largest index found among the children of `root`
/// whose name starts with `<prefix>_` followed by digits. Anything after the
/// digits is ignored, so `Acq_7foo` counts as index 7.
pub fn next_directory_name(root: &Path, prefix: &str) -> Result<String, AcquisitionError> {
    fs::create_dir_all(root).map_err(|e| {
        error!("Failed to create root directory {}: {}", root.display(), e);
        AcquisitionError::DirectoryResolutionFailed(format!("{}: {}", root.display(), e))
    })?;

    let pattern = format!("^{}(\\d+)", regex::escape(&format!("{}_", prefix)));
    let index = Regex::new(&pattern)
        .map_err(|e| AcquisitionError::DirectoryResolutionFailed(e.to_string()))?;

    let entries = fs::read_dir(root).map_err(|e| {
        error!("Failed to list {}: {}", root.display(), e);
        AcquisitionError::DirectoryResolutionFailed(format!("{}: {}", root.display(), e))
    })?;

    let mut max = 0u64;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if let Some(n) = index
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        {
            if n == u64::MAX {
                debug!("Ignoring {}: index has no successor", name);
                continue;
            }
            max = max.max(n);
        }
    }
    Ok(format!("{}_{}", prefix, max + 1))
}

/// Creates a fresh `<prefix>_<N>` directory under `root` and returns its name and path.
///
/// The directory is created with a create-if-absent call; when another writer
/// took the same index first the scan is repeated.
pub fn reserve_directory(root: &Path, prefix: &str) -> Result<(String, PathBuf), AcquisitionError> {
    loop {
        let name = next_directory_name(root, prefix)?;
        let path = root.join(&name);
        match fs::create_dir(&path) {
            Ok(()) => {
                info!("Reserved acquisition directory {}", path.display());
                return Ok((name, path));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("{} was taken concurrently, rescanning", path.display());
            }
            Err(e) => {
                error!("Failed to create {}: {}", path.display(), e);
                return Err(AcquisitionError::DirectoryResolutionFailed(format!(
                    "{}: {}",
                    path.display(),
                    e
                )));
            }
        }
    }
}

/// Derives a name from `candidate` for which `taken` returns false.
///
/// `Acq_4` becomes `Acq_5`; a name without a numeric suffix gets `_1` appended.
pub fn unique_name<F>(candidate: &str, mut taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    let mut name = candidate.to_string();
    while taken(&name) {
        name = match name.rsplit_once('_') {
            Some((base, suffix)) => match suffix.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
                Some(next) => format!("{}_{}", base, next),
                None => format!("{}_1", name),
            },
            None => format!("{}_1", name),
        };
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_root_starts_at_one() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("not").join("there");
        assert_eq!(next_directory_name(&root, "Acq").unwrap(), "Acq_1");
        assert!(root.is_dir());
    }

    #[test]
    fn highest_index_wins_and_suffixes_are_ignored() {
        let dir = TempDir::new().unwrap();
        for child in ["Acq_1", "Acq_3", "Acq_7foo", "Acq_x9", "Other_12"] {
            fs::create_dir(dir.path().join(child)).unwrap();
        }
        fs::write(dir.path().join("Acq_2.txt"), b"").unwrap();
        assert_eq!(next_directory_name(dir.path(), "Acq").unwrap(), "Acq_8");
    }

    #[test]
    fn prefix_is_matched_literally() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("a.b_4")).unwrap();
        fs::create_dir(dir.path().join("axb_9")).unwrap();
        assert_eq!(next_directory_name(dir.path(), "a.b").unwrap(), "a.b_5");
    }

    #[test]
    fn reserved_directories_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let (first, first_path) = reserve_directory(dir.path(), "Run").unwrap();
        let (second, _) = reserve_directory(dir.path(), "Run").unwrap();
        assert_eq!(first, "Run_1");
        assert_eq!(second, "Run_2");
        assert!(first_path.is_dir());
    }

    #[test]
    fn unique_name_increments_suffix() {
        let live = ["Acq", "Acq_1"];
        assert_eq!(unique_name("Acq", |n| live.contains(&n)), "Acq_2");
        assert_eq!(unique_name("Fresh", |n| live.contains(&n)), "Fresh");
        assert_eq!(unique_name("my_scan", |n| n == "my_scan"), "my_scan_1");
        assert_eq!(unique_name("Acq_9", |n| n == "Acq_9"), "Acq_10");
    }

    #[test]
    fn largest_index_does_not_overflow() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Acq_4")).unwrap();
        fs::create_dir(dir.path().join("Acq_18446744073709551615")).unwrap();
        assert_eq!(next_directory_name(dir.path(), "Acq").unwrap(), "Acq_5");

        let max = "Acq_18446744073709551615";
        assert_eq!(unique_name(max, |n| n == max), "Acq_18446744073709551615_1");
    }
}
