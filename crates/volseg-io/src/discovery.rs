//! Recursive file discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{IoError, Result};

/// Collect every file below `root` whose extension matches `extension`
/// (case-insensitive, with or without the leading dot), sorted by path.
pub fn find_files<P: AsRef<Path>>(root: P, extension: &str) -> Result<Vec<PathBuf>> {
    let wanted = extension.trim_start_matches('.').to_ascii_lowercase();
    let mut files = Vec::new();

    for entry in WalkDir::new(root.as_ref()).follow_links(true) {
        let entry = entry.map_err(|e| IoError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.to_ascii_lowercase() == wanted);
        if matches {
            files.push(entry.into_path());
        }
    }

    files.sort();
    tracing::debug!(extension = %wanted, count = files.len(), "Discovered files");
    Ok(files)
}

/// Directories containing at least one file with `extension`, sorted.
///
/// DICOM series are usually stored one per directory, so this yields the
/// candidate series directories below a study root.
pub fn find_directories_with<P: AsRef<Path>>(root: P, extension: &str) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = find_files(root, extension)?
        .into_iter()
        .filter_map(|f| f.parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    dirs.dedup();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_files_recursive() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("patient").join("series");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("b.dcm"), b"").unwrap();
        fs::write(nested.join("a.DCM"), b"").unwrap();
        fs::write(temp.path().join("label.mhd"), b"").unwrap();
        fs::write(temp.path().join("label.raw"), b"").unwrap();

        let dicoms = find_files(temp.path(), ".dcm").unwrap();
        assert_eq!(dicoms, vec![nested.join("a.DCM"), nested.join("b.dcm")]);

        let headers = find_files(temp.path(), "mhd").unwrap();
        assert_eq!(headers, vec![temp.path().join("label.mhd")]);

        assert_eq!(find_directories_with(temp.path(), "dcm").unwrap(), vec![nested]);
    }

    #[test]
    fn test_find_files_missing_root() {
        assert!(find_files("/non/existent/root", "dcm").is_err());
    }
}
