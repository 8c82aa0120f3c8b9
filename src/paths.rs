//! Output locations derived from a source recording path.
//!
//! Every derivative sits next to its source, optionally in a named
//! sub-directory that is created on demand:
//!
//! | output         | directory      | name                  |
//! |----------------|----------------|-----------------------|
//! | filtered       | `01_filtered`  | `<stem>__F.edf`       |
//! | PSD report     | `02_psd`       | `<stem>__report.xlsx` |
//! | FOOOF report   | `foof_report`  | `<stem>__psd.xlsx/.png` |
//! | split halves   | (same)         | `<stem><suffix>.edf`  |
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::recording::SUPPORTED_EXTENSIONS;

pub const FILTERED_DIR: &str = "01_filtered";
pub const PSD_DIR: &str = "02_psd";
pub const FOOOF_DIR: &str = "foof_report";

/// Builds `<parent>/<dir>/<stem><suffix>.<ext>` and creates the directory.
///
/// Calling it again with the same arguments returns the same path.
///
/// ```rust
/// use ratat::paths::get_step_filename;
/// # let root = std::env::temp_dir().join(format!("ratat_doc_paths_{}", std::process::id()));
/// # std::fs::create_dir_all(&root).unwrap();
///
/// let source = root.join("rat7.bdf");
/// let out = get_step_filename(&source, Some("01_filtered"), Some("__F"), Some("edf")).unwrap();
/// assert_eq!(out, root.join("01_filtered").join("rat7__F.edf"));
/// assert!(root.join("01_filtered").is_dir());
/// # std::fs::remove_dir_all(&root).ok();
/// ```
pub fn get_step_filename<P: AsRef<Path>>(
    path: P,
    dir: Option<&str>,
    suffix: Option<&str>,
    ext: Option<&str>,
) -> Result<PathBuf> {
    let target = step_path(path.as_ref(), dir, suffix, ext);
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            debug!(dir = %parent.display(), "creating output directory");
            fs::create_dir_all(parent)?;
        }
    }
    Ok(target)
}

fn step_path(path: &Path, dir: Option<&str>, suffix: Option<&str>, ext: Option<&str>) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let parent = match dir {
        Some(d) => parent.join(d),
        None => parent.to_path_buf(),
    };

    let mut name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(suffix) = suffix {
        name.push_str(suffix);
    }
    let ext = ext
        .map(str::to_string)
        .or_else(|| path.extension().map(|e| e.to_string_lossy().into_owned()));
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(&ext);
    }

    parent.join(name)
}

pub fn filtered_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    get_step_filename(path, Some(FILTERED_DIR), Some("__F"), Some("edf"))
}

pub fn psd_report_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    get_step_filename(path, Some(PSD_DIR), Some("__report"), Some("xlsx"))
}

/// `(xlsx, png)`.
pub fn fooof_report_paths<P: AsRef<Path>>(path: P) -> Result<(PathBuf, PathBuf)> {
    let path = path.as_ref();
    Ok((
        get_step_filename(path, Some(FOOOF_DIR), Some("__psd"), Some("xlsx"))?,
        get_step_filename(path, Some(FOOOF_DIR), Some("__psd"), Some("png"))?,
    ))
}

pub fn split_path<P: AsRef<Path>>(path: P, suffix: &str) -> Result<PathBuf> {
    get_step_filename(path, None, Some(suffix), Some("edf"))
}

/// A recording file found by [`scan_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingEntry {
    pub path: PathBuf,
    /// The `01_filtered` derivative exists.
    pub filtered: bool,
}

/// Lists `.edf`/`.bdf` files in `dir`, sorted by name. Does not create
/// any directory.
pub fn scan_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<RecordingEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e));
        if !supported {
            continue;
        }
        let filtered = step_path(&path, Some(FILTERED_DIR), Some("__F"), Some("edf")).exists();
        entries.push(RecordingEntry { path, filtered });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("ratat_paths_{}_{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn derived_names() {
        let root = scratch_dir("names");
        let src = root.join("a.b.bdf");

        assert_eq!(filtered_path(&src).unwrap(), root.join("01_filtered/a.b__F.edf"));
        assert_eq!(psd_report_path(&src).unwrap(), root.join("02_psd/a.b__report.xlsx"));
        let (xlsx, png) = fooof_report_paths(&src).unwrap();
        assert_eq!(xlsx, root.join("foof_report/a.b__psd.xlsx"));
        assert_eq!(png, root.join("foof_report/a.b__psd.png"));
        assert_eq!(split_path(&src, "_1").unwrap(), root.join("a.b_1.edf"));
        assert_eq!(get_step_filename(&src, None, None, None).unwrap(), src);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn step_filename_is_idempotent() {
        let root = scratch_dir("idem");
        let src = root.join("x.edf");
        let first = get_step_filename(&src, Some("out"), Some("_s"), None).unwrap();
        let second = get_step_filename(&src, Some("out"), Some("_s"), None).unwrap();
        assert_eq!(first, second);
        assert!(root.join("out").is_dir());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn scan_lists_supported_files() {
        let root = scratch_dir("scan");
        for name in ["b.edf", "a.bdf", "c.EDF", "notes.txt"] {
            fs::write(root.join(name), b"").unwrap();
        }
        let filtered = filtered_path(root.join("a.bdf")).unwrap();
        fs::write(&filtered, b"").unwrap();

        let entries = scan_directory(&root).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.bdf", "b.edf"]);
        assert!(entries[0].filtered);
        assert!(!entries[1].filtered);

        fs::remove_dir_all(&root).ok();
    }
}
