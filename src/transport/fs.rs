use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Existence checks used by input path resolution.
///
/// Implementations must be shareable across threads; the resolver probes
/// candidates in parallel.
pub trait FileSystem: Send + Sync {
    /// True if `path` exists.
    fn exists(&self, path: &Path) -> io::Result<bool>;
}

/// `FileSystem` backed by the local disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }
}

/// Fixed set of paths, for callers whose storage is not the local disk.
#[derive(Clone, Debug, Default)]
pub struct StaticFileSystem {
    paths: BTreeSet<PathBuf>,
}

impl StaticFileSystem {
    /// Create a listing from known paths.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl FileSystem for StaticFileSystem {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.paths.contains(path))
    }
}

/// True if the path has a `.txt` extension (case-insensitive).
pub fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

/// Every regular file under `root`, sorted by path.
///
/// Sorting keeps downstream processing order reproducible regardless of
/// directory enumeration order.
pub fn sorted_files_under(
    root: &Path,
    follow_links: bool,
    text_files_only: bool,
) -> io::Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root);
    if follow_links {
        walker = walker.follow_links(true);
    }
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if text_files_only && !is_text_file(path) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    Ok(files)
}
