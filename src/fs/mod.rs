//! Filesystem abstraction
//!
//! The pipeline touches the filesystem through the four operations of
//! [`FileSystem`], so any backend can stand in for the host OS. [`OsFs`]
//! is the production backend; [`mem::MemFs`] backs the test suites.

pub mod mem;

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::error::FilterError;

/// Metadata for a single directory entry, as reported by `lstat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Base name of the entry.
    pub name: String,
    /// Size in bytes. Zero for directories.
    pub size: u64,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Minimal filesystem surface the pipeline depends on.
///
/// Implementations must be callable from multiple threads at once.
pub trait FileSystem: Send + Sync {
    /// Opens the file at `path` for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Stats `path` without following symbolic links.
    fn lstat(&self, path: &str) -> io::Result<FileInfo>;

    /// Reads the target of the symbolic link at `path`.
    fn read_link(&self, path: &str) -> io::Result<String>;

    /// Lists the entry names of the directory at `path`, sorted ascending.
    fn read_dir_names(&self, path: &str) -> io::Result<Vec<String>>;
}

/// The host operating system's filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl FileSystem for OsFs {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn lstat(&self, path: &str) -> io::Result<FileInfo> {
        let meta = fs::symlink_metadata(path)?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        Ok(FileInfo {
            name,
            size: meta.len(),
            is_dir: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
        })
    }

    fn read_link(&self, path: &str) -> io::Result<String> {
        Ok(fs::read_link(path)?.to_string_lossy().into_owned())
    }

    fn read_dir_names(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// Stats `path`, chasing a symbolic link to its target when `follow` is
/// set. Returns the metadata together with the canonical path: the link
/// target when a link was followed, the input path otherwise.
pub(crate) fn resolve(
    fs: &dyn FileSystem,
    path: &str,
    follow: bool,
) -> Result<(FileInfo, String), FilterError> {
    let info = fs.lstat(path).map_err(|source| FilterError::Stat {
        path: path.to_string(),
        source,
    })?;
    if follow && info.is_symlink {
        let target = fs.read_link(path).map_err(|source| FilterError::Readlink {
            path: path.to_string(),
            source,
        })?;
        let info = fs.lstat(&target).map_err(|source| FilterError::Stat {
            path: target.clone(),
            source,
        })?;
        return Ok((info, target));
    }
    Ok((info, path.to_string()))
}

/// Joins a directory path and an entry name.
pub(crate) fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir == "." {
        return name.to_string();
    }
    if dir == "/" {
        return format!("/{name}");
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
    use super::mem::MemFs;
    use super::*;
    use std::io::Write;

    #[test]
    fn join_handles_roots() {
        assert_eq!(join("root", "a"), "root/a");
        assert_eq!(join("root/", "a"), "root/a");
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("", "a"), "a");
        assert_eq!(join(".", "a"), "a");
    }

    #[test]
    fn resolve_returns_input_path_for_regular_files() {
        let mut fs = MemFs::new();
        fs.insert("dir/file", b"hello".to_vec());

        let (info, path) = resolve(&fs, "dir/file", true).unwrap();
        assert_eq!(path, "dir/file");
        assert_eq!(info.size, 5);
        assert!(!info.is_dir);
    }

    #[test]
    fn resolve_follows_links_to_their_target() {
        let mut fs = MemFs::new();
        fs.insert("target", b"contents".to_vec());
        fs.symlink("link", "target");

        // Not following: the link itself, whose size is its target string.
        let (info, path) = resolve(&fs, "link", false).unwrap();
        assert_eq!(path, "link");
        assert!(info.is_symlink);

        // Following: metadata and path of the target.
        let (info, path) = resolve(&fs, "link", true).unwrap();
        assert_eq!(path, "target");
        assert!(!info.is_symlink);
        assert_eq!(info.size, 8);
    }

    #[test]
    fn resolve_reports_missing_paths() {
        let fs = MemFs::new();
        let err = resolve(&fs, "bogus", false).unwrap_err();
        assert_eq!(err.to_string(), "lstat bogus: file does not exist");
    }

    #[test]
    fn os_fs_lists_sorted_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            let mut f = fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(b"x").unwrap();
        }

        let names = OsFs.read_dir_names(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn os_fs_stats_and_opens_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, b"abcd").unwrap();

        let path = path.to_str().unwrap();
        let info = OsFs.lstat(path).unwrap();
        assert_eq!(info.name, "data");
        assert_eq!(info.size, 4);
        assert!(!info.is_dir);

        let mut contents = Vec::new();
        OsFs.open(path).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"abcd");
    }
}
