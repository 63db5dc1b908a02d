//! In-memory filesystem backend.
//!
//! Paths use `/` separators without a leading slash; `""`, `"."`, and
//! `"/"` all address the root. Directories are implied by the paths of the
//! files beneath them.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, ErrorKind, Read};

use super::{FileInfo, FileSystem};

/// Filesystem backed by a map of path to contents.
#[derive(Debug, Default, Clone)]
pub struct MemFs {
    files: BTreeMap<String, Vec<u8>>,
    links: BTreeSet<String>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a regular file.
    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    /// Adds a symbolic link at `path` pointing at `target`.
    pub fn symlink(&mut self, path: impl Into<String>, target: impl Into<String>) {
        let path = path.into();
        self.files.insert(path.clone(), target.into().into_bytes());
        self.links.insert(path);
    }

    fn is_dir(&self, norm: &str) -> bool {
        if norm.is_empty() {
            return !self.files.is_empty();
        }
        let prefix = format!("{norm}/");
        self.files.keys().any(|key| key.starts_with(&prefix))
    }
}

impl FileSystem for MemFs {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        match self.files.get(normalize(path)) {
            Some(contents) => Ok(Box::new(Cursor::new(contents.clone()))),
            None => Err(not_found()),
        }
    }

    fn lstat(&self, path: &str) -> io::Result<FileInfo> {
        let norm = normalize(path);
        if let Some(contents) = self.files.get(norm) {
            return Ok(FileInfo {
                name: base_name(norm),
                size: contents.len() as u64,
                is_dir: false,
                is_symlink: self.links.contains(norm),
            });
        }
        if self.is_dir(norm) {
            return Ok(FileInfo {
                name: base_name(norm),
                size: 0,
                is_dir: true,
                is_symlink: false,
            });
        }
        Err(not_found())
    }

    fn read_link(&self, path: &str) -> io::Result<String> {
        let norm = normalize(path);
        if self.links.contains(norm) {
            if let Some(contents) = self.files.get(norm) {
                return Ok(String::from_utf8_lossy(contents).into_owned());
            }
        }
        Err(io::Error::new(ErrorKind::InvalidInput, "invalid argument"))
    }

    fn read_dir_names(&self, path: &str) -> io::Result<Vec<String>> {
        let norm = normalize(path);
        let mut names = BTreeSet::new();
        for key in self.files.keys() {
            if norm.is_empty() {
                if let Some(first) = key.split('/').next() {
                    names.insert(first.to_string());
                }
            } else if let Some(rest) = key.strip_prefix(norm).and_then(|r| r.strip_prefix('/')) {
                if let Some(first) = rest.split('/').next() {
                    if !first.is_empty() {
                        names.insert(first.to_string());
                    }
                }
            }
        }
        if names.is_empty() {
            return Err(not_found());
        }
        Ok(names.into_iter().collect())
    }
}

fn normalize(path: &str) -> &str {
    let mut p = path.trim_start_matches('/').trim_end_matches('/');
    if let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    if p == "." {
        ""
    } else {
        p
    }
}

fn base_name(norm: &str) -> String {
    match norm.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => ".".to_string(),
    }
}

fn not_found() -> io::Error {
    io::Error::new(ErrorKind::NotFound, "file does not exist")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemFs {
        let mut fs = MemFs::new();
        fs.insert("root/black", b"black".to_vec());
        fs.insert("root/sub/blue", b"blue".to_vec());
        fs.insert("other/lime", b"lime".to_vec());
        fs.symlink("root/link", "other/lime");
        fs
    }

    #[test]
    fn lstat_files_and_directories() {
        let fs = sample();

        let info = fs.lstat("root/black").unwrap();
        assert_eq!(info.name, "black");
        assert_eq!(info.size, 5);
        assert!(!info.is_dir && !info.is_symlink);

        let info = fs.lstat("root").unwrap();
        assert!(info.is_dir);

        let info = fs.lstat("root/link").unwrap();
        assert!(info.is_symlink);
        assert!(!info.is_dir);

        assert_eq!(
            fs.lstat("missing").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn root_spellings_are_equivalent() {
        let fs = sample();
        for root in ["", ".", "/"] {
            let names = fs.read_dir_names(root).unwrap();
            assert_eq!(names, vec!["other", "root"], "root spelled {root:?}");
        }
    }

    #[test]
    fn read_dir_names_is_sorted_and_shallow() {
        let fs = sample();
        let names = fs.read_dir_names("root").unwrap();
        assert_eq!(names, vec!["black", "link", "sub"]);

        assert_eq!(
            fs.read_dir_names("root/black/nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn read_link_only_works_on_links() {
        let fs = sample();
        assert_eq!(fs.read_link("root/link").unwrap(), "other/lime");
        assert_eq!(
            fs.read_link("root/black").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn open_reads_contents() {
        let fs = sample();
        let mut buf = Vec::new();
        fs.open("other/lime").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"lime");
        assert_eq!(fs.open("nope").err().unwrap().kind(), ErrorKind::NotFound);
    }
}
