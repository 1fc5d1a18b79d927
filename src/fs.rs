//! Filesystem abstraction for predicate and envelope I/O
//!
//! Provides:
//! - Filesystem trait: the operations the pipeline needs
//! - OsFs: the real filesystem, temp dirs allocated with `tempfile`
//! - MemFs: in-memory filesystem for hermetic tests

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Filesystem operations used by the writer, attestor and digest step.
///
/// Implementations must be safe for concurrent use.
pub trait Filesystem: Send + Sync {
    /// Allocate a fresh, uniquely named directory and return its path
    fn create_temp_dir(&self, prefix: &str) -> io::Result<PathBuf>;

    /// Create `path` with the given permission bits and write `data`.
    ///
    /// Fails if the file already exists.
    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()>;

    /// Read a whole file
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Permission bits of an existing file
    fn mode(&self, path: &Path) -> io::Result<u32>;
}

/// The host filesystem
#[derive(Debug, Clone, Default)]
pub struct OsFs {
    root: Option<PathBuf>,
}

impl OsFs {
    /// Temp dirs are allocated under the system temp directory
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Temp dirs are allocated under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn temp_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Filesystem for OsFs {
    fn create_temp_dir(&self, prefix: &str) -> io::Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(self.temp_root())?;
        // The caller owns the directory from here on.
        Ok(dir.keep())
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(path)?;
        file.write_all(data)?;
        file.sync_all()
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn mode(&self, path: &Path) -> io::Result<u32> {
        let metadata = fs::metadata(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            Ok(metadata.permissions().mode() & 0o777)
        }
        #[cfg(not(unix))]
        {
            Ok(if metadata.permissions().readonly() { 0o400 } else { 0o600 })
        }
    }
}

/// A file held by `MemFs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemFile {
    pub data: Vec<u8>,
    pub mode: u32,
}

#[derive(Debug, Default)]
struct MemFsInner {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, MemFile>,
}

/// In-memory filesystem rooted at a virtual `/tmp`
#[derive(Debug, Default)]
pub struct MemFs {
    inner: Mutex<MemFsInner>,
    counter: AtomicU64,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, MemFsInner>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memfs lock poisoned"))
    }

    /// All directories created so far
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.lock()
            .map(|inner| inner.dirs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All files written so far, sorted by path
    pub fn files(&self) -> Vec<PathBuf> {
        self.lock()
            .map(|inner| inner.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// A file's contents and mode
    pub fn file(&self, path: &Path) -> Option<MemFile> {
        self.lock().ok().and_then(|inner| inner.files.get(path).cloned())
    }
}

impl Filesystem for MemFs {
    fn create_temp_dir(&self, prefix: &str) -> io::Result<PathBuf> {
        let mut inner = self.lock()?;
        loop {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let dir = PathBuf::from(format!("/tmp/{}{:08}", prefix, n));
            if inner.dirs.insert(dir.clone()) {
                return Ok(dir);
            }
        }
    }

    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        let mut inner = self.lock()?;

        let parent = path.parent().unwrap_or_else(|| Path::new("/"));
        if !inner.dirs.contains(parent) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory does not exist: {}", parent.display()),
            ));
        }
        if inner.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {}", path.display()),
            ));
        }

        inner.files.insert(
            path.to_path_buf(),
            MemFile {
                data: data.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.lock()?
            .files
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such file: {}", path.display()),
                )
            })
    }

    fn mode(&self, path: &Path) -> io::Result<u32> {
        self.lock()?
            .files
            .get(path)
            .map(|f| f.mode)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such file: {}", path.display()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memfs_temp_dirs_unique() {
        let fs = MemFs::new();
        let a = fs.create_temp_dir("vsa-").unwrap();
        let b = fs.create_temp_dir("vsa-").unwrap();
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("vsa-"));
        assert_eq!(fs.dirs().len(), 2);
    }

    #[test]
    fn test_memfs_write_requires_parent() {
        let fs = MemFs::new();
        let err = fs
            .write_file(Path::new("/nowhere/file.json"), b"{}", 0o600)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_memfs_write_read_mode() {
        let fs = MemFs::new();
        let dir = fs.create_temp_dir("t-").unwrap();
        let path = dir.join("a.json");
        fs.write_file(&path, b"data", 0o600).unwrap();
        assert_eq!(fs.read_file(&path).unwrap(), b"data");
        assert_eq!(fs.mode(&path).unwrap(), 0o600);

        let err = fs.write_file(&path, b"again", 0o600).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_osfs_round_trip() {
        let root = tempfile::TempDir::new().unwrap();
        let fs = OsFs::with_root(root.path());
        let dir = fs.create_temp_dir("vsa-").unwrap();
        assert!(dir.starts_with(root.path()));

        let path = dir.join("vsa-x.json");
        fs.write_file(&path, b"{}", 0o600).unwrap();
        assert_eq!(fs.read_file(&path).unwrap(), b"{}");

        #[cfg(unix)]
        assert_eq!(fs.mode(&path).unwrap(), 0o600);
    }

    #[test]
    fn test_osfs_refuses_overwrite() {
        let root = tempfile::TempDir::new().unwrap();
        let fs = OsFs::with_root(root.path());
        let dir = fs.create_temp_dir("vsa-").unwrap();
        let path = dir.join("f");
        fs.write_file(&path, b"1", 0o600).unwrap();
        assert!(fs.write_file(&path, b"2", 0o600).is_err());
    }
}
