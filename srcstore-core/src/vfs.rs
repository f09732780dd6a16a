//! Virtual filesystems backing stores and build data: local directories
//! and HTTP object storage.

use crate::StoreError;
use ignore::WalkBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Host suffix identifying an object storage endpoint
pub const OBJECT_STORAGE_HOST_SUFFIX: &str = "amazonaws.com";

/// Minimal read/write filesystem. Paths are `/`-separated and relative to
/// the filesystem root.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Read a whole file. Missing files are `StoreError::NotFound`.
    fn read(&self, path: &str) -> crate::Result<Vec<u8>>;

    fn write(&self, path: &str, data: &[u8]) -> crate::Result<()>;

    fn exists(&self, path: &str) -> crate::Result<bool>;

    /// Human-readable location, used in logs.
    fn label(&self) -> String;

    /// Listing support, if the backing medium has it.
    fn as_walkable(&self) -> Option<&dyn Walkable> {
        None
    }

    /// Parent directory creation support, if the backing medium needs it.
    fn as_create_parent_dirs(&mut self) -> Option<&mut dyn CreateParentDirs> {
        None
    }
}

/// Filesystems that can enumerate their files.
pub trait Walkable {
    /// All file paths under `dir`, relative to the filesystem root, sorted.
    fn walk(&self, dir: &str) -> crate::Result<Vec<String>>;
}

/// Filesystems that can create missing parent directories on write.
pub trait CreateParentDirs {
    fn create_parent_dirs(&mut self, enabled: bool);
}

/// True if `root` is a URL whose host is an object storage endpoint.
pub fn is_object_storage_url(root: &str) -> bool {
    match reqwest::Url::parse(root) {
        Ok(url) => url
            .host_str()
            .is_some_and(|host| host.ends_with(OBJECT_STORAGE_HOST_SUFFIX)),
        Err(_) => false,
    }
}

/// Open the filesystem named by `root`: object storage for object storage
/// URLs, a local directory otherwise. Parent directory creation is always
/// switched on where supported.
pub fn open_root(root: &str) -> Arc<dyn FileSystem> {
    let mut fs: Box<dyn FileSystem> = if is_object_storage_url(root) {
        Box::new(ObjectStoreFs::new(root))
    } else {
        Box::new(OsFs::new(root))
    };
    if let Some(fs) = fs.as_create_parent_dirs() {
        fs.create_parent_dirs(true);
    }
    Arc::from(fs)
}

/// Read and decode a JSON file.
pub fn read_json<T: DeserializeOwned>(fs: &dyn FileSystem, path: &str) -> crate::Result<T> {
    let bytes = fs.read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Like `read_json`, but a missing file is `Ok(None)`.
pub fn read_json_opt<T: DeserializeOwned>(
    fs: &dyn FileSystem,
    path: &str,
) -> crate::Result<Option<T>> {
    match fs.read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Encode and write a JSON file. Returns the number of bytes written.
pub fn write_json<T: Serialize>(fs: &dyn FileSystem, path: &str, value: &T) -> crate::Result<u64> {
    let bytes = serde_json::to_vec(value)?;
    fs.write(path, &bytes)?;
    Ok(bytes.len() as u64)
}

/// Local directory filesystem
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
    create_parents: bool,
}

impl OsFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create_parents: false,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileSystem for OsFs {
    fn read(&self, path: &str) -> crate::Result<Vec<u8>> {
        let full = self.resolve(path);
        fs::read(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(full),
            _ => StoreError::Io(e),
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> crate::Result<()> {
        let full = self.resolve(path);
        if self.create_parents {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&full, data)?;
        Ok(())
    }

    fn exists(&self, path: &str) -> crate::Result<bool> {
        Ok(self.resolve(path).is_file())
    }

    fn label(&self) -> String {
        self.root.display().to_string()
    }

    fn as_walkable(&self) -> Option<&dyn Walkable> {
        Some(self)
    }

    fn as_create_parent_dirs(&mut self) -> Option<&mut dyn CreateParentDirs> {
        Some(self)
    }
}

impl Walkable for OsFs {
    fn walk(&self, dir: &str) -> crate::Result<Vec<String>> {
        let start = self.resolve(dir);
        if !start.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkBuilder::new(&start)
            .standard_filters(false)
            .hidden(false)
            .build()
        {
            let entry = entry.map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push(relative);
        }
        files.sort();
        Ok(files)
    }
}

impl CreateParentDirs for OsFs {
    fn create_parent_dirs(&mut self, enabled: bool) {
        self.create_parents = enabled;
    }
}

/// Object storage over plain HTTP verbs (GET/PUT/HEAD) on `<base>/<path>`.
/// Object storage has no directories, so it needs no parent creation and
/// offers no listing.
#[derive(Debug, Clone)]
pub struct ObjectStoreFs {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl ObjectStoreFs {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl FileSystem for ObjectStoreFs {
    fn read(&self, path: &str) -> crate::Result<Vec<u8>> {
        let url = self.url(path);
        let resp = self.client.get(&url).send()?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(PathBuf::from(url)));
        }
        if !status.is_success() {
            return Err(StoreError::ObjectStorage {
                url,
                status: status.as_u16(),
            });
        }
        Ok(resp.bytes()?.to_vec())
    }

    fn write(&self, path: &str, data: &[u8]) -> crate::Result<()> {
        let url = self.url(path);
        let resp = self.client.put(&url).body(data.to_vec()).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::ObjectStorage {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> crate::Result<bool> {
        let url = self.url(path);
        let status = self.client.head(&url).send()?.status();
        if status.is_success() {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(StoreError::ObjectStorage {
                url,
                status: status.as_u16(),
            })
        }
    }

    fn label(&self) -> String {
        self.base_url.clone()
    }
}

/// View of another filesystem rooted at a sub-path.
#[derive(Debug, Clone)]
pub struct PrefixFs {
    inner: Arc<dyn FileSystem>,
    prefix: String,
}

impl PrefixFs {
    pub fn new(inner: Arc<dyn FileSystem>, prefix: &str) -> Self {
        Self {
            inner,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn join(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.prefix.is_empty() {
            path.to_string()
        } else if path.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }
}

impl FileSystem for PrefixFs {
    fn read(&self, path: &str) -> crate::Result<Vec<u8>> {
        self.inner.read(&self.join(path))
    }

    fn write(&self, path: &str, data: &[u8]) -> crate::Result<()> {
        self.inner.write(&self.join(path), data)
    }

    fn exists(&self, path: &str) -> crate::Result<bool> {
        self.inner.exists(&self.join(path))
    }

    fn label(&self) -> String {
        format!("{}/{}", self.inner.label(), self.prefix)
    }

    fn as_walkable(&self) -> Option<&dyn Walkable> {
        self.inner.as_walkable().map(|_| self as &dyn Walkable)
    }
}

impl Walkable for PrefixFs {
    fn walk(&self, dir: &str) -> crate::Result<Vec<String>> {
        let Some(inner) = self.inner.as_walkable() else {
            return Ok(Vec::new());
        };
        let strip = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        };
        Ok(inner
            .walk(&self.join(dir))?
            .into_iter()
            .map(|p| p.strip_prefix(&strip).map(str::to_string).unwrap_or(p))
            .collect())
    }
}
