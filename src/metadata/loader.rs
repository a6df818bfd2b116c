//! Loading and caching of modules referenced by path.
//!
//! The rewriter does not parse binary module files itself. A host supplies a
//! [`ModuleReader`] that turns the raw bytes of a module into a [`Module`]; the
//! [`ModuleCache`] memory-maps the file, hands the bytes to the reader and caches the
//! result per canonical path, so every module is parsed at most once per pass even
//! when many methods are woven in parallel.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use memmap2::Mmap;

use crate::{metadata::Module, Error, Result};

/// Parses the raw bytes of a module file.
pub trait ModuleReader: Send + Sync {
    /// Parses `data`, the full contents of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not a readable module.
    fn read(&self, path: &Path, data: &[u8]) -> Result<Module>;
}

impl<F> ModuleReader for F
where
    F: Fn(&Path, &[u8]) -> Result<Module> + Send + Sync,
{
    fn read(&self, path: &Path, data: &[u8]) -> Result<Module> {
        self(path, data)
    }
}

/// Path-keyed cache of parsed modules.
pub struct ModuleCache {
    reader: Arc<dyn ModuleReader>,
    modules: DashMap<PathBuf, Arc<Module>>,
}

impl ModuleCache {
    /// Creates an empty cache using `reader` to parse files.
    pub fn new(reader: Arc<dyn ModuleReader>) -> Self {
        ModuleCache {
            reader,
            modules: DashMap::new(),
        }
    }

    /// Resolves and caches a module given a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleLoad`] if the file cannot be opened, mapped or parsed.
    pub fn load(&self, path: &Path) -> Result<Arc<Module>> {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if let Some(module) = self.modules.get(&key) {
            return Ok(module.clone());
        }

        let module = Arc::new(self.read(&key)?);
        log::debug!("loaded module {} from {}", module.name, key.display());

        // Another thread may have loaded the same file meanwhile; keep the first one.
        let entry = self.modules.entry(key).or_insert(module);
        Ok(entry.value().clone())
    }

    /// Number of cached modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// True if nothing has been loaded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn read(&self, path: &Path) -> Result<Module> {
        let load_error = |message: String| Error::ModuleLoad {
            path: path.to_path_buf(),
            message,
        };

        let file = fs::File::open(path).map_err(|e| load_error(e.to_string()))?;
        let length = file.metadata().map_err(|e| load_error(e.to_string()))?.len();
        if length == 0 {
            return Err(load_error("file is empty".to_string()));
        }

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(load_error(error.to_string())),
        };

        self.reader.read(path, &mmap).map_err(|error| match error {
            Error::ModuleLoad { .. } => error,
            other => load_error(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn name_reader() -> Arc<dyn ModuleReader> {
        Arc::new(|path: &Path, data: &[u8]| -> Result<Module> {
            let assembly = std::str::from_utf8(data)
                .map_err(|e| Error::Config(e.to_string()))?
                .trim()
                .to_string();
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Module::new(file, assembly))
        })
    }

    fn temp_module(file: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cilweave-loader-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);
        let mut handle = fs::File::create(&path).unwrap();
        handle.write_all(contents).unwrap();
        path
    }

    #[test]
    fn loads_once_per_path() {
        let path = temp_module("Cached.dll", b"Cached");
        let cache = ModuleCache::new(name_reader());

        let first = cache.load(&path).unwrap();
        let second = cache.load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.assembly, "Cached");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_file_reports_path() {
        let cache = ModuleCache::new(name_reader());
        let error = cache.load(Path::new("/nonexistent/Missing.dll")).unwrap_err();
        assert!(matches!(error, Error::ModuleLoad { .. }));
        assert!(error.to_string().starts_with("Could not read module"));
        assert!(cache.is_empty());
    }

    #[test]
    fn reader_failures_become_load_errors() {
        let path = temp_module("Broken.dll", &[0xFF, 0xFE, 0x00]);
        let cache = ModuleCache::new(name_reader());
        let error = cache.load(&path).unwrap_err();
        assert!(matches!(error, Error::ModuleLoad { .. }));
    }

    #[test]
    fn empty_file_rejected() {
        let path = temp_module("Empty.dll", b"");
        let cache = ModuleCache::new(name_reader());
        assert!(cache.load(&path).is_err());
    }
}
