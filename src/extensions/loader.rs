//! Extension discovery and the catalog of compiled-in extensions.
//!
//! Every extension lives in its own directory below the extension folder
//! and is described by an `extension.toml` manifest. A `DISABLED` marker
//! file next to the manifest skips the extension. The manifest id selects
//! the factory from the [`ExtensionCatalog`].

use super::IsolationContext;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

pub const MANIFEST_FILE: &str = "extension.toml";
pub const DISABLED_MARKER: &str = "DISABLED";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtensionManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Interceptor order; higher runs first.
    #[serde(default)]
    pub priority: i32,
    /// Start order; higher starts first and stops last.
    #[serde(default)]
    pub start_priority: i32,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub settings: toml::Table,
}

impl ExtensionManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            priority: 0,
            start_priority: 0,
            author: None,
            settings: toml::Table::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_start_priority(mut self, start_priority: i32) -> Self {
        self.start_priority = start_priority;
        self
    }

    pub fn with_settings(mut self, settings: toml::Table) -> Self {
        self.settings = settings;
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must not be empty".into());
        }
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.version.trim().is_empty() {
            return Err("version must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },
    #[error("an extension with id {id} is already loaded")]
    Duplicate { id: String },
    #[error("no extension with id {id} is available in this build")]
    Unknown { id: String },
    #[error("extension {id} could not be created: {reason}")]
    Factory { id: String, reason: String },
    #[error("extension {id} failed to start: {reason}")]
    Start { id: String, reason: String },
    #[error("extension {id} panicked: {message}")]
    Panicked { id: String, message: String },
}

/// Entry point of an extension.
pub trait ExtensionMain: Send + Sync + 'static {
    /// Registers providers and starts background work. An error disables
    /// the extension.
    fn start(&self, context: &Arc<IsolationContext>) -> anyhow::Result<()>;

    fn stop(&self, _context: &Arc<IsolationContext>) -> anyhow::Result<()> {
        Ok(())
    }
}

pub trait ExtensionFactory: Send + Sync + 'static {
    fn create(&self, manifest: &ExtensionManifest) -> anyhow::Result<Box<dyn ExtensionMain>>;
}

impl<F> ExtensionFactory for F
where
    F: Fn(&ExtensionManifest) -> anyhow::Result<Box<dyn ExtensionMain>> + Send + Sync + 'static,
{
    fn create(&self, manifest: &ExtensionManifest) -> anyhow::Result<Box<dyn ExtensionMain>> {
        self(manifest)
    }
}

/// Extensions compiled into this binary, keyed by manifest id.
#[derive(Clone, Default)]
pub struct ExtensionCatalog {
    factories: HashMap<String, Arc<dyn ExtensionFactory>>,
}

impl ExtensionCatalog {
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ExtensionManifest) -> anyhow::Result<Box<dyn ExtensionMain>> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ExtensionFactory>> {
        self.factories.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for ExtensionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionCatalog")
            .field("ids", &self.ids())
            .finish()
    }
}

/// One extension that did not make it.
#[derive(Debug)]
pub struct LoadFailure {
    /// Extension id, or the directory when the manifest was unreadable.
    pub extension: String,
    pub error: LoadError,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub started: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub(crate) fn fail(&mut self, extension: impl Into<String>, error: LoadError) {
        let extension = extension.into();
        error!(extension = %extension, error = %error, "extension disabled");
        self.failures.push(LoadFailure { extension, error });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of scanning the extension folder.
#[derive(Debug, Default)]
pub struct Discovery {
    pub manifests: Vec<ExtensionManifest>,
    pub skipped: Vec<String>,
    pub failures: Vec<LoadFailure>,
}

/// Scans `folder` for extension directories. Problems with one directory
/// are recorded and never stop the scan. A missing folder yields nothing.
pub fn discover(folder: &Path) -> Discovery {
    let mut discovery = Discovery::default();
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(folder = %folder.display(), "extension folder does not exist");
            return discovery;
        }
        Err(source) => {
            discovery.failures.push(LoadFailure {
                extension: folder.display().to_string(),
                error: LoadError::Io {
                    path: folder.to_path_buf(),
                    source,
                },
            });
            return discovery;
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut seen = HashSet::new();
    for dir in dirs {
        let label = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        if dir.join(DISABLED_MARKER).exists() {
            debug!(extension = %label, "extension marked as disabled");
            discovery.skipped.push(label);
            continue;
        }
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            debug!(path = %dir.display(), "directory without extension manifest ignored");
            continue;
        }
        match read_manifest(&manifest_path) {
            Ok(manifest) => {
                if seen.insert(manifest.id.clone()) {
                    discovery.manifests.push(manifest);
                } else {
                    discovery.failures.push(LoadFailure {
                        extension: label,
                        error: LoadError::Duplicate { id: manifest.id },
                    });
                }
            }
            Err(error) => discovery.failures.push(LoadFailure {
                extension: label,
                error,
            }),
        }
    }
    discovery
}

pub fn read_manifest(path: &Path) -> Result<ExtensionManifest, LoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: ExtensionManifest = toml::from_str(&raw).map_err(|source| LoadError::Manifest {
        path: path.to_path_buf(),
        source,
    })?;
    manifest
        .validate()
        .map_err(|reason| LoadError::InvalidManifest {
            path: path.to_path_buf(),
            reason,
        })?;
    Ok(manifest)
}
