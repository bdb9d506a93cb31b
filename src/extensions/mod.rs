//! Extension hosting: isolation contexts, services, discovery and lifecycle.

mod builtin;
mod executor;
mod isolation;
mod loader;
mod namespace;
mod services;

pub use builtin::builtin_catalog;
pub use isolation::{current, services, IsolationContext, IsolationError};
pub use loader::{
    discover, read_manifest, Discovery, ExtensionCatalog, ExtensionFactory, ExtensionMain,
    ExtensionManifest, LoadError, LoadFailure, LoadReport, DISABLED_MARKER, MANIFEST_FILE,
};
pub use namespace::{ExtensionNamespace, SharedNamespace, RESTRICTED_PREFIXES};
pub use services::{BrokerServices, ConnectedClient, ConnectionDirectory, PublishBuilder};

use crate::interceptor::panic_payload_to_string;
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

struct HostedExtension {
    manifest: ExtensionManifest,
    context: Arc<IsolationContext>,
    main: Mutex<Option<Box<dyn ExtensionMain>>>,
}

/// All extensions that started successfully, in start order.
pub struct ExtensionRegistry {
    services: Arc<BrokerServices>,
    hosted: RwLock<Vec<Arc<HostedExtension>>>,
}

impl ExtensionRegistry {
    pub fn new(services: Arc<BrokerServices>) -> Self {
        Self {
            services,
            hosted: RwLock::new(Vec::new()),
        }
    }

    pub fn services(&self) -> &Arc<BrokerServices> {
        &self.services
    }

    /// Discovers and starts every extension below `folder`.
    pub fn load_folder(&self, folder: &Path, catalog: &ExtensionCatalog) -> LoadReport {
        let discovery = discover(folder);
        let mut report = self.load(discovery.manifests, catalog);
        report.skipped.extend(discovery.skipped);
        for failure in discovery.failures {
            report.fail(failure.extension, failure.error);
        }
        report
    }

    /// Starts `manifests` in descending start priority. A failing extension
    /// is disabled and recorded; the others are unaffected.
    pub fn load(&self, mut manifests: Vec<ExtensionManifest>, catalog: &ExtensionCatalog) -> LoadReport {
        manifests.sort_by(|a, b| b.start_priority.cmp(&a.start_priority));
        let mut report = LoadReport::default();
        for manifest in manifests {
            match self.start_extension(manifest, catalog) {
                Ok(id) => report.started.push(id),
                Err((id, error)) => report.fail(id, error),
            }
        }
        report
    }

    fn start_extension(
        &self,
        manifest: ExtensionManifest,
        catalog: &ExtensionCatalog,
    ) -> Result<String, (String, LoadError)> {
        let id = manifest.id.clone();
        if self.get(&id).is_some() {
            return Err((id.clone(), LoadError::Duplicate { id }));
        }
        let Some(factory) = catalog.get(&id) else {
            return Err((id.clone(), LoadError::Unknown { id }));
        };

        let context = IsolationContext::new(&manifest, Arc::clone(&self.services));
        let main = match context.enter(|| panic::catch_unwind(AssertUnwindSafe(|| factory.create(&manifest)))) {
            Ok(Ok(main)) => main,
            Ok(Err(err)) => {
                context.disable();
                return Err((id.clone(), LoadError::Factory { id, reason: format!("{err:#}") }));
            }
            Err(payload) => {
                context.disable();
                let message = panic_payload_to_string(payload.as_ref());
                return Err((id.clone(), LoadError::Panicked { id, message }));
            }
        };

        match context.enter(|| panic::catch_unwind(AssertUnwindSafe(|| main.start(&context)))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                context.disable();
                return Err((id.clone(), LoadError::Start { id, reason: format!("{err:#}") }));
            }
            Err(payload) => {
                context.disable();
                let message = panic_payload_to_string(payload.as_ref());
                return Err((id.clone(), LoadError::Panicked { id, message }));
            }
        }

        info!(
            extension = %id,
            name = %manifest.name,
            version = %manifest.version,
            providers = context.provider_count(),
            "extension started"
        );
        self.hosted.write().push(Arc::new(HostedExtension {
            manifest,
            context,
            main: Mutex::new(Some(main)),
        }));
        Ok(id)
    }

    /// Stops one extension at runtime. Its interceptors are skipped on every
    /// connection from now on.
    pub fn stop(&self, id: &str) -> bool {
        let hosted = {
            let mut all = self.hosted.write();
            match all.iter().position(|h| h.manifest.id == id) {
                Some(index) => all.remove(index),
                None => return false,
            }
        };
        Self::shutdown(&hosted);
        true
    }

    /// Stops every extension in reverse start order.
    pub fn stop_all(&self) {
        let hosted = std::mem::take(&mut *self.hosted.write());
        for extension in hosted.iter().rev() {
            Self::shutdown(extension);
        }
    }

    fn shutdown(hosted: &HostedExtension) {
        let context = &hosted.context;
        context.disable();
        let Some(main) = hosted.main.lock().take() else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| context.enter(|| main.stop(context)))) {
            Ok(Ok(())) => info!(extension = %context.id(), "extension stopped"),
            Ok(Err(err)) => warn!(extension = %context.id(), error = %format!("{err:#}"), "extension failed to stop cleanly"),
            Err(payload) => warn!(
                extension = %context.id(),
                panic = %panic_payload_to_string(payload.as_ref()),
                "extension panicked while stopping"
            ),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<IsolationContext>> {
        self.hosted
            .read()
            .iter()
            .find(|h| h.manifest.id == id)
            .map(|h| Arc::clone(&h.context))
    }

    /// Enabled extensions in interceptor order: descending priority, then
    /// start order.
    pub fn active(&self) -> Vec<Arc<IsolationContext>> {
        let mut contexts: Vec<Arc<IsolationContext>> = self
            .hosted
            .read()
            .iter()
            .filter(|h| h.context.is_enabled())
            .map(|h| Arc::clone(&h.context))
            .collect();
        contexts.sort_by(|a, b| b.priority().cmp(&a.priority()));
        contexts
    }

    pub fn ids(&self) -> Vec<String> {
        self.hosted
            .read()
            .iter()
            .map(|h| h.manifest.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.hosted.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosted.read().is_empty()
    }
}

impl Drop for ExtensionRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.ids())
            .finish_non_exhaustive()
    }
}
