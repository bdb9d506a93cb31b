//! Common test harness utilities for integration tests.
//!
//! This module provides helpers for:
//! - Starting extensions compiled into the test binary
//! - Building pipelines and opening client connections
//! - Writing extension folders for discovery tests

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use gatehouse::extensions::{
    BrokerServices, ExtensionCatalog, ExtensionMain, ExtensionManifest, ExtensionRegistry,
    IsolationContext, LoadReport,
};
use gatehouse::interceptor::{ChainSettings, ClientInformation, ConnectionInformation};
use gatehouse::packets::{ProtocolVersion, PublishPacket, Qos};
use gatehouse::pipeline::{ConnectionPipeline, Pipeline};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub type StartFn = Arc<dyn Fn(&Arc<IsolationContext>) -> anyhow::Result<()> + Send + Sync>;

/// Extension main backed by a closure.
pub struct ClosureMain {
    start: StartFn,
}

impl ExtensionMain for ClosureMain {
    fn start(&self, context: &Arc<IsolationContext>) -> anyhow::Result<()> {
        (self.start)(context)
    }
}

/// A manifest plus the closure run as its `start`.
pub struct TestExtension {
    pub manifest: ExtensionManifest,
    pub start: StartFn,
}

pub fn extension<F>(id: &str, priority: i32, start: F) -> TestExtension
where
    F: Fn(&Arc<IsolationContext>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    TestExtension {
        manifest: ExtensionManifest::new(id, id, "1.0.0").with_priority(priority),
        start: Arc::new(start),
    }
}

pub fn catalog_for(extensions: &[TestExtension]) -> ExtensionCatalog {
    let mut catalog = ExtensionCatalog::default();
    for ext in extensions {
        let start = Arc::clone(&ext.start);
        catalog.register(ext.manifest.id.clone(), move |_: &ExtensionManifest| {
            Ok(Box::new(ClosureMain {
                start: Arc::clone(&start),
            }) as Box<dyn ExtensionMain>)
        });
    }
    catalog
}

/// Starts `extensions` on a fresh registry.
pub fn start_extensions(extensions: Vec<TestExtension>) -> (Arc<ExtensionRegistry>, LoadReport) {
    let registry = Arc::new(ExtensionRegistry::new(Arc::new(BrokerServices::default())));
    let catalog = catalog_for(&extensions);
    let manifests = extensions.into_iter().map(|ext| ext.manifest).collect();
    let report = registry.load(manifests, &catalog);
    (registry, report)
}

pub fn pipeline(registry: &Arc<ExtensionRegistry>) -> Pipeline {
    Pipeline::new(Arc::clone(registry), ChainSettings::default())
}

pub fn pipeline_with_timeout(registry: &Arc<ExtensionRegistry>, max: Duration) -> Pipeline {
    let settings = ChainSettings {
        max_async_timeout: max,
        ..ChainSettings::default()
    };
    Pipeline::new(Arc::clone(registry), settings)
}

pub fn connect(pipeline: &Pipeline, client_id: &str) -> ConnectionPipeline {
    connect_with(pipeline, client_id, ProtocolVersion::V5)
}

pub fn connect_with(
    pipeline: &Pipeline,
    client_id: &str,
    version: ProtocolVersion,
) -> ConnectionPipeline {
    pipeline.open_connection(
        ClientInformation::new(client_id),
        ConnectionInformation::new(version),
    )
}

pub fn publish(topic: &str) -> PublishPacket {
    PublishPacket::new(topic, Qos::AtLeastOnce, "payload").with_packet_id(1)
}

/// Writes `<root>/<dir>/extension.toml`.
pub fn write_manifest(root: &Path, dir: &str, body: &str) {
    let path = root.join(dir);
    fs::create_dir_all(&path).expect("create extension dir");
    fs::write(path.join("extension.toml"), body).expect("write manifest");
}
