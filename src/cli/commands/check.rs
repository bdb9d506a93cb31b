//! Check command - validates config and extension manifests offline.

use crate::cli::args::{CheckArgs, OutputFormat};
use crate::config::Config;
use crate::extensions::{builtin_catalog, discover, ExtensionCatalog, ExtensionManifest};
use anyhow::{bail, Result};
use serde_json::json;
use std::path::Path;

/// Problems found for one extension directory or manifest.
struct Finding {
    extension: String,
    problem: String,
}

pub fn run_check(args: CheckArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    config.validate()?;
    let folder = args
        .extensions
        .clone()
        .unwrap_or_else(|| config.extensions.folder.clone());

    let catalog = builtin_catalog();
    let (manifests, skipped, findings) = inspect_folder(&folder, &catalog);

    match args.format {
        OutputFormat::Json => {
            let report = json!({
                "config": args.config.display().to_string(),
                "folder": folder.display().to_string(),
                "extensions": manifests.iter().map(|m| json!({
                    "id": m.id,
                    "name": m.name,
                    "version": m.version,
                    "priority": m.priority,
                    "start_priority": m.start_priority,
                })).collect::<Vec<_>>(),
                "skipped": skipped,
                "problems": findings.iter().map(|f| json!({
                    "extension": f.extension,
                    "problem": f.problem,
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("config {} ok", args.config.display());
            println!("extension folder {}", folder.display());
            for manifest in &manifests {
                println!(
                    "  {} {} (priority {}, start-priority {})",
                    manifest.id, manifest.version, manifest.priority, manifest.start_priority
                );
            }
            for id in &skipped {
                println!("  {id} disabled");
            }
            for finding in &findings {
                println!("  {}: {}", finding.extension, finding.problem);
            }
        }
    }

    if !findings.is_empty() {
        bail!("{} extension problem(s) found", findings.len());
    }
    Ok(())
}

fn inspect_folder(
    folder: &Path,
    catalog: &ExtensionCatalog,
) -> (Vec<ExtensionManifest>, Vec<String>, Vec<Finding>) {
    let discovery = discover(folder);
    let mut findings: Vec<Finding> = discovery
        .failures
        .into_iter()
        .map(|failure| Finding {
            extension: failure.extension,
            problem: failure.error.to_string(),
        })
        .collect();
    for manifest in &discovery.manifests {
        if !catalog.contains(&manifest.id) {
            findings.push(Finding {
                extension: manifest.id.clone(),
                problem: "no compiled-in implementation for this id".to_string(),
            });
        }
    }
    (discovery.manifests, discovery.skipped, findings)
}
