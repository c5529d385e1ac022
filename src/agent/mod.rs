//! Startup sequence of the injection agent
//!
//! [`premain`] runs once, before the host starts defining the program's classes. It finds the
//! mods, scans their handlers, freezes the registry, defines the context class, and installs the
//! [`Transformer`]. The host-specific parts (finding mods, extending the class path, hooking class
//! definition) come in through traits.

mod config;
mod errors;
mod mods;

pub use config::*;
pub use errors::*;
pub use mods::*;

use crate::inject::{
    context, CandidateSet, ClassFileTransformer, ClassSource, Registry, ScanReport, Scanner,
    Transformer,
};
use crate::jvm::BinaryName;
use log::{debug, info, warn};
use std::io;
use std::sync::Arc;

/// What the agent needs from the host runtime
pub trait Instrumentation {
    /// Call this transformer for every class defined from now on
    fn add_transformer(&mut self, transformer: Arc<dyn ClassFileTransformer>);

    /// Define a class that is not on any class path
    fn define_class(&mut self, name: &BinaryName, class_bytes: Vec<u8>) -> io::Result<()>;
}

/// Installed agent
pub struct Agent {
    transformer: Arc<Transformer>,
    report: ScanReport,
    mods: Vec<ModManifest>,
}

impl Agent {
    pub fn transformer(&self) -> &Arc<Transformer> {
        &self.transformer
    }

    pub fn scan_report(&self) -> &ScanReport {
        &self.report
    }

    /// Mods whose archives were added to the class path
    pub fn mods(&self) -> &[ModManifest] {
        &self.mods
    }
}

/// Entry point of the agent
///
/// Handlers are scanned in this order: the ones named in the configuration, then the configured
/// namespace, then each mod's handlers in discovery order. A mod whose archive cannot be added to
/// the class path is skipped entirely.
pub fn premain(
    options: &str,
    host: &mut impl Instrumentation,
    source: &dyn ClassSource,
    discovery: &dyn ModDiscovery,
    class_path: &mut dyn ClassPathAugmenter,
) -> Result<Agent, Error> {
    let config = AgentConfig::parse(options)?;
    let settings = config.settings;

    let discovered = discovery.discover().unwrap_or_else(|err| {
        warn!("Could not list mods: {}", err);
        vec![]
    });
    info!("Found {} mod(s)", discovered.len());
    for manifest in &discovered {
        info!("  {}", manifest);
    }

    let mut mods = Vec::with_capacity(discovered.len());
    for manifest in discovered {
        match class_path.append(&manifest.archive) {
            Ok(()) => mods.push(manifest),
            Err(err) => warn!(
                "Failed to add {} to the class path, skipping {}: {}",
                manifest.archive.display(),
                manifest.id,
                err
            ),
        }
    }

    let mut registry = Registry::new();
    let mut scanner = Scanner::new(&settings, &mut registry);
    if !config.handlers.is_empty() {
        scanner.scan(&CandidateSet::Names(config.handlers.clone()), source);
    }
    if let Some(namespace) = &config.namespace {
        scanner.scan(&CandidateSet::Namespace(namespace.clone()), source);
    }
    for manifest in &mods {
        debug!("Scanning handlers of {}", manifest.id);
        scanner.scan(&CandidateSet::Names(manifest.handler_class_names()), source);
    }
    let report = scanner.finish();
    let registry = registry.freeze();
    info!(
        "Registered {} insertion(s) into {} class(es) ({} candidate(s) skipped)",
        report.specs_emitted,
        registry.len(),
        report.candidates_skipped
    );

    let context_class = context::generate(&settings)?;
    host.define_class(&settings.context_class, context_class)?;

    let transformer = Arc::new(Transformer::new(registry, settings));
    host.add_transformer(transformer.clone());

    Ok(Agent {
        transformer,
        report,
        mods,
    })
}
