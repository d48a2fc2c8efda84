//! Legacy schema families this crate can migrate from.

pub mod earthdawn4e;

use crate::detect::{Detector, SourceSystem};
use crate::registry::{LegacySystemSupport, MigrationRegistry};
use crate::Result;

/// Every legacy system shipped with the crate.
pub fn builtin_systems() -> Vec<Box<dyn LegacySystemSupport>> {
    vec![Box::new(earthdawn4e::Earthdawn4e)]
}

/// Build a registry and detector wired with every built-in legacy system.
///
/// `fallback` is assumed for documents that only show the old container
/// layout.
pub fn build_pipeline(fallback: &str) -> Result<(MigrationRegistry, Detector)> {
    let mut registry = MigrationRegistry::new();
    let mut detector = Detector::default().with_fallback(SourceSystem::new(fallback));
    for support in builtin_systems() {
        registry.install(support.as_ref())?;
        for signature in support.signatures() {
            detector.add_signature(signature);
        }
    }
    Ok((registry, detector))
}
