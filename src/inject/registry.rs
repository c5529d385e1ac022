use super::{Error, InsertionSpec};
use crate::jvm::Name;
use log::{debug, warn};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

type SpecMap = HashMap<String, Vec<InsertionSpec>>;

/// Insertions by target class, in registration order
///
/// The registry is built up during startup and then frozen. Freezing hands out a
/// [`FrozenRegistry`], which is immutable and can be shared freely across threads.
#[derive(Debug, Default)]
pub struct Registry {
    pending: SpecMap,
    frozen: Option<FrozenRegistry>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Add an insertion (after any already registered for the same class)
    pub fn register(&mut self, spec: InsertionSpec) -> Result<(), Error> {
        if self.frozen.is_some() {
            return Err(Error::RegistryFrozen);
        }
        let specs = self
            .pending
            .entry(spec.target_class.as_str().to_owned())
            .or_default();
        if specs.iter().any(|other| other.identity() == spec.identity()) {
            warn!("Registering {} twice, the handler will run twice", spec);
        }
        debug!("Registered {}", spec);
        specs.push(spec);
        Ok(())
    }

    /// Stop accepting insertions
    ///
    /// Freezing again returns the same shared registry.
    pub fn freeze(&mut self) -> FrozenRegistry {
        if let Some(frozen) = &self.frozen {
            return frozen.clone();
        }
        let frozen = FrozenRegistry(Arc::new(std::mem::take(&mut self.pending)));
        self.frozen = Some(frozen.clone());
        frozen
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Insertions registered for a class (empty if there are none)
    pub fn lookup(&self, target_class: &str) -> &[InsertionSpec] {
        match &self.frozen {
            Some(frozen) => frozen.lookup(target_class),
            None => lookup_in(&self.pending, target_class),
        }
    }
}

/// Read-only registry, safe to query concurrently without locking
#[derive(Debug, Clone, Default)]
pub struct FrozenRegistry(Arc<SpecMap>);

impl FrozenRegistry {
    /// Insertions registered for a class, named in either `a.b.C` or `a/b/C` form
    pub fn lookup(&self, target_class: &str) -> &[InsertionSpec] {
        lookup_in(&self.0, target_class)
    }

    pub fn contains(&self, target_class: &str) -> bool {
        !self.lookup(target_class).is_empty()
    }

    /// Number of classes with insertions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Do both handles share the same underlying map?
    pub fn same_as(&self, other: &FrozenRegistry) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn lookup_in<'a>(specs: &'a SpecMap, target_class: &str) -> &'a [InsertionSpec] {
    let key: Cow<str> = if target_class.contains('.') {
        Cow::Owned(target_class.replace('.', "/"))
    } else {
        Cow::Borrowed(target_class)
    };
    specs.get(key.as_ref()).map(Vec::as_slice).unwrap_or(&[])
}
