use super::splice::rewrite_method;
use super::{Error, FrozenRegistry, InsertionSpec, Settings};
use crate::jvm;
use crate::jvm::class_file::{ClassFile, Serialize};
use crate::jvm::{Name, RenderDescriptor};
use log::{info, warn};
use std::borrow::Cow;

/// Hook called by the host every time a class is about to be defined
///
/// Hosts may call this from several class loading threads at once.
pub trait ClassFileTransformer: Send + Sync {
    /// Bytes to define instead of `class_bytes`, or `None` to define the class unchanged
    fn transform(&self, class_name: &str, class_bytes: &[u8]) -> Option<Vec<u8>>;
}

/// Rewrites the classes mentioned in a frozen registry
///
/// Every other class is passed through without being parsed.
pub struct Transformer {
    registry: FrozenRegistry,
    settings: Settings,
}

impl Transformer {
    pub fn new(registry: FrozenRegistry, settings: Settings) -> Transformer {
        Transformer { registry, settings }
    }

    pub fn registry(&self) -> &FrozenRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Rewritten class, if there is anything to rewrite and rewriting succeeds
    ///
    /// A rewrite that fails for any reason is logged and abandoned: the class should then be
    /// defined as it was.
    pub fn transform(&self, class_name: &str, class_bytes: &[u8]) -> Option<Vec<u8>> {
        let specs = self.registry.lookup(class_name);
        if specs.is_empty() {
            return None;
        }

        match rewrite_class(class_bytes, specs, &self.settings) {
            Ok(rewritten) => {
                info!("Injected {} handler(s) into {}", specs.len(), class_name);
                Some(rewritten)
            }
            Err(cause) => {
                let abandoned = Error::RewriteAbandoned {
                    class: class_name.to_owned(),
                    cause: Box::new(cause),
                };
                warn!("{}", abandoned);
                None
            }
        }
    }

    /// Bytes to define for the class (the input itself when nothing changed)
    pub fn transform_or_passthrough<'b>(&self, class_name: &str, class_bytes: &'b [u8]) -> Cow<'b, [u8]> {
        match self.transform(class_name, class_bytes) {
            Some(rewritten) => Cow::Owned(rewritten),
            None => Cow::Borrowed(class_bytes),
        }
    }
}

impl ClassFileTransformer for Transformer {
    fn transform(&self, class_name: &str, class_bytes: &[u8]) -> Option<Vec<u8>> {
        Transformer::transform(self, class_name, class_bytes)
    }
}

/// Apply insertions to a serialized class
///
/// Every spec must name a method with a body in the class. Methods that no spec targets keep
/// their attributes untouched.
pub fn rewrite_class(
    class_bytes: &[u8],
    specs: &[InsertionSpec],
    settings: &Settings,
) -> Result<Vec<u8>, Error> {
    let mut class = ClassFile::parse_bytes(class_bytes)?;

    // Group insertions by method, keeping registration order within each method
    let mut targets: Vec<(usize, Vec<&InsertionSpec>)> = vec![];
    for spec in specs {
        let descriptor = spec.target_descriptor.render();
        let index = match class.find_method(spec.target_method.as_str(), &descriptor) {
            Some(index) => index,
            None => {
                return Err(Error::TargetNotFound {
                    class: spec.target_class.to_string(),
                    method: spec.target_method.to_string(),
                    descriptor,
                })
            }
        };
        if !class.methods[index].has_body() {
            return Err(Error::NoMethodBody {
                class: spec.target_class.to_string(),
                method: spec.target_method.to_string(),
                descriptor,
            });
        }
        match targets.iter_mut().find(|(target, _)| *target == index) {
            Some((_, method_specs)) => method_specs.push(spec),
            None => targets.push((index, vec![spec])),
        }
    }

    for (index, method_specs) in &targets {
        rewrite_method(&mut class, *index, method_specs, settings)?;
    }

    Ok(class.to_bytes().map_err(jvm::Error::from)?)
}
