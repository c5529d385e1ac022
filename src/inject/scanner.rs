use super::{Error, InsertionSpec, Location, Registry, Settings};
use crate::jvm::class_file::{
    Annotation, Attribute, ClassFile, ConstantsPool, Method, RuntimeInvisibleAnnotations,
    RuntimeVisibleAnnotations,
};
use crate::jvm::{BinaryName, Name, UnqualifiedName};
use log::{debug, info, warn};

/// Names of the classes that might declare handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSet {
    /// Explicit class names (dotted or `/`-separated)
    Names(Vec<String>),

    /// Every class under a package prefix, as listed by the [`ClassSource`]
    Namespace(String),
}

/// Where the scanner gets class files from
pub trait ClassSource {
    /// Contents of a class file, or `None` if there is no such class
    fn load_class_bytes(&self, name: &BinaryName) -> Option<Vec<u8>>;

    /// Names of all classes whose name starts with this prefix
    fn list_namespace(&self, prefix: &str) -> Vec<String>;
}

/// Handler class described without annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDecl {
    pub handler_class: String,
    pub target_class: String,
    pub insertions: Vec<InsertionDecl>,
}

/// Equivalent of one insertion annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionDecl {
    pub handler_method: String,
    pub method: String,
    pub descriptor: String,
    pub at: Location,
}

impl InsertionDecl {
    /// Insertion with the same defaults as the annotation: the no-argument constructor, at `HEAD`
    pub fn new(handler_method: &str) -> InsertionDecl {
        InsertionDecl {
            handler_method: handler_method.to_owned(),
            method: UnqualifiedName::INIT.as_str().to_owned(),
            descriptor: String::from("()V"),
            at: Location::Head,
        }
    }
}

/// What came out of scanning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Handler classes that had a target
    pub classes_registered: usize,

    /// Insertions added to the registry
    pub specs_emitted: usize,

    /// Candidates that were missing, unreadable, or had no target
    pub candidates_skipped: usize,
}

/// Reads handler annotations and fills a registry
///
/// Nothing here fails: a bad candidate (or a bad handler method) is logged and skipped, and the
/// rest of the scan carries on.
pub struct Scanner<'a> {
    settings: &'a Settings,
    registry: &'a mut Registry,
    report: ScanReport,
}

impl<'a> Scanner<'a> {
    pub fn new(settings: &'a Settings, registry: &'a mut Registry) -> Scanner<'a> {
        Scanner {
            settings,
            registry,
            report: ScanReport::default(),
        }
    }

    pub fn scan(&mut self, candidates: &CandidateSet, source: &dyn ClassSource) {
        let names = match candidates {
            CandidateSet::Names(names) => names.clone(),
            CandidateSet::Namespace(prefix) => {
                let names = source.list_namespace(prefix);
                debug!("Namespace {} lists {} class(es)", prefix, names.len());
                names
            }
        };
        for name in &names {
            self.scan_candidate(name, source);
        }
    }

    /// Register handlers declared directly instead of through annotations
    pub fn register_declared(&mut self, declaration: &HandlerDecl) {
        let mut emitted = 0;
        for insertion in &declaration.insertions {
            let spec = InsertionSpec::new(
                &declaration.target_class,
                &insertion.method,
                &insertion.descriptor,
                insertion.at,
                &declaration.handler_class,
                &insertion.handler_method,
            );
            match spec {
                Ok(spec) => {
                    if self.emit(spec) {
                        emitted += 1;
                    }
                }
                Err(err) => warn!(
                    "Skipping declared handler {}.{}: {}",
                    declaration.handler_class, insertion.handler_method, err
                ),
            }
        }
        if emitted > 0 {
            self.report.classes_registered += 1;
        }
    }

    pub fn report(&self) -> &ScanReport {
        &self.report
    }

    pub fn finish(self) -> ScanReport {
        self.report
    }

    fn scan_candidate(&mut self, name: &str, source: &dyn ClassSource) {
        let class_name = match BinaryName::canonicalize(name) {
            Ok(class_name) => class_name,
            Err(reason) => {
                warn!("Skipping handler candidate '{}': {}", name, reason);
                self.report.candidates_skipped += 1;
                return;
            }
        };
        let bytes = match source.load_class_bytes(&class_name) {
            Some(bytes) => bytes,
            None => {
                debug!("Handler candidate {} is not available", class_name);
                self.report.candidates_skipped += 1;
                return;
            }
        };

        match self.read_handler_class(&class_name, &bytes) {
            Ok(Some(specs)) => {
                self.report.classes_registered += 1;
                let count = specs.len();
                for spec in specs {
                    self.emit(spec);
                }
                info!("Found {} handler(s) in {}", count, class_name);
            }
            Ok(None) => {
                debug!("{} has no target annotation", class_name);
                self.report.candidates_skipped += 1;
            }
            Err(err) => {
                warn!("Skipping handler candidate {}: {}", class_name, err);
                self.report.candidates_skipped += 1;
            }
        }
    }

    fn emit(&mut self, spec: InsertionSpec) -> bool {
        let description = spec.to_string();
        match self.registry.register(spec) {
            Ok(()) => {
                self.report.specs_emitted += 1;
                true
            }
            Err(err) => {
                warn!("Could not register {}: {}", description, err);
                false
            }
        }
    }

    /// Insertions declared by a class, or `None` if the class does not say what it edits
    fn read_handler_class(
        &self,
        class_name: &BinaryName,
        bytes: &[u8],
    ) -> Result<Option<Vec<InsertionSpec>>, Error> {
        let class = ClassFile::parse_bytes(bytes)?;
        let constants = &class.constants;

        let edit_class = Settings::annotation_descriptor(&self.settings.edit_class_annotation);
        let target = match find_annotation(constants, &class.attributes, &edit_class)? {
            Some(target) => target,
            None => return Ok(None),
        };
        let target_class = target
            .element(constants, "value")
            .and_then(|value| value.as_string(constants))
            .ok_or_else(|| {
                Error::InvalidHandler(format!("{} does not name its target class", class_name))
            })?;
        let target_class = Settings::class_name(&target_class)?;

        let inject = Settings::annotation_descriptor(&self.settings.inject_annotation);
        let mut specs = vec![];
        for method in &class.methods {
            let method_name = method.name(constants)?;
            let annotation = match find_annotation(constants, &method.attributes, &inject)? {
                Some(annotation) => annotation,
                None => continue,
            };
            match self.read_insertion(constants, method, &annotation) {
                Ok((target_method, target_descriptor, location)) => {
                    let spec = InsertionSpec::new(
                        target_class.as_str(),
                        &target_method,
                        &target_descriptor,
                        location,
                        class_name.as_str(),
                        &method_name,
                    );
                    match spec {
                        Ok(spec) => specs.push(spec),
                        Err(err) => {
                            warn!("Skipping handler {}.{}: {}", class_name, method_name, err)
                        }
                    }
                }
                Err(err) => warn!("Skipping handler {}.{}: {}", class_name, method_name, err),
            }
        }
        Ok(Some(specs))
    }

    /// Target method name, descriptor, and location of one annotated handler method
    fn read_insertion(
        &self,
        constants: &ConstantsPool,
        method: &Method,
        annotation: &Annotation,
    ) -> Result<(String, String, Location), Error> {
        if !method.is_static() {
            return Err(Error::InvalidHandler(String::from("handler is not static")));
        }
        let descriptor = method.descriptor(constants)?;
        let expected = self.settings.handler_descriptor();
        if descriptor != expected {
            return Err(Error::InvalidHandler(format!(
                "handler has descriptor {} instead of {}",
                descriptor, expected
            )));
        }

        let string_element = |name: &str, default: &str| -> Result<String, Error> {
            match annotation.element(constants, name) {
                None => Ok(default.to_owned()),
                Some(value) => value.as_string(constants).ok_or_else(|| {
                    Error::InvalidHandler(format!("`{}` is not a string", name))
                }),
            }
        };
        let target_method = string_element("method", UnqualifiedName::INIT.as_str())?;
        let target_descriptor = string_element("descriptor", "()V")?;

        let location = match annotation.element(constants, "at") {
            None => Location::Head,
            Some(value) => {
                let (enum_type, constant) = value.as_enum(constants).ok_or_else(|| {
                    Error::InvalidHandler(String::from("`at` is not an enum constant"))
                })?;
                let expected = Settings::annotation_descriptor(&self.settings.location_enum);
                if enum_type != expected {
                    return Err(Error::InvalidHandler(format!(
                        "`at` has type {} instead of {}",
                        enum_type, expected
                    )));
                }
                Location::from_constant_name(&constant).ok_or_else(|| {
                    Error::InvalidHandler(format!("unknown location {}", constant))
                })?
            }
        };

        Ok((target_method, target_descriptor, location))
    }
}

/// Look for an annotation (visible or not) by its type descriptor
fn find_annotation(
    constants: &ConstantsPool,
    attributes: &[Attribute],
    descriptor: &str,
) -> Result<Option<Annotation>, Error> {
    let visible = constants
        .decode_attribute::<RuntimeVisibleAnnotations>(attributes)?
        .map(|annotations| annotations.0)
        .unwrap_or_default();
    let invisible = constants
        .decode_attribute::<RuntimeInvisibleAnnotations>(attributes)?
        .map(|annotations| annotations.0)
        .unwrap_or_default();

    Ok(visible.into_iter().chain(invisible).find(|annotation| {
        constants.utf8_bytes(annotation.type_index).ok() == Some(descriptor.as_bytes())
    }))
}
