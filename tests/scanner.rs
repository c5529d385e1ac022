mod common;

use common::builder::{Body, ClassBuilder, Element, PUBLIC_STATIC};
use common::{init_logging, HANDLER};
use jarhook::inject::{CandidateSet, ClassSource, Location, Registry, ScanReport, Scanner, Settings};
use jarhook::jvm::class_file::Annotation;
use jarhook::jvm::code::{BranchInstruction, CodeBuffer};
use jarhook::jvm::{BinaryName, MethodAccessFlags, Name, RenderDescriptor};
use std::collections::HashMap;

const EDIT_CLASS: &str = "Ljarhook/annotation/EditClass;";
const INJECT: &str = "Ljarhook/annotation/Inject;";
const AT: &str = "Ljarhook/annotation/At;";

#[derive(Default)]
struct MapSource(HashMap<String, Vec<u8>>);

impl MapSource {
    fn with(mut self, name: &str, bytes: Vec<u8>) -> MapSource {
        self.0.insert(name.to_owned(), bytes);
        self
    }
}

impl ClassSource for MapSource {
    fn load_class_bytes(&self, name: &BinaryName) -> Option<Vec<u8>> {
        self.0.get(name.as_str()).cloned()
    }

    fn list_namespace(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .0
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

fn returning() -> Body {
    let mut code = CodeBuffer::new();
    code.push_branch_instruction(BranchInstruction::Return);
    Body::new(code, 0, 1)
}

fn handler(builder: &mut ClassBuilder, flags: MethodAccessFlags, name: &str, descriptor: &str, annotation: Annotation) {
    builder.method_with(flags, name, descriptor, Some(returning()), vec![annotation]);
}

/// Handler class editing `game.Game`, with a mix of valid and invalid handler methods
fn game_hooks(inject: &str) -> Vec<u8> {
    let mut builder = ClassBuilder::new("hooks/GameHooks");
    let edit_class = builder.annotation(EDIT_CLASS, &[("value", Element::Str("game.Game"))]);
    builder.annotate(edit_class);

    let annotation = builder.annotation(
        inject,
        &[("method", Element::Str("tick")), ("descriptor", Element::Str("(I)V"))],
    );
    handler(&mut builder, PUBLIC_STATIC, "onTick", HANDLER, annotation);

    let annotation = builder.annotation(
        inject,
        &[
            ("method", Element::Str("tick")),
            ("descriptor", Element::Str("(I)V")),
            ("at", Element::Enum(AT, "RETURN")),
        ],
    );
    handler(&mut builder, PUBLIC_STATIC, "afterTick", HANDLER, annotation);

    let annotation = builder.annotation(inject, &[]);
    handler(&mut builder, PUBLIC_STATIC, "onCreate", HANDLER, annotation);

    let annotation = builder.annotation(inject, &[("method", Element::Str("tick"))]);
    handler(&mut builder, MethodAccessFlags::PUBLIC, "notStatic", HANDLER, annotation);

    let annotation = builder.annotation(inject, &[("method", Element::Str("tick"))]);
    handler(&mut builder, PUBLIC_STATIC, "wrongSignature", "(I)V", annotation);

    let annotation = builder.annotation(inject, &[("at", Element::Enum("Lother/Where;", "HEAD"))]);
    handler(&mut builder, PUBLIC_STATIC, "wrongEnum", HANDLER, annotation);

    let annotation = builder.annotation(inject, &[("at", Element::Enum(AT, "BEFORE"))]);
    handler(&mut builder, PUBLIC_STATIC, "unknownLocation", HANDLER, annotation);

    let annotation = builder.annotation(inject, &[("method", Element::Enum(AT, "HEAD"))]);
    handler(&mut builder, PUBLIC_STATIC, "methodNotAString", HANDLER, annotation);

    builder.method(PUBLIC_STATIC, "helper", HANDLER, returning());
    builder.build()
}

/// Class that looks like a handler but does not say what it edits
fn plain_class() -> Vec<u8> {
    let mut builder = ClassBuilder::new("hooks/Plain");
    let annotation = builder.annotation(INJECT, &[]);
    handler(&mut builder, PUBLIC_STATIC, "onCreate", HANDLER, annotation);
    builder.build()
}

fn describe(registry: &Registry, class: &str) -> Vec<String> {
    registry
        .lookup(class)
        .iter()
        .map(|spec| {
            format!(
                "{} {}{} {}",
                spec.handler_method,
                spec.target_method,
                spec.target_descriptor.render(),
                spec.location
            )
        })
        .collect()
}

#[test]
fn annotated_handlers() {
    init_logging();
    let settings = Settings::new();
    let mut registry = Registry::new();
    let source = MapSource::default().with("hooks/GameHooks", game_hooks(INJECT));

    let mut scanner = Scanner::new(&settings, &mut registry);
    scanner.scan(&CandidateSet::Names(vec![String::from("hooks.GameHooks")]), &source);
    assert_eq!(
        scanner.finish(),
        ScanReport {
            classes_registered: 1,
            specs_emitted: 3,
            candidates_skipped: 0,
        }
    );

    assert_eq!(
        describe(&registry, "game/Game"),
        vec![
            "onTick tick(I)V HEAD",
            "afterTick tick(I)V RETURN",
            "onCreate <init>()V HEAD",
        ]
    );
    let spec = &registry.lookup("game/Game")[0];
    assert_eq!(spec.handler_class.as_str(), "hooks/GameHooks");
}

#[test]
fn invisible_annotations_are_read_too() {
    init_logging();
    let settings = Settings {
        inject_annotation: BinaryName::from_string(String::from("hooks/InvisibleInject")).unwrap(),
        ..Settings::new()
    };
    let mut registry = Registry::new();
    let source = MapSource::default()
        .with("hooks/GameHooks", game_hooks("Lhooks/InvisibleInject;"));

    let mut scanner = Scanner::new(&settings, &mut registry);
    scanner.scan(&CandidateSet::Names(vec![String::from("hooks/GameHooks")]), &source);
    assert_eq!(scanner.finish().specs_emitted, 3);
    assert_eq!(registry.lookup("game.Game").len(), 3);

    // The default annotation is not what these settings look for
    let mut registry = Registry::new();
    let source = MapSource::default().with("hooks/GameHooks", game_hooks(INJECT));
    let mut scanner = Scanner::new(&settings, &mut registry);
    scanner.scan(&CandidateSet::Names(vec![String::from("hooks/GameHooks")]), &source);
    let report = scanner.finish();
    assert_eq!(report.classes_registered, 1);
    assert_eq!(report.specs_emitted, 0);
}

#[test]
fn unusable_candidates_are_skipped() {
    init_logging();
    let settings = Settings::new();
    let mut registry = Registry::new();

    let mut untargeted = ClassBuilder::new("hooks/Untargeted");
    let edit_class = untargeted.annotation(EDIT_CLASS, &[]);
    untargeted.annotate(edit_class);

    let source = MapSource::default()
        .with("hooks/Plain", plain_class())
        .with("hooks/Untargeted", untargeted.build());

    let mut scanner = Scanner::new(&settings, &mut registry);
    scanner.scan(
        &CandidateSet::Names(vec![
            String::from("hooks.Missing"),
            String::from("hooks.Plain"),
            String::from("hooks.Untargeted"),
        ]),
        &source,
    );
    assert_eq!(
        scanner.finish(),
        ScanReport {
            classes_registered: 0,
            specs_emitted: 0,
            candidates_skipped: 3,
        }
    );
    assert!(registry.freeze().is_empty());
}

#[test]
fn namespace_scan() {
    init_logging();
    let settings = Settings::new();
    let mut registry = Registry::new();
    let source = MapSource::default()
        .with("hooks/GameHooks", game_hooks(INJECT))
        .with("hooks/Plain", plain_class())
        .with("other/GameHooks", game_hooks(INJECT));

    let mut scanner = Scanner::new(&settings, &mut registry);
    scanner.scan(&CandidateSet::Namespace(String::from("hooks/")), &source);
    let report = scanner.finish();
    assert_eq!(report.classes_registered, 1);
    assert_eq!(report.specs_emitted, 3);
    assert_eq!(report.candidates_skipped, 1);

    let frozen = registry.freeze();
    assert_eq!(frozen.len(), 1);
    assert_eq!(frozen.lookup("game/Game").len(), 3);
}

#[test]
fn scanning_twice_registers_twice() {
    init_logging();
    let settings = Settings::new();
    let mut registry = Registry::new();
    let source = MapSource::default().with("hooks/GameHooks", game_hooks(INJECT));

    let mut scanner = Scanner::new(&settings, &mut registry);
    let candidates = CandidateSet::Names(vec![String::from("hooks.GameHooks")]);
    scanner.scan(&candidates, &source);
    scanner.scan(&candidates, &source);
    assert_eq!(scanner.report().classes_registered, 2);
    assert_eq!(scanner.finish().specs_emitted, 6);

    // Insertions are kept in scan order, duplicates included
    let handlers: Vec<String> = describe(&registry, "game/Game")
        .into_iter()
        .map(|line| line.split(' ').next().unwrap().to_owned())
        .collect();
    assert_eq!(
        handlers,
        vec!["onTick", "afterTick", "onCreate", "onTick", "afterTick", "onCreate"]
    );
}
