#![allow(dead_code)]

pub mod builder;
pub mod interpreter;

use interpreter::{Jvm, Val};
use jarhook::inject::{context, InsertionSpec, Location, Registry, Settings, Transformer};

pub const HOOKS: &str = "hooks/Hooks";
pub const HANDLER: &str = "(Ljarhook/util/HandlerContext;)V";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Transformer for insertions given as `(method, descriptor, location, handler)`, all targeting
/// `class` and calling handlers on [`HOOKS`]
pub fn transformer(class: &str, insertions: &[(&str, &str, Location, &str)]) -> Transformer {
    let mut registry = Registry::new();
    for (method, descriptor, location, handler) in insertions {
        let spec =
            InsertionSpec::new(class, method, descriptor, *location, HOOKS, handler).unwrap();
        registry.register(spec).unwrap();
    }
    Transformer::new(registry.freeze(), Settings::new())
}

/// Interpreter with the default context class loaded
pub fn jvm() -> Jvm {
    let mut jvm = Jvm::new();
    jvm.load(&context::generate(&Settings::new()).unwrap());
    jvm
}

/// Handler on [`HOOKS`] that records `name` along with the arguments it sees
pub fn recording_handler(jvm: &mut Jvm, name: &'static str) {
    jvm.native(HOOKS, name, HANDLER, move |jvm, args| {
        let ctx = args[0];
        let this = jvm.ctx_self(ctx)?;
        let count = match jvm.ctx_arg_count(ctx)? {
            Val::Int(count) => count,
            other => panic!("argument count {:?}", other),
        };
        let mut seen = vec![];
        for index in 1..=count {
            let arg = jvm.ctx_arg(ctx, index)?;
            seen.push(jvm.describe(arg));
        }
        let this = if this == Val::Null { "null" } else { "this" };
        jvm.record(format!("{}({}) [{}]", name, this, seen.join(", ")));
        Ok(None)
    });
}

/// Handler on [`HOOKS`] that cancels the method, making it return `value` (built on each call)
pub fn cancelling_handler(jvm: &mut Jvm, name: &'static str, value: impl Fn(&mut Jvm) -> Val + 'static) {
    jvm.native(HOOKS, name, HANDLER, move |jvm, args| {
        jvm.record(name);
        let value = value(jvm);
        jvm.ctx_cancel(args[0], value)?;
        Ok(None)
    });
}
