use super::{Error, Reflector, Runtime, Value};

/// Native counterpart of the context object rewritten code passes to handlers
///
/// Hosts that dispatch handlers to Rust build one of these per invocation, run the handler, and
/// then read back [`HandlerContext::is_cancelled`] and [`HandlerContext::return_value`].
#[derive(Clone, Debug)]
pub struct HandlerContext<O> {
    instance: Option<O>,
    args: Vec<Value<O>>,
    cancelled: bool,
    return_value: Value<O>,
}

impl<O> HandlerContext<O> {
    /// `instance` is `None` for static methods and for constructors that have not run yet
    pub fn new(instance: Option<O>, args: Vec<Value<O>>) -> HandlerContext<O> {
        HandlerContext {
            instance,
            args,
            cancelled: false,
            return_value: Value::Null,
        }
    }

    pub fn instance(&self) -> Option<&O> {
        self.instance.as_ref()
    }

    /// Argument of the edited method, counting from 1
    pub fn arg(&self, index: usize) -> Result<&Value<O>, Error> {
        index
            .checked_sub(1)
            .and_then(|index| self.args.get(index))
            .ok_or(Error::ArgumentIndex {
                index,
                count: self.args.len(),
            })
    }

    pub fn args(&self) -> &[Value<O>] {
        &self.args
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Make the edited method return right after the handler
    ///
    /// Cancelling does nothing in a constructor, or at the tail of a method.
    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Value returned when the edited method is cancelled
    pub fn set_return_value(&mut self, value: Value<O>) {
        self.return_value = value;
    }

    pub fn return_value(&self) -> &Value<O> {
        &self.return_value
    }

    /// Reflector over the receiver of the edited method
    pub fn reflector<'r, R>(&self, runtime: &'r R) -> Option<Reflector<'r, R>>
    where
        R: Runtime<Object = O>,
        O: Clone,
    {
        self.instance
            .clone()
            .map(|instance| Reflector::for_object(runtime, instance))
    }
}
