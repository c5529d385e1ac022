use jarhook::jvm::{BinaryName, FieldType, Name};
use jarhook::reflect::{
    Error, FieldInfo, HandlerContext, MethodInfo, Reflector, Runtime, TypeUniverse, Value,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

const WORLD: &str = "game/World";
const STRING: &str = "java/lang/String";

#[derive(Debug)]
struct HostFailure(String);

impl fmt::Display for HostFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host failure: {}", self.0)
    }
}

impl std::error::Error for HostFailure {}

enum HeapObject {
    World(HashMap<String, Value<usize>>),
    Str(String),
}

/// Tiny host with a single `game.World` class
///
/// ```java
/// class World {
///     static int count;
///     String name;
///     World parent;
///
///     World(String name) { ... }
///     static String greet(String who) { return "hello, " + who; }
///     void rename(String name) { ... }
///     int size() { return name.length(); }
///     void explode() { throw ...; }
/// }
/// ```
#[derive(Default)]
struct Host {
    heap: RefCell<Vec<HeapObject>>,
    count: RefCell<i32>,
}

impl Host {
    fn string(&self, value: &str) -> usize {
        let mut heap = self.heap.borrow_mut();
        heap.push(HeapObject::Str(value.to_owned()));
        heap.len() - 1
    }

    fn class(name: &str) -> FieldType<String> {
        FieldType::object(name.to_owned())
    }

    fn world_field(&self, world: usize, name: &str) -> Value<usize> {
        match &self.heap.borrow()[world] {
            HeapObject::World(fields) => fields.get(name).cloned().unwrap_or(Value::Null),
            HeapObject::Str(_) => panic!("not a world"),
        }
    }
}

impl TypeUniverse for Host {
    type Class = String;

    fn resolve_class(&self, name: &BinaryName) -> Option<String> {
        match name.as_str() {
            WORLD | STRING | "java/lang/Object" => Some(name.as_str().to_owned()),
            _ => None,
        }
    }
}

impl Runtime for Host {
    type Object = usize;
    type Failure = HostFailure;

    fn class_of(&self, object: &usize) -> String {
        match self.heap.borrow()[*object] {
            HeapObject::World(_) => WORLD.to_owned(),
            HeapObject::Str(_) => STRING.to_owned(),
        }
    }

    fn string_value(&self, object: &usize) -> Option<String> {
        match &self.heap.borrow()[*object] {
            HeapObject::Str(value) => Some(value.clone()),
            HeapObject::World(_) => None,
        }
    }

    fn declared_field(&self, class: &String, name: &str) -> Option<FieldInfo<String>> {
        if class != WORLD {
            return None;
        }
        let (field_type, is_static) = match name {
            "count" => (FieldType::int(), true),
            "name" => (Host::class(STRING), false),
            "parent" => (Host::class(WORLD), false),
            _ => return None,
        };
        Some(FieldInfo {
            field_type,
            is_static,
        })
    }

    fn declared_method(
        &self,
        class: &String,
        name: &str,
        parameters: &[FieldType<String>],
    ) -> Option<MethodInfo<String>> {
        if class != WORLD {
            return None;
        }
        let string = vec![Host::class(STRING)];
        let (expected, return_type, is_static) = match name {
            "greet" => (string, Some(Host::class(STRING)), true),
            "rename" => (string, None, false),
            "size" => (vec![], Some(FieldType::int()), false),
            "explode" => (vec![], None, false),
            _ => return None,
        };
        if expected.as_slice() != parameters {
            return None;
        }
        Some(MethodInfo {
            return_type,
            is_static,
        })
    }

    fn has_constructor(&self, class: &String, parameters: &[FieldType<String>]) -> bool {
        class == WORLD && parameters == &[Host::class(STRING)][..]
    }

    fn read_field(
        &self,
        _class: &String,
        name: &str,
        receiver: Option<&usize>,
    ) -> Result<Value<usize>, HostFailure> {
        match receiver {
            None => Ok(Value::Int(*self.count.borrow())),
            Some(world) => Ok(self.world_field(*world, name)),
        }
    }

    fn write_field(
        &self,
        _class: &String,
        name: &str,
        receiver: Option<&usize>,
        value: Value<usize>,
    ) -> Result<(), HostFailure> {
        match (receiver, value) {
            (None, Value::Int(count)) => *self.count.borrow_mut() = count,
            (None, other) => return Err(HostFailure(format!("cannot store {:?} in count", other))),
            (Some(world), value) => match &mut self.heap.borrow_mut()[*world] {
                HeapObject::World(fields) => {
                    fields.insert(name.to_owned(), value);
                }
                HeapObject::Str(_) => return Err(HostFailure(String::from("not a world"))),
            },
        }
        Ok(())
    }

    fn call_method(
        &self,
        class: &String,
        name: &str,
        _parameters: &[FieldType<String>],
        receiver: Option<&usize>,
        args: &[Value<usize>],
    ) -> Result<Value<usize>, HostFailure> {
        match name {
            "greet" => {
                let who = args[0]
                    .as_object()
                    .and_then(|who| self.string_value(who))
                    .unwrap_or_else(|| String::from("null"));
                Ok(Value::Object(self.string(&format!("hello, {}", who))))
            }
            "rename" => {
                self.write_field(class, "name", receiver, args[0].clone())?;
                Ok(Value::Null)
            }
            "size" => {
                let world = receiver.ok_or_else(|| HostFailure(String::from("no receiver")))?;
                let name = self.world_field(*world, "name");
                let length = name
                    .as_object()
                    .and_then(|name| self.string_value(name))
                    .map_or(0, |name| name.len());
                Ok(Value::Int(length as i32))
            }
            _ => Err(HostFailure(format!("{} threw", name))),
        }
    }

    fn construct(
        &self,
        _class: &String,
        _parameters: &[FieldType<String>],
        args: &[Value<usize>],
    ) -> Result<usize, HostFailure> {
        let mut fields = HashMap::new();
        fields.insert(String::from("name"), args[0].clone());
        let mut heap = self.heap.borrow_mut();
        heap.push(HeapObject::World(fields));
        Ok(heap.len() - 1)
    }
}

#[test]
fn static_view() {
    let host = Host::default();
    let world = Reflector::for_class(&host, "game.World").unwrap();
    assert!(world.is_null());

    world.set_field("count", Value::Int(3)).unwrap();
    assert_eq!(world.get_field("count").unwrap().as_int(), Some(3));

    let bob = host.string("bob");
    let greeting = world
        .invoke("greet", "(Ljava/lang/String;)", &[Value::Object(bob)])
        .unwrap();
    assert_eq!(greeting.as_string().as_deref(), Some("hello, bob"));
    assert_eq!(greeting.declared_type(), Some(&Host::class(STRING)));

    assert!(matches!(world.get_field("name"), Err(Error::NotStatic(_))));
    assert!(matches!(
        world.invoke("size", "()", &[]),
        Err(Error::NotStatic(_))
    ));
    assert!(matches!(
        world.get_field("missing"),
        Err(Error::MemberNotFound(_))
    ));
    assert!(matches!(
        Reflector::for_class(&host, "game.Nowhere"),
        Err(Error::MemberNotFound(_))
    ));
}

#[test]
fn instances() {
    let host = Host::default();
    let world = Reflector::for_class(&host, "game/World").unwrap();
    let earth = host.string("earth");
    let earth = world
        .new_instance("(Ljava/lang/String;)V", &[Value::Object(earth)])
        .unwrap();
    assert!(!earth.is_null());
    assert_eq!(
        earth.get_field("name").unwrap().as_string().as_deref(),
        Some("earth")
    );
    assert_eq!(earth.invoke("size", "()I", &[]).unwrap().as_int(), Some(5));

    let mars = host.string("mars");
    let renamed = earth
        .invoke("rename", "(Ljava/lang/String;)V", &[Value::Object(mars)])
        .unwrap();
    assert!(renamed.is_null());
    assert_eq!(renamed.declared_type(), None);
    assert!(matches!(
        renamed.get_field("name"),
        Err(Error::MemberNotFound(_))
    ));
    assert_eq!(earth.invoke("size", "()I", &[]).unwrap().as_int(), Some(4));

    // A null field of a class type is a static view of that class
    let parent = earth.get_field("parent").unwrap();
    assert!(parent.is_null());
    assert_eq!(parent.get_field("count").unwrap().as_int(), Some(0));
    assert!(matches!(parent.get_field("name"), Err(Error::NotStatic(_))));

    let same = Reflector::for_object(&host, *earth.as_object().unwrap());
    assert_eq!(same.get_field("name").unwrap().as_string().as_deref(), Some("mars"));
}

#[test]
fn lookups_are_exact() {
    let host = Host::default();
    let world = Reflector::for_class(&host, "game.World").unwrap();

    assert!(matches!(
        world.invoke("greet", "(Ljava/lang/Object;)", &[Value::Null]),
        Err(Error::MemberNotFound(_))
    ));
    assert!(matches!(
        world.invoke("greet", "(Lcom/acme/Missing;)", &[Value::Null]),
        Err(Error::MalformedDescriptor(_))
    ));
    assert!(matches!(
        world.invoke("greet", "(Ljava/lang/String", &[Value::Null]),
        Err(Error::MalformedDescriptor(_))
    ));
    assert!(matches!(
        world.new_instance("()V", &[]),
        Err(Error::MemberNotFound(_))
    ));

    // Members of primitives and arrays cannot be looked up
    let count = world.get_field("count").unwrap();
    assert!(matches!(count.get_field("x"), Err(Error::MemberNotFound(_))));
    let array = Reflector::new(&host, FieldType::array(Host::class(WORLD)), Value::Null);
    assert!(matches!(array.invoke("size", "()", &[]), Err(Error::MemberNotFound(_))));
}

#[test]
fn host_failures_keep_their_cause() {
    let host = Host::default();
    let world = Reflector::for_class(&host, "game.World").unwrap();
    let earth = host.string("earth");
    let earth = world
        .new_instance("(Ljava/lang/String;)V", &[Value::Object(earth)])
        .unwrap();

    let err = match earth.invoke("explode", "()V", &[]) {
        Err(err) => err,
        Ok(_) => panic!("explode should fail"),
    };
    assert!(matches!(&err, Error::Access { member, .. } if member == "method explode"));
    assert_eq!(
        err.to_string(),
        "failed to access method explode: host failure: explode threw"
    );
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(source.to_string(), "host failure: explode threw");

    assert!(matches!(
        world.set_field("count", Value::Long(1)),
        Err(Error::Access { .. })
    ));
}

#[test]
fn handler_context_reflects_its_receiver() {
    let host = Host::default();
    let world = Reflector::for_class(&host, "game.World").unwrap();
    let name = host.string("venus");
    let venus = world
        .new_instance("(Ljava/lang/String;)V", &[Value::Object(name)])
        .unwrap();
    let venus = *venus.as_object().unwrap();

    let mut context = HandlerContext::new(Some(venus), vec![Value::Int(2), Value::Object(name)]);
    let this = context.reflector(&host).unwrap();
    assert_eq!(
        this.get_field("name").unwrap().as_string().as_deref(),
        Some("venus")
    );
    assert_eq!(context.arg(1).unwrap(), &Value::Int(2));
    assert!(matches!(
        context.arg(3),
        Err(Error::ArgumentIndex { index: 3, count: 2 })
    ));

    context.set_return_value(Value::Int(9));
    context.set_cancelled(true);
    assert!(context.is_cancelled());
    assert_eq!(context.return_value(), &Value::Int(9));

    let static_context: HandlerContext<usize> = HandlerContext::new(None, vec![]);
    assert!(static_context.reflector(&host).is_none());
    assert_eq!(static_context.arg_count(), 0);
}
