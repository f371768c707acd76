use parking_lot::{Condvar, Mutex};
use pregen_adapter::patch::classfile::ClassFile;
use pregen_adapter::patch::code::{CodeAttribute, ALOAD_0, PUTSTATIC, RETURN};
use pregen_adapter::{
    FieldHandle, ForeignRuntime, MethodHandle, ObjectRef, Primitive, RuntimeError, TypeHandle,
    Value, INSTANCE_FIELD,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scripted method body
pub type MethodBehavior =
    Arc<dyn Fn(&FakeRuntime, Option<ObjectRef>, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Scripted field read
pub type FieldGetter = Arc<dyn Fn(&FakeRuntime, Option<ObjectRef>) -> Value + Send + Sync>;

type MethodKey = (String, String, Vec<String>);

struct DefinedType {
    handle: TypeHandle,
    fields: HashMap<String, FieldHandle>,
    publishes_instance: bool,
}

/// In-memory [`ForeignRuntime`]
///
/// Types are defined from real class files. Fields come from the image, so
/// the injected `instance` field exists only if the image was patched, and
/// constructing a type publishes the new object only if its constructor
/// ends with the patched store.
pub struct FakeRuntime {
    next_id: AtomicU64,
    types: Mutex<HashMap<String, DefinedType>>,
    system: Mutex<HashMap<String, TypeHandle>>,
    defined: Mutex<Vec<(String, Vec<u8>)>>,
    behaviors: Mutex<HashMap<MethodKey, MethodBehavior>>,
    bound: Mutex<HashMap<u64, MethodBehavior>>,
    getters: Mutex<HashMap<(String, String), FieldGetter>>,
    statics: Mutex<HashMap<(String, String), Value>>,
    objects: Mutex<HashMap<ObjectRef, String>>,
    threads: Mutex<HashMap<String, bool>>,
    thread_changed: Condvar,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        let runtime = Self {
            next_id: AtomicU64::new(1),
            types: Mutex::new(HashMap::new()),
            system: Mutex::new(HashMap::new()),
            defined: Mutex::new(Vec::new()),
            behaviors: Mutex::new(HashMap::new()),
            bound: Mutex::new(HashMap::new()),
            getters: Mutex::new(HashMap::new()),
            statics: Mutex::new(HashMap::new()),
            objects: Mutex::new(HashMap::new()),
            threads: Mutex::new(HashMap::new()),
            thread_changed: Condvar::new(),
        };
        for name in ["java.lang.Object", "java.lang.String", "java.lang.Thread"] {
            let handle = TypeHandle::new(runtime.id(), name);
            runtime.system.lock().insert(name.to_string(), handle);
        }
        runtime
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Script a method; `params` are runtime type names
    pub fn on_method<F>(&self, owner: &str, name: &str, params: &[&str], behavior: F)
    where
        F: Fn(&FakeRuntime, Option<ObjectRef>, &[Value]) -> Result<Value, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        let key = (
            owner.to_string(),
            name.to_string(),
            params.iter().map(|p| (*p).to_string()).collect(),
        );
        self.behaviors.lock().insert(key, Arc::new(behavior));
    }

    /// Script the static entry method of `owner`
    pub fn on_entry<F>(&self, owner: &str, behavior: F)
    where
        F: Fn(&FakeRuntime, Option<ObjectRef>, &[Value]) -> Result<Value, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        self.on_method(owner, "main", &["java.lang.String[]"], behavior);
    }

    /// Script reads of a field
    pub fn on_field_read<F>(&self, owner: &str, name: &str, getter: F)
    where
        F: Fn(&FakeRuntime, Option<ObjectRef>) -> Value + Send + Sync + 'static,
    {
        self.getters
            .lock()
            .insert((owner.to_string(), name.to_string()), Arc::new(getter));
    }

    pub fn set_static(&self, owner: &str, name: &str, value: Value) {
        self.statics
            .lock()
            .insert((owner.to_string(), name.to_string()), value);
    }

    pub fn static_value(&self, owner: &str, name: &str) -> Option<Value> {
        self.statics
            .lock()
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
    }

    /// Allocate an object of a defined type, running its constructor
    pub fn construct(&self, type_name: &str) -> ObjectRef {
        let obj = ObjectRef::new(self.id());
        self.objects.lock().insert(obj, type_name.to_string());
        let publishes = self
            .types
            .lock()
            .get(type_name)
            .is_some_and(|t| t.publishes_instance);
        if publishes {
            self.set_static(type_name, INSTANCE_FIELD, Value::Object(obj));
        }
        obj
    }

    /// Allocate a plain object that is not an instance of a defined type
    pub fn allocate(&self, label: &str) -> ObjectRef {
        let obj = ObjectRef::new(self.id());
        self.objects.lock().insert(obj, label.to_string());
        obj
    }

    pub fn type_of_object(&self, obj: ObjectRef) -> Option<String> {
        self.objects.lock().get(&obj).cloned()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.types.lock().contains_key(name)
    }

    /// Images passed to `define_type`, in order
    pub fn defined_images(&self) -> Vec<(String, Vec<u8>)> {
        self.defined.lock().clone()
    }

    pub fn start_thread(&self, name: &str) {
        self.threads.lock().insert(name.to_string(), true);
        self.thread_changed.notify_all();
    }

    pub fn stop_thread(&self, name: &str) {
        self.threads.lock().insert(name.to_string(), false);
        self.thread_changed.notify_all();
    }

    fn publishes_instance(class: &ClassFile) -> bool {
        if !class.field(INSTANCE_FIELD).is_some_and(|f| f.is_static()) {
            return false;
        }
        let code_name = class.pool.find_utf8(b"Code");
        class.methods_named("<init>").any(|init| {
            init.attributes
                .iter()
                .filter(|a| Some(a.name) == code_name)
                .filter_map(|a| CodeAttribute::parse(&a.data).ok())
                .any(|body| {
                    body.code
                        .windows(5)
                        .any(|w| w[0] == ALOAD_0 && w[1] == PUTSTATIC && w[4] == RETURN)
                })
        })
    }
}

impl ForeignRuntime for FakeRuntime {
    fn primitive(&self, primitive: Primitive) -> TypeHandle {
        TypeHandle::new(0, primitive.name())
    }

    fn system_type(&self, name: &str) -> Option<TypeHandle> {
        self.system.lock().get(name).cloned()
    }

    fn define_type(&self, name: &str, image: &[u8]) -> Result<TypeHandle, RuntimeError> {
        let invalid = |reason: String| RuntimeError::InvalidImage {
            name: name.to_string(),
            reason,
        };
        let class = ClassFile::parse(image).map_err(|e| invalid(e.to_string()))?;
        let declared = class.binary_name().map_err(|e| invalid(e.to_string()))?;
        if declared != name {
            return Err(invalid(format!("image declares {declared}")));
        }

        let mut types = self.types.lock();
        if types.contains_key(name) {
            return Err(RuntimeError::DuplicateType(name.to_string()));
        }
        let handle = TypeHandle::new(self.id(), name);
        let mut fields = HashMap::new();
        for field in &class.fields {
            let field_name = class
                .member_name(field)
                .map_err(|e| invalid(e.to_string()))?;
            let field_name = String::from_utf8_lossy(field_name).into_owned();
            let field_handle =
                FieldHandle::new(self.id(), handle.clone(), field_name.as_str(), field.is_static());
            fields.insert(field_name, field_handle);
        }
        types.insert(
            name.to_string(),
            DefinedType {
                handle: handle.clone(),
                fields,
                publishes_instance: Self::publishes_instance(&class),
            },
        );
        self.defined.lock().push((name.to_string(), image.to_vec()));
        Ok(handle)
    }

    fn field(&self, owner: &TypeHandle, name: &str) -> Option<FieldHandle> {
        self.types
            .lock()
            .get(owner.name())
            .and_then(|t| t.fields.get(name))
            .cloned()
    }

    fn method(&self, owner: &TypeHandle, name: &str, params: &[TypeHandle]) -> Option<MethodHandle> {
        let key = (
            owner.name().to_string(),
            name.to_string(),
            params.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
        );
        let known_owner = self.is_defined(owner.name()) || self.system_type(owner.name()).is_some();
        if !known_owner {
            return None;
        }
        let behavior = self.behaviors.lock().get(&key).cloned()?;
        let handle = MethodHandle::new(self.id(), owner.clone(), name, params.to_vec());
        self.bound.lock().insert(handle.id(), behavior);
        Some(handle)
    }

    fn entry_method(&self, ty: &TypeHandle) -> Option<MethodHandle> {
        let string_array = TypeHandle::new(0, "java.lang.String[]");
        self.method(ty, "main", &[string_array])
    }

    fn read_field(&self, field: &FieldHandle, target: Option<ObjectRef>) -> Result<Value, RuntimeError> {
        let key = (field.owner().name().to_string(), field.name().to_string());
        let getter = self.getters.lock().get(&key).cloned();
        if let Some(getter) = getter {
            return Ok(getter(self, target));
        }
        if field.is_static() {
            return Ok(self.statics.lock().get(&key).cloned().unwrap_or(Value::Null));
        }
        if target.is_none() {
            return Err(RuntimeError::MissingReceiver(field.to_string()));
        }
        Ok(Value::Null)
    }

    fn invoke(
        &self,
        method: &MethodHandle,
        target: Option<ObjectRef>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let behavior = self
            .bound
            .lock()
            .get(&method.id())
            .cloned()
            .ok_or_else(|| RuntimeError::Raised {
                member: method.to_string(),
                message: "method was never bound".to_string(),
            })?;
        behavior(self, target, args)
    }

    fn thread_alive(&self, name: &str) -> bool {
        self.threads.lock().get(name).copied().unwrap_or(false)
    }

    fn join_thread(&self, name: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut threads = self.threads.lock();
        while threads.get(name).copied().unwrap_or(false) {
            if self.thread_changed.wait_until(&mut threads, deadline).timed_out() {
                return !threads.get(name).copied().unwrap_or(false);
            }
        }
        true
    }
}

impl std::fmt::Debug for FakeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeRuntime")
            .field("types", &self.types.lock().len())
            .field("objects", &self.objects.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClassImage;
    use pregen_adapter::{InstanceFieldPatcher, StructuralPatcher};

    #[test]
    fn unpatched_type_does_not_publish() {
        let runtime = FakeRuntime::new();
        runtime
            .define_type("dg", &ClassImage::new("dg").build())
            .unwrap();
        runtime.construct("dg");
        assert_eq!(runtime.static_value("dg", INSTANCE_FIELD), None);
    }

    #[test]
    fn patched_type_publishes_last_instance() {
        let runtime = FakeRuntime::new();
        let patched = InstanceFieldPatcher::default()
            .patch("dg", &ClassImage::new("dg").build())
            .unwrap();
        let ty = runtime.define_type("dg", &patched).unwrap();
        assert!(runtime.field(&ty, INSTANCE_FIELD).unwrap().is_static());

        runtime.construct("dg");
        let second = runtime.construct("dg");
        assert_eq!(
            runtime.static_value("dg", INSTANCE_FIELD),
            Some(Value::Object(second))
        );
    }

    #[test]
    fn duplicate_definition_rejected() {
        let runtime = FakeRuntime::new();
        let image = ClassImage::new("bx").build();
        runtime.define_type("bx", &image).unwrap();
        assert_eq!(
            runtime.define_type("bx", &image),
            Err(RuntimeError::DuplicateType("bx".to_string()))
        );
    }

    #[test]
    fn join_returns_when_thread_stops() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.start_thread("worker");
        assert!(!runtime.join_thread("worker", Duration::from_millis(10)));

        let stopper = Arc::clone(&runtime);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            stopper.stop_thread("worker");
        });
        assert!(runtime.join_thread("worker", Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
