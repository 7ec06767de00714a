//! The runtime classes get defined into, executed in, and redefined in
//!
//! ### Simple example
//!
//! ```
//! use hotswap::jvm::*;
//! use hotswap::model::*;
//! use hotswap::runtime::{Runtime, Value};
//! use hotswap::Settings;
//!
//! let runtime = Runtime::new(Settings::new());
//! let thread = runtime.attach_thread();
//!
//! let name = BinaryName::from_string(String::from("demo/Answer")).unwrap();
//! let mut class = CandidateClass::new(name, Some(BinaryName::OBJECT), ClassAccessFlags::PUBLIC);
//! class.add_method(Method::new(
//!     UnqualifiedName::from_string(String::from("get")).unwrap(),
//!     MethodDescriptor::parse("()I").unwrap(),
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     Some(Code::new(vec![Instruction::IConst(42), Instruction::IReturn])),
//! ));
//!
//! let id = runtime.define_class(&thread, class).unwrap();
//! let answer = runtime.invoke_static(&thread, id, "get", "()I", vec![]).unwrap();
//! assert_eq!(answer, Some(Value::Int(42)));
//! ```

mod call_sites;
mod class_table;
mod dispatch;
mod heap;
pub mod hooks;
mod reflection;
mod safepoint;
mod shape;
mod statics;

pub use call_sites::*;
pub use class_table::*;
pub use dispatch::*;
pub use heap::*;
pub use hooks::*;
pub use reflection::{ClassMirror, FieldMirror, MethodMirror};
pub(crate) use reflection::invalidate as invalidate_mirror;
pub use safepoint::*;
pub use shape::*;
pub use statics::*;

use crate::errors::Error;
use crate::exec::{ExecError, Interpreter, NativeContext, NativeRegistry};
use crate::jvm::{
    BinaryName, ClassAccessFlags, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
    UnqualifiedName,
};
use crate::model::{CandidateClass, ClassDefinition, Code, Instruction, InvokeType, Method};
use crate::redefine::{
    FieldTableBuilder, FixupCoordinator, IdentityHandle, IdentityRegistry, MemberKey,
    MethodTableBuilder, RedefinitionSummary, ViolatedRule,
};
use crate::settings::{CacheInvalidation, Settings};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A class table, the code running over it, and the machinery to redefine its classes
pub struct Runtime {
    pub(crate) settings: Settings,
    pub(crate) classes: ClassTable,
    pub(crate) statics: StaticStorage,
    pub(crate) safepoints: Arc<Safepoints>,
    pub(crate) identities: IdentityRegistry,
    pub(crate) call_sites: CallSiteTable,
    pub(crate) natives: NativeRegistry,
    pub(crate) collaborators: Collaborators,

    /// Serializes redefinitions (and class definitions) with each other
    pub(crate) redefinition_lock: Mutex<()>,

    /// Number of committed redefinition batches
    pub(crate) redefinition_count: AtomicU64,
    pub(crate) listeners: RwLock<Vec<Arc<dyn RedefinitionListener>>>,
}

impl Runtime {
    pub fn new(settings: Settings) -> Runtime {
        Runtime::with_collaborators(settings, Collaborators::default())
    }

    pub fn with_collaborators(settings: Settings, collaborators: Collaborators) -> Runtime {
        let runtime = Runtime {
            settings,
            classes: ClassTable::new(),
            statics: StaticStorage::new(),
            safepoints: Arc::new(Safepoints::new()),
            identities: IdentityRegistry::new(),
            call_sites: CallSiteTable::new(),
            natives: NativeRegistry::new(),
            collaborators,
            redefinition_lock: Mutex::new(()),
            redefinition_count: AtomicU64::new(0),
            listeners: RwLock::new(vec![]),
        };
        for class in bootstrap_classes() {
            if let Err(err) = runtime.define_locked(class) {
                panic!("Failed to define a bootstrap class: {}", err);
            }
        }
        runtime
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn safepoints(&self) -> &Arc<Safepoints> {
        &self.safepoints
    }

    /// Register the calling thread as a mutator
    pub fn attach_thread(&self) -> MutatorThread {
        MutatorThread::new(self.safepoints.clone())
    }

    /// Load a new class
    ///
    /// Its superclass and interfaces must already be defined.
    pub fn define_class(
        &self,
        thread: &MutatorThread,
        candidate: CandidateClass,
    ) -> Result<ClassId, Error> {
        let _lock = thread.blocking(|| self.redefinition_lock.lock());
        self.define_locked(candidate)
    }

    fn define_locked(&self, candidate: CandidateClass) -> Result<ClassId, Error> {
        let name = candidate.name.clone();
        if self.classes.lookup(&name).is_some() {
            return Err(Error::DuplicateClass(name));
        }
        check_candidate(&candidate)?;
        let invalid = |reason: &str| Error::InvalidClass {
            class: name.clone(),
            reason: String::from(reason),
        };

        let superclass = match &candidate.superclass {
            None if name == BinaryName::OBJECT => None,
            None => return Err(invalid("missing superclass")),
            Some(superclass) => {
                let id = self.class_id_of(superclass)?;
                if self.classes.entry(id).shape().is_interface() {
                    return Err(invalid("superclass is an interface"));
                }
                Some(id)
            }
        };
        if candidate.access_flags.is_interface() && candidate.superclass != Some(BinaryName::OBJECT) {
            return Err(invalid("interfaces must extend java/lang/Object"));
        }
        let mut interfaces = vec![];
        for interface in &candidate.interfaces {
            let id = self.class_id_of(interface)?;
            if !self.classes.entry(id).shape().is_interface() {
                return Err(invalid("implements a class that isn't an interface"));
            }
            interfaces.push(id);
        }

        let id = self.classes.next_id();
        let depth = superclass
            .iter()
            .chain(interfaces.iter())
            .map(|parent| self.classes.entry(*parent).depth + 1)
            .max()
            .unwrap_or(0);
        let superclass_slots =
            superclass.map_or(0, |parent| self.classes.entry(parent).shape().instance_slot_count);

        let fields = FieldTableBuilder::new(id, &self.statics).fresh(&candidate, superclass_slots);
        let methods = MethodTableBuilder::new(&self.classes, id, 0).build(
            &candidate,
            None,
            superclass,
            &interfaces,
            0,
        );
        let shape = ClassShape::from_parts(ShapeParts {
            class: id,
            name: name.clone(),
            superclass,
            interfaces,
            access_flags: candidate.access_flags,
            is_hidden: candidate.is_hidden,
            generation: 0,
            fields: fields.fields,
            methods: methods.methods,
            constants: methods.constants,
            bootstrap_methods: methods.bootstrap_methods,
            annotations: candidate.annotations,
            instance_slot_count: fields.instance_slot_count,
            vtable: Arc::new(VTable::new(methods.vtable)),
            itable: Arc::new(ITable::new(methods.itable)),
        });
        self.classes.insert(ClassEntry::new(depth, shape));
        log::debug!("Defined {} as {:?}", name, id);
        Ok(id)
    }

    fn class_id_of(&self, name: &BinaryName) -> Result<ClassId, Error> {
        self.classes
            .lookup(name)
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))
    }

    pub fn class_id(&self, name: &str) -> Result<ClassId, Error> {
        BinaryName::from_string(String::from(name))
            .ok()
            .and_then(|name| self.classes.lookup(&name))
            .ok_or_else(|| Error::ClassNotFound(String::from(name)))
    }

    pub(crate) fn entry(&self, class: ClassId) -> Result<Arc<ClassEntry>, Error> {
        self.classes
            .get(class)
            .ok_or_else(|| Error::ClassNotFound(format!("{:?}", class)))
    }

    pub fn class_name(&self, class: ClassId) -> Result<BinaryName, Error> {
        Ok(self.entry(class)?.name.clone())
    }

    /// Currently installed shape of a class
    pub fn shape(&self, class: ClassId) -> Result<Arc<ClassShape>, Error> {
        Ok(self.entry(class)?.shape())
    }

    pub fn initialize(&self, thread: &MutatorThread, class: ClassId) -> Result<(), Error> {
        self.entry(class)?;
        Interpreter::new(self, thread).initialize(class)?;
        Ok(())
    }

    /// Allocate an object and run its no-argument constructor
    pub fn new_instance(&self, thread: &MutatorThread, class: ClassId) -> Result<ObjectRef, Error> {
        self.entry(class)?;
        let mut interpreter = Interpreter::new(self, thread);
        let obj = interpreter.allocate(class)?;
        let init = MethodKey::new(UnqualifiedName::INIT, MethodDescriptor::VOID);
        interpreter.call(
            InvokeType::Special,
            class,
            &init,
            vec![Value::Object(obj.clone())],
        )?;
        Ok(obj)
    }

    /// Call a static method, initializing its class first
    pub fn invoke_static(
        &self,
        thread: &MutatorThread,
        class: ClassId,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        let key = self.method_key(class, name, descriptor)?;
        let result = Interpreter::new(self, thread).call(InvokeType::Static, class, &key, args)?;
        Ok(result)
    }

    /// Call an instance method, dispatching on the class of `receiver`
    pub fn invoke_virtual(
        &self,
        thread: &MutatorThread,
        receiver: &ObjectRef,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        let class = receiver.class();
        let key = self.method_key(class, name, descriptor)?;
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(Value::Object(receiver.clone()));
        full_args.extend(args);
        let result =
            Interpreter::new(self, thread).call(InvokeType::Virtual, class, &key, full_args)?;
        Ok(result)
    }

    /// Call a method through its identity handle
    ///
    /// Virtual methods dispatch on the receiver (the first argument).
    pub fn invoke_handle(
        &self,
        thread: &MutatorThread,
        handle: &IdentityHandle,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        let method = self.resolve_method(handle)?;
        let kind = if method.is_static() {
            InvokeType::Static
        } else if method.is_virtual() {
            InvokeType::Virtual
        } else {
            InvokeType::Special
        };
        let result =
            Interpreter::new(self, thread).call(kind, method.class, &method.key(), args)?;
        Ok(result)
    }

    /// Provide the implementation of a `native` method
    pub fn register_native(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
        native: impl Fn(&NativeContext<'_>, Vec<Value>) -> Result<Option<Value>, ExecError>
            + Send
            + Sync
            + 'static,
    ) -> Result<(), Error> {
        let class_name = BinaryName::from_string(String::from(class))
            .map_err(|_| Error::ClassNotFound(String::from(class)))?;
        let key = parse_method_key(name, descriptor).ok_or_else(|| Error::MemberNotFound {
            class: class_name.clone(),
            member: format!("{}{}", name, descriptor),
        })?;
        self.natives.register(class_name, key, Arc::new(native));
        Ok(())
    }

    fn method_key(&self, class: ClassId, name: &str, descriptor: &str) -> Result<MethodKey, Error> {
        let entry = self.entry(class)?;
        parse_method_key(name, descriptor).ok_or_else(|| Error::MemberNotFound {
            class: entry.name.clone(),
            member: format!("{}{}", name, descriptor),
        })
    }

    /// Identity handle of a field of the current version of `class`
    pub fn field_handle(&self, class: ClassId, name: &str) -> Result<IdentityHandle, Error> {
        let entry = self.entry(class)?;
        let shape = entry.shape();
        shape
            .fields
            .iter()
            .find(|f| f.name.as_str() == name)
            .and_then(|field| self.identities.handle(&shape, MemberKey::Field(field.key())))
            .ok_or_else(|| Error::MemberNotFound {
                class: entry.name.clone(),
                member: String::from(name),
            })
    }

    /// Identity handle of a method of the current version of `class`
    pub fn method_handle(
        &self,
        class: ClassId,
        name: &str,
        descriptor: &str,
    ) -> Result<IdentityHandle, Error> {
        let entry = self.entry(class)?;
        let key = self.method_key(class, name, descriptor)?;
        self.identities
            .handle(&entry.shape(), MemberKey::Method(key))
            .ok_or_else(|| Error::MemberNotFound {
                class: entry.name.clone(),
                member: format!("{}{}", name, descriptor),
            })
    }

    fn stale(&self, handle: &IdentityHandle) -> Error {
        Error::StaleMember {
            class: self.classes.entry(handle.class()).name.clone(),
            member: handle.key().to_string(),
        }
    }

    /// Current version of the field behind a handle
    pub fn resolve_field(&self, handle: &IdentityHandle) -> Result<FieldData, Error> {
        let shape = self.shape(handle.class())?;
        match handle.key() {
            MemberKey::Field(_) => handle
                .resolve(&shape)
                .map(|idx| shape.fields[idx].clone())
                .ok_or_else(|| self.stale(handle)),
            MemberKey::Method(_) => Err(Error::MemberNotFound {
                class: shape.name.clone(),
                member: format!("{} (not a field)", handle.key()),
            }),
        }
    }

    /// Current version of the method behind a handle
    pub fn resolve_method(&self, handle: &IdentityHandle) -> Result<Arc<MethodData>, Error> {
        let shape = self.shape(handle.class())?;
        match handle.key() {
            MemberKey::Method(_) => handle
                .resolve(&shape)
                .map(|idx| shape.methods[idx].clone())
                .ok_or_else(|| self.stale(handle)),
            MemberKey::Field(_) => Err(Error::MemberNotFound {
                class: shape.name.clone(),
                member: format!("{} (not a method)", handle.key()),
            }),
        }
    }

    /// Storage cell of a static field
    ///
    /// The same cell is returned for as long as the field exists, across any number of
    /// redefinitions.
    pub fn static_cell(&self, handle: &IdentityHandle) -> Result<Arc<StaticCell>, Error> {
        let field = self.resolve_field(handle)?;
        match field.storage {
            FieldStorage::Static(slot) => Ok(self.statics.cell(slot)),
            FieldStorage::Instance(_) => Err(ExecError::IncompatibleClassChange(format!(
                "{:?} is not static",
                field
            ))
            .into()),
        }
    }

    pub fn get_static(&self, handle: &IdentityHandle) -> Result<Value, Error> {
        Ok(self.static_cell(handle)?.get())
    }

    pub fn put_static(&self, handle: &IdentityHandle, value: Value) -> Result<(), Error> {
        self.static_cell(handle)?.set(value);
        Ok(())
    }

    fn instance_slot(
        &self,
        handle: &IdentityHandle,
        obj: &ObjectRef,
    ) -> Result<(InstanceSlot, FieldData), Error> {
        let field = self.resolve_field(handle)?;
        if !self.classes.is_subtype(obj.class(), field.class) {
            return Err(ExecError::IncompatibleClassChange(format!(
                "{:?} has no field {:?}",
                obj, field
            ))
            .into());
        }
        match field.storage {
            FieldStorage::Instance(slot) => Ok((slot, field)),
            FieldStorage::Static(_) => Err(ExecError::IncompatibleClassChange(format!(
                "{:?} is static",
                field
            ))
            .into()),
        }
    }

    pub fn get_field(&self, handle: &IdentityHandle, obj: &ObjectRef) -> Result<Value, Error> {
        let (slot, field) = self.instance_slot(handle, obj)?;
        Ok(obj.get(slot, &field.descriptor))
    }

    pub fn put_field(
        &self,
        handle: &IdentityHandle,
        obj: &ObjectRef,
        value: Value,
    ) -> Result<(), Error> {
        let (slot, _) = self.instance_slot(handle, obj)?;
        obj.set(slot, value);
        Ok(())
    }

    /// Reflective view of a class
    ///
    /// Building the mirror counts as running code of the class, so it never straddles a
    /// redefinition of the class or of one of its superclasses.
    pub fn mirror(&self, thread: &MutatorThread, class: ClassId) -> Result<Arc<ClassMirror>, Error> {
        let entry = self.entry(class)?;
        let _frame = thread.enter(class);
        let mut cached = entry.mirror.lock();
        if let Some(mirror) = cached.as_ref() {
            let trusted = match self.settings.cache_invalidation {
                CacheInvalidation::Eager => true,
                CacheInvalidation::Lazy => mirror.is_current(&self.classes),
            };
            if trusted {
                return Ok(mirror.clone());
            }
            log::trace!("Mirror of {:?} is out of date", entry);
        }
        let mirror = Arc::new(ClassMirror::build(&self.classes, &self.identities, class));
        *cached = Some(mirror.clone());
        Ok(mirror)
    }

    /// Atomically replace a batch of classes
    ///
    /// Either every class in the batch is redefined, or (on error) nothing changed.
    pub fn redefine_classes(
        &self,
        thread: &MutatorThread,
        definitions: Vec<ClassDefinition>,
    ) -> Result<RedefinitionSummary, Error> {
        FixupCoordinator::new(self, thread).run(definitions)
    }

    /// Replace one class
    pub fn redefine_class(
        &self,
        thread: &MutatorThread,
        class: ClassId,
        candidate: CandidateClass,
    ) -> Result<RedefinitionSummary, Error> {
        self.redefine_classes(thread, vec![ClassDefinition::new(class, candidate)])
    }

    /// Can this class ever be redefined?
    pub fn is_modifiable_class(&self, class: ClassId) -> bool {
        match self.classes.get(class) {
            Some(entry) => self.unmodifiable_reason(&entry.shape()).is_none(),
            None => false,
        }
    }

    pub(crate) fn unmodifiable_reason(&self, shape: &ClassShape) -> Option<ViolatedRule> {
        if shape.is_hidden {
            Some(ViolatedRule::HiddenClass)
        } else if shape.name.is_array() || self.settings.is_reserved(&shape.name) {
            Some(ViolatedRule::ReservedClass)
        } else {
            None
        }
    }

    /// Number of redefinition batches committed so far
    pub fn redefinition_count(&self) -> u64 {
        self.redefinition_count.load(Ordering::Acquire)
    }

    pub fn add_listener(&self, listener: Arc<dyn RedefinitionListener>) {
        self.listeners.write().push(listener);
    }

    /// Number of linked `invokedynamic` call sites
    pub fn call_site_count(&self) -> usize {
        self.call_sites.len()
    }
}

fn parse_method_key(name: &str, descriptor: &str) -> Option<MethodKey> {
    let name = UnqualifiedName::from_string(String::from(name)).ok()?;
    let descriptor = MethodDescriptor::parse(descriptor).ok()?;
    Some(MethodKey::new(name, descriptor))
}

/// Structural checks a class must pass before it is defined or used as a replacement
pub(crate) fn check_candidate(candidate: &CandidateClass) -> Result<(), Error> {
    for method in &candidate.methods {
        let problem = match (&method.code, method.access_flags.has_no_code()) {
            (Some(code), false) => code.check_well_formed().err(),
            (None, true) => None,
            (Some(_), true) => Some(String::from("abstract or native method has code")),
            (None, false) => Some(String::from("method has no code")),
        };
        if let Some(problem) = problem {
            return Err(Error::InvalidClass {
                class: candidate.name.clone(),
                reason: format!("{}{}: {}", method.name, method.descriptor, problem),
            });
        }
    }
    Ok(())
}

/// Classes every runtime starts out with
fn bootstrap_classes() -> Vec<CandidateClass> {
    let constructor = || {
        Method::new(
            UnqualifiedName::INIT,
            MethodDescriptor::VOID,
            MethodAccessFlags::PUBLIC,
            Some(Code::new(vec![Instruction::Return])),
        )
    };

    let mut object = CandidateClass::new(
        BinaryName::OBJECT,
        None,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
    );
    object.add_method(constructor());

    let mut enumeration = CandidateClass::new(
        BinaryName::ENUM,
        Some(BinaryName::OBJECT),
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER | ClassAccessFlags::ABSTRACT,
    );
    enumeration.add_method(constructor());

    vec![object, enumeration]
}
