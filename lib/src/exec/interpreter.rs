use super::{ExecError, NativeContext};
use crate::jvm::{
    BinaryName, ClassAccessFlags, MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName,
};
use crate::model::{
    ConstantData, ConstantIndex, FieldRef, Instruction, InvokeDynamicData, InvokeType, MethodRef,
    Offset,
};
use crate::runtime::{
    CallSiteBinding, CallSiteKey, ClassId, FieldData, FieldKey, FieldStorage, InitState,
    MethodBody, MethodData, MethodKey, MutatorThread, Object, ObjectRef, Runtime, Slot,
    StaticCell, Value,
};
use std::sync::Arc;

/// Evaluates method bodies on one mutator thread
///
/// Every frame holds on to the `Arc<MethodBody>` it started with. A redefinition that replaces
/// the method mid-call doesn't affect the running frame: it finishes on the old (obsolete) body,
/// and only calls made afterwards see the new one.
pub struct Interpreter<'a> {
    runtime: &'a Runtime,
    thread: &'a MutatorThread,
    depth: usize,
}

/// Locals and operand stack of an executing method
///
/// Locals are numbered per value: `long` takes one local, not two.
struct Frame {
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, ExecError> {
        self.stack.pop().ok_or(ExecError::StackUnderflow)
    }

    fn pop_int(&mut self) -> Result<i32, ExecError> {
        match self.pop()? {
            Value::Int(i) => Ok(i),
            other => Err(mismatch("int", &other)),
        }
    }

    fn pop_long(&mut self) -> Result<i64, ExecError> {
        match self.pop()? {
            Value::Long(l) => Ok(l),
            other => Err(mismatch("long", &other)),
        }
    }

    fn pop_reference(&mut self) -> Result<Value, ExecError> {
        let value = self.pop()?;
        if value.is_reference() {
            Ok(value)
        } else {
            Err(mismatch("reference", &value))
        }
    }

    fn pop_object(&mut self) -> Result<ObjectRef, ExecError> {
        match self.pop()? {
            Value::Object(obj) => Ok(obj),
            Value::Null => Err(ExecError::NullPointer),
            other => Err(mismatch("object", &other)),
        }
    }

    /// Pop the top `count` values, in the order they were pushed
    fn pop_args(&mut self, count: usize) -> Result<Vec<Value>, ExecError> {
        if self.stack.len() < count {
            return Err(ExecError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn local(&self, idx: u16) -> Result<Value, ExecError> {
        self.locals
            .get(idx as usize)
            .cloned()
            .ok_or(ExecError::TypeMismatch {
                expected: "initialized local",
                found: "nothing",
            })
    }

    fn store(&mut self, idx: u16, value: Value) {
        let idx = idx as usize;
        if idx >= self.locals.len() {
            self.locals.resize(idx + 1, Value::Null);
        }
        self.locals[idx] = value;
    }
}

fn mismatch(expected: &'static str, found: &Value) -> ExecError {
    ExecError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

impl<'a> Interpreter<'a> {
    pub fn new(runtime: &'a Runtime, thread: &'a MutatorThread) -> Interpreter<'a> {
        Interpreter {
            runtime,
            thread,
            depth: 0,
        }
    }

    /// Run `<clinit>` of the class (and of its superclasses) unless that already happened
    ///
    /// Initialization happens exactly once per class. It is tied to the class, not to any one
    /// shape, so redefinitions never cause it to run again.
    pub fn initialize(&mut self, class: ClassId) -> Result<(), ExecError> {
        let entry = self.runtime.classes.entry(class);
        let me = self.thread.id();

        // The init lock is only ever held inside the blocking region
        let state = self.thread.blocking(|| {
            let mut state = entry.init.lock();
            loop {
                match *state {
                    InitState::Initializing(owner) if owner != me => {
                        entry.init_done.wait(&mut state)
                    }
                    InitState::Uninitialized => {
                        *state = InitState::Initializing(me);
                        return InitState::Uninitialized;
                    }
                    other => return other,
                }
            }
        });
        match state {
            InitState::Initialized | InitState::Initializing(_) => return Ok(()),
            InitState::Erroneous => return Err(ExecError::NoClassDefFound(entry.name.clone())),
            InitState::Uninitialized => (),
        }

        log::debug!("Initializing {:?}", entry);
        let result = self.run_initializer(class);
        self.thread.blocking(|| {
            let mut state = entry.init.lock();
            *state = if result.is_ok() {
                InitState::Initialized
            } else {
                InitState::Erroneous
            };
            entry.init_done.notify_all();
        });
        result
    }

    fn run_initializer(&mut self, class: ClassId) -> Result<(), ExecError> {
        let shape = self.runtime.classes.entry(class).shape();
        if let (Some(superclass), false) = (shape.superclass, shape.is_interface()) {
            self.initialize(superclass)?;
        }
        let clinit = MethodKey::new(UnqualifiedName::CLINIT, MethodDescriptor::VOID);
        if let Some(method) = shape.method(&clinit) {
            self.invoke(method.clone(), vec![])?;
        }
        Ok(())
    }

    /// Invoke a resolved method
    ///
    /// For instance methods, the receiver is the first argument.
    pub fn invoke(
        &mut self,
        method: Arc<MethodData>,
        args: Vec<Value>,
    ) -> Result<Option<Value>, ExecError> {
        if self.depth >= self.runtime.settings.max_call_depth {
            return Err(ExecError::StackOverflow);
        }
        let thread = self.thread;
        let _frame = thread.enter(method.class);

        self.depth += 1;
        let result = match method.body.clone() {
            Some(body) => self.run(&method, body, args),
            None if method.access_flags.contains(MethodAccessFlags::NATIVE) => {
                self.call_native(&method, args)
            }
            None => Err(ExecError::AbstractMethod {
                class: self.class_name(method.class),
                method: method.key().to_string(),
            }),
        };
        self.depth -= 1;
        result
    }

    /// Resolve and invoke a method the way the corresponding `invoke*` instruction would
    ///
    /// `class` is the class named by the method reference, except for virtual calls, where
    /// dispatch starts from the class of the receiver.
    pub fn call(
        &mut self,
        kind: InvokeType,
        class: ClassId,
        key: &MethodKey,
        args: Vec<Value>,
    ) -> Result<Option<Value>, ExecError> {
        let thread = self.thread;
        match kind {
            InvokeType::Static => {
                self.initialize(class)?;
                let _resolving = thread.enter(class);
                let method = self.find_static(class, key)?;
                self.invoke(method, args)
            }
            InvokeType::Special => {
                receiver_class(&args)?;
                let _resolving = thread.enter(class);
                let method = self.find_in_hierarchy(class, key)?;
                self.invoke(method, args)
            }
            InvokeType::Virtual | InvokeType::Interface => {
                let receiver = receiver_class(&args)?;
                let _resolving = thread.enter(receiver);
                let method = if kind == InvokeType::Interface {
                    self.select_interface(receiver, class, key)?
                } else {
                    self.select_virtual(receiver, key)?
                };
                self.invoke(method, args)
            }
        }
    }

    fn invoke_ref(
        &mut self,
        kind: InvokeType,
        method_ref: &MethodRef,
        args: Vec<Value>,
    ) -> Result<Option<Value>, ExecError> {
        let class = self.resolve_class(&method_ref.class)?;
        let key = MethodKey::new(method_ref.name.clone(), method_ref.descriptor.clone());
        self.call(kind, class, &key, args)
    }

    fn run(
        &mut self,
        method: &Arc<MethodData>,
        body: Arc<MethodBody>,
        args: Vec<Value>,
    ) -> Result<Option<Value>, ExecError> {
        let mut frame = Frame {
            locals: args,
            stack: vec![],
        };
        let mut pc: Offset = 0;

        loop {
            let insn = match body.code.instructions.get(pc) {
                Some(insn) => insn,
                None => panic!("Execution fell off the end of {:?}", method),
            };
            let mut next = pc + 1;

            match insn {
                Instruction::Nop => (),
                Instruction::AConstNull => frame.push(Value::Null),
                Instruction::IConst(i) => frame.push(Value::Int(*i)),
                Instruction::LConst(l) => frame.push(Value::Long(*l)),
                Instruction::Ldc(idx) => {
                    let constant = constant(&body, *idx)?;
                    let value =
                        constant_value(constant).ok_or(ExecError::InvalidConstant(idx.0))?;
                    frame.push(value);
                }
                Instruction::ILoad(idx) => match frame.local(*idx)? {
                    value @ Value::Int(_) => frame.push(value),
                    other => return Err(mismatch("int", &other)),
                },
                Instruction::LLoad(idx) => match frame.local(*idx)? {
                    value @ Value::Long(_) => frame.push(value),
                    other => return Err(mismatch("long", &other)),
                },
                Instruction::ALoad(idx) => {
                    let value = frame.local(*idx)?;
                    if !value.is_reference() {
                        return Err(mismatch("reference", &value));
                    }
                    frame.push(value);
                }
                Instruction::IStore(idx) => {
                    let value = frame.pop_int()?;
                    frame.store(*idx, Value::Int(value));
                }
                Instruction::LStore(idx) => {
                    let value = frame.pop_long()?;
                    frame.store(*idx, Value::Long(value));
                }
                Instruction::AStore(idx) => {
                    let value = frame.pop_reference()?;
                    frame.store(*idx, value);
                }
                Instruction::IInc(idx, delta) => match frame.local(*idx)? {
                    Value::Int(i) => frame.store(*idx, Value::Int(i.wrapping_add(*delta as i32))),
                    other => return Err(mismatch("int", &other)),
                },
                Instruction::Pop => {
                    frame.pop()?;
                }
                Instruction::Dup => {
                    let value = frame.pop()?;
                    frame.push(value.clone());
                    frame.push(value);
                }
                Instruction::Swap => {
                    let top = frame.pop()?;
                    let below = frame.pop()?;
                    frame.push(top);
                    frame.push(below);
                }
                Instruction::IAdd => int_op(&mut frame, |a, b| Ok(a.wrapping_add(b)))?,
                Instruction::ISub => int_op(&mut frame, |a, b| Ok(a.wrapping_sub(b)))?,
                Instruction::IMul => int_op(&mut frame, |a, b| Ok(a.wrapping_mul(b)))?,
                Instruction::IDiv => int_op(&mut frame, |a, b| {
                    if b == 0 {
                        Err(ExecError::Arithmetic("/ by zero"))
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                Instruction::INeg => {
                    let value = frame.pop_int()?;
                    frame.push(Value::Int(value.wrapping_neg()));
                }
                Instruction::LAdd => long_op(&mut frame, i64::wrapping_add)?,
                Instruction::LSub => long_op(&mut frame, i64::wrapping_sub)?,
                Instruction::LMul => long_op(&mut frame, i64::wrapping_mul)?,

                Instruction::GetStatic(idx) => {
                    let cell = self.static_field(field_ref(&body, *idx)?)?;
                    frame.push(cell.get());
                }
                Instruction::PutStatic(idx) => {
                    let cell = self.static_field(field_ref(&body, *idx)?)?;
                    cell.set(frame.pop()?);
                }
                Instruction::GetField(idx) => {
                    let field = self.instance_field(field_ref(&body, *idx)?)?;
                    let obj = frame.pop_object()?;
                    if let FieldStorage::Instance(slot) = field.storage {
                        frame.push(obj.get(slot, &field.descriptor));
                    }
                }
                Instruction::PutField(idx) => {
                    let field = self.instance_field(field_ref(&body, *idx)?)?;
                    let value = frame.pop()?;
                    let obj = frame.pop_object()?;
                    if let FieldStorage::Instance(slot) = field.storage {
                        obj.set(slot, value);
                    }
                }
                Instruction::New(idx) => {
                    let class_name = match constant(&body, *idx)? {
                        ConstantData::Class(name) => name,
                        _ => return Err(ExecError::InvalidConstant(idx.0)),
                    };
                    let class = self.resolve_class(class_name)?;
                    let obj = self.allocate(class)?;
                    frame.push(Value::Object(obj));
                }

                Instruction::Invoke(kind, idx) => {
                    let method_ref = match constant(&body, *idx)? {
                        ConstantData::Method(method_ref)
                        | ConstantData::InterfaceMethod(method_ref) => method_ref,
                        _ => return Err(ExecError::InvalidConstant(idx.0)),
                    };
                    let has_receiver = *kind != InvokeType::Static;
                    let arg_count =
                        method_ref.descriptor.parameters.len() + usize::from(has_receiver);
                    let args = frame.pop_args(arg_count)?;
                    if let Some(result) = self.invoke_ref(*kind, method_ref, args)? {
                        frame.push(result);
                    }
                }
                Instruction::InvokeDynamic(idx) => {
                    let site = match constant(&body, *idx)? {
                        ConstantData::InvokeDynamic(site) => site,
                        _ => return Err(ExecError::InvalidConstant(idx.0)),
                    };
                    let target = self.link_call_site(method, &body, pc, site)?;
                    let args = frame.pop_args(site.descriptor.parameters.len())?;
                    if let Some(result) = self.invoke_handle(&target, args)? {
                        frame.push(result);
                    }
                }

                Instruction::If(comparison, target) => {
                    if comparison.holds(frame.pop_int()?, 0) {
                        next = *target;
                    }
                }
                Instruction::IfICmp(comparison, target) => {
                    let rhs = frame.pop_int()?;
                    let lhs = frame.pop_int()?;
                    if comparison.holds(lhs, rhs) {
                        next = *target;
                    }
                }
                Instruction::IfNull(comparison, target) => {
                    let value = frame.pop_reference()?;
                    if comparison.holds(value == Value::Null) {
                        next = *target;
                    }
                }
                Instruction::IfACmp(comparison, target) => {
                    let rhs = frame.pop_reference()?;
                    let lhs = frame.pop_reference()?;
                    if comparison.holds(lhs == rhs) {
                        next = *target;
                    }
                }
                Instruction::Goto(target) => next = *target,

                Instruction::Return => return Ok(None),
                Instruction::IReturn => return Ok(Some(Value::Int(frame.pop_int()?))),
                Instruction::LReturn => return Ok(Some(Value::Long(frame.pop_long()?))),
                Instruction::AReturn => return Ok(Some(frame.pop_reference()?)),
            }

            // Backward branches are safepoint polls
            if next <= pc {
                self.thread.poll();
            }
            pc = next;
        }
    }

    /// Allocate an instance of an initialized class, without running a constructor
    pub fn allocate(&mut self, class: ClassId) -> Result<ObjectRef, ExecError> {
        self.initialize(class)?;
        let shape = self.runtime.classes.entry(class).shape();
        if shape.is_interface() || shape.access_flags.contains(ClassAccessFlags::ABSTRACT) {
            return Err(ExecError::IncompatibleClassChange(format!(
                "{} can't be instantiated",
                shape.name
            )));
        }
        Ok(Object::new(class, shape.instance_slot_count as usize))
    }

    fn call_native(
        &mut self,
        method: &Arc<MethodData>,
        args: Vec<Value>,
    ) -> Result<Option<Value>, ExecError> {
        let class = self.class_name(method.class);
        let key = method.key();
        match self.runtime.natives.lookup(&class, &key) {
            Some(native) => native(&NativeContext::new(self.runtime, self.thread), args),
            None => Err(ExecError::UnsatisfiedLink {
                class,
                method: key.to_string(),
            }),
        }
    }

    /// Find the target of an `invokedynamic`, running its bootstrap method if it isn't linked
    fn link_call_site(
        &mut self,
        method: &MethodData,
        body: &Arc<MethodBody>,
        offset: Offset,
        site: &InvokeDynamicData,
    ) -> Result<Value, ExecError> {
        let key = CallSiteKey {
            class: method.class,
            method: method.key(),
            generation: body.generation,
            offset,
        };
        if let Some(binding) = self.runtime.call_sites.lookup(&key) {
            return Ok(binding.target.clone());
        }

        let bootstrap = body.bootstrap_methods.get(site.bootstrap).ok_or_else(|| {
            ExecError::BootstrapFailed(format!("missing bootstrap method #{}", site.bootstrap))
        })?;
        let mut args = vec![Value::String(Arc::from(site.name.as_str()))];
        for argument in &bootstrap.arguments {
            args.push(constant_value(argument).ok_or_else(|| {
                ExecError::BootstrapFailed(format!("unsupported static argument {:?}", argument))
            })?);
        }

        log::debug!("Linking {:?} through {:?}", key, bootstrap);
        match self.invoke_ref(InvokeType::Static, &bootstrap.method, args)? {
            Some(target @ Value::MethodHandle(_)) => {
                let binding = self.runtime.call_sites.link(CallSiteBinding {
                    key,
                    bootstrap: bootstrap.clone(),
                    name: site.name.clone(),
                    descriptor: site.descriptor.clone(),
                    target,
                    body: Arc::downgrade(body),
                });
                Ok(binding.target.clone())
            }
            other => Err(ExecError::BootstrapFailed(format!(
                "{:?} returned {:?} instead of a method handle",
                bootstrap.method, other
            ))),
        }
    }

    /// Invoke the static method a method handle points to
    pub fn invoke_handle(
        &mut self,
        handle: &Value,
        args: Vec<Value>,
    ) -> Result<Option<Value>, ExecError> {
        match handle {
            Value::MethodHandle(method_ref) => {
                self.invoke_ref(InvokeType::Static, method_ref, args)
            }
            Value::Null => Err(ExecError::NullPointer),
            other => Err(mismatch("method handle", other)),
        }
    }

    fn static_field(&mut self, field_ref: &FieldRef) -> Result<Arc<StaticCell>, ExecError> {
        let class = self.resolve_class(&field_ref.class)?;
        self.initialize(class)?;
        let field = self.find_field(class, field_ref)?;
        match field.storage {
            FieldStorage::Static(slot) => Ok(self.runtime.statics.cell(slot)),
            FieldStorage::Instance(_) => Err(ExecError::IncompatibleClassChange(format!(
                "{:?} is not static",
                field_ref
            ))),
        }
    }

    fn instance_field(&mut self, field_ref: &FieldRef) -> Result<FieldData, ExecError> {
        let class = self.resolve_class(&field_ref.class)?;
        let field = self.find_field(class, field_ref)?;
        match field.storage {
            FieldStorage::Instance(_) => Ok(field),
            FieldStorage::Static(_) => Err(ExecError::IncompatibleClassChange(format!(
                "{:?} is static",
                field_ref
            ))),
        }
    }

    fn find_field(&self, class: ClassId, field_ref: &FieldRef) -> Result<FieldData, ExecError> {
        let classes = &self.runtime.classes;
        let key = FieldKey::new(field_ref.name.clone(), field_ref.descriptor.clone());
        classes
            .superclass_chain(class)
            .into_iter()
            .chain(classes.all_interfaces(class))
            .find_map(|id| classes.entry(id).shape().field(&key).cloned())
            .ok_or_else(|| ExecError::NoSuchField {
                class: field_ref.class.clone(),
                field: key.to_string(),
            })
    }

    fn find_static(&self, class: ClassId, key: &MethodKey) -> Result<Arc<MethodData>, ExecError> {
        let classes = &self.runtime.classes;
        classes
            .superclass_chain(class)
            .into_iter()
            .find_map(|id| {
                classes
                    .entry(id)
                    .shape()
                    .method(key)
                    .filter(|m| m.is_static())
                    .cloned()
            })
            .ok_or_else(|| self.no_such_method(class, key))
    }

    /// Method lookup for `invokespecial`: no dispatch on the receiver
    fn find_in_hierarchy(&self, class: ClassId, key: &MethodKey) -> Result<Arc<MethodData>, ExecError> {
        let classes = &self.runtime.classes;
        classes
            .superclass_chain(class)
            .into_iter()
            .chain(classes.all_interfaces(class))
            .find_map(|id| {
                classes
                    .entry(id)
                    .shape()
                    .method(key)
                    .filter(|m| !m.is_static())
                    .cloned()
            })
            .ok_or_else(|| self.no_such_method(class, key))
    }

    /// Select the method `invokevirtual` runs on a receiver of class `receiver`
    fn select_virtual(&self, receiver: ClassId, key: &MethodKey) -> Result<Arc<MethodData>, ExecError> {
        let shape = self.runtime.classes.entry(receiver).shape();
        let from_vtable = shape
            .vtable
            .snapshot()
            .into_iter()
            .filter(|slot| slot.key().as_ref() == Some(key))
            .find_map(|slot| slot.method().cloned());
        let selected = from_vtable.or_else(|| {
            shape
                .itable
                .snapshot()
                .into_values()
                .flatten()
                .filter_map(|slot| slot.method().cloned())
                .find(|m| &m.key() == key && !m.is_abstract())
        });
        match selected {
            Some(method) if method.is_abstract() => Err(ExecError::AbstractMethod {
                class: self.class_name(receiver),
                method: key.to_string(),
            }),
            Some(method) => Ok(method),
            None => Err(self.no_such_method(receiver, key)),
        }
    }

    /// Select the method `invokeinterface` runs on a receiver of class `receiver`
    fn select_interface(
        &self,
        receiver: ClassId,
        interface: ClassId,
        key: &MethodKey,
    ) -> Result<Arc<MethodData>, ExecError> {
        let classes = &self.runtime.classes;
        let itable_slot = classes
            .entry(interface)
            .shape()
            .method(key)
            .and_then(|m| m.itable_slot);
        let itable_slot = match itable_slot {
            Some(slot) => slot,
            None => return self.select_virtual(receiver, key),
        };

        match classes.entry(receiver).shape().itable.get(interface, itable_slot) {
            Some(Slot::Method(method)) if method.is_abstract() => Err(ExecError::AbstractMethod {
                class: self.class_name(receiver),
                method: key.to_string(),
            }),
            Some(Slot::Method(method)) => Ok(method),
            Some(Slot::Removed(_)) | Some(Slot::Vacant) => Err(self.no_such_method(receiver, key)),
            None => Err(ExecError::IncompatibleClassChange(format!(
                "{} does not implement {}",
                self.class_name(receiver),
                self.class_name(interface)
            ))),
        }
    }

    fn resolve_class(&self, name: &BinaryName) -> Result<ClassId, ExecError> {
        self.runtime
            .classes
            .lookup(name)
            .ok_or_else(|| ExecError::NoClassDefFound(name.clone()))
    }

    fn class_name(&self, class: ClassId) -> BinaryName {
        self.runtime.classes.entry(class).name.clone()
    }

    fn no_such_method(&self, class: ClassId, key: &MethodKey) -> ExecError {
        ExecError::NoSuchMethod {
            class: self.class_name(class),
            method: key.to_string(),
        }
    }
}

fn receiver_class(args: &[Value]) -> Result<ClassId, ExecError> {
    match args.first() {
        Some(Value::Object(obj)) => Ok(obj.class()),
        Some(Value::Null) => Err(ExecError::NullPointer),
        Some(other) => Err(mismatch("object", other)),
        None => Err(ExecError::StackUnderflow),
    }
}

fn constant(body: &MethodBody, idx: ConstantIndex) -> Result<&ConstantData, ExecError> {
    body.constants
        .get(idx)
        .ok_or(ExecError::InvalidConstant(idx.0))
}

fn field_ref(body: &MethodBody, idx: ConstantIndex) -> Result<&FieldRef, ExecError> {
    match constant(body, idx)? {
        ConstantData::Field(field_ref) => Ok(field_ref),
        _ => Err(ExecError::InvalidConstant(idx.0)),
    }
}

/// Value of a loadable constant
fn constant_value(constant: &ConstantData) -> Option<Value> {
    match constant {
        ConstantData::Integer(i) => Some(Value::Int(*i)),
        ConstantData::Long(l) => Some(Value::Long(*l)),
        ConstantData::Float(x) => Some(Value::Float(*x)),
        ConstantData::Double(x) => Some(Value::Double(*x)),
        ConstantData::String(s) => Some(Value::String(s.clone())),
        ConstantData::MethodHandle(method) => Some(Value::MethodHandle(Arc::new(method.clone()))),
        _ => None,
    }
}

fn int_op(
    frame: &mut Frame,
    op: impl FnOnce(i32, i32) -> Result<i32, ExecError>,
) -> Result<(), ExecError> {
    let rhs = frame.pop_int()?;
    let lhs = frame.pop_int()?;
    frame.push(Value::Int(op(lhs, rhs)?));
    Ok(())
}

fn long_op(frame: &mut Frame, op: impl FnOnce(i64, i64) -> i64) -> Result<(), ExecError> {
    let rhs = frame.pop_long()?;
    let lhs = frame.pop_long()?;
    frame.push(Value::Long(op(lhs, rhs)));
    Ok(())
}
