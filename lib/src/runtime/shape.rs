use super::{ClassId, ITable, StorageSlotId, VTable};
use crate::jvm::{
    BinaryName, ClassAccessFlags, ClassKind, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, RenderDescriptor, UnqualifiedName,
};
use crate::model::{Annotation, BootstrapMethodData, Code, ConstantPool};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lookup key of a method within a class
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

impl MethodKey {
    pub fn new(name: UnqualifiedName, descriptor: MethodDescriptor) -> MethodKey {
        MethodKey { name, descriptor }
    }
}

impl fmt::Debug for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name.as_str(), self.descriptor.render())
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lookup key of a field within a class
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

impl FieldKey {
    pub fn new(name: UnqualifiedName, descriptor: FieldType) -> FieldKey {
        FieldKey { name, descriptor }
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name.as_str(), self.descriptor.render())
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index of an instance field's value inside every object of the class (and its subclasses)
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct InstanceSlot(pub(crate) u32);

/// Where a field's value lives
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FieldStorage {
    Static(StorageSlotId),
    Instance(InstanceSlot),
}

/// Field of an installed class shape
#[derive(Clone, PartialEq, Eq)]
pub struct FieldData {
    /// Declaring class
    pub class: ClassId,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    pub access_flags: FieldAccessFlags,

    /// Backing storage, preserved across redefinitions for as long as the field exists
    pub storage: FieldStorage,
}

impl FieldData {
    pub fn key(&self) -> FieldKey {
        FieldKey::new(self.name.clone(), self.descriptor.clone())
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.is_static()
    }
}

impl fmt::Debug for FieldData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}.{}:{} @ {:?}",
            self.class,
            self.name.as_str(),
            self.descriptor.render(),
            self.storage
        )
    }
}

/// Executable body of a method
///
/// The body keeps the constant pool and bootstrap table it was defined with, so a frame that
/// started executing it can run to completion even after a redefinition replaced the method.
#[derive(Debug)]
pub struct MethodBody {
    pub code: Code,
    pub constants: Arc<ConstantPool>,
    pub bootstrap_methods: Arc<Vec<BootstrapMethodData>>,

    /// Generation of the declaring class this body was installed with
    pub generation: u64,
}

/// Method of an installed class shape
pub struct MethodData {
    /// Declaring class
    pub class: ClassId,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,

    /// Slot in the declaring class's vtable (and in that of every subclass)
    pub vtable_slot: Option<usize>,

    /// Slot in the itable of the declaring interface
    pub itable_slot: Option<usize>,

    /// `None` for abstract and native methods
    pub body: Option<Arc<MethodBody>>,
}

impl MethodData {
    pub fn key(&self) -> MethodKey {
        MethodKey::new(self.name.clone(), self.descriptor.clone())
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.is_static()
    }

    /// Can this method be selected by `invokevirtual` or `invokeinterface`?
    pub fn is_virtual(&self) -> bool {
        !self.access_flags.is_static()
            && !self.access_flags.contains(MethodAccessFlags::PRIVATE)
            && !self.name.is_initializer()
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ABSTRACT)
    }
}

impl fmt::Debug for MethodData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}.{}{}",
            self.class,
            self.name.as_str(),
            self.descriptor.render()
        )
    }
}

/// Immutable snapshot of everything known about a class at one generation
///
/// A shape is installed into the class table as a whole and superseded as a whole: readers that
/// clone the current `Arc<ClassShape>` see one consistent generation. The vtable and itable are
/// the exception; they are indirect arrays shared with later work on subclasses, and individual
/// entries get overwritten when a superclass is redefined.
pub struct ClassShape {
    pub class: ClassId,
    pub name: BinaryName,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub access_flags: ClassAccessFlags,
    pub is_hidden: bool,

    /// Starts at 0 and goes up by one for every committed redefinition of the class
    pub generation: u64,

    pub fields: Vec<FieldData>,
    pub methods: Vec<Arc<MethodData>>,
    field_index: HashMap<FieldKey, usize>,
    method_index: HashMap<MethodKey, usize>,

    pub constants: Arc<ConstantPool>,
    pub bootstrap_methods: Arc<Vec<BootstrapMethodData>>,
    pub annotations: Vec<Annotation>,

    /// Highest instance slot used by this class or any of its superclasses, plus one
    pub instance_slot_count: u32,

    pub vtable: Arc<VTable>,
    pub itable: Arc<ITable>,
}

/// Pieces a builder hands over to make a [`ClassShape`]
pub struct ShapeParts {
    pub class: ClassId,
    pub name: BinaryName,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub access_flags: ClassAccessFlags,
    pub is_hidden: bool,
    pub generation: u64,
    pub fields: Vec<FieldData>,
    pub methods: Vec<Arc<MethodData>>,
    pub constants: Arc<ConstantPool>,
    pub bootstrap_methods: Arc<Vec<BootstrapMethodData>>,
    pub annotations: Vec<Annotation>,
    pub instance_slot_count: u32,
    pub vtable: Arc<VTable>,
    pub itable: Arc<ITable>,
}

impl ClassShape {
    pub fn from_parts(parts: ShapeParts) -> ClassShape {
        let field_index = parts
            .fields
            .iter()
            .enumerate()
            .map(|(idx, field)| (field.key(), idx))
            .collect();
        let method_index = parts
            .methods
            .iter()
            .enumerate()
            .map(|(idx, method)| (method.key(), idx))
            .collect();
        ClassShape {
            class: parts.class,
            name: parts.name,
            superclass: parts.superclass,
            interfaces: parts.interfaces,
            access_flags: parts.access_flags,
            is_hidden: parts.is_hidden,
            generation: parts.generation,
            fields: parts.fields,
            methods: parts.methods,
            field_index,
            method_index,
            constants: parts.constants,
            bootstrap_methods: parts.bootstrap_methods,
            annotations: parts.annotations,
            instance_slot_count: parts.instance_slot_count,
            vtable: parts.vtable,
            itable: parts.itable,
        }
    }

    pub fn kind(&self) -> ClassKind {
        self.access_flags.kind()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.is_interface()
    }

    /// Position of a field in [`Self::fields`]
    pub fn field_index(&self, key: &FieldKey) -> Option<usize> {
        self.field_index.get(key).copied()
    }

    /// Position of a method in [`Self::methods`]
    pub fn method_index(&self, key: &MethodKey) -> Option<usize> {
        self.method_index.get(key).copied()
    }

    pub fn field(&self, key: &FieldKey) -> Option<&FieldData> {
        self.field_index(key).map(|idx| &self.fields[idx])
    }

    pub fn method(&self, key: &MethodKey) -> Option<&Arc<MethodData>> {
        self.method_index(key).map(|idx| &self.methods[idx])
    }

    /// Find a field by name alone
    pub fn field_named(&self, name: &UnqualifiedName) -> Option<&FieldData> {
        self.fields.iter().find(|f| &f.name == name)
    }

    /// Does the class declare `finalize()V`?
    pub fn has_finalizer(&self) -> bool {
        self.method(&MethodKey::new(
            UnqualifiedName::FINALIZE,
            MethodDescriptor::VOID,
        ))
        .map_or(false, |m| !m.is_static())
    }
}

impl fmt::Debug for ClassShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name.as_str(), self.generation)
    }
}
