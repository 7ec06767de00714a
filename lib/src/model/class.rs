use super::{BootstrapMethodData, Code, ConstantData, ConstantIndex, ConstantPool};
use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, UnqualifiedName,
};
use crate::runtime::ClassId;

/// Parsed and verified class, ready to be defined or to replace a loaded class
///
/// Instructions in method bodies refer to entries in [`Self::constants`], and `invokedynamic`
/// constants refer to entries in [`Self::bootstrap_methods`].
#[derive(Clone, Debug)]
pub struct CandidateClass {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<BinaryName>,

    /// Interfaces implemented (or super-interfaces), in declaration order
    pub interfaces: Vec<BinaryName>,

    pub access_flags: ClassAccessFlags,

    /// Fields
    ///
    /// Use [`Self::add_field`] for additional validation.
    pub fields: Vec<Field>,

    /// Methods
    ///
    /// Use [`Self::add_method`] for additional validation.
    pub methods: Vec<Method>,

    pub constants: ConstantPool,

    pub bootstrap_methods: Vec<BootstrapMethodData>,

    /// Runtime-visible annotations on the class
    pub annotations: Vec<Annotation>,

    /// Hidden classes are not nameable from other classes and can't be redefined
    pub is_hidden: bool,
}

impl CandidateClass {
    /// Create a new class with no members
    pub fn new(
        name: BinaryName,
        superclass: Option<BinaryName>,
        access_flags: ClassAccessFlags,
    ) -> CandidateClass {
        CandidateClass {
            name,
            superclass,
            interfaces: vec![],
            access_flags,
            fields: vec![],
            methods: vec![],
            constants: ConstantPool::new(),
            bootstrap_methods: vec![],
            annotations: vec![],
            is_hidden: false,
        }
    }

    /// Add a field
    ///
    /// Panics if a field with the same name and type already exists.
    pub fn add_field(&mut self, field: Field) {
        assert!(
            self.field(&field.name).map(|f| &f.descriptor) != Some(&field.descriptor),
            "Duplicate field {} in {}",
            field.name,
            self.name
        );
        self.fields.push(field);
    }

    /// Add a method
    ///
    /// Panics if a method with the same name and descriptor already exists.
    pub fn add_method(&mut self, method: Method) {
        assert!(
            self.method(&method.name, &method.descriptor).is_none(),
            "Duplicate method {}{} in {}",
            method.name,
            method.descriptor,
            self.name
        );
        self.methods.push(method);
    }

    /// Register a bootstrap method and get an `invokedynamic` constant for it
    pub fn add_invoke_dynamic(
        &mut self,
        bootstrap: BootstrapMethodData,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
    ) -> ConstantIndex {
        let bootstrap = match self.bootstrap_methods.iter().position(|b| b == &bootstrap) {
            Some(idx) => idx,
            None => {
                self.bootstrap_methods.push(bootstrap);
                self.bootstrap_methods.len() - 1
            }
        };
        self.constants
            .push(ConstantData::InvokeDynamic(super::InvokeDynamicData {
                name,
                descriptor,
                bootstrap,
            }))
    }

    pub fn field(&self, name: &UnqualifiedName) -> Option<&Field> {
        self.fields.iter().find(|f| &f.name == name)
    }

    pub fn method(&self, name: &UnqualifiedName, descriptor: &MethodDescriptor) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| &m.name == name && &m.descriptor == descriptor)
    }

    /// Does this class declare a non-trivial `finalize()V`?
    pub fn has_finalizer(&self) -> bool {
        self.method(&UnqualifiedName::FINALIZE, &MethodDescriptor::VOID)
            .map_or(false, |m| !m.access_flags.is_static())
    }
}

/// Field declared on a candidate class
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    pub access_flags: FieldAccessFlags,
}

impl Field {
    pub fn new(name: UnqualifiedName, descriptor: FieldType, access_flags: FieldAccessFlags) -> Field {
        Field {
            name,
            descriptor,
            access_flags,
        }
    }
}

/// Method declared on a candidate class
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Method {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,

    /// Abstract and native methods have no code
    pub code: Option<Code>,
}

impl Method {
    pub fn new(
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        access_flags: MethodAccessFlags,
        code: Option<Code>,
    ) -> Method {
        Method {
            name,
            descriptor,
            access_flags,
            code,
        }
    }
}

/// Runtime-visible annotation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub type_name: BinaryName,
    pub elements: Vec<(UnqualifiedName, ConstantData)>,
}

/// Pairing of a loaded class with the candidate that should replace it
#[derive(Clone, Debug)]
pub struct ClassDefinition {
    pub class: ClassId,
    pub candidate: CandidateClass,
}

impl ClassDefinition {
    pub fn new(class: ClassId, candidate: CandidateClass) -> ClassDefinition {
        ClassDefinition { class, candidate }
    }
}
