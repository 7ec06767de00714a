//! Reflection mirrors
//!
//! A mirror is the reflective view of a class: its declared members, the public methods it
//! exposes (inherited ones included), and its annotations. Every part of one mirror is built
//! from a single shape per class, so a reader never sees the annotations of one version next to
//! the fields of another.

use super::{ClassId, ClassTable, MethodData};
use crate::jvm::{BinaryName, FieldAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor};
use crate::jvm::{Name, UnqualifiedName};
use crate::model::Annotation;
use crate::redefine::{IdentityHandle, IdentityRegistry, MemberKey};
use std::collections::HashSet;

#[derive(Clone, Debug)]
pub struct FieldMirror {
    pub handle: IdentityHandle,
    pub declaring_class: ClassId,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    pub access_flags: FieldAccessFlags,
}

#[derive(Clone, Debug)]
pub struct MethodMirror {
    pub handle: IdentityHandle,
    pub declaring_class: ClassId,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,
}

impl MethodMirror {
    fn new(handle: IdentityHandle, method: &MethodData) -> MethodMirror {
        MethodMirror {
            handle,
            declaring_class: method.class,
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            access_flags: method.access_flags,
        }
    }
}

#[derive(Debug)]
pub struct ClassMirror {
    pub class: ClassId,
    pub name: BinaryName,

    /// Generation of the class the mirror describes
    pub generation: u64,

    /// Generation of every class whose shape went into the mirror
    stamps: Vec<(ClassId, u64)>,

    pub declared_fields: Vec<FieldMirror>,
    pub declared_methods: Vec<MethodMirror>,

    /// Public methods, including those inherited from superclasses
    pub methods: Vec<MethodMirror>,

    pub annotations: Vec<Annotation>,
}

impl ClassMirror {
    pub(crate) fn build(
        classes: &ClassTable,
        identities: &IdentityRegistry,
        class: ClassId,
    ) -> ClassMirror {
        let shapes: Vec<_> = classes
            .superclass_chain(class)
            .into_iter()
            .map(|id| classes.entry(id).shape())
            .collect();
        let shape = &shapes[0];

        let declared_fields = shape
            .fields
            .iter()
            .filter_map(|field| {
                let handle = identities.handle(shape, MemberKey::Field(field.key()))?;
                Some(FieldMirror {
                    handle,
                    declaring_class: field.class,
                    name: field.name.clone(),
                    descriptor: field.descriptor.clone(),
                    access_flags: field.access_flags,
                })
            })
            .collect();
        let declared_methods = shape
            .methods
            .iter()
            .filter(|method| method.name != UnqualifiedName::CLINIT)
            .filter_map(|method| {
                let handle = identities.handle(shape, MemberKey::Method(method.key()))?;
                Some(MethodMirror::new(handle, method))
            })
            .collect();

        // Public methods, most derived first, hiding overridden ones
        let mut seen = HashSet::new();
        let mut methods = vec![];
        for shape in &shapes {
            for method in &shape.methods {
                if !method.access_flags.contains(MethodAccessFlags::PUBLIC)
                    || method.name.is_initializer()
                    || !seen.insert(method.key())
                {
                    continue;
                }
                if let Some(handle) = identities.handle(shape, MemberKey::Method(method.key())) {
                    methods.push(MethodMirror::new(handle, method));
                }
            }
        }

        log::trace!("Built mirror of {:?}", shape);
        ClassMirror {
            class,
            name: shape.name.clone(),
            generation: shape.generation,
            stamps: shapes.iter().map(|s| (s.class, s.generation)).collect(),
            declared_fields,
            declared_methods,
            methods,
            annotations: shape.annotations.clone(),
        }
    }

    /// Were all the classes this mirror was built from left alone since?
    pub fn is_current(&self, classes: &ClassTable) -> bool {
        self.stamps
            .iter()
            .all(|(class, generation)| classes.entry(*class).generation() == *generation)
    }

    pub fn declared_field(&self, name: &str) -> Option<&FieldMirror> {
        self.declared_fields.iter().find(|f| f.name.as_str() == name)
    }

    pub fn declared_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<&MethodMirror> {
        self.declared_methods
            .iter()
            .find(|m| m.name.as_str() == name && &m.descriptor == descriptor)
    }

    pub fn annotation(&self, type_name: &BinaryName) -> Option<&Annotation> {
        self.annotations.iter().find(|a| &a.type_name == type_name)
    }
}

/// Drop the cached mirror of a class
pub(crate) fn invalidate(classes: &ClassTable, class: ClassId) -> bool {
    classes.entry(class).mirror.lock().take().is_some()
}
