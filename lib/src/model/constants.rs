use crate::jvm::{BinaryName, FieldType, MethodDescriptor, Name, RenderDescriptor, UnqualifiedName};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// Index into a constant pool
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct ConstantIndex(pub u16);

/// Symbolic reference to a field
#[derive(PartialEq, Eq, Hash, Clone)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

impl Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

/// Symbolic reference to a method
#[derive(PartialEq, Eq, Hash, Clone)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

impl Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}{}",
            self.class.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

/// Bootstrap method of an `invokedynamic` call site
///
/// Two bootstrap methods are the same when they name the same static method and pass the same
/// static arguments. That pairing is what decides whether a linked call site can outlive a
/// redefinition of its owner.
#[derive(PartialEq, Eq, Clone)]
pub struct BootstrapMethodData {
    /// Bootstrap method
    ///
    /// This must be a static method.
    pub method: MethodRef,

    /// Boostrap arguments
    pub arguments: Vec<ConstantData>,
}

impl Debug for BootstrapMethodData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple(&format!(
            "{}.{}",
            self.method.class.as_str(),
            self.method.name.as_str(),
        ));
        for argument in &self.arguments {
            tuple.field(argument);
        }
        tuple.finish()
    }
}

#[derive(PartialEq, Eq, Clone)]
pub struct InvokeDynamicData {
    /// Name of the dynamically invoked method
    pub name: UnqualifiedName,

    /// Type of the dynamically invoked method
    pub descriptor: MethodDescriptor,

    /// Index into the class's bootstrap method table
    pub bootstrap: usize,
}

impl Debug for InvokeDynamicData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "[#{}]{}:{}",
            self.bootstrap,
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

#[derive(PartialEq, Clone)]
pub enum ConstantData {
    String(Arc<str>),
    Class(BinaryName),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Field(FieldRef),
    Method(MethodRef),
    InterfaceMethod(MethodRef),
    MethodHandle(MethodRef),
    InvokeDynamic(InvokeDynamicData),
}

impl Eq for ConstantData {}

impl Debug for ConstantData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantData::String(string) => string.fmt(f),
            ConstantData::Class(class) => class.fmt(f),
            ConstantData::Integer(integer) => integer.fmt(f),
            ConstantData::Long(long) => long.fmt(f),
            ConstantData::Float(float) => float.fmt(f),
            ConstantData::Double(double) => double.fmt(f),
            ConstantData::Field(field) => field.fmt(f),
            ConstantData::Method(method) => method.fmt(f),
            ConstantData::InterfaceMethod(method) => method.fmt(f),
            ConstantData::MethodHandle(method) => {
                f.write_str("handle ")?;
                method.fmt(f)
            }
            ConstantData::InvokeDynamic(indy) => indy.fmt(f),
        }
    }
}

/// Constant pool of a class
///
/// Constants are interned, so pushing the same constant twice returns the same index.
#[derive(Default, Clone, Debug)]
pub struct ConstantPool {
    constants: Vec<ConstantData>,
}

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool::default()
    }

    /// Add a constant (or find an existing equal one)
    pub fn push(&mut self, constant: ConstantData) -> ConstantIndex {
        if let Some(idx) = self.constants.iter().position(|c| c == &constant) {
            return ConstantIndex(idx as u16);
        }
        assert!(
            self.constants.len() < u16::MAX as usize,
            "Constant pool overflow"
        );
        self.constants.push(constant);
        ConstantIndex((self.constants.len() - 1) as u16)
    }

    pub fn get(&self, index: ConstantIndex) -> Option<&ConstantData> {
        self.constants.get(index.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &ConstantData)> {
        self.constants
            .iter()
            .enumerate()
            .map(|(idx, constant)| (ConstantIndex(idx as u16), constant))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constants_are_interned() {
        let mut pool = ConstantPool::new();
        let first = pool.push(ConstantData::Integer(100));
        let second = pool.push(ConstantData::String(Arc::from("hello")));
        let again = pool.push(ConstantData::Integer(100));

        assert_eq!(first, again);
        assert_ne!(first, second);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(second), Some(&ConstantData::String(Arc::from("hello"))));
        assert_eq!(pool.get(ConstantIndex(7)), None);
    }
}
