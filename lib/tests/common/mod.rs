//! Small builders for hand-assembled test classes
#![allow(dead_code)]

use hotswap::jvm::*;
use hotswap::model::*;
use std::sync::Arc;

pub fn name(s: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(String::from(s)).unwrap()
}

pub fn class_name(s: &str) -> BinaryName {
    BinaryName::from_string(String::from(s)).unwrap()
}

pub fn descriptor(s: &str) -> MethodDescriptor {
    MethodDescriptor::parse(s).unwrap()
}

pub fn field_type(s: &str) -> FieldType {
    FieldType::parse(s).unwrap()
}

/// Public class extending `superclass`
pub fn class(name: &str, superclass: &str) -> CandidateClass {
    CandidateClass::new(
        class_name(name),
        Some(class_name(superclass)),
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
    )
}

pub fn interface(name: &str) -> CandidateClass {
    CandidateClass::new(
        class_name(name),
        Some(BinaryName::OBJECT),
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
    )
}

pub fn add_method(
    class: &mut CandidateClass,
    method: &str,
    desc: &str,
    access_flags: MethodAccessFlags,
    code: Option<Vec<Instruction>>,
) {
    class.add_method(Method::new(
        name(method),
        descriptor(desc),
        access_flags,
        code.map(Code::new),
    ));
}

/// `public int <method>()` returning a constant
pub fn add_virtual_int(class: &mut CandidateClass, method: &str, value: i32) {
    let idx = class.constants.push(ConstantData::Integer(value));
    add_method(
        class,
        method,
        "()I",
        MethodAccessFlags::PUBLIC,
        Some(vec![Instruction::Ldc(idx), Instruction::IReturn]),
    );
}

/// `public static int <method>()` returning a constant
pub fn add_static_int(class: &mut CandidateClass, method: &str, value: i32) {
    add_method(
        class,
        method,
        "()I",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        Some(vec![Instruction::IConst(value), Instruction::IReturn]),
    );
}

pub fn add_field(class: &mut CandidateClass, field: &str, desc: &str, access_flags: FieldAccessFlags) {
    class.add_field(Field::new(name(field), field_type(desc), access_flags));
}

pub fn field_ref(class: &mut CandidateClass, owner: &str, field: &str, desc: &str) -> ConstantIndex {
    class.constants.push(ConstantData::Field(FieldRef {
        class: class_name(owner),
        name: name(field),
        descriptor: field_type(desc),
    }))
}

pub fn method_ref(class: &mut CandidateClass, owner: &str, method: &str, desc: &str) -> ConstantIndex {
    class.constants.push(ConstantData::Method(MethodRef {
        class: class_name(owner),
        name: name(method),
        descriptor: descriptor(desc),
    }))
}

pub fn interface_method_ref(
    class: &mut CandidateClass,
    owner: &str,
    method: &str,
    desc: &str,
) -> ConstantIndex {
    class.constants.push(ConstantData::InterfaceMethod(MethodRef {
        class: class_name(owner),
        name: name(method),
        descriptor: descriptor(desc),
    }))
}

pub fn method_handle(class: &mut CandidateClass, owner: &str, method: &str, desc: &str) -> ConstantIndex {
    class.constants.push(ConstantData::MethodHandle(MethodRef {
        class: class_name(owner),
        name: name(method),
        descriptor: descriptor(desc),
    }))
}

/// Instructions incrementing a static `int` counter
pub fn bump_counter(class: &mut CandidateClass, owner: &str, counter: &str) -> Vec<Instruction> {
    let counter = field_ref(class, owner, counter, "I");
    vec![
        Instruction::GetStatic(counter),
        Instruction::IConst(1),
        Instruction::IAdd,
        Instruction::PutStatic(counter),
    ]
}

pub fn annotation(type_name: &str, value: i32) -> Annotation {
    Annotation {
        type_name: class_name(type_name),
        elements: vec![(name("value"), ConstantData::Integer(value))],
    }
}

pub fn string(s: &str) -> ConstantData {
    ConstantData::String(Arc::from(s))
}
