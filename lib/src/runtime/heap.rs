use super::{ClassId, InstanceSlot};
use crate::jvm::{BaseType, FieldType};
use crate::model::MethodRef;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Values on the operand stack, in locals, and in fields
#[derive(Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Object(ObjectRef),
    String(Arc<str>),

    /// Direct handle to a static method, produced by `ldc` of a method handle constant
    MethodHandle(Arc<MethodRef>),
}

impl Value {
    /// Value of a field that has never been written
    pub fn default_for(field_type: &FieldType) -> Value {
        match field_type {
            FieldType::Base(BaseType::Long) => Value::Long(0),
            FieldType::Base(BaseType::Float) => Value::Float(0.0),
            FieldType::Base(BaseType::Double) => Value::Double(0.0),
            FieldType::Base(_) => Value::Int(0),
            FieldType::Ref(_) => Value::Null,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Object(_) | Value::String(_) | Value::MethodHandle(_)
        )
    }

    /// Short name of the kind of value, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Null => "null",
            Value::Object(_) => "object",
            Value::String(_) => "string",
            Value::MethodHandle(_) => "method handle",
        }
    }
}

/// Objects compare by identity, everything else by value
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Null, Value::Null) => true,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::MethodHandle(a), Value::MethodHandle(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}L", l),
            Value::Float(x) => write!(f, "{}F", x),
            Value::Double(x) => write!(f, "{}D", x),
            Value::Null => f.write_str("null"),
            Value::Object(obj) => obj.fmt(f),
            Value::String(s) => write!(f, "{:?}", s),
            Value::MethodHandle(method) => write!(f, "handle {:?}", method),
        }
    }
}

pub type ObjectRef = Arc<Object>;

/// Heap object
///
/// Objects are never relocated or reconstructed by a redefinition. A slot that was added to the
/// class layout after the object was allocated simply has no stored value yet, and reads as the
/// default value for the field's type.
pub struct Object {
    class: ClassId,
    slots: RwLock<Vec<Option<Value>>>,
}

impl Object {
    pub fn new(class: ClassId, slot_count: usize) -> ObjectRef {
        Arc::new(Object {
            class,
            slots: RwLock::new(vec![None; slot_count]),
        })
    }

    /// Class the object was instantiated from
    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn get(&self, slot: InstanceSlot, field_type: &FieldType) -> Value {
        match self.slots.read().get(slot.0 as usize) {
            Some(Some(value)) => value.clone(),
            _ => Value::default_for(field_type),
        }
    }

    pub fn set(&self, slot: InstanceSlot, value: Value) {
        let mut slots = self.slots.write();
        let idx = slot.0 as usize;
        if idx >= slots.len() {
            slots.resize(idx + 1, None);
        }
        slots[idx] = Some(value);
    }

    /// Number of slots that have backing storage (may be less than the class layout)
    pub fn allocated_slots(&self) -> usize {
        self.slots.read().len()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{:p}", self.class, self as *const Object)
    }
}
