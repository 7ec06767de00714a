//! Stable external identifiers for fields and methods
//!
//! Native code and reflection hold on to members for arbitrarily long. A handle never points
//! into a particular [`ClassShape`]: it names the member by `(class, kind, name, descriptor)`
//! and gets resolved against whatever shape is current. The last successful resolution is kept
//! as a `(generation, index)` hint, which is only trusted when the generation still matches.

use crate::runtime::{ClassId, ClassShape, FieldKey, MethodKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemberKind {
    Field,
    Method,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemberKey {
    Field(FieldKey),
    Method(MethodKey),
}

impl MemberKey {
    pub fn kind(&self) -> MemberKind {
        match self {
            MemberKey::Field(_) => MemberKind::Field,
            MemberKey::Method(_) => MemberKind::Method,
        }
    }

    fn lookup(&self, shape: &ClassShape) -> Option<usize> {
        match self {
            MemberKey::Field(key) => shape.field_index(key),
            MemberKey::Method(key) => shape.method_index(key),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKey::Field(key) => key.fmt(f),
            MemberKey::Method(key) => key.fmt(f),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Binding {
    Resolved { generation: u64, index: usize },
    Stale,
}

struct HandleData {
    class: ClassId,
    key: MemberKey,
    binding: Mutex<Binding>,
}

/// Identity of a field or method that survives redefinitions
///
/// There is at most one live handle per member, so handles compare by identity.
#[derive(Clone)]
pub struct IdentityHandle(Arc<HandleData>);

impl IdentityHandle {
    pub fn class(&self) -> ClassId {
        self.0.class
    }

    pub fn kind(&self) -> MemberKind {
        self.0.key.kind()
    }

    pub fn key(&self) -> &MemberKey {
        &self.0.key
    }

    /// Has the member been removed?
    ///
    /// Once stale, a handle stays stale, even if a later redefinition adds back a member with
    /// the same name and descriptor. That member gets a new handle.
    pub fn is_stale(&self) -> bool {
        *self.0.binding.lock() == Binding::Stale
    }

    /// Find the member's index in `shape` (in [`ClassShape::fields`] or
    /// [`ClassShape::methods`], depending on the kind)
    ///
    /// Returns `None` if the member is gone.
    pub fn resolve(&self, shape: &ClassShape) -> Option<usize> {
        assert_eq!(
            shape.class, self.0.class,
            "Resolving a handle against the wrong class"
        );
        let mut binding = self.0.binding.lock();
        match *binding {
            Binding::Stale => None,
            Binding::Resolved { generation, index } if generation == shape.generation => Some(index),
            Binding::Resolved { generation, .. } => {
                let found = self.0.key.lookup(shape);
                if shape.generation > generation {
                    *binding = match found {
                        Some(index) => Binding::Resolved {
                            generation: shape.generation,
                            index,
                        },
                        None => Binding::Stale,
                    };
                }
                found
            }
        }
    }

    fn mark_stale(&self) {
        *self.0.binding.lock() = Binding::Stale;
    }

    fn rebind(&self, shape: &ClassShape) -> bool {
        let mut binding = self.0.binding.lock();
        if *binding == Binding::Stale {
            return false;
        }
        match self.0.key.lookup(shape) {
            Some(index) => {
                *binding = Binding::Resolved {
                    generation: shape.generation,
                    index,
                };
                true
            }
            None => {
                *binding = Binding::Stale;
                false
            }
        }
    }
}

impl PartialEq for IdentityHandle {
    fn eq(&self, other: &IdentityHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for IdentityHandle {}

impl fmt::Debug for IdentityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}::{}", self.0.class, self.0.key)?;
        if self.is_stale() {
            f.write_str(" (stale)")?;
        }
        Ok(())
    }
}

/// Table of every identity handle handed out so far
#[derive(Default)]
pub struct IdentityRegistry {
    handles: Mutex<HashMap<(ClassId, MemberKey), IdentityHandle>>,
}

impl IdentityRegistry {
    pub fn new() -> IdentityRegistry {
        IdentityRegistry::default()
    }

    /// Get the handle for a member of `shape`, issuing one on first observation
    ///
    /// Returns `None` if `shape` has no such member.
    pub fn handle(&self, shape: &ClassShape, key: MemberKey) -> Option<IdentityHandle> {
        let index = key.lookup(shape)?;
        let mut handles = self.handles.lock();
        let map_key = (shape.class, key);
        if let Some(handle) = handles.get(&map_key) {
            if !handle.is_stale() {
                return Some(handle.clone());
            }
        }
        let handle = IdentityHandle(Arc::new(HandleData {
            class: shape.class,
            key: map_key.1.clone(),
            binding: Mutex::new(Binding::Resolved {
                generation: shape.generation,
                index,
            }),
        }));
        handles.insert(map_key, handle.clone());
        Some(handle)
    }

    /// Re-point every handle of the shape's class at the new shape
    ///
    /// Handles whose member no longer exists are marked stale and forgotten. Returns those.
    pub fn rebind(&self, shape: &ClassShape) -> Vec<IdentityHandle> {
        let mut handles = self.handles.lock();
        let mut stale = vec![];
        handles.retain(|(class, _), handle| {
            if *class != shape.class || handle.rebind(shape) {
                true
            } else {
                handle.mark_stale();
                stale.push(handle.clone());
                false
            }
        });
        if !stale.is_empty() {
            log::debug!("{} handle(s) of {:?} went stale", stale.len(), shape);
        }
        stale
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{
        BinaryName, ClassAccessFlags, FieldAccessFlags, FieldType, Name, UnqualifiedName,
    };
    use crate::model::{CandidateClass, ClassDefinition, Field};
    use crate::runtime::Runtime;
    use crate::Settings;

    fn name(s: &str) -> UnqualifiedName {
        UnqualifiedName::from_string(String::from(s)).unwrap()
    }

    fn holder(fields: &[&str]) -> CandidateClass {
        let mut class = CandidateClass::new(
            BinaryName::from_string(String::from("demo/Holder")).unwrap(),
            Some(BinaryName::OBJECT),
            ClassAccessFlags::PUBLIC,
        );
        for field in fields {
            class.add_field(Field::new(name(field), FieldType::int(), FieldAccessFlags::STATIC));
        }
        class
    }

    #[test]
    fn one_handle_per_member() {
        let runtime = Runtime::new(Settings::new());
        let thread = runtime.attach_thread();
        let id = runtime.define_class(&thread, holder(&["a", "b"])).unwrap();
        let shape = runtime.shape(id).unwrap();
        let key = MemberKey::Field(FieldKey::new(name("b"), FieldType::int()));

        let first = runtime.identities().handle(&shape, key.clone()).unwrap();
        let second = runtime.identities().handle(&shape, key).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.resolve(&shape), Some(1));
        assert_eq!(runtime.identities().len(), 1);

        let missing = MemberKey::Field(FieldKey::new(name("c"), FieldType::int()));
        assert!(runtime.identities().handle(&shape, missing).is_none());
    }

    #[test]
    fn handles_follow_members_and_go_stale() {
        let runtime = Runtime::new(Settings::extended());
        let thread = runtime.attach_thread();
        let id = runtime.define_class(&thread, holder(&["a", "b"])).unwrap();
        let a = runtime.field_handle(id, "a").unwrap();
        let b = runtime.field_handle(id, "b").unwrap();

        let summary = runtime
            .redefine_classes(&thread, vec![ClassDefinition::new(id, holder(&["b"]))])
            .unwrap();
        assert_eq!(summary.stale_handles, vec![a.clone()]);
        assert!(a.is_stale());
        assert_eq!(b.resolve(&runtime.shape(id).unwrap()), Some(0));

        // Adding the member back doesn't revive the old handle
        runtime
            .redefine_classes(&thread, vec![ClassDefinition::new(id, holder(&["a", "b"]))])
            .unwrap();
        assert!(a.is_stale());
        let revived = runtime.field_handle(id, "a").unwrap();
        assert_ne!(revived, a);
        assert!(!revived.is_stale());
    }
}
