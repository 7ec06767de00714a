//! Indirect dispatch arrays
//!
//! Every class owns one vtable and one itable. Call sites never hold method bodies directly:
//! they resolve a slot number and index the receiver's table on every dispatch. Updating what a
//! whole hierarchy dispatches to is therefore a matter of overwriting table entries.

use super::{ClassId, MethodData, MethodKey};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Entry in a dispatch table
#[derive(Clone)]
pub enum Slot {
    Method(Arc<MethodData>),

    /// The method occupying this slot was removed by a redefinition
    Removed(MethodKey),

    /// Slot index reserved by some other class in the hierarchy
    Vacant,
}

impl Slot {
    /// Key of the method this slot dispatches (or used to dispatch)
    pub fn key(&self) -> Option<MethodKey> {
        match self {
            Slot::Method(method) => Some(method.key()),
            Slot::Removed(key) => Some(key.clone()),
            Slot::Vacant => None,
        }
    }

    pub fn method(&self) -> Option<&Arc<MethodData>> {
        match self {
            Slot::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Do both slots dispatch to the same method data?
    pub fn same_target(&self, other: &Slot) -> bool {
        match (self, other) {
            (Slot::Method(a), Slot::Method(b)) => Arc::ptr_eq(a, b),
            (Slot::Removed(a), Slot::Removed(b)) => a == b,
            (Slot::Vacant, Slot::Vacant) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Method(method) => method.fmt(f),
            Slot::Removed(key) => write!(f, "<removed {:?}>", key),
            Slot::Vacant => f.write_str("<vacant>"),
        }
    }
}

/// Virtual method table
#[derive(Default)]
pub struct VTable {
    slots: RwLock<Vec<Slot>>,
}

impl VTable {
    pub fn new(slots: Vec<Slot>) -> VTable {
        VTable {
            slots: RwLock::new(slots),
        }
    }

    pub fn get(&self, slot: usize) -> Option<Slot> {
        self.slots.read().get(slot).cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Copy of all the entries
    pub fn snapshot(&self) -> Vec<Slot> {
        self.slots.read().clone()
    }

    /// Lowest slot whose entry has this key
    pub fn find(&self, key: &MethodKey) -> Option<usize> {
        self.slots
            .read()
            .iter()
            .position(|slot| slot.key().as_ref() == Some(key))
    }

    /// Overwrite one entry, growing the table with vacant slots if needed
    ///
    /// Returns whether the entry actually changed.
    pub fn patch(&self, slot: usize, entry: Slot) -> bool {
        let mut slots = self.slots.write();
        if slot >= slots.len() {
            slots.resize(slot + 1, Slot::Vacant);
        }
        if slots[slot].same_target(&entry) {
            false
        } else {
            slots[slot] = entry;
            true
        }
    }
}

impl fmt::Debug for VTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.read().iter()).finish()
    }
}

/// Interface method tables, one per implemented interface
///
/// The table for interface `I` is indexed by the itable slots of `I`'s own methods.
#[derive(Default)]
pub struct ITable {
    tables: RwLock<BTreeMap<ClassId, Vec<Slot>>>,
}

impl ITable {
    pub fn new(tables: BTreeMap<ClassId, Vec<Slot>>) -> ITable {
        ITable {
            tables: RwLock::new(tables),
        }
    }

    pub fn get(&self, interface: ClassId, slot: usize) -> Option<Slot> {
        self.tables
            .read()
            .get(&interface)
            .and_then(|table| table.get(slot))
            .cloned()
    }

    pub fn interfaces(&self) -> Vec<ClassId> {
        self.tables.read().keys().copied().collect()
    }

    pub fn snapshot(&self) -> BTreeMap<ClassId, Vec<Slot>> {
        self.tables.read().clone()
    }

    /// Replace the table for one interface
    ///
    /// Returns the slots whose entries changed.
    pub fn replace(&self, interface: ClassId, table: Vec<Slot>) -> Vec<usize> {
        let mut tables = self.tables.write();
        let old = tables.entry(interface).or_default();
        let changed = (0..table.len().max(old.len()))
            .filter(|&idx| match (old.get(idx), table.get(idx)) {
                (Some(a), Some(b)) => !a.same_target(b),
                _ => true,
            })
            .collect();
        *old = table;
        changed
    }
}

impl fmt::Debug for ITable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.tables.read().iter()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{MethodDescriptor, Name, UnqualifiedName};

    fn key(name: &str) -> MethodKey {
        MethodKey::new(
            UnqualifiedName::from_string(String::from(name)).unwrap(),
            MethodDescriptor::VOID,
        )
    }

    #[test]
    fn patching_grows_and_reports_changes() {
        let vtable = VTable::new(vec![Slot::Removed(key("a"))]);
        assert!(!vtable.patch(0, Slot::Removed(key("a"))));
        assert!(vtable.patch(3, Slot::Removed(key("b"))));
        assert_eq!(vtable.len(), 4);
        assert!(matches!(vtable.get(1), Some(Slot::Vacant)));
        assert_eq!(vtable.find(&key("b")), Some(3));
        assert_eq!(vtable.find(&key("c")), None);
    }

    #[test]
    fn itable_replacement_diff() {
        let itable = ITable::default();
        let interface = ClassId(9);
        assert_eq!(
            itable.replace(interface, vec![Slot::Removed(key("a"))]),
            vec![0]
        );
        assert_eq!(
            itable.replace(
                interface,
                vec![Slot::Removed(key("a")), Slot::Removed(key("b"))]
            ),
            vec![1]
        );
        assert_eq!(itable.interfaces(), vec![interface]);
    }
}
