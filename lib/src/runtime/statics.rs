use super::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Identifier of a static storage cell
///
/// Cells are never freed or reused, so an id stays valid (and keeps designating the same cell)
/// for the lifetime of the runtime.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageSlotId(pub(crate) u32);

impl fmt::Debug for StorageSlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "static#{}", self.0)
    }
}

/// Backing storage of one static field
pub struct StaticCell(RwLock<Value>);

impl StaticCell {
    pub fn get(&self) -> Value {
        self.0.read().clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.write() = value;
    }
}

/// Slab of static field storage, shared by all classes
#[derive(Default)]
pub struct StaticStorage {
    cells: RwLock<Vec<Arc<StaticCell>>>,
}

impl StaticStorage {
    pub fn new() -> StaticStorage {
        StaticStorage::default()
    }

    /// Allocate a fresh cell holding `initial`
    pub fn allocate(&self, initial: Value) -> StorageSlotId {
        let mut cells = self.cells.write();
        let id = StorageSlotId(cells.len() as u32);
        cells.push(Arc::new(StaticCell(RwLock::new(initial))));
        id
    }

    /// Get the cell for an id
    ///
    /// Panics on an id this storage never handed out.
    pub fn cell(&self, slot: StorageSlotId) -> Arc<StaticCell> {
        match self.cells.read().get(slot.0 as usize) {
            Some(cell) => cell.clone(),
            None => panic!("Unallocated static storage {:?}", slot),
        }
    }

    pub fn get(&self, slot: StorageSlotId) -> Value {
        self.cell(slot).get()
    }

    pub fn set(&self, slot: StorageSlotId, value: Value) {
        self.cell(slot).set(value)
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }
}
