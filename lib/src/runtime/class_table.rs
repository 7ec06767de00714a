use super::reflection::ClassMirror;
use super::{ClassShape, MutatorId};
use crate::jvm::{BinaryName, Name};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Index of a class in the class table
///
/// Classes refer to each other (superclass, interfaces, subclasses) through ids only, so the
/// class graph never forms ownership cycles.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Progress of running `<clinit>`
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InitState {
    Uninitialized,
    Initializing(MutatorId),
    Initialized,

    /// `<clinit>` failed, and the class can't be used
    Erroneous,
}

/// A loaded class
///
/// The parts of a class that can never change through redefinition (name, hierarchy, the
/// initialization state) live here. Everything else is in the current [`ClassShape`].
pub struct ClassEntry {
    pub id: ClassId,
    pub name: BinaryName,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,

    /// Length of the longest path to `java/lang/Object`, counting interface edges
    pub depth: u32,

    /// Direct subclasses, implementing classes, and sub-interfaces
    subclasses: RwLock<Vec<ClassId>>,

    current: RwLock<Arc<ClassShape>>,

    pub(crate) init: Mutex<InitState>,
    pub(crate) init_done: Condvar,

    /// Cached reflection data
    pub(crate) mirror: Mutex<Option<Arc<ClassMirror>>>,
}

impl ClassEntry {
    pub(crate) fn new(depth: u32, shape: ClassShape) -> ClassEntry {
        ClassEntry {
            id: shape.class,
            name: shape.name.clone(),
            superclass: shape.superclass,
            interfaces: shape.interfaces.clone(),
            depth,
            subclasses: RwLock::new(vec![]),
            current: RwLock::new(Arc::new(shape)),
            init: Mutex::new(InitState::Uninitialized),
            init_done: Condvar::new(),
            mirror: Mutex::new(None),
        }
    }

    /// Currently installed shape
    pub fn shape(&self) -> Arc<ClassShape> {
        self.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Swap in a new shape, returning the one it replaces
    ///
    /// Panics if the new shape doesn't belong to the next generation of this class.
    pub(crate) fn install(&self, shape: Arc<ClassShape>) -> Arc<ClassShape> {
        let mut current = self.current.write();
        assert_eq!(shape.class, self.id, "Installing a shape into the wrong class");
        assert_eq!(
            shape.generation,
            current.generation + 1,
            "Generation of {} must go up by exactly one",
            self.name
        );
        std::mem::replace(&mut *current, shape)
    }

    pub fn subclasses(&self) -> Vec<ClassId> {
        self.subclasses.read().clone()
    }
}

impl fmt::Debug for ClassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.name.as_str(), self.id)
    }
}

/// All loaded classes, indexed by id and by name
#[derive(Default)]
pub struct ClassTable {
    entries: RwLock<Vec<Arc<ClassEntry>>>,
    by_name: RwLock<HashMap<BinaryName, ClassId>>,
}

impl ClassTable {
    pub fn new() -> ClassTable {
        ClassTable::default()
    }

    /// Id the next inserted class will get
    pub(crate) fn next_id(&self) -> ClassId {
        ClassId(self.entries.read().len() as u32)
    }

    /// Add a class and link it under its supertypes
    ///
    /// Callers serialize insertions (the runtime holds the redefinition lock), which is what
    /// makes `next_id` agree with the id the entry ends up with.
    pub(crate) fn insert(&self, entry: ClassEntry) -> Arc<ClassEntry> {
        let entry = Arc::new(entry);
        {
            let mut entries = self.entries.write();
            assert_eq!(entry.id.0 as usize, entries.len(), "Class ids are allocated in order");
            entries.push(entry.clone());
        }
        self.by_name.write().insert(entry.name.clone(), entry.id);

        for parent in entry.superclass.iter().chain(entry.interfaces.iter()) {
            self.entry(*parent).subclasses.write().push(entry.id);
        }
        entry
    }

    pub fn get(&self, id: ClassId) -> Option<Arc<ClassEntry>> {
        self.entries.read().get(id.0 as usize).cloned()
    }

    /// Like [`Self::get`], but panics on an unknown id
    pub fn entry(&self, id: ClassId) -> Arc<ClassEntry> {
        match self.get(id) {
            Some(entry) => entry,
            None => panic!("Unknown {:?}", id),
        }
    }

    pub fn lookup(&self, name: &BinaryName) -> Option<ClassId> {
        self.by_name.read().get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Every class that transitively extends or implements `class` (excluding `class` itself)
    ///
    /// The result is sorted by depth, so every class comes after all of its supertypes that are
    /// also in the set.
    pub fn transitive_subclasses(&self, class: ClassId) -> Vec<ClassId> {
        let mut seen: HashSet<ClassId> = HashSet::new();
        let mut found: Vec<Arc<ClassEntry>> = vec![];
        let mut to_visit: VecDeque<ClassId> = self.entry(class).subclasses().into();

        while let Some(next) = to_visit.pop_front() {
            if seen.insert(next) {
                let entry = self.entry(next);
                to_visit.extend(entry.subclasses());
                found.push(entry);
            }
        }

        found.sort_by_key(|entry| (entry.depth, entry.id));
        found.into_iter().map(|entry| entry.id).collect()
    }

    /// Superclass chain, starting at `class` itself
    pub fn superclass_chain(&self, class: ClassId) -> Vec<ClassId> {
        let mut chain = vec![];
        let mut next = Some(class);
        while let Some(id) = next {
            chain.push(id);
            next = self.entry(id).superclass;
        }
        chain
    }

    /// All interfaces `class` implements, directly or through superclasses and super-interfaces
    pub fn all_interfaces(&self, class: ClassId) -> Vec<ClassId> {
        let mut seen: HashSet<ClassId> = HashSet::new();
        let mut interfaces = vec![];
        let mut to_visit: VecDeque<ClassId> = self
            .superclass_chain(class)
            .into_iter()
            .flat_map(|id| self.entry(id).interfaces.clone())
            .collect();

        while let Some(next) = to_visit.pop_front() {
            if seen.insert(next) {
                interfaces.push(next);
                to_visit.extend(self.entry(next).interfaces.iter().copied());
            }
        }
        interfaces
    }

    /// Is `sub` the same as, a subclass of, or an implementor of `sup`?
    pub fn is_subtype(&self, sub: ClassId, sup: ClassId) -> bool {
        sub == sup
            || self.superclass_chain(sub).contains(&sup)
            || self.all_interfaces(sub).contains(&sup)
    }
}
