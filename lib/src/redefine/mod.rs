//! Redefinition of loaded classes
//!
//! A batch of candidate classes goes through the [`FixupCoordinator`]: each candidate is diffed
//! against the installed shape of the class it replaces, new field and method tables get built
//! around the storage and slots that must survive, and then everything derived from the old
//! shapes (subclass vtables, itables, call sites, identity handles, caches) is brought up to
//! date before any affected thread resumes.

mod call_sites;
mod coordinator;
mod differ;
mod fields;
mod identity;
mod methods;

pub use call_sites::*;
pub use coordinator::*;
pub use differ::*;
pub use fields::*;
pub use identity::*;
pub use methods::*;

use crate::runtime::ClassId;

/// What a committed redefinition batch did
///
/// Listeners registered on the runtime receive this after the batch commits, and
/// [`crate::runtime::Runtime::redefine_classes`] returns it.
#[derive(Clone, Debug, Default)]
pub struct RedefinitionSummary {
    /// Classes of the batch, supertypes first
    pub classes: Vec<ClassId>,
    pub reports: Vec<CompatibilityReport>,

    /// New generation of each class of the batch
    pub generations: Vec<(ClassId, u64)>,

    /// Subclasses and implementors whose dispatch tables were recomputed
    pub propagated: Vec<ClassId>,

    pub patched_vtable_slots: usize,
    pub patched_itable_slots: usize,
    pub replaced_methods: usize,

    /// Replaced methods whose new version does exactly what the old one did
    pub equivalent_methods: usize,

    /// Handles to members the batch removed
    pub stale_handles: Vec<IdentityHandle>,

    pub call_sites_migrated: usize,
    pub call_sites_dropped: usize,

    /// Did any class need the extended rules?
    pub extensions_used: bool,

    /// Number of committed batches, this one included
    pub redefinition_count: u64,
}

impl RedefinitionSummary {
    /// Generation a class of the batch ended up at
    pub fn generation_of(&self, class: ClassId) -> Option<u64> {
        self.generations
            .iter()
            .find(|(id, _)| *id == class)
            .map(|(_, generation)| *generation)
    }
}
