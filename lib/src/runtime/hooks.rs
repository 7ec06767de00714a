//! Hooks into the systems that surround the runtime
//!
//! The JIT compiler, the garbage collector, and the reflection layer keep their own derived
//! state about classes. A redefinition tells them what changed through these traits. Every
//! method has a no-op default, so a collaborator only implements what it cares about.

use super::{ClassId, MethodData};
use crate::redefine::RedefinitionSummary;
use std::sync::Arc;

/// Compiled code fixups
pub trait CompilerHooks: Send + Sync {
    /// A vtable entry of `class` now dispatches somewhere else
    fn patch_vtable_slot(&self, _class: ClassId, _slot: usize) {}

    /// An itable entry of `class` for `interface` now dispatches somewhere else
    fn patch_itable_slot(&self, _class: ClassId, _interface: ClassId, _slot: usize) {}

    /// `old` was replaced by `new`
    ///
    /// When `equivalent` is true, the new body does exactly what the old one did, and compiled
    /// code that inlined or assumed the old method may be kept. Otherwise frames and code that
    /// assumed the old method identity must be invalidated.
    fn method_replaced(&self, _old: &Arc<MethodData>, _new: &Arc<MethodData>, _equivalent: bool) {}

    /// `old` no longer exists
    fn method_removed(&self, _old: &Arc<MethodData>) {}
}

/// Heap layout confirmations
pub trait CollectorHooks: Send + Sync {
    /// Objects of `class` are about to be described by a layout of `new_slots` instance slots
    /// instead of `old_slots`
    ///
    /// Added slots are always trailing, and existing objects are never moved; they read the
    /// new slots as default values. Returning false refuses the change and aborts the batch.
    fn confirm_layout_growth(&self, _class: ClassId, _old_slots: u32, _new_slots: u32) -> bool {
        true
    }
}

/// Reflection cache invalidation
pub trait ReflectionHooks: Send + Sync {
    /// Cached `Method`/`Field`/annotation objects for `class` are out of date
    fn invalidate_class(&self, _class: ClassId) {}
}

/// Subscriber to committed redefinitions
pub trait RedefinitionListener: Send + Sync {
    fn classes_redefined(&self, summary: &RedefinitionSummary);
}

/// Collaborator that ignores every event
#[derive(Default, Debug, Clone, Copy)]
pub struct NoHooks;

impl CompilerHooks for NoHooks {}
impl CollectorHooks for NoHooks {}
impl ReflectionHooks for NoHooks {}

/// The collaborators a runtime reports to
#[derive(Clone)]
pub struct Collaborators {
    pub compiler: Arc<dyn CompilerHooks>,
    pub collector: Arc<dyn CollectorHooks>,
    pub reflection: Arc<dyn ReflectionHooks>,
}

impl Default for Collaborators {
    fn default() -> Collaborators {
        Collaborators {
            compiler: Arc::new(NoHooks),
            collector: Arc::new(NoHooks),
            reflection: Arc::new(NoHooks),
        }
    }
}
