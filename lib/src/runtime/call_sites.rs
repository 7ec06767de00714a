//! Linked `invokedynamic` call sites
//!
//! Running a bootstrap method is expensive and observable, so its result is cached per call
//! site. A call site is a position in one particular version of a method body: when a
//! redefinition installs new bodies, links are copied over to equivalent sites of the new
//! bodies. Links of the old bodies stay for as long as some frame still runs them.

use super::{ClassId, MethodBody, MethodKey, Value};
use crate::jvm::{MethodDescriptor, UnqualifiedName};
use crate::model::{BootstrapMethodData, Offset};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Position of an `invokedynamic` instruction
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CallSiteKey {
    /// Class declaring the method
    pub class: ClassId,
    pub method: MethodKey,

    /// Generation of the class when the method body was installed
    pub generation: u64,
    pub offset: Offset,
}

/// Result of running the bootstrap method of a call site
#[derive(Debug)]
pub struct CallSiteBinding {
    pub key: CallSiteKey,
    pub bootstrap: BootstrapMethodData,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,

    /// Method handle returned by the bootstrap method
    pub target: Value,

    /// Body containing the site. Once it is gone, nothing can execute the site again.
    pub body: Weak<MethodBody>,
}

impl CallSiteBinding {
    /// Same link, but for a site in a different method body
    pub fn moved_to(&self, key: CallSiteKey, body: &Arc<MethodBody>) -> CallSiteBinding {
        CallSiteBinding {
            key,
            bootstrap: self.bootstrap.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            target: self.target.clone(),
            body: Arc::downgrade(body),
        }
    }

    /// Whether some method body or frame still holds the site
    pub fn is_reachable(&self) -> bool {
        self.body.strong_count() > 0
    }
}

#[derive(Default)]
pub struct CallSiteTable {
    sites: Mutex<HashMap<CallSiteKey, Arc<CallSiteBinding>>>,
}

impl CallSiteTable {
    pub fn new() -> CallSiteTable {
        CallSiteTable::default()
    }

    pub fn lookup(&self, key: &CallSiteKey) -> Option<Arc<CallSiteBinding>> {
        self.sites.lock().get(key).cloned()
    }

    /// Record the link of a call site
    ///
    /// If two threads race to link the same site, the first link wins and is returned to both.
    pub fn link(&self, binding: CallSiteBinding) -> Arc<CallSiteBinding> {
        self.sites
            .lock()
            .entry(binding.key.clone())
            .or_insert_with(|| Arc::new(binding))
            .clone()
    }

    /// Links to sites in method bodies of `class` installed at `generation`, by offset
    pub fn bindings(&self, class: ClassId, generation: u64) -> Vec<Arc<CallSiteBinding>> {
        let mut bindings: Vec<Arc<CallSiteBinding>> = self
            .sites
            .lock()
            .values()
            .filter(|binding| binding.key.class == class && binding.key.generation == generation)
            .cloned()
            .collect();
        bindings.sort_by_key(|binding| binding.key.offset);
        bindings
    }

    /// Forget links of `class` whose method body can no longer run, returning how many went
    pub fn purge_unreachable(&self, class: ClassId) -> usize {
        let mut sites = self.sites.lock();
        let before = sites.len();
        sites.retain(|key, binding| key.class != class || binding.is_reachable());
        before - sites.len()
    }

    /// Record a link, replacing any previous one for the same site
    pub fn insert(&self, binding: CallSiteBinding) {
        self.sites
            .lock()
            .insert(binding.key.clone(), Arc::new(binding));
    }

    /// Number of linked call sites that can still execute
    pub fn len(&self) -> usize {
        self.sites
            .lock()
            .values()
            .filter(|binding| binding.is_reachable())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
