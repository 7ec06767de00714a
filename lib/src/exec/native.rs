use super::ExecError;
use crate::jvm::BinaryName;
use crate::runtime::{MethodKey, MutatorThread, Runtime, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Implementation of a `native` method
///
/// Arguments include the receiver for instance methods. Natives are registered by class name
/// and method key, so they stay bound across redefinitions of the declaring class.
pub type NativeMethod =
    Arc<dyn Fn(&NativeContext<'_>, Vec<Value>) -> Result<Option<Value>, ExecError> + Send + Sync>;

/// What a native method gets to work with
pub struct NativeContext<'a> {
    runtime: &'a Runtime,
    thread: &'a MutatorThread,
}

impl<'a> NativeContext<'a> {
    pub(crate) fn new(runtime: &'a Runtime, thread: &'a MutatorThread) -> NativeContext<'a> {
        NativeContext { runtime, thread }
    }

    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    /// Thread the native is running on
    pub fn thread(&self) -> &'a MutatorThread {
        self.thread
    }

    /// Wait on something outside the runtime, counting as safe for redefinitions meanwhile
    pub fn blocking<R>(&self, f: impl FnOnce() -> R) -> R {
        self.thread.blocking(f)
    }
}

#[derive(Default)]
pub struct NativeRegistry {
    methods: RwLock<HashMap<(BinaryName, MethodKey), NativeMethod>>,
}

impl NativeRegistry {
    pub fn new() -> NativeRegistry {
        NativeRegistry::default()
    }

    /// Bind a native implementation, replacing any previous one
    pub fn register(&self, class: BinaryName, method: MethodKey, native: NativeMethod) {
        log::debug!("Registered native {}.{}", class, method);
        self.methods.write().insert((class, method), native);
    }

    pub fn lookup(&self, class: &BinaryName, method: &MethodKey) -> Option<NativeMethod> {
        self.methods
            .read()
            .get(&(class.clone(), method.clone()))
            .cloned()
    }
}
