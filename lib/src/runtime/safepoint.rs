//! Per-class safepoints for redefinition
//!
//! Unlike a stop-the-world pause, a redefinition safepoint only stops the threads that are
//! actually running code of the classes being replaced:
//!
//!  1. The requester publishes the set of affected classes
//!  2. Threads with an active frame in one of those classes park at their next poll, and
//!     threads about to enter such a frame park on entry
//!  3. Threads that are blocked, already parked, or not touching the classes are left alone
//!  4. Dropping the [`SafepointGuard`] releases everyone that parked
//!
//! All bookkeeping lives behind one mutex. Polling is a single atomic load unless a request is
//! pending.

use super::ClassId;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifier of a registered mutator thread
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutatorId(u64);

impl fmt::Debug for MutatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mutator#{}", self.0)
    }
}

/// State of a mutator thread with respect to safepoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatorState {
    /// Running and may need to stop at a safepoint
    Running,

    /// Parked at a safepoint, waiting to be released
    AtSafepoint,

    /// Blocked on synchronization or I/O (already safe)
    Blocked,
}

impl MutatorState {
    pub fn is_safe(&self) -> bool {
        matches!(self, MutatorState::AtSafepoint | MutatorState::Blocked)
    }
}

struct ThreadRecord {
    state: MutatorState,

    /// Number of active frames per class
    active: HashMap<ClassId, usize>,
}

struct Request {
    classes: HashSet<ClassId>,
    requester: MutatorId,
}

impl Request {
    fn must_stop(&self, id: MutatorId, record: &ThreadRecord) -> bool {
        id != self.requester && record.active.keys().any(|c| self.classes.contains(c))
    }
}

#[derive(Default)]
struct Registry {
    threads: HashMap<MutatorId, ThreadRecord>,
    request: Option<Request>,

    /// Bumped every time parked threads get released
    epoch: u64,
    next_id: u64,
}

impl Registry {
    fn record(&mut self, id: MutatorId) -> &mut ThreadRecord {
        match self.threads.get_mut(&id) {
            Some(record) => record,
            None => panic!("{:?} is not registered", id),
        }
    }

    fn must_stop(&self, id: MutatorId) -> bool {
        match (&self.request, self.threads.get(&id)) {
            (Some(request), Some(record)) => request.must_stop(id, record),
            _ => false,
        }
    }
}

/// Coordinator for redefinition safepoints
#[derive(Default)]
pub struct Safepoints {
    registry: Mutex<Registry>,

    /// Signalled when parked threads may resume
    released: Condvar,

    /// Signalled when a thread parks, blocks, leaves a class, or unregisters
    arrived: Condvar,

    /// Fast-path flag mirroring `registry.request.is_some()`
    requested: AtomicBool,
}

impl Safepoints {
    pub fn new() -> Safepoints {
        Safepoints::default()
    }

    pub fn register(&self) -> MutatorId {
        let mut registry = self.registry.lock();
        let id = MutatorId(registry.next_id);
        registry.next_id += 1;
        registry.threads.insert(
            id,
            ThreadRecord {
                state: MutatorState::Running,
                active: HashMap::new(),
            },
        );
        log::trace!("Registered {:?}", id);
        id
    }

    pub fn unregister(&self, id: MutatorId) {
        let mut registry = self.registry.lock();
        registry.threads.remove(&id);
        self.arrived.notify_all();
        log::trace!("Unregistered {:?}", id);
    }

    pub fn state(&self, id: MutatorId) -> Option<MutatorState> {
        self.registry.lock().threads.get(&id).map(|r| r.state)
    }

    /// Number of registered threads
    pub fn thread_count(&self) -> usize {
        self.registry.lock().threads.len()
    }

    /// Park if a pending request covers a class this thread is executing
    pub fn poll(&self, id: MutatorId) {
        if !self.requested.load(Ordering::Acquire) {
            return;
        }
        let mut registry = self.registry.lock();
        if registry.must_stop(id) {
            self.park(&mut registry, id);
        }
    }

    /// Record a new active frame of `class`, parking first if the class is being replaced
    pub fn enter_class(&self, id: MutatorId, class: ClassId) {
        let mut registry = self.registry.lock();
        *registry.record(id).active.entry(class).or_insert(0) += 1;
        if registry.must_stop(id) {
            self.park(&mut registry, id);
        }
    }

    pub fn exit_class(&self, id: MutatorId, class: ClassId) {
        let mut registry = self.registry.lock();
        let record = registry.record(id);
        match record.active.get_mut(&class) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                record.active.remove(&class);
            }
            None => panic!("{:?} has no active frame of {:?}", id, class),
        }
        if registry.request.is_some() {
            self.arrived.notify_all();
        }
    }

    pub fn enter_blocked(&self, id: MutatorId) {
        let mut registry = self.registry.lock();
        registry.record(id).state = MutatorState::Blocked;
        if registry.request.is_some() {
            self.arrived.notify_all();
        }
    }

    pub fn exit_blocked(&self, id: MutatorId) {
        let mut registry = self.registry.lock();
        registry.record(id).state = MutatorState::Running;
        if registry.must_stop(id) {
            self.park(&mut registry, id);
        }
    }

    fn park(&self, registry: &mut MutexGuard<'_, Registry>, id: MutatorId) {
        let epoch = registry.epoch;
        registry.record(id).state = MutatorState::AtSafepoint;
        self.arrived.notify_all();
        log::trace!("{:?} parked at safepoint", id);
        while registry.epoch == epoch {
            self.released.wait(registry);
        }
        registry.record(id).state = MutatorState::Running;
        log::trace!("{:?} resumed", id);
    }

    /// Wait until no thread other than `requester` is running code of `classes`
    ///
    /// Threads stay parked until the returned guard is dropped.
    pub fn quiesce(&self, classes: HashSet<ClassId>, requester: MutatorId) -> SafepointGuard<'_> {
        let start_time = Instant::now();
        let mut registry = self.registry.lock();
        while registry.request.is_some() {
            self.released.wait(&mut registry);
        }
        registry.request = Some(Request {
            classes,
            requester,
        });
        self.requested.store(true, Ordering::Release);

        loop {
            let running: Vec<MutatorId> = registry
                .threads
                .iter()
                .filter(|(id, record)| {
                    !record.state.is_safe()
                        && registry
                            .request
                            .as_ref()
                            .map_or(false, |req| req.must_stop(**id, record))
                })
                .map(|(id, _)| *id)
                .collect();
            if running.is_empty() {
                break;
            }
            log::debug!("Waiting on {:?} to reach a safepoint", running);
            self.arrived.wait(&mut registry);
        }

        SafepointGuard {
            safepoints: self,
            start_time,
        }
    }

    fn release(&self) {
        let mut registry = self.registry.lock();
        registry.request = None;
        registry.epoch += 1;
        self.requested.store(false, Ordering::Release);
        self.released.notify_all();
    }
}

/// Keeps affected threads parked until dropped
pub struct SafepointGuard<'a> {
    safepoints: &'a Safepoints,
    start_time: Instant,
}

impl<'a> SafepointGuard<'a> {
    /// Time since the safepoint was requested
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Drop for SafepointGuard<'_> {
    fn drop(&mut self) {
        log::trace!("Releasing safepoint after {:?}", self.start_time.elapsed());
        self.safepoints.release();
    }
}

/// Registration of the current thread as a mutator
///
/// Every thread that runs bytecode needs one. Dropping it unregisters the thread.
pub struct MutatorThread {
    id: MutatorId,
    safepoints: Arc<Safepoints>,
}

impl MutatorThread {
    pub fn new(safepoints: Arc<Safepoints>) -> MutatorThread {
        let id = safepoints.register();
        MutatorThread { id, safepoints }
    }

    pub fn id(&self) -> MutatorId {
        self.id
    }

    pub fn state(&self) -> Option<MutatorState> {
        self.safepoints.state(self.id)
    }

    pub fn poll(&self) {
        self.safepoints.poll(self.id)
    }

    /// Mark the start of a frame executing code of `class`
    pub fn enter(&self, class: ClassId) -> ActiveFrame<'_> {
        self.safepoints.enter_class(self.id, class);
        ActiveFrame {
            thread: self,
            class,
        }
    }

    /// Run `f` in the blocked state
    ///
    /// Anything that may wait on another thread (locks, condition variables, I/O) should go
    /// through here, otherwise a redefinition affecting one of this thread's active classes
    /// would wait on it forever.
    pub fn blocking<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Unblock<'a>(&'a MutatorThread);
        impl Drop for Unblock<'_> {
            fn drop(&mut self) {
                self.0.safepoints.exit_blocked(self.0.id);
            }
        }

        self.safepoints.enter_blocked(self.id);
        let _unblock = Unblock(self);
        f()
    }
}

impl Drop for MutatorThread {
    fn drop(&mut self) {
        self.safepoints.unregister(self.id);
    }
}

impl fmt::Debug for MutatorThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

/// Active frame of some class on a mutator thread
pub struct ActiveFrame<'a> {
    thread: &'a MutatorThread,
    class: ClassId,
}

impl Drop for ActiveFrame<'_> {
    fn drop(&mut self) {
        self.thread.safepoints.exit_class(self.thread.id, self.class);
    }
}
