//! Live redefinition of classes in a running JVM-style runtime
//!
//! The crate is organized as
//!
//!   - [`jvm`]: names, descriptors, and access flags
//!   - [`model`]: candidate classes, as handed over by a class loader
//!   - [`runtime`]: the class table, dispatch tables, heap, safepoints, and the [`Runtime`]
//!     facade tying them together
//!   - [`exec`]: a small bytecode evaluator running over the runtime
//!   - [`redefine`]: compatibility checks and the redefinition state machine
//!
//! Redefining a class replaces its method bodies (and, with the extended rules, its fields and
//! methods) while keeping everything that identifies it: objects stay where they are, static
//! fields keep their storage, handles keep resolving, and code already running in an old body
//! finishes there.

pub mod errors;
pub mod exec;
pub mod jvm;
pub mod model;
pub mod redefine;
pub mod runtime;
mod settings;

pub use errors::Error;
pub use runtime::Runtime;
pub use settings::{CacheInvalidation, Settings};
