//! Bytecode evaluator
//!
//! Just enough of an interpreter to run the code whose classes get redefined: frames enter and
//! leave classes so safepoints know who runs what, dispatch goes through vtables and itables,
//! and `invokedynamic` sites link through the call site table.

mod errors;
mod interpreter;
mod native;

pub use errors::*;
pub use interpreter::*;
pub use native::*;
