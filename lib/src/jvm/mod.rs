//! JVM vocabulary shared by the model, the runtime, and the redefinition engine
//!
//! ### Simple example
//!
//! ```
//! use hotswap::jvm::*;
//!
//! let point = BinaryName::from_string(String::from("me/alec/Point")).unwrap();
//! let descriptor = MethodDescriptor::parse("(II)V").unwrap();
//!
//! assert_eq!(point.package(), "me/alec");
//! assert_eq!(descriptor.parameters, vec![FieldType::int(), FieldType::int()]);
//! assert_eq!(descriptor.render(), "(II)V");
//! ```

mod access_flags;
mod descriptors;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use names::*;
