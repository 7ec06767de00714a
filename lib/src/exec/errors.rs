use crate::jvm::BinaryName;
use std::fmt;

/// Failure while evaluating bytecode
///
/// Most variants mirror the JVM error a real VM would throw.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    NoSuchMethod { class: BinaryName, method: String },
    AbstractMethod { class: BinaryName, method: String },
    NoSuchField { class: BinaryName, field: String },
    NoClassDefFound(BinaryName),
    NullPointer,

    /// Operand stack was popped while empty
    StackUnderflow,

    /// Value of the wrong kind on the stack, in a local, or passed as an argument
    TypeMismatch { expected: &'static str, found: &'static str },

    /// Constant pool index is missing or refers to the wrong kind of constant
    InvalidConstant(u16),

    /// Call depth exceeded the configured maximum
    StackOverflow,

    /// Bootstrap method of an `invokedynamic` did not produce a method handle
    BootstrapFailed(String),

    /// Native method without a registered implementation
    UnsatisfiedLink { class: BinaryName, method: String },

    Arithmetic(&'static str),

    /// `invokeinterface` on a receiver that doesn't implement the interface, and the like
    IncompatibleClassChange(String),

    /// Error raised by a native implementation
    Native(String),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::NoSuchMethod { class, method } => {
                write!(f, "NoSuchMethodError: {}.{}", class, method)
            }
            ExecError::AbstractMethod { class, method } => {
                write!(f, "AbstractMethodError: {}.{}", class, method)
            }
            ExecError::NoSuchField { class, field } => {
                write!(f, "NoSuchFieldError: {}.{}", class, field)
            }
            ExecError::NoClassDefFound(class) => write!(f, "NoClassDefFoundError: {}", class),
            ExecError::NullPointer => f.write_str("NullPointerException"),
            ExecError::StackUnderflow => f.write_str("operand stack underflow"),
            ExecError::TypeMismatch { expected, found } => {
                write!(f, "expected {} but found {}", expected, found)
            }
            ExecError::InvalidConstant(idx) => write!(f, "invalid constant #{}", idx),
            ExecError::StackOverflow => f.write_str("StackOverflowError"),
            ExecError::BootstrapFailed(reason) => {
                write!(f, "BootstrapMethodError: {}", reason)
            }
            ExecError::UnsatisfiedLink { class, method } => {
                write!(f, "UnsatisfiedLinkError: {}.{}", class, method)
            }
            ExecError::Arithmetic(reason) => write!(f, "ArithmeticException: {}", reason),
            ExecError::IncompatibleClassChange(reason) => {
                write!(f, "IncompatibleClassChangeError: {}", reason)
            }
            ExecError::Native(reason) => f.write_str(reason),
        }
    }
}

impl std::error::Error for ExecError {}
