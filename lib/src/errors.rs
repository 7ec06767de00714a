use crate::exec::ExecError;
use crate::jvm::BinaryName;
use crate::redefine::{CompatibilityReport, ViolatedRule};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A class in a redefinition batch breaks a compatibility rule
    ///
    /// The whole batch was aborted and nothing changed.
    IncompatibleChange {
        class: BinaryName,
        rule: ViolatedRule,
        report: Box<CompatibilityReport>,
    },

    /// Access through an identity handle whose member was removed by a redefinition
    StaleMember { class: BinaryName, member: String },

    /// Attempt to redefine a class that is never modifiable
    UnsupportedRedefinition { class: BinaryName, rule: ViolatedRule },

    /// Candidate class is malformed
    InvalidClass { class: BinaryName, reason: String },

    /// A class with this name is already defined (or appears twice in one batch)
    DuplicateClass(BinaryName),

    /// Unknown class name or id
    ClassNotFound(String),

    /// Unknown field or method
    MemberNotFound { class: BinaryName, member: String },

    /// Bytecode execution failed
    Execution(ExecError),
}

impl Error {
    /// Class the error is about, if any
    pub fn class(&self) -> Option<&BinaryName> {
        match self {
            Error::IncompatibleChange { class, .. }
            | Error::StaleMember { class, .. }
            | Error::UnsupportedRedefinition { class, .. }
            | Error::InvalidClass { class, .. }
            | Error::MemberNotFound { class, .. }
            | Error::DuplicateClass(class) => Some(class),
            Error::ClassNotFound(_) | Error::Execution(_) => None,
        }
    }

    /// Redefinition rule that was broken, if any
    pub fn rule(&self) -> Option<&ViolatedRule> {
        match self {
            Error::IncompatibleChange { rule, .. } | Error::UnsupportedRedefinition { rule, .. } => {
                Some(rule)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IncompatibleChange { class, rule, .. } => {
                write!(f, "incompatible redefinition of {}: {}", class, rule)
            }
            Error::StaleMember { class, member } => {
                write!(f, "{}.{} was removed by a redefinition", class, member)
            }
            Error::UnsupportedRedefinition { class, rule } => {
                write!(f, "{} can't be redefined: {}", class, rule)
            }
            Error::InvalidClass { class, reason } => write!(f, "invalid class {}: {}", class, reason),
            Error::DuplicateClass(class) => write!(f, "duplicate class {}", class),
            Error::ClassNotFound(class) => write!(f, "class {} not found", class),
            Error::MemberNotFound { class, member } => {
                write!(f, "{}.{} not found", class, member)
            }
            Error::Execution(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Execution(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ExecError> for Error {
    fn from(err: ExecError) -> Error {
        Error::Execution(err)
    }
}
