use bitflags::bitflags;

bitflags! {
    /// Access flags on classes
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-E.1
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// Access flags on methods
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6-200-A.1
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Access flags on fields
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5-200-A.1
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

/// Fundamental kind of a class
///
/// A redefinition can never move a class from one kind to another.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

impl ClassAccessFlags {
    /// Flags that must be identical between a class and its redefinition
    pub const COMPATIBILITY_MASK: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
        ClassAccessFlags::PUBLIC.bits()
            | ClassAccessFlags::FINAL.bits()
            | ClassAccessFlags::INTERFACE.bits()
            | ClassAccessFlags::ABSTRACT.bits()
            | ClassAccessFlags::ANNOTATION.bits()
            | ClassAccessFlags::ENUM.bits(),
    );

    pub fn kind(&self) -> ClassKind {
        if self.contains(ClassAccessFlags::ANNOTATION) {
            ClassKind::Annotation
        } else if self.contains(ClassAccessFlags::INTERFACE) {
            ClassKind::Interface
        } else if self.contains(ClassAccessFlags::ENUM) {
            ClassKind::Enum
        } else {
            ClassKind::Class
        }
    }

    pub fn is_interface(&self) -> bool {
        self.contains(ClassAccessFlags::INTERFACE)
    }
}

impl MethodAccessFlags {
    pub fn is_static(&self) -> bool {
        self.contains(MethodAccessFlags::STATIC)
    }

    /// Does this method get a body from somewhere other than its own code?
    pub fn has_no_code(&self) -> bool {
        self.intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE)
    }
}

impl FieldAccessFlags {
    pub fn is_static(&self) -> bool {
        self.contains(FieldAccessFlags::STATIC)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn class_kinds() {
        let annotation = ClassAccessFlags::INTERFACE
            | ClassAccessFlags::ANNOTATION
            | ClassAccessFlags::ABSTRACT;
        assert_eq!(annotation.kind(), ClassKind::Annotation);
        assert_eq!(ClassAccessFlags::INTERFACE.kind(), ClassKind::Interface);
        assert_eq!(
            (ClassAccessFlags::FINAL | ClassAccessFlags::ENUM).kind(),
            ClassKind::Enum
        );
        assert_eq!(ClassAccessFlags::PUBLIC.kind(), ClassKind::Class);
    }

    #[test]
    fn compatibility_mask_ignores_super() {
        let old = ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER;
        let new = ClassAccessFlags::PUBLIC | ClassAccessFlags::SYNTHETIC;
        assert_eq!(
            old & ClassAccessFlags::COMPATIBILITY_MASK,
            new & ClassAccessFlags::COMPATIBILITY_MASK
        );
    }
}
