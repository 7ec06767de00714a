use crate::jvm::BinaryName;
use crate::redefine::RedefinitionMode;

pub struct Settings {
    /// Allow the extended redefinition rules
    ///
    /// With extensions, a redefinition may add and remove fields and methods and change method
    /// modifiers. The class hierarchy, the class kind, and finalizers stay frozen either way.
    pub extensions_enabled: bool,

    /// Classes that can never be redefined, written as `java/lang/Object`
    pub reserved_classes: Vec<BinaryName>,

    /// Packages whose classes can never be redefined, written as `java/lang/invoke`
    pub reserved_packages: Vec<String>,

    /// When cached reflection data gets thrown away
    pub cache_invalidation: CacheInvalidation,

    /// Maximum depth of nested calls before the evaluator gives up with `StackOverflowError`
    pub max_call_depth: usize,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            extensions_enabled: false,
            reserved_classes: vec![
                BinaryName::OBJECT,
                BinaryName::CLASS,
                BinaryName::ENUM,
                BinaryName::STRING,
                BinaryName::THROWABLE,
            ],
            reserved_packages: vec![String::from("java/lang/invoke")],
            cache_invalidation: CacheInvalidation::Eager,
            max_call_depth: 512,
        }
    }

    /// Same as [`Self::new`], but with the extended rules enabled
    pub fn extended() -> Settings {
        Settings {
            extensions_enabled: true,
            ..Settings::new()
        }
    }

    pub fn mode(&self) -> RedefinitionMode {
        if self.extensions_enabled {
            RedefinitionMode::Extended
        } else {
            RedefinitionMode::Standard
        }
    }

    /// Is this class off-limits for redefinition?
    pub fn is_reserved(&self, class: &BinaryName) -> bool {
        self.reserved_classes.contains(class)
            || self
                .reserved_packages
                .iter()
                .any(|package| class.package() == package)
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}

/// Strategy for discarding cached reflection data after a redefinition
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CacheInvalidation {
    /// Caches of the redefined classes and all their subclasses are cleared while propagating
    Eager,

    /// Cached entries remember the generations they were built from and get rebuilt on the
    /// next access that notices a newer generation
    Lazy,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    #[test]
    fn reserved_classes() {
        let settings = Settings::new();
        assert!(settings.is_reserved(&BinaryName::OBJECT));
        assert!(settings.is_reserved(
            &BinaryName::from_string(String::from("java/lang/invoke/CallSite")).unwrap()
        ));
        assert!(!settings.is_reserved(
            &BinaryName::from_string(String::from("java/lang/Integer")).unwrap()
        ));
        assert_eq!(settings.mode(), RedefinitionMode::Standard);
        assert_eq!(Settings::extended().mode(), RedefinitionMode::Extended);
    }
}
