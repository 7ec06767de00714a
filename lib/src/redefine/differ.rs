use crate::jvm::{BinaryName, ClassAccessFlags, ClassKind, FieldAccessFlags, MethodAccessFlags};
use crate::model::CandidateClass;
use crate::runtime::{ClassShape, ClassTable, FieldKey, MethodKey};
use std::collections::HashMap;
use std::fmt;

/// Which set of compatibility rules applies
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RedefinitionMode {
    /// Only method bodies (and constant pools, bootstrap tables, annotations) may change
    Standard,

    /// Fields and methods may also be added, removed, or reordered
    Extended,
}

/// Compatibility rule a redefinition broke
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ViolatedRule {
    /// The candidate's name isn't the name of the class it should replace
    NamesDontMatch { expected: BinaryName, found: BinaryName },
    SuperclassChanged,
    InterfacesChanged,
    ClassModifiersChanged {
        old: ClassAccessFlags,
        new: ClassAccessFlags,
    },
    ClassKindChanged { old: ClassKind, new: ClassKind },
    FinalizerAdded,
    FinalizerRemoved,
    FieldAdded(FieldKey),
    FieldRemoved(FieldKey),

    /// Field modifiers or field order changed
    FieldChanged(FieldKey),

    /// A field that exists before and after has a different type
    FieldTypeChanged(FieldKey),
    MethodAdded(MethodKey),
    MethodDeleted(MethodKey),
    MethodModifiersChanged(MethodKey),

    /// The class belongs to the platform
    ReservedClass,

    /// Hidden classes can't be named, so they can't be redefined
    HiddenClass,

    /// The collector refused the grown instance layout
    LayoutRequiresRelocation { old_slots: u32, new_slots: u32 },
}

impl fmt::Display for ViolatedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolatedRule::NamesDontMatch { expected, found } => {
                write!(f, "class name {} doesn't match {}", found, expected)
            }
            ViolatedRule::SuperclassChanged => f.write_str("superclass changed"),
            ViolatedRule::InterfacesChanged => f.write_str("implemented interfaces changed"),
            ViolatedRule::ClassModifiersChanged { old, new } => {
                write!(f, "class modifiers changed from {:?} to {:?}", old, new)
            }
            ViolatedRule::ClassKindChanged { old, new } => {
                write!(f, "class kind changed from {:?} to {:?}", old, new)
            }
            ViolatedRule::FinalizerAdded => f.write_str("finalizer added"),
            ViolatedRule::FinalizerRemoved => f.write_str("finalizer removed"),
            ViolatedRule::FieldAdded(key) => write!(f, "field {} added", key),
            ViolatedRule::FieldRemoved(key) => write!(f, "field {} removed", key),
            ViolatedRule::FieldChanged(key) => write!(f, "field {} changed", key),
            ViolatedRule::FieldTypeChanged(key) => write!(f, "type of field {} changed", key),
            ViolatedRule::MethodAdded(key) => write!(f, "method {} added", key),
            ViolatedRule::MethodDeleted(key) => write!(f, "method {} deleted", key),
            ViolatedRule::MethodModifiersChanged(key) => {
                write!(f, "modifiers of method {} changed", key)
            }
            ViolatedRule::ReservedClass => f.write_str("class is reserved by the platform"),
            ViolatedRule::HiddenClass => f.write_str("class is hidden"),
            ViolatedRule::LayoutRequiresRelocation {
                old_slots,
                new_slots,
            } => write!(
                f,
                "growing instances from {} to {} slots requires relocating objects",
                old_slots, new_slots
            ),
        }
    }
}

/// Outcome of comparing a loaded class with its candidate replacement
#[derive(Clone, Debug)]
pub struct CompatibilityReport {
    pub class: BinaryName,
    pub compatible: bool,
    pub violated_rule: Option<ViolatedRule>,
    pub added_fields: Vec<FieldKey>,
    pub removed_fields: Vec<FieldKey>,
    pub added_methods: Vec<MethodKey>,
    pub removed_methods: Vec<MethodKey>,

    /// Methods present in both versions whose modifiers differ
    pub modified_methods: Vec<MethodKey>,

    /// Did accepting the candidate need the extended rules?
    pub extensions_used: bool,
}

impl CompatibilityReport {
    fn new(class: BinaryName) -> CompatibilityReport {
        CompatibilityReport {
            class,
            compatible: true,
            violated_rule: None,
            added_fields: vec![],
            removed_fields: vec![],
            added_methods: vec![],
            removed_methods: vec![],
            modified_methods: vec![],
            extensions_used: false,
        }
    }

    pub(crate) fn violate(mut self, rule: ViolatedRule) -> CompatibilityReport {
        log::debug!("{} is incompatible: {}", self.class, rule);
        self.compatible = false;
        self.violated_rule = Some(rule);
        self
    }

    /// Number of instance fields the candidate adds
    pub fn added_instance_fields(&self, candidate: &CandidateClass) -> usize {
        candidate
            .fields
            .iter()
            .filter(|f| !f.access_flags.is_static())
            .filter(|f| {
                self.added_fields
                    .iter()
                    .any(|k| k.name == f.name && k.descriptor == f.descriptor)
            })
            .count()
    }
}

/// Compares loaded classes against candidates
///
/// The comparison is pure: it reads the class table (for the names of supertypes) and never
/// changes anything.
pub struct ClassShapeDiffer<'a> {
    classes: &'a ClassTable,
    mode: RedefinitionMode,
}

/// Field modifiers that may not change in standard mode
const FIELD_ACCESS_MASK: FieldAccessFlags = FieldAccessFlags::from_bits_truncate(
    FieldAccessFlags::PUBLIC.bits()
        | FieldAccessFlags::PRIVATE.bits()
        | FieldAccessFlags::PROTECTED.bits()
        | FieldAccessFlags::STATIC.bits()
        | FieldAccessFlags::FINAL.bits()
        | FieldAccessFlags::VOLATILE.bits()
        | FieldAccessFlags::TRANSIENT.bits()
        | FieldAccessFlags::ENUM.bits(),
);

/// Method modifiers that may not change in standard mode
const METHOD_ACCESS_MASK: MethodAccessFlags = MethodAccessFlags::from_bits_truncate(
    MethodAccessFlags::PUBLIC.bits()
        | MethodAccessFlags::PRIVATE.bits()
        | MethodAccessFlags::PROTECTED.bits()
        | MethodAccessFlags::STATIC.bits()
        | MethodAccessFlags::FINAL.bits()
        | MethodAccessFlags::SYNCHRONIZED.bits()
        | MethodAccessFlags::NATIVE.bits()
        | MethodAccessFlags::ABSTRACT.bits(),
);

impl<'a> ClassShapeDiffer<'a> {
    pub fn new(classes: &'a ClassTable, mode: RedefinitionMode) -> ClassShapeDiffer<'a> {
        ClassShapeDiffer { classes, mode }
    }

    pub fn compare(&self, old: &ClassShape, candidate: &CandidateClass) -> CompatibilityReport {
        let report = CompatibilityReport::new(old.name.clone());
        let extended = self.mode == RedefinitionMode::Extended;

        if candidate.name != old.name {
            return report.violate(ViolatedRule::NamesDontMatch {
                expected: old.name.clone(),
                found: candidate.name.clone(),
            });
        }

        // Hierarchy
        let old_superclass = old.superclass.map(|id| self.classes.entry(id).name.clone());
        if old_superclass != candidate.superclass {
            return report.violate(ViolatedRule::SuperclassChanged);
        }
        let old_interfaces: Vec<BinaryName> = old
            .interfaces
            .iter()
            .map(|id| self.classes.entry(*id).name.clone())
            .collect();
        if old_interfaces != candidate.interfaces {
            return report.violate(ViolatedRule::InterfacesChanged);
        }

        // Kind and modifiers
        let (old_kind, new_kind) = (old.kind(), candidate.access_flags.kind());
        if old_kind != new_kind {
            return report.violate(ViolatedRule::ClassKindChanged {
                old: old_kind,
                new: new_kind,
            });
        }
        let mask = ClassAccessFlags::COMPATIBILITY_MASK;
        if old.access_flags & mask != candidate.access_flags & mask {
            return report.violate(ViolatedRule::ClassModifiersChanged {
                old: old.access_flags,
                new: candidate.access_flags,
            });
        }

        // Finalizers change how instances are allocated and collected
        match (old.has_finalizer(), candidate.has_finalizer()) {
            (false, true) => return report.violate(ViolatedRule::FinalizerAdded),
            (true, false) => return report.violate(ViolatedRule::FinalizerRemoved),
            _ => (),
        }

        let report = match self.compare_fields(report, old, candidate, extended) {
            Ok(report) => report,
            Err(report) => return report,
        };
        self.compare_methods(report, old, candidate, extended)
    }

    fn compare_fields(
        &self,
        mut report: CompatibilityReport,
        old: &ClassShape,
        candidate: &CandidateClass,
        extended: bool,
    ) -> Result<CompatibilityReport, CompatibilityReport> {
        let new_by_name: HashMap<_, _> = candidate.fields.iter().map(|f| (&f.name, f)).collect();

        for old_field in &old.fields {
            match new_by_name.get(&old_field.name) {
                None => report.removed_fields.push(old_field.key()),
                Some(new_field) => {
                    if new_field.descriptor != old_field.descriptor {
                        return Err(report.violate(ViolatedRule::FieldTypeChanged(old_field.key())));
                    }
                    if new_field.access_flags.is_static() != old_field.is_static() {
                        return Err(report.violate(ViolatedRule::FieldChanged(old_field.key())));
                    }
                    if new_field.access_flags & FIELD_ACCESS_MASK
                        != old_field.access_flags & FIELD_ACCESS_MASK
                    {
                        if !extended {
                            return Err(report.violate(ViolatedRule::FieldChanged(old_field.key())));
                        }
                        report.extensions_used = true;
                    }
                }
            }
        }
        for new_field in &candidate.fields {
            if old.field_named(&new_field.name).is_none() {
                report
                    .added_fields
                    .push(FieldKey::new(new_field.name.clone(), new_field.descriptor.clone()));
            }
        }

        // Order of the static and of the instance fields
        let mut reordered = None;
        for is_static in [false, true] {
            let old_order = old
                .fields
                .iter()
                .filter(|f| f.is_static() == is_static)
                .map(|f| &f.name);
            let new_order = candidate
                .fields
                .iter()
                .filter(|f| f.access_flags.is_static() == is_static)
                .map(|f| &f.name);
            if let Some((old_name, _)) = old_order.zip(new_order).find(|(a, b)| a != b) {
                reordered = old.field_named(old_name).map(|f| f.key());
                break;
            }
        }

        if extended {
            if !report.added_fields.is_empty()
                || !report.removed_fields.is_empty()
                || reordered.is_some()
            {
                report.extensions_used = true;
            }
        } else if let Some(key) = report.added_fields.first().cloned() {
            return Err(report.violate(ViolatedRule::FieldAdded(key)));
        } else if let Some(key) = report.removed_fields.first().cloned() {
            return Err(report.violate(ViolatedRule::FieldRemoved(key)));
        } else if let Some(key) = reordered {
            return Err(report.violate(ViolatedRule::FieldChanged(key)));
        }
        Ok(report)
    }

    fn compare_methods(
        &self,
        mut report: CompatibilityReport,
        old: &ClassShape,
        candidate: &CandidateClass,
        extended: bool,
    ) -> CompatibilityReport {
        for old_method in &old.methods {
            let key = old_method.key();
            match candidate.method(&key.name, &key.descriptor) {
                None => report.removed_methods.push(key),
                Some(new_method) => {
                    if new_method.access_flags & METHOD_ACCESS_MASK
                        != old_method.access_flags & METHOD_ACCESS_MASK
                    {
                        report.modified_methods.push(key);
                    }
                }
            }
        }
        for new_method in &candidate.methods {
            let key = MethodKey::new(new_method.name.clone(), new_method.descriptor.clone());
            if old.method(&key).is_none() {
                report.added_methods.push(key);
            }
        }

        if extended {
            if !report.added_methods.is_empty()
                || !report.removed_methods.is_empty()
                || !report.modified_methods.is_empty()
            {
                report.extensions_used = true;
            }
        } else if let Some(key) = report.added_methods.first().cloned() {
            return report.violate(ViolatedRule::MethodAdded(key));
        } else if let Some(key) = report.removed_methods.first().cloned() {
            return report.violate(ViolatedRule::MethodDeleted(key));
        } else if let Some(key) = report.modified_methods.first().cloned() {
            return report.violate(ViolatedRule::MethodModifiersChanged(key));
        }
        report
    }
}
