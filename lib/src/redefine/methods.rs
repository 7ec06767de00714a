//! Method tables: vtables, itables, and method identity across versions
//!
//! Vtable slots are fixed once handed out. A class starts with a copy of its superclass's
//! vtable, overrides entries by key, and appends its own virtual methods. Slots for methods a
//! redefinition adds go past the longest vtable anywhere in the hierarchy, so they can't collide
//! with a slot some subclass already uses for its own methods.

use crate::jvm::MethodAccessFlags;
use crate::model::{BootstrapMethodData, CandidateClass, ConstantData, ConstantIndex, ConstantPool, Instruction};
use crate::runtime::{
    ClassId, ClassShape, ClassTable, MethodBody, MethodData, MethodKey, Slot, VTable,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

/// A method that exists in both the old and the new version of a class
pub struct MethodReplacement {
    pub old: Arc<MethodData>,
    pub new: Arc<MethodData>,

    /// Does the new method do exactly what the old one did?
    pub equivalent: bool,
}

/// Methods and dispatch tables of a new shape
pub struct MethodTable {
    pub methods: Vec<Arc<MethodData>>,
    pub vtable: Vec<Slot>,
    pub itable: BTreeMap<ClassId, Vec<Slot>>,
    pub replaced: Vec<MethodReplacement>,
    pub removed: Vec<Arc<MethodData>>,
    pub added: Vec<MethodKey>,

    /// Constant pool and bootstrap table shared by every body in [`Self::methods`]
    pub constants: Arc<ConstantPool>,
    pub bootstrap_methods: Arc<Vec<BootstrapMethodData>>,
}

pub struct MethodTableBuilder<'a> {
    classes: &'a ClassTable,
    class: ClassId,
    generation: u64,
}

impl<'a> MethodTableBuilder<'a> {
    pub fn new(classes: &'a ClassTable, class: ClassId, generation: u64) -> MethodTableBuilder<'a> {
        MethodTableBuilder {
            classes,
            class,
            generation,
        }
    }

    /// Build the method table for `candidate`
    ///
    /// `old` is the shape being replaced (if any). The supertypes must already be in the class
    /// table, with their current shapes installed.
    pub fn build(
        &self,
        candidate: &CandidateClass,
        old: Option<&ClassShape>,
        superclass: Option<ClassId>,
        interfaces: &[ClassId],
        vtable_floor: usize,
    ) -> MethodTable {
        let constants = Arc::new(candidate.constants.clone());
        let bootstrap_methods = Arc::new(candidate.bootstrap_methods.clone());
        let is_interface = candidate.access_flags.is_interface();

        // Vtable starts as a copy of the superclass's (interfaces don't dispatch virtually)
        let mut vtable: Vec<Slot> = match superclass {
            Some(superclass) if !is_interface => self.classes.entry(superclass).shape().vtable.snapshot(),
            _ => vec![],
        };
        let inherited_len = vtable.len();
        let inherited = vtable.clone();
        let mut next_vtable_slot = vtable_floor.max(inherited_len);

        // Slots the old version of this class introduced itself
        let old_own_slots: Vec<(usize, MethodKey)> = old
            .map(|old| {
                old.vtable
                    .snapshot()
                    .into_iter()
                    .enumerate()
                    .filter(|(idx, _)| is_own_slot(&inherited, *idx))
                    .filter_map(|(idx, slot)| slot.key().map(|key| (idx, key)))
                    .collect()
            })
            .unwrap_or_default();

        // Interfaces lay out their own itable
        let mut itable_layout: Vec<Slot> = match old {
            Some(old) if is_interface => old.itable.snapshot().remove(&self.class).unwrap_or_default(),
            _ => vec![],
        };
        let mut next_itable_slot = itable_layout.len();

        let methods: Vec<Arc<MethodData>> = candidate
            .methods
            .iter()
            .map(|method| {
                let key = MethodKey::new(method.name.clone(), method.descriptor.clone());
                let is_virtual = !method.access_flags.is_static()
                    && !method.access_flags.contains(MethodAccessFlags::PRIVATE)
                    && !method.name.is_initializer();

                let mut vtable_slot = None;
                let mut itable_slot = None;
                if is_virtual && is_interface {
                    itable_slot = Some(find_key(&itable_layout, &key).unwrap_or_else(|| {
                        next_itable_slot += 1;
                        next_itable_slot - 1
                    }));
                } else if is_virtual {
                    let slot = find_key(&inherited, &key)
                        .or_else(|| {
                            old_own_slots
                                .iter()
                                .find(|(_, old_key)| old_key == &key)
                                .map(|(idx, _)| *idx)
                        })
                        .unwrap_or_else(|| {
                            next_vtable_slot += 1;
                            next_vtable_slot - 1
                        });
                    vtable_slot = Some(slot);
                }

                let body = method.code.as_ref().map(|code| {
                    Arc::new(MethodBody {
                        code: code.clone(),
                        constants: constants.clone(),
                        bootstrap_methods: bootstrap_methods.clone(),
                        generation: self.generation,
                    })
                });

                Arc::new(MethodData {
                    class: self.class,
                    name: method.name.clone(),
                    descriptor: method.descriptor.clone(),
                    access_flags: method.access_flags,
                    vtable_slot,
                    itable_slot,
                    body,
                })
            })
            .collect();

        // Fill in the dispatch tables
        for method in &methods {
            if let Some(slot) = method.vtable_slot {
                set_slot(&mut vtable, slot, Slot::Method(method.clone()));
            }
            if let Some(slot) = method.itable_slot {
                set_slot(&mut itable_layout, slot, Slot::Method(method.clone()));
            }
        }
        let declared_virtual = |key: &MethodKey| -> Option<&Arc<MethodData>> {
            methods
                .iter()
                .find(|m| &m.key() == key && (m.vtable_slot.is_some() || m.itable_slot.is_some()))
        };
        for (idx, key) in &old_own_slots {
            let entry = match declared_virtual(key) {
                Some(method) => Slot::Method(method.clone()),
                None => Slot::Removed(key.clone()),
            };
            set_slot(&mut vtable, *idx, entry);
        }
        for idx in 0..itable_layout.len() {
            if let Some(key) = itable_layout[idx].key() {
                if declared_virtual(&key).is_none() {
                    itable_layout[idx] = Slot::Removed(key);
                }
            }
        }

        let itable = if is_interface {
            BTreeMap::from([(self.class, itable_layout)])
        } else {
            build_itable(self.classes, superclass, interfaces, &vtable)
        };

        // Match up old and new methods
        let mut replaced = vec![];
        let mut removed = vec![];
        let mut added = vec![];
        if let Some(old) = old {
            for old_method in &old.methods {
                match methods.iter().find(|m| m.key() == old_method.key()) {
                    Some(new_method) => replaced.push(MethodReplacement {
                        old: old_method.clone(),
                        new: new_method.clone(),
                        equivalent: methods_equivalent(old_method, new_method),
                    }),
                    None => removed.push(old_method.clone()),
                }
            }
            for method in &methods {
                if old.method(&method.key()).is_none() {
                    added.push(method.key());
                }
            }
        } else {
            added = methods.iter().map(|m| m.key()).collect();
        }

        MethodTable {
            methods,
            vtable,
            itable,
            replaced,
            removed,
            added,
            constants,
            bootstrap_methods,
        }
    }
}

/// Was slot `idx` free in the inherited vtable (so a subclass can own it)?
fn is_own_slot(inherited: &[Slot], idx: usize) -> bool {
    matches!(inherited.get(idx), None | Some(Slot::Vacant))
}

fn find_key(slots: &[Slot], key: &MethodKey) -> Option<usize> {
    slots.iter().position(|slot| slot.key().as_ref() == Some(key))
}

fn set_slot(slots: &mut Vec<Slot>, idx: usize, slot: Slot) {
    if idx >= slots.len() {
        slots.resize(idx + 1, Slot::Vacant);
    }
    slots[idx] = slot;
}

/// Lowest vtable slot that is unused by `class`, its superclasses, and its transitive
/// subclasses
pub fn vtable_floor(classes: &ClassTable, class: ClassId) -> usize {
    classes
        .superclass_chain(class)
        .into_iter()
        .chain(classes.transitive_subclasses(class))
        .map(|id| classes.entry(id).shape().vtable.len())
        .max()
        .unwrap_or(0)
}

/// Compute the itables of a class from its vtable and the current shapes of its interfaces
///
/// An interface method is implemented by the first non-abstract vtable entry with the same key,
/// falling back to a default method from the interfaces. Without either, the slot keeps the
/// abstract declaration (which raises `AbstractMethodError` when invoked).
pub fn build_itable(
    classes: &ClassTable,
    superclass: Option<ClassId>,
    interfaces: &[ClassId],
    vtable: &[Slot],
) -> BTreeMap<ClassId, Vec<Slot>> {
    // All interfaces, direct ones first
    let mut all: Vec<ClassId> = vec![];
    let mut seen: HashSet<ClassId> = HashSet::new();
    let mut to_visit: VecDeque<ClassId> = interfaces.iter().copied().collect();
    if let Some(superclass) = superclass {
        to_visit.extend(classes.all_interfaces(superclass));
    }
    while let Some(next) = to_visit.pop_front() {
        if seen.insert(next) {
            all.push(next);
            to_visit.extend(classes.entry(next).interfaces.iter().copied());
        }
    }

    let shapes: Vec<Arc<ClassShape>> = all.iter().map(|id| classes.entry(*id).shape()).collect();
    let default_method = |key: &MethodKey| -> Option<Arc<MethodData>> {
        shapes
            .iter()
            .filter_map(|shape| shape.method(key))
            .find(|m| m.is_virtual() && !m.is_abstract() && m.body.is_some())
            .cloned()
    };

    shapes
        .iter()
        .map(|shape| {
            let layout = shape.itable.snapshot().remove(&shape.class).unwrap_or_default();
            let table = layout
                .into_iter()
                .map(|declared| match declared {
                    Slot::Method(declaration) => {
                        let key = declaration.key();
                        let from_class = vtable
                            .iter()
                            .filter_map(Slot::method)
                            .find(|m| m.key() == key && !m.is_abstract())
                            .cloned();
                        match from_class.or_else(|| default_method(&key)) {
                            Some(implementation) => Slot::Method(implementation),
                            None => Slot::Method(declaration),
                        }
                    }
                    other => other,
                })
                .collect();
            (shape.class, table)
        })
        .collect()
}

/// Re-inherit a subclass's vtable from its (possibly just redefined) superclass
///
/// Every entry the superclass owns is copied down, unless the subclass declares its own virtual
/// method with that key. Returns the slots that changed.
pub fn reinherit(parent: &VTable, child: &ClassShape) -> Vec<usize> {
    let mut changed = vec![];
    for (idx, slot) in parent.snapshot().into_iter().enumerate() {
        let key = match slot.key() {
            Some(key) => key,
            None => continue,
        };
        let entry = match child.method(&key) {
            Some(own) if own.is_virtual() => Slot::Method(own.clone()),
            _ => slot,
        };
        if child.vtable.patch(idx, entry) {
            changed.push(idx);
        }
    }
    changed
}

/// Are two versions of a method interchangeable?
///
/// Equivalent methods have the same modifiers and the same instructions, where instructions
/// referring to the constant pool are compared by the constants they load (constant pools
/// themselves are free to be laid out differently).
pub fn methods_equivalent(old: &MethodData, new: &MethodData) -> bool {
    if old.access_flags != new.access_flags {
        return false;
    }
    match (&old.body, &new.body) {
        (None, None) => true,
        (Some(old_body), Some(new_body)) => bodies_equivalent(old_body, new_body),
        _ => false,
    }
}

fn bodies_equivalent(old: &MethodBody, new: &MethodBody) -> bool {
    old.code.len() == new.code.len()
        && old
            .code
            .instructions
            .iter()
            .zip(new.code.instructions.iter())
            .all(|(a, b)| instructions_equivalent(old, a, new, b))
}

fn instructions_equivalent(
    old: &MethodBody,
    a: &Instruction,
    new: &MethodBody,
    b: &Instruction,
) -> bool {
    match (a.constant_operand(), b.constant_operand()) {
        (None, None) => a == b,
        (Some(a_idx), Some(b_idx)) => {
            let same_opcode = match (a, b) {
                (Instruction::Invoke(a_type, _), Instruction::Invoke(b_type, _)) => a_type == b_type,
                _ => std::mem::discriminant(a) == std::mem::discriminant(b),
            };
            same_opcode && constants_equivalent(old, a_idx, new, b_idx)
        }
        _ => false,
    }
}

fn constants_equivalent(
    old: &MethodBody,
    a: ConstantIndex,
    new: &MethodBody,
    b: ConstantIndex,
) -> bool {
    match (old.constants.get(a), new.constants.get(b)) {
        (Some(ConstantData::InvokeDynamic(a)), Some(ConstantData::InvokeDynamic(b))) => {
            a.name == b.name
                && a.descriptor == b.descriptor
                && old.bootstrap_methods.get(a.bootstrap) == new.bootstrap_methods.get(b.bootstrap)
        }
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{
        BinaryName, ClassAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
    };
    use crate::model::{Code, Method};
    use crate::runtime::Runtime;
    use crate::Settings;
    use std::sync::Arc;

    fn key(name: &str) -> MethodKey {
        MethodKey::new(
            UnqualifiedName::from_string(String::from(name)).unwrap(),
            MethodDescriptor::parse("()I").unwrap(),
        )
    }

    fn class(name: &str, superclass: &str, pad: bool, methods: &[(&str, i32)]) -> CandidateClass {
        let mut class = CandidateClass::new(
            BinaryName::from_string(String::from(name)).unwrap(),
            Some(BinaryName::from_string(String::from(superclass)).unwrap()),
            ClassAccessFlags::PUBLIC,
        );
        if pad {
            class.constants.push(ConstantData::String(Arc::from("padding")));
        }
        for (method, value) in methods {
            let idx = class.constants.push(ConstantData::Integer(*value));
            let method_key = key(method);
            class.add_method(Method::new(
                method_key.name,
                method_key.descriptor,
                MethodAccessFlags::PUBLIC,
                Some(Code::new(vec![Instruction::Ldc(idx), Instruction::IReturn])),
            ));
        }
        class
    }

    #[test]
    fn overrides_reuse_the_inherited_slot() {
        let runtime = Runtime::new(Settings::new());
        let thread = runtime.attach_thread();
        let a = runtime
            .define_class(&thread, class("A", "java/lang/Object", false, &[("m", 1), ("n", 2)]))
            .unwrap();
        let b = runtime
            .define_class(&thread, class("B", "A", false, &[("n", 3), ("o", 4)]))
            .unwrap();

        let a_shape = runtime.shape(a).unwrap();
        let b_shape = runtime.shape(b).unwrap();
        assert_eq!(a_shape.vtable.find(&key("n")), b_shape.vtable.find(&key("n")));
        assert_eq!(b_shape.vtable.find(&key("o")), Some(a_shape.vtable.len()));
        match b_shape.vtable.get(a_shape.vtable.find(&key("m")).unwrap()) {
            Some(Slot::Method(method)) => assert_eq!(method.class, a),
            other => panic!("unexpected slot {:?}", other),
        }
    }

    #[test]
    fn added_methods_go_past_subclass_slots() {
        let runtime = Runtime::new(Settings::extended());
        let thread = runtime.attach_thread();
        let a = runtime
            .define_class(&thread, class("A", "java/lang/Object", false, &[("m", 1)]))
            .unwrap();
        let b = runtime
            .define_class(&thread, class("B", "A", false, &[("o", 2)]))
            .unwrap();
        let old = runtime.shape(a).unwrap();
        let floor = vtable_floor(runtime.classes(), a);
        assert_eq!(floor, runtime.shape(b).unwrap().vtable.len());

        let candidate = class("A", "java/lang/Object", false, &[("m", 1), ("p", 5)]);
        let table = MethodTableBuilder::new(runtime.classes(), a, 1).build(
            &candidate,
            Some(&old),
            old.superclass,
            &old.interfaces,
            floor,
        );
        let p_slot = table.vtable.iter().position(|s| s.key() == Some(key("p")));
        assert_eq!(p_slot, Some(floor));
        assert_eq!(table.added, vec![key("p")]);
        assert_eq!(table.replaced.len(), 1);
        assert!(table.replaced[0].equivalent);
    }

    #[test]
    fn removed_methods_leave_a_marker() {
        let runtime = Runtime::new(Settings::extended());
        let thread = runtime.attach_thread();
        let a = runtime
            .define_class(&thread, class("A", "java/lang/Object", false, &[("m", 1), ("n", 2)]))
            .unwrap();
        let old = runtime.shape(a).unwrap();
        let n_slot = old.vtable.find(&key("n")).unwrap();

        let candidate = class("A", "java/lang/Object", false, &[("m", 1)]);
        let table = MethodTableBuilder::new(runtime.classes(), a, 1).build(
            &candidate,
            Some(&old),
            old.superclass,
            &old.interfaces,
            vtable_floor(runtime.classes(), a),
        );
        assert!(matches!(&table.vtable[n_slot], Slot::Removed(k) if k == &key("n")));
        assert_eq!(table.removed.len(), 1);
    }

    #[test]
    fn equivalence_ignores_constant_pool_layout() {
        let runtime = Runtime::new(Settings::new());
        let thread = runtime.attach_thread();
        let a = runtime
            .define_class(&thread, class("A", "java/lang/Object", false, &[("m", 1)]))
            .unwrap();
        let old = runtime.shape(a).unwrap();
        let build = |candidate: &CandidateClass| {
            MethodTableBuilder::new(runtime.classes(), a, 1).build(
                candidate,
                Some(&old),
                old.superclass,
                &old.interfaces,
                0,
            )
        };

        let padded = build(&class("A", "java/lang/Object", true, &[("m", 1)]));
        assert!(padded.replaced[0].equivalent);
        assert!(methods_equivalent(&padded.replaced[0].old, &padded.replaced[0].new));

        let changed = build(&class("A", "java/lang/Object", false, &[("m", 100)]));
        assert!(!changed.replaced[0].equivalent);
    }
}
