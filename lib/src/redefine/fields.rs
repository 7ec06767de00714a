//! Static and instance field layouts
//!
//! Storage identity is what matters here. A static field that survives a redefinition keeps its
//! [`StorageSlotId`], so every handle to it keeps reading and writing the same cell. An instance
//! field that survives keeps its [`InstanceSlot`], so existing objects keep their values. New
//! fields only ever get fresh storage.

use crate::jvm::FieldType;
use crate::model::CandidateClass;
use crate::runtime::{
    ClassId, ClassShape, ClassTable, FieldData, FieldKey, FieldStorage, InstanceSlot,
    StaticStorage, StorageSlotId, Value,
};
use std::collections::HashMap;

/// Field layout of a new shape
pub struct FieldTable {
    pub fields: Vec<FieldData>,

    /// One past the highest instance slot used by the class or its superclasses
    pub instance_slot_count: u32,

    pub added: Vec<FieldKey>,
    pub removed: Vec<FieldKey>,
}

pub struct FieldTableBuilder<'a> {
    class: ClassId,
    statics: &'a StaticStorage,
}

impl<'a> FieldTableBuilder<'a> {
    pub fn new(class: ClassId, statics: &'a StaticStorage) -> FieldTableBuilder<'a> {
        FieldTableBuilder { class, statics }
    }

    /// Layout for a class being defined for the first time
    ///
    /// Instance fields are laid out after those of the superclass.
    pub fn fresh(&self, candidate: &CandidateClass, superclass_slots: u32) -> FieldTable {
        let mut next_slot = superclass_slots;
        let fields = candidate
            .fields
            .iter()
            .map(|field| {
                let storage = if field.access_flags.is_static() {
                    FieldStorage::Static(self.allocate_static(&field.descriptor))
                } else {
                    next_slot += 1;
                    FieldStorage::Instance(InstanceSlot(next_slot - 1))
                };
                FieldData {
                    class: self.class,
                    name: field.name.clone(),
                    descriptor: field.descriptor.clone(),
                    access_flags: field.access_flags,
                    storage,
                }
            })
            .collect();

        FieldTable {
            fields,
            instance_slot_count: next_slot,
            added: candidate
                .fields
                .iter()
                .map(|f| FieldKey::new(f.name.clone(), f.descriptor.clone()))
                .collect(),
            removed: vec![],
        }
    }

    /// Layout for a replacement of `old`
    ///
    /// `slot_floor` is the lowest instance slot that is free in every class of the hierarchy
    /// that could see the new fields (see [`instance_slot_floor`]). The candidate must already
    /// have been found compatible: a persisting field keeps its name, type, and staticness.
    pub fn rebuild(&self, old: &ClassShape, candidate: &CandidateClass, slot_floor: u32) -> FieldTable {
        let old_by_name: HashMap<_, _> = old.fields.iter().map(|f| (&f.name, f)).collect();
        let mut next_slot = slot_floor.max(old.instance_slot_count);
        let mut added = vec![];

        let fields: Vec<FieldData> = candidate
            .fields
            .iter()
            .map(|field| {
                let storage = match old_by_name.get(&field.name) {
                    Some(old_field) => {
                        assert!(
                            old_field.descriptor == field.descriptor
                                && old_field.is_static() == field.access_flags.is_static(),
                            "Field {} of {} changed shape after validation",
                            field.name,
                            old.name
                        );
                        old_field.storage
                    }
                    None => {
                        added.push(FieldKey::new(field.name.clone(), field.descriptor.clone()));
                        if field.access_flags.is_static() {
                            let slot = self.allocate_static(&field.descriptor);
                            log::trace!("New static {} of {} in {:?}", field.name, old.name, slot);
                            FieldStorage::Static(slot)
                        } else {
                            next_slot += 1;
                            log::trace!(
                                "New instance field {} of {} in slot {}",
                                field.name,
                                old.name,
                                next_slot - 1
                            );
                            FieldStorage::Instance(InstanceSlot(next_slot - 1))
                        }
                    }
                };
                FieldData {
                    class: self.class,
                    name: field.name.clone(),
                    descriptor: field.descriptor.clone(),
                    access_flags: field.access_flags,
                    storage,
                }
            })
            .collect();

        let removed = old
            .fields
            .iter()
            .filter(|f| !fields.iter().any(|n| n.name == f.name))
            .map(FieldData::key)
            .collect();

        let instance_slot_count = if added.iter().any(|k| is_instance(&fields, k)) {
            next_slot
        } else {
            old.instance_slot_count
        };

        FieldTable {
            fields,
            instance_slot_count,
            added,
            removed,
        }
    }

    /// New static fields start out with their default value: `<clinit>` doesn't run again
    fn allocate_static(&self, descriptor: &FieldType) -> StorageSlotId {
        self.statics.allocate(Value::default_for(descriptor))
    }
}

fn is_instance(fields: &[FieldData], key: &FieldKey) -> bool {
    fields
        .iter()
        .any(|f| f.name == key.name && matches!(f.storage, FieldStorage::Instance(_)))
}

/// Lowest instance slot that is unused by `class`, its superclasses, and all of its transitive
/// subclasses
///
/// `projected` overrides the slot counts of classes whose new layout isn't installed yet.
pub fn instance_slot_floor(
    classes: &ClassTable,
    class: ClassId,
    projected: &HashMap<ClassId, u32>,
) -> u32 {
    let count = |id: ClassId| -> u32 {
        projected
            .get(&id)
            .copied()
            .unwrap_or_else(|| classes.entry(id).shape().instance_slot_count)
    };
    classes
        .superclass_chain(class)
        .into_iter()
        .chain(classes.transitive_subclasses(class))
        .map(count)
        .max()
        .unwrap_or(0)
}

/// Instance slot count the class will have once `candidate` is installed
pub fn projected_slot_count(old: &ClassShape, added_instance_fields: usize, slot_floor: u32) -> u32 {
    if added_instance_fields == 0 {
        old.instance_slot_count
    } else {
        slot_floor.max(old.instance_slot_count) + added_instance_fields as u32
    }
}
