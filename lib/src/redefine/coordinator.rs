//! The redefinition state machine
//!
//! ```text
//! Idle -> Validating -> Quiescing -> Installing -> Propagating -> Committed
//!              |
//!              +-> Aborted
//! ```
//!
//! Everything that can fail happens while validating, before anything observable changed. Once
//! installing starts, the batch runs to completion: a failure from then on is a bug, and panics.

use super::{
    build_itable, instance_slot_floor, projected_slot_count, reinherit, vtable_floor,
    CallSiteMigrationPolicy, ClassShapeDiffer, CompatibilityReport, FieldTableBuilder,
    MethodReplacement, MethodTable, MethodTableBuilder, RedefinitionSummary, ViolatedRule,
};
use crate::errors::Error;
use crate::model::ClassDefinition;
use crate::runtime::{
    check_candidate, invalidate_mirror, ClassEntry, ClassId, ClassShape, ITable, MethodData,
    MutatorThread, Runtime, ShapeParts, VTable,
};
use crate::settings::CacheInvalidation;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FixupState {
    Idle,
    Validating,
    Quiescing,
    Installing,
    Propagating,
    Committed,
    Aborted,
}

impl FixupState {
    fn can_become(self, next: FixupState) -> bool {
        matches!(
            (self, next),
            (FixupState::Idle, FixupState::Validating)
                | (FixupState::Validating, FixupState::Quiescing)
                | (FixupState::Validating, FixupState::Aborted)
                | (FixupState::Quiescing, FixupState::Installing)
                | (FixupState::Installing, FixupState::Propagating)
                | (FixupState::Propagating, FixupState::Committed)
        )
    }
}

/// Class of the batch that passed validation
struct Validated {
    entry: Arc<ClassEntry>,
    old: Arc<ClassShape>,
    definition: ClassDefinition,
    report: CompatibilityReport,
}

/// Class of the batch whose new shape is installed
struct Installed {
    old: Arc<ClassShape>,
    new: Arc<ClassShape>,
    replaced: Vec<MethodReplacement>,
    removed: Vec<Arc<MethodData>>,
}

/// Runs one batch of redefinitions on the calling thread
pub struct FixupCoordinator<'a> {
    runtime: &'a Runtime,
    thread: &'a MutatorThread,
    state: FixupState,
}

impl<'a> FixupCoordinator<'a> {
    pub fn new(runtime: &'a Runtime, thread: &'a MutatorThread) -> FixupCoordinator<'a> {
        FixupCoordinator {
            runtime,
            thread,
            state: FixupState::Idle,
        }
    }

    pub fn state(&self) -> FixupState {
        self.state
    }

    fn transition(&mut self, next: FixupState) {
        assert!(
            self.state.can_become(next),
            "Illegal redefinition state change from {:?} to {:?}",
            self.state,
            next
        );
        log::debug!("Redefinition {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub fn run(mut self, definitions: Vec<ClassDefinition>) -> Result<RedefinitionSummary, Error> {
        let runtime = self.runtime;
        let lock = self.thread.blocking(|| runtime.redefinition_lock.lock());

        if definitions.is_empty() {
            log::debug!("Empty redefinition batch");
            return Ok(RedefinitionSummary {
                redefinition_count: runtime.redefinition_count.load(Ordering::Acquire),
                ..RedefinitionSummary::default()
            });
        }

        self.transition(FixupState::Validating);
        let batch = match self.validate(definitions) {
            Ok(batch) => batch,
            Err(err) => {
                self.transition(FixupState::Aborted);
                log::warn!("Redefinition aborted: {}", err);
                return Err(err);
            }
        };

        // Batch classes and everything inheriting from them, supertypes first
        let mut affected: Vec<Arc<ClassEntry>> = vec![];
        let mut seen: HashSet<ClassId> = HashSet::new();
        for item in &batch {
            let class = item.entry.id;
            for id in std::iter::once(class).chain(runtime.classes.transitive_subclasses(class)) {
                if seen.insert(id) {
                    affected.push(runtime.classes.entry(id));
                }
            }
        }
        affected.sort_by_key(|entry| (entry.depth, entry.id));
        let affected: Vec<ClassId> = affected.into_iter().map(|entry| entry.id).collect();

        self.transition(FixupState::Quiescing);
        let safepoint = runtime
            .safepoints
            .quiesce(affected.iter().copied().collect(), self.thread.id());
        log::debug!(
            "Quiesced {} class(es) in {:?}",
            affected.len(),
            safepoint.elapsed()
        );

        let mut summary = RedefinitionSummary::default();
        self.transition(FixupState::Installing);
        let installed = self.install(batch, &mut summary);

        self.transition(FixupState::Propagating);
        self.propagate(&affected, &installed, &mut summary);

        drop(safepoint);
        self.transition(FixupState::Committed);
        summary.redefinition_count = runtime.redefinition_count.fetch_add(1, Ordering::AcqRel) + 1;
        drop(lock);

        log::info!(
            "Redefined {} class(es), propagated to {} more",
            summary.classes.len(),
            summary.propagated.len()
        );
        let listeners = runtime.listeners.read().clone();
        for listener in listeners {
            listener.classes_redefined(&summary);
        }
        Ok(summary)
    }

    fn validate(&self, definitions: Vec<ClassDefinition>) -> Result<Vec<Validated>, Error> {
        let runtime = self.runtime;
        let differ = ClassShapeDiffer::new(&runtime.classes, runtime.settings.mode());
        let mut seen = HashSet::new();
        let mut batch = vec![];

        for definition in definitions {
            let entry = runtime
                .classes
                .get(definition.class)
                .ok_or_else(|| Error::ClassNotFound(format!("{:?}", definition.class)))?;
            if !seen.insert(entry.id) {
                return Err(Error::DuplicateClass(entry.name.clone()));
            }
            let old = entry.shape();
            if let Some(rule) = runtime.unmodifiable_reason(&old) {
                return Err(Error::UnsupportedRedefinition {
                    class: entry.name.clone(),
                    rule,
                });
            }
            check_candidate(&definition.candidate)?;

            let report = differ.compare(&old, &definition.candidate);
            if let Some(rule) = report.violated_rule.clone() {
                return Err(Error::IncompatibleChange {
                    class: entry.name.clone(),
                    rule,
                    report: Box::new(report),
                });
            }
            batch.push(Validated {
                entry,
                old,
                definition,
                report,
            });
        }
        batch.sort_by_key(|item| (item.entry.depth, item.entry.id));

        // Confirm grown layouts with the collector, in the order they will be installed
        let mut projected: HashMap<ClassId, u32> = HashMap::new();
        for item in &batch {
            let added = item.report.added_instance_fields(&item.definition.candidate);
            if added == 0 {
                continue;
            }
            let class = item.entry.id;
            let floor = instance_slot_floor(&runtime.classes, class, &projected);
            let old_slots = item.old.instance_slot_count;
            let new_slots = projected_slot_count(&item.old, added, floor);
            let confirmed = runtime
                .collaborators
                .collector
                .confirm_layout_growth(class, old_slots, new_slots);
            if !confirmed {
                let rule = ViolatedRule::LayoutRequiresRelocation {
                    old_slots,
                    new_slots,
                };
                return Err(Error::IncompatibleChange {
                    class: item.entry.name.clone(),
                    rule: rule.clone(),
                    report: Box::new(item.report.clone().violate(rule)),
                });
            }
            projected.insert(class, new_slots);

            // Instances of subclasses carry the new slots too
            for subclass in runtime.classes.transitive_subclasses(class) {
                let sub_entry = runtime.classes.entry(subclass);
                let sub_old = projected
                    .get(&subclass)
                    .copied()
                    .unwrap_or_else(|| sub_entry.shape().instance_slot_count);
                if sub_old >= new_slots {
                    continue;
                }
                let confirmed = runtime
                    .collaborators
                    .collector
                    .confirm_layout_growth(subclass, sub_old, new_slots);
                if !confirmed {
                    let rule = ViolatedRule::LayoutRequiresRelocation {
                        old_slots: sub_old,
                        new_slots,
                    };
                    return Err(Error::IncompatibleChange {
                        class: sub_entry.name.clone(),
                        rule: rule.clone(),
                        report: Box::new(item.report.clone().violate(rule)),
                    });
                }
                projected.insert(subclass, new_slots);
            }
        }
        Ok(batch)
    }

    fn install(&self, batch: Vec<Validated>, summary: &mut RedefinitionSummary) -> Vec<Installed> {
        let runtime = self.runtime;
        let classes = &runtime.classes;
        let mut installed = vec![];

        for item in batch {
            let class = item.entry.id;
            let candidate = item.definition.candidate;
            let generation = item.old.generation + 1;

            let slot_floor = instance_slot_floor(classes, class, &HashMap::new());
            let fields =
                FieldTableBuilder::new(class, &runtime.statics).rebuild(&item.old, &candidate, slot_floor);
            let MethodTable {
                methods,
                vtable,
                itable,
                replaced,
                removed,
                added,
                constants,
                bootstrap_methods,
            } = MethodTableBuilder::new(classes, class, generation).build(
                &candidate,
                Some(&item.old),
                item.old.superclass,
                &item.old.interfaces,
                vtable_floor(classes, class),
            );

            let shape = Arc::new(ClassShape::from_parts(ShapeParts {
                class,
                name: item.old.name.clone(),
                superclass: item.old.superclass,
                interfaces: item.old.interfaces.clone(),
                access_flags: candidate.access_flags,
                is_hidden: item.old.is_hidden,
                generation,
                fields: fields.fields,
                methods,
                constants,
                bootstrap_methods,
                annotations: candidate.annotations,
                instance_slot_count: fields.instance_slot_count,
                vtable: Arc::new(VTable::new(vtable)),
                itable: Arc::new(ITable::new(itable)),
            }));
            let old = item.entry.install(shape.clone());
            assert!(
                Arc::ptr_eq(&old, &item.old),
                "{} changed while the redefinition lock was held",
                item.entry.name
            );
            let stale = runtime.identities.rebind(&shape);

            log::debug!(
                "Installed {:?}: {} field(s) added, {} removed; {} method(s) added, {} removed",
                shape,
                fields.added.len(),
                fields.removed.len(),
                added.len(),
                removed.len()
            );
            summary.classes.push(class);
            summary.generations.push((class, generation));
            summary.extensions_used |= item.report.extensions_used;
            summary.reports.push(item.report);
            summary.stale_handles.extend(stale);
            installed.push(Installed {
                old,
                new: shape,
                replaced,
                removed,
            });
        }
        installed
    }

    fn propagate(&self, affected: &[ClassId], installed: &[Installed], summary: &mut RedefinitionSummary) {
        let runtime = self.runtime;
        let classes = &runtime.classes;
        let compiler = &runtime.collaborators.compiler;

        for &class in affected {
            let shape = classes.entry(class).shape();

            if let (Some(superclass), false) = (shape.superclass, shape.is_interface()) {
                let parent = classes.entry(superclass).shape();
                for slot in reinherit(&parent.vtable, &shape) {
                    log::trace!("Patched vtable slot {} of {:?}", slot, shape);
                    compiler.patch_vtable_slot(class, slot);
                    summary.patched_vtable_slots += 1;
                }
            }
            if !shape.is_interface() {
                let vtable = shape.vtable.snapshot();
                let itable = build_itable(classes, shape.superclass, &shape.interfaces, &vtable);
                for (interface, table) in itable {
                    for slot in shape.itable.replace(interface, table) {
                        log::trace!("Patched itable slot {} of {:?} for {:?}", slot, shape, interface);
                        compiler.patch_itable_slot(class, interface, slot);
                        summary.patched_itable_slots += 1;
                    }
                }
            }

            if runtime.settings.cache_invalidation == CacheInvalidation::Eager {
                invalidate_mirror(classes, class);
            }
            runtime.collaborators.reflection.invalidate_class(class);
            if !summary.classes.contains(&class) {
                summary.propagated.push(class);
            }
        }

        for installed in installed {
            for replacement in &installed.replaced {
                compiler.method_replaced(&replacement.old, &replacement.new, replacement.equivalent);
                summary.replaced_methods += 1;
                if replacement.equivalent {
                    summary.equivalent_methods += 1;
                }
            }
            for method in &installed.removed {
                compiler.method_removed(method);
            }

            let outcome =
                CallSiteMigrationPolicy::migrate(&runtime.call_sites, &installed.old, &installed.new);
            summary.call_sites_migrated += outcome.migrated;
            summary.call_sites_dropped += outcome.dropped;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BinaryName, ClassAccessFlags};
    use crate::model::CandidateClass;
    use crate::Settings;

    #[test]
    fn state_transitions() {
        use FixupState::*;
        let happy = [Idle, Validating, Quiescing, Installing, Propagating, Committed];
        for pair in happy.windows(2) {
            assert!(pair[0].can_become(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(Validating.can_become(Aborted));
        assert!(!Installing.can_become(Aborted));
        assert!(!Propagating.can_become(Aborted));
        assert!(!Committed.can_become(Idle));
        assert!(!Idle.can_become(Installing));
    }

    #[test]
    fn empty_batch_changes_nothing() {
        let runtime = Runtime::new(Settings::new());
        let thread = runtime.attach_thread();
        let coordinator = FixupCoordinator::new(&runtime, &thread);
        assert_eq!(coordinator.state(), FixupState::Idle);

        let summary = coordinator.run(vec![]).unwrap();
        assert!(summary.classes.is_empty());
        assert_eq!(summary.redefinition_count, 0);
        assert_eq!(runtime.redefinition_count(), 0);
    }

    #[test]
    fn unknown_class_aborts() {
        let runtime = Runtime::new(Settings::new());
        let thread = runtime.attach_thread();
        let candidate = CandidateClass::new(BinaryName::OBJECT, None, ClassAccessFlags::PUBLIC);
        let result = FixupCoordinator::new(&runtime, &thread)
            .run(vec![ClassDefinition::new(ClassId(99), candidate)]);
        assert!(matches!(result, Err(Error::ClassNotFound(_))));
        assert_eq!(runtime.redefinition_count(), 0);
    }
}
