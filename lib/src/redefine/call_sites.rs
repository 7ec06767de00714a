//! Carrying linked `invokedynamic` call sites over to redefined method bodies

use crate::model::{ConstantData, ConstantIndex, InvokeDynamicData, Offset};
use crate::runtime::{CallSiteKey, CallSiteTable, ClassShape, MethodBody};

/// What happened to the links of one class's call sites
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct MigrationOutcome {
    pub migrated: usize,
    pub dropped: usize,
}

/// Decides which linked call sites survive a redefinition
///
/// The `k`-th `invokedynamic` of an old method body corresponds to the `k`-th `invokedynamic`
/// of the new body of the same method. The link carries over only if that site uses an equal
/// bootstrap method (same method, same static arguments) and the same name and type. Other
/// sites get linked again by their next execution.
///
/// Links of the old bodies are copied, not moved: a frame still running an obsolete body keeps
/// using them. They are purged by a later migration once no frame holds that body anymore.
pub struct CallSiteMigrationPolicy;

impl CallSiteMigrationPolicy {
    /// Find the site of `new` that corresponds to the site at `offset` in `old`
    pub fn equivalent_site(old: &MethodBody, offset: Offset, new: &MethodBody) -> Option<Offset> {
        let ordinal = old
            .code
            .invoke_dynamic_sites()
            .position(|(site, _)| site == offset)?;
        let (old_site, old_constant) = old.code.invoke_dynamic_sites().nth(ordinal)?;
        let (new_site, new_constant) = new.code.invoke_dynamic_sites().nth(ordinal)?;
        debug_assert_eq!(old_site, offset);

        let old_data = invoke_dynamic_data(old, old_constant)?;
        let new_data = invoke_dynamic_data(new, new_constant)?;
        let same = old_data.name == new_data.name
            && old_data.descriptor == new_data.descriptor
            && old.bootstrap_methods.get(old_data.bootstrap)?
                == new.bootstrap_methods.get(new_data.bootstrap)?;
        if same {
            Some(new_site)
        } else {
            None
        }
    }

    /// Copy the links of call sites in `old`'s method bodies over to `new`
    pub fn migrate(table: &CallSiteTable, old: &ClassShape, new: &ClassShape) -> MigrationOutcome {
        let purged = table.purge_unreachable(old.class);
        if purged > 0 {
            log::trace!("Purged {} links of obsolete method bodies", purged);
        }

        let mut outcome = MigrationOutcome::default();
        for binding in table.bindings(old.class, old.generation) {
            let key = &binding.key;
            let new_site = old
                .method(&key.method)
                .and_then(|m| m.body.as_ref())
                .zip(new.method(&key.method).and_then(|m| m.body.as_ref()))
                .and_then(|(old_body, new_body)| {
                    Self::equivalent_site(old_body, key.offset, new_body)
                        .map(|offset| (offset, new_body))
                });

            match new_site {
                Some((offset, new_body)) => {
                    log::trace!("Carrying over {:?} to offset {}", key, offset);
                    let moved = CallSiteKey {
                        class: key.class,
                        method: key.method.clone(),
                        generation: new_body.generation,
                        offset,
                    };
                    table.insert(binding.moved_to(moved, new_body));
                    outcome.migrated += 1;
                }
                None => {
                    log::trace!("Not carrying over {:?}", key);
                    outcome.dropped += 1;
                }
            }
        }
        outcome
    }
}

fn invoke_dynamic_data(body: &MethodBody, index: ConstantIndex) -> Option<&InvokeDynamicData> {
    match body.constants.get(index) {
        Some(ConstantData::InvokeDynamic(data)) => Some(data),
        _ => None,
    }
}
