mod common;

use common::*;
use hotswap::jvm::*;
use hotswap::model::*;
use hotswap::redefine::{RedefinitionSummary, ViolatedRule};
use hotswap::runtime::hooks::{CollectorHooks, CompilerHooks, RedefinitionListener};
use hotswap::runtime::{ClassId, Collaborators, MethodData, Runtime, Slot, Value};
use hotswap::{Error, Settings};
use std::sync::{Arc, Mutex};

fn foo(value: i32) -> CandidateClass {
    let mut foo = class("demo/Foo", "java/lang/Object");
    add_field(&mut foo, "x", "I", FieldAccessFlags::PRIVATE);
    add_virtual_int(&mut foo, "m", value);
    foo
}

#[test]
fn same_object_sees_the_new_body() {
    let runtime = Runtime::new(Settings::new());
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, foo(0)).unwrap();
    let obj = runtime.new_instance(&thread, id).unwrap();
    let x = runtime.field_handle(id, "x").unwrap();
    runtime.put_field(&x, &obj, Value::Int(42)).unwrap();

    let before = runtime.invoke_virtual(&thread, &obj, "m", "()I", vec![]).unwrap();
    assert_eq!(before, Some(Value::Int(0)));

    let summary = runtime.redefine_class(&thread, id, foo(100)).unwrap();
    assert_eq!(summary.classes, vec![id]);
    assert_eq!(summary.generation_of(id), Some(1));
    assert_eq!(summary.replaced_methods, 1);
    assert_eq!(summary.equivalent_methods, 0);

    let after = runtime.invoke_virtual(&thread, &obj, "m", "()I", vec![]).unwrap();
    assert_eq!(after, Some(Value::Int(100)));
    assert_eq!(runtime.get_field(&x, &obj).unwrap(), Value::Int(42));
    assert_eq!(runtime.shape(id).unwrap().generation, 1);
}

#[test]
fn static_storage_is_shared_across_versions() {
    let counter = |extra: i32| {
        let mut class = class("demo/Counter", "java/lang/Object");
        add_field(&mut class, "count", "I", FieldAccessFlags::STATIC);
        let count = field_ref(&mut class, "demo/Counter", "count", "I");
        add_method(
            &mut class,
            "read",
            "()I",
            MethodAccessFlags::STATIC,
            Some(vec![
                Instruction::GetStatic(count),
                Instruction::IConst(extra),
                Instruction::IAdd,
                Instruction::IReturn,
            ]),
        );
        class
    };

    let runtime = Runtime::new(Settings::new());
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, counter(0)).unwrap();
    let count = runtime.field_handle(id, "count").unwrap();
    let cell = runtime.static_cell(&count).unwrap();
    runtime.put_static(&count, Value::Int(5)).unwrap();

    for extra in 1..=3 {
        runtime.redefine_class(&thread, id, counter(extra)).unwrap();
        assert!(Arc::ptr_eq(&cell, &runtime.static_cell(&count).unwrap()));
        assert_eq!(
            runtime.invoke_static(&thread, id, "read", "()I", vec![]).unwrap(),
            Some(Value::Int(5 + extra))
        );
    }

    // The handle issued before any redefinition still names the same field
    assert_eq!(runtime.field_handle(id, "count").unwrap(), count);
    assert_eq!(runtime.get_static(&count).unwrap(), Value::Int(5));
}

#[test]
fn vtable_fixups_reach_every_subclass() {
    let runtime = Runtime::new(Settings::new());
    let thread = runtime.attach_thread();

    let a_v1 = |value: i32| {
        let mut a = class("demo/A", "java/lang/Object");
        add_virtual_int(&mut a, "m", value);
        add_virtual_int(&mut a, "n", 10);
        a
    };
    let a = runtime.define_class(&thread, a_v1(1)).unwrap();
    let mut b = class("demo/B", "demo/A");
    add_virtual_int(&mut b, "n", 20);
    let b = runtime.define_class(&thread, b).unwrap();
    let c = runtime.define_class(&thread, class("demo/C", "demo/B")).unwrap();
    let obj = runtime.new_instance(&thread, c).unwrap();

    let call = |name: &str| runtime.invoke_virtual(&thread, &obj, name, "()I", vec![]).unwrap();
    assert_eq!(call("m"), Some(Value::Int(1)));
    assert_eq!(call("n"), Some(Value::Int(20)));

    let summary = runtime.redefine_class(&thread, a, a_v1(2)).unwrap();
    assert_eq!(summary.propagated, vec![b, c]);
    assert_eq!(call("m"), Some(Value::Int(2)));
    assert_eq!(call("n"), Some(Value::Int(20)), "override in B must survive");

    // C's table entry is the very method A now has installed
    let a_shape = runtime.shape(a).unwrap();
    let slot = a_shape.vtable.find(&a_shape.methods[0].key()).unwrap();
    match runtime.shape(c).unwrap().vtable.get(slot) {
        Some(Slot::Method(method)) => assert!(Arc::ptr_eq(&method, &a_shape.methods[0])),
        other => panic!("unexpected vtable entry {:?}", other),
    }
}

#[test]
fn batches_install_superclasses_first() {
    let runtime = Runtime::new(Settings::extended());
    let thread = runtime.attach_thread();
    let mut a = class("demo/A", "java/lang/Object");
    add_virtual_int(&mut a, "m", 1);
    let a = runtime.define_class(&thread, a).unwrap();
    let mut b = class("demo/B", "demo/A");
    add_virtual_int(&mut b, "own", 1);
    let b = runtime.define_class(&thread, b).unwrap();
    let obj = runtime.new_instance(&thread, b).unwrap();

    // B is listed first, and both classes add a method
    let mut new_a = class("demo/A", "java/lang/Object");
    add_virtual_int(&mut new_a, "m", 1);
    add_virtual_int(&mut new_a, "fromA", 7);
    let mut new_b = class("demo/B", "demo/A");
    add_virtual_int(&mut new_b, "own", 1);
    add_virtual_int(&mut new_b, "fromB", 8);

    let summary = runtime
        .redefine_classes(
            &thread,
            vec![ClassDefinition::new(b, new_b), ClassDefinition::new(a, new_a)],
        )
        .unwrap();
    assert_eq!(summary.classes, vec![a, b]);
    assert!(summary.extensions_used);
    assert!(summary.propagated.is_empty());

    let call = |name: &str| runtime.invoke_virtual(&thread, &obj, name, "()I", vec![]).unwrap();
    assert_eq!(call("fromA"), Some(Value::Int(7)));
    assert_eq!(call("fromB"), Some(Value::Int(8)));
    assert_eq!(call("m"), Some(Value::Int(1)));

    let b_vtable = runtime.shape(b).unwrap().vtable.snapshot();
    let keys: Vec<_> = b_vtable.iter().filter_map(Slot::key).collect();
    let unique: std::collections::HashSet<_> = keys.iter().collect();
    assert_eq!(keys.len(), unique.len(), "no two slots for one method: {:?}", b_vtable);
}

#[test]
fn class_initializer_runs_once() {
    let init = |body_value: i32| {
        let mut class = class("demo/Init", "java/lang/Object");
        add_field(&mut class, "runs", "I", FieldAccessFlags::STATIC);
        let mut clinit = bump_counter(&mut class, "demo/Init", "runs");
        clinit.push(Instruction::Return);
        add_method(&mut class, "<clinit>", "()V", MethodAccessFlags::STATIC, Some(clinit));
        add_static_int(&mut class, "value", body_value);
        class
    };

    let runtime = Runtime::new(Settings::new());
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, init(1)).unwrap();
    let runs = runtime.field_handle(id, "runs").unwrap();

    assert_eq!(runtime.get_static(&runs).unwrap(), Value::Int(0));
    assert_eq!(
        runtime.invoke_static(&thread, id, "value", "()I", vec![]).unwrap(),
        Some(Value::Int(1))
    );
    assert_eq!(runtime.get_static(&runs).unwrap(), Value::Int(1));

    runtime.redefine_class(&thread, id, init(2)).unwrap();
    assert_eq!(
        runtime.invoke_static(&thread, id, "value", "()I", vec![]).unwrap(),
        Some(Value::Int(2))
    );
    assert_eq!(runtime.get_static(&runs).unwrap(), Value::Int(1));
}

/// Adds a counting bootstrap method and an `invokedynamic` constant linked through it
fn add_counted_site(class: &mut CandidateClass, owner: &str, static_argument: i32) -> ConstantIndex {
    add_field(class, "bootstraps", "I", FieldAccessFlags::STATIC);

    let mut bootstrap = bump_counter(class, owner, "bootstraps");
    let target = method_handle(class, owner, "target", "()I");
    bootstrap.extend([Instruction::Ldc(target), Instruction::AReturn]);
    add_method(
        class,
        "bootstrap",
        "(Ljava/lang/String;I)Ljava/lang/Object;",
        MethodAccessFlags::STATIC,
        Some(bootstrap),
    );
    add_static_int(class, "target", 7);

    class.add_invoke_dynamic(
        BootstrapMethodData {
            method: MethodRef {
                class: class_name(owner),
                name: name("bootstrap"),
                descriptor: descriptor("(Ljava/lang/String;I)Ljava/lang/Object;"),
            },
            arguments: vec![ConstantData::Integer(static_argument)],
        },
        name("call"),
        descriptor("()I"),
    )
}

/// Class with one `invokedynamic` site whose bootstrap method counts its runs
fn indy(static_argument: i32, padding: usize) -> CandidateClass {
    let owner = "demo/Indy";
    let mut class = class(owner, "java/lang/Object");
    let site = add_counted_site(&mut class, owner, static_argument);
    let mut run = vec![Instruction::Nop; padding];
    run.extend([Instruction::InvokeDynamic(site), Instruction::IReturn]);
    add_method(&mut class, "run", "()I", MethodAccessFlags::STATIC, Some(run));
    class
}

/// `demo/Loop.run()` goes twice through its `invokedynamic`, calling the native `hcr()` after
/// each pass
fn redefining_loop() -> CandidateClass {
    let owner = "demo/Loop";
    let mut class = class(owner, "java/lang/Object");
    let site = add_counted_site(&mut class, owner, 1);
    add_method(
        &mut class,
        "hcr",
        "()V",
        MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE,
        None,
    );
    let hcr = method_ref(&mut class, owner, "hcr", "()V");
    add_method(
        &mut class,
        "run",
        "()I",
        MethodAccessFlags::STATIC,
        Some(vec![
            Instruction::IConst(2),
            Instruction::IStore(0),
            Instruction::InvokeDynamic(site),
            Instruction::Pop,
            Instruction::Invoke(InvokeType::Static, hcr),
            Instruction::IInc(0, -1),
            Instruction::ILoad(0),
            Instruction::If(OrdComparison::NE, 2),
            Instruction::IConst(0),
            Instruction::IReturn,
        ]),
    );
    class
}

#[test]
fn linked_call_sites_survive_equivalent_redefinitions() {
    let runtime = Runtime::new(Settings::new());
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, indy(1, 0)).unwrap();
    let bootstraps = runtime.field_handle(id, "bootstraps").unwrap();
    let run = || runtime.invoke_static(&thread, id, "run", "()I", vec![]).unwrap();

    assert_eq!(run(), Some(Value::Int(7)));
    assert_eq!(run(), Some(Value::Int(7)));
    assert_eq!(runtime.get_static(&bootstraps).unwrap(), Value::Int(1));
    assert_eq!(runtime.call_site_count(), 1);

    // Site moves to a different offset, but stays the first one with the same bootstrap
    let summary = runtime.redefine_class(&thread, id, indy(1, 3)).unwrap();
    assert_eq!(summary.call_sites_migrated, 1);
    assert_eq!(summary.call_sites_dropped, 0);
    assert_eq!(run(), Some(Value::Int(7)));
    assert_eq!(runtime.get_static(&bootstraps).unwrap(), Value::Int(1));
    assert_eq!(runtime.call_site_count(), 1);

    // A different static argument means linking again
    let summary = runtime.redefine_class(&thread, id, indy(2, 3)).unwrap();
    assert_eq!(summary.call_sites_migrated, 0);
    assert_eq!(summary.call_sites_dropped, 1);
    assert_eq!(runtime.call_site_count(), 0);
    assert_eq!(run(), Some(Value::Int(7)));
    assert_eq!(runtime.get_static(&bootstraps).unwrap(), Value::Int(2));
}

#[test]
fn obsolete_bodies_keep_their_call_site_links() {
    let runtime = Runtime::new(Settings::new());
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, redefining_loop()).unwrap();
    let bootstraps = runtime.field_handle(id, "bootstraps").unwrap();
    runtime
        .register_native("demo/Loop", "hcr", "()V", move |ctx, _args| {
            let summary = ctx
                .runtime()
                .redefine_class(ctx.thread(), id, redefining_loop())
                .unwrap();
            assert_eq!(summary.call_sites_migrated, 1);
            Ok(None)
        })
        .unwrap();

    // The second pass runs the now obsolete body, whose site was already linked
    assert_eq!(
        runtime.invoke_static(&thread, id, "run", "()I", vec![]).unwrap(),
        Some(Value::Int(0))
    );
    assert_eq!(runtime.get_static(&bootstraps).unwrap(), Value::Int(1));
    assert_eq!(runtime.redefinition_count(), 2);
    assert_eq!(runtime.shape(id).unwrap().generation, 2);

    // Only the current body can still run the site
    assert_eq!(runtime.call_site_count(), 1);
    assert_eq!(
        runtime.invoke_static(&thread, id, "run", "()I", vec![]).unwrap(),
        Some(Value::Int(0))
    );
    assert_eq!(runtime.get_static(&bootstraps).unwrap(), Value::Int(1));
    assert_eq!(runtime.call_site_count(), 1);
}

#[derive(Default)]
struct Recorder {
    summaries: Mutex<Vec<u64>>,
}

impl RedefinitionListener for Recorder {
    fn classes_redefined(&self, summary: &RedefinitionSummary) {
        self.summaries.lock().unwrap().push(summary.redefinition_count);
    }
}

#[test]
fn finalizer_changes_abort_the_whole_batch() {
    let runtime = Runtime::new(Settings::extended());
    let thread = runtime.attach_thread();
    let recorder = Arc::new(Recorder::default());
    runtime.add_listener(recorder.clone());

    let foo_id = runtime.define_class(&thread, foo(0)).unwrap();
    let mut finalizable = class("demo/Finalizable", "java/lang/Object");
    add_method(
        &mut finalizable,
        "finalize",
        "()V",
        MethodAccessFlags::PROTECTED,
        Some(vec![Instruction::Return]),
    );
    let finalizable_id = runtime.define_class(&thread, finalizable).unwrap();
    let obj = runtime.new_instance(&thread, foo_id).unwrap();

    let err = runtime
        .redefine_classes(
            &thread,
            vec![
                ClassDefinition::new(foo_id, foo(100)),
                ClassDefinition::new(
                    finalizable_id,
                    class("demo/Finalizable", "java/lang/Object"),
                ),
            ],
        )
        .unwrap_err();
    match &err {
        Error::IncompatibleChange { class, rule, report } => {
            assert_eq!(class, &class_name("demo/Finalizable"));
            assert_eq!(rule, &ViolatedRule::FinalizerRemoved);
            assert!(!report.compatible);
        }
        other => panic!("unexpected error {}", other),
    }

    assert_eq!(runtime.shape(foo_id).unwrap().generation, 0);
    assert_eq!(runtime.shape(finalizable_id).unwrap().generation, 0);
    assert_eq!(
        runtime.invoke_virtual(&thread, &obj, "m", "()I", vec![]).unwrap(),
        Some(Value::Int(0))
    );
    assert_eq!(runtime.redefinition_count(), 0);
    assert!(recorder.summaries.lock().unwrap().is_empty());

    runtime.redefine_class(&thread, foo_id, foo(100)).unwrap();
    runtime.redefine_class(&thread, foo_id, foo(200)).unwrap();
    assert_eq!(*recorder.summaries.lock().unwrap(), vec![1, 2]);
    assert_eq!(runtime.redefinition_count(), 2);
}

#[test]
fn standard_mode_rejects_shape_changes() {
    let runtime = Runtime::new(Settings::new());
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, foo(0)).unwrap();

    let mut candidate = foo(0);
    add_virtual_int(&mut candidate, "extra", 1);
    let err = runtime.redefine_class(&thread, id, candidate).unwrap_err();
    assert!(matches!(err.rule(), Some(ViolatedRule::MethodAdded(_))));
    assert_eq!(err.class(), Some(&class_name("demo/Foo")));

    let err = runtime
        .redefine_classes(
            &thread,
            vec![ClassDefinition::new(id, foo(1)), ClassDefinition::new(id, foo(2))],
        )
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateClass(_)));
    assert_eq!(runtime.shape(id).unwrap().generation, 0);
}

#[test]
fn reserved_and_hidden_classes_are_not_modifiable() {
    let runtime = Runtime::new(Settings::new());
    let thread = runtime.attach_thread();
    let object = runtime.class_id("java/lang/Object").unwrap();
    assert!(!runtime.is_modifiable_class(object));

    let candidate = CandidateClass::new(
        BinaryName::OBJECT,
        None,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
    );
    let err = runtime.redefine_class(&thread, object, candidate).unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedRedefinition {
            rule: ViolatedRule::ReservedClass,
            ..
        }
    ));

    let mut hidden = foo(0);
    hidden.is_hidden = true;
    let id = runtime.define_class(&thread, hidden.clone()).unwrap();
    assert!(!runtime.is_modifiable_class(id));
    let err = runtime.redefine_class(&thread, id, hidden).unwrap_err();
    assert_eq!(err.rule(), Some(&ViolatedRule::HiddenClass));

    let id = runtime.define_class(&thread, class("demo/Plain", "java/lang/Object")).unwrap();
    assert!(runtime.is_modifiable_class(id));
}

#[test]
fn extended_mode_adds_and_removes_members() {
    let runtime = Runtime::new(Settings::extended());
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, foo(0)).unwrap();
    let obj = runtime.new_instance(&thread, id).unwrap();
    let x = runtime.field_handle(id, "x").unwrap();
    runtime.put_field(&x, &obj, Value::Int(3)).unwrap();
    let m = runtime.method_handle(id, "m", "()I").unwrap();

    let mut candidate = class("demo/Foo", "java/lang/Object");
    add_field(&mut candidate, "y", "J", FieldAccessFlags::PRIVATE);
    add_field(&mut candidate, "x", "I", FieldAccessFlags::PRIVATE);
    add_field(&mut candidate, "total", "I", FieldAccessFlags::STATIC);
    add_virtual_int(&mut candidate, "other", 5);
    let summary = runtime.redefine_class(&thread, id, candidate).unwrap();
    assert!(summary.extensions_used);
    assert_eq!(summary.stale_handles, vec![m.clone()]);

    // Existing objects keep their values and read new fields as defaults
    let y = runtime.field_handle(id, "y").unwrap();
    assert_eq!(runtime.get_field(&x, &obj).unwrap(), Value::Int(3));
    assert_eq!(runtime.get_field(&y, &obj).unwrap(), Value::Long(0));
    runtime.put_field(&y, &obj, Value::Long(9)).unwrap();
    assert_eq!(runtime.get_field(&x, &obj).unwrap(), Value::Int(3));
    let total = runtime.field_handle(id, "total").unwrap();
    assert_eq!(runtime.get_static(&total).unwrap(), Value::Int(0));

    // The removed method is gone, through handles and through dispatch
    assert!(matches!(
        runtime.invoke_handle(&thread, &m, vec![Value::Object(obj.clone())]),
        Err(Error::StaleMember { .. })
    ));
    assert!(runtime.invoke_virtual(&thread, &obj, "m", "()I", vec![]).is_err());
    assert_eq!(
        runtime.invoke_virtual(&thread, &obj, "other", "()I", vec![]).unwrap(),
        Some(Value::Int(5))
    );
}

struct Refusing;

impl CollectorHooks for Refusing {
    fn confirm_layout_growth(&self, _class: ClassId, _old_slots: u32, _new_slots: u32) -> bool {
        false
    }
}

#[test]
fn collector_can_refuse_layout_growth() {
    let collaborators = Collaborators {
        collector: Arc::new(Refusing),
        ..Collaborators::default()
    };
    let runtime = Runtime::with_collaborators(Settings::extended(), collaborators);
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, foo(0)).unwrap();

    // Growing statics doesn't touch the instance layout
    let mut statics_only = foo(1);
    add_field(&mut statics_only, "cache", "I", FieldAccessFlags::STATIC);
    runtime.redefine_class(&thread, id, statics_only).unwrap();

    let mut grown = foo(2);
    add_field(&mut grown, "cache", "I", FieldAccessFlags::STATIC);
    add_field(&mut grown, "y", "I", FieldAccessFlags::PRIVATE);
    let err = runtime.redefine_class(&thread, id, grown).unwrap_err();
    assert_eq!(
        err.rule(),
        Some(&ViolatedRule::LayoutRequiresRelocation {
            old_slots: 1,
            new_slots: 2
        })
    );
    assert_eq!(runtime.shape(id).unwrap().generation, 1);
}

/// Collector that records every growth it is asked about and refuses the one class it is told to
#[derive(Default)]
struct Selective {
    asked: Mutex<Vec<(ClassId, u32, u32)>>,
    refused: Mutex<Option<ClassId>>,
}

impl CollectorHooks for Selective {
    fn confirm_layout_growth(&self, class: ClassId, old_slots: u32, new_slots: u32) -> bool {
        self.asked.lock().unwrap().push((class, old_slots, new_slots));
        *self.refused.lock().unwrap() != Some(class)
    }
}

#[test]
fn collector_confirms_growth_of_subclass_layouts() {
    let collector = Arc::new(Selective::default());
    let collaborators = Collaborators {
        collector: collector.clone(),
        ..Collaborators::default()
    };
    let runtime = Runtime::with_collaborators(Settings::extended(), collaborators);
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, foo(0)).unwrap();
    let mut sub_class = class("demo/Sub", "demo/Foo");
    add_field(&mut sub_class, "z", "I", FieldAccessFlags::PRIVATE);
    let sub = runtime.define_class(&thread, sub_class).unwrap();
    let grown = || {
        let mut grown = foo(1);
        add_field(&mut grown, "y", "I", FieldAccessFlags::PRIVATE);
        grown
    };

    // Only the subclass's layout is refused, and that is enough to abort
    *collector.refused.lock().unwrap() = Some(sub);
    match runtime.redefine_class(&thread, id, grown()).unwrap_err() {
        Error::IncompatibleChange { class, rule, .. } => {
            assert_eq!(class.as_str(), "demo/Sub");
            assert_eq!(
                rule,
                ViolatedRule::LayoutRequiresRelocation {
                    old_slots: 2,
                    new_slots: 3
                }
            );
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(
        *collector.asked.lock().unwrap(),
        vec![(id, 1, 3), (sub, 2, 3)]
    );
    assert_eq!(runtime.shape(id).unwrap().generation, 0);

    *collector.refused.lock().unwrap() = None;
    collector.asked.lock().unwrap().clear();
    runtime.redefine_class(&thread, id, grown()).unwrap();
    assert_eq!(
        *collector.asked.lock().unwrap(),
        vec![(id, 1, 3), (sub, 2, 3)]
    );
}

#[derive(Default)]
struct CompilerLog {
    vtable_patches: Mutex<Vec<(ClassId, usize)>>,
    replacements: Mutex<Vec<bool>>,
}

impl CompilerHooks for CompilerLog {
    fn patch_vtable_slot(&self, class: ClassId, slot: usize) {
        self.vtable_patches.lock().unwrap().push((class, slot));
    }

    fn method_replaced(&self, _old: &Arc<MethodData>, _new: &Arc<MethodData>, equivalent: bool) {
        self.replacements.lock().unwrap().push(equivalent);
    }
}

#[test]
fn compiler_is_told_what_changed() {
    let compiler = Arc::new(CompilerLog::default());
    let collaborators = Collaborators {
        compiler: compiler.clone(),
        ..Collaborators::default()
    };
    let runtime = Runtime::with_collaborators(Settings::new(), collaborators);
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, foo(0)).unwrap();
    let sub = runtime.define_class(&thread, class("demo/Sub", "demo/Foo")).unwrap();

    // Same body, different constant pool layout
    let mut padded = class("demo/Foo", "java/lang/Object");
    padded.constants.push(string("unused"));
    add_field(&mut padded, "x", "I", FieldAccessFlags::PRIVATE);
    add_virtual_int(&mut padded, "m", 0);
    let summary = runtime.redefine_class(&thread, id, padded).unwrap();
    assert_eq!(summary.equivalent_methods, 1);

    runtime.redefine_class(&thread, id, foo(1)).unwrap();
    assert_eq!(*compiler.replacements.lock().unwrap(), vec![true, false]);

    let slot = runtime.shape(id).unwrap().vtable.find(&runtime.shape(id).unwrap().methods[0].key());
    assert_eq!(*compiler.vtable_patches.lock().unwrap(), vec![(sub, slot.unwrap()); 2]);
}

#[test]
fn interface_dispatch_follows_redefinitions() {
    let runtime = Runtime::new(Settings::extended());
    let thread = runtime.attach_thread();

    let mut greeter = interface("demo/Greeter");
    add_method(
        &mut greeter,
        "greet",
        "()I",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        None,
    );
    let greeter_id = runtime.define_class(&thread, greeter.clone()).unwrap();

    let english = |value: i32| {
        let mut class = class("demo/English", "java/lang/Object");
        class.interfaces.push(class_name("demo/Greeter"));
        add_virtual_int(&mut class, "greet", value);
        class
    };
    let english_id = runtime.define_class(&thread, english(1)).unwrap();

    let mut caller = class("demo/Caller", "java/lang/Object");
    for method in ["greet", "wave"] {
        let target = interface_method_ref(&mut caller, "demo/Greeter", method, "()I");
        add_method(
            &mut caller,
            method,
            "(Ldemo/Greeter;)I",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            Some(vec![
                Instruction::ALoad(0),
                Instruction::Invoke(InvokeType::Interface, target),
                Instruction::IReturn,
            ]),
        );
    }
    let caller_id = runtime.define_class(&thread, caller).unwrap();
    let obj = runtime.new_instance(&thread, english_id).unwrap();
    let call = |method: &str| {
        runtime.invoke_static(
            &thread,
            caller_id,
            method,
            "(Ldemo/Greeter;)I",
            vec![Value::Object(obj.clone())],
        )
    };

    assert_eq!(call("greet").unwrap(), Some(Value::Int(1)));
    assert!(call("wave").is_err());

    runtime.redefine_class(&thread, english_id, english(2)).unwrap();
    assert_eq!(call("greet").unwrap(), Some(Value::Int(2)));

    // A default method added to the interface reaches the implementing class
    add_virtual_int(&mut greeter, "wave", 9);
    let summary = runtime.redefine_class(&thread, greeter_id, greeter).unwrap();
    assert_eq!(summary.propagated, vec![english_id]);
    assert!(summary.patched_itable_slots >= 1);
    assert_eq!(call("wave").unwrap(), Some(Value::Int(9)));
    assert_eq!(call("greet").unwrap(), Some(Value::Int(2)));
}

#[test]
fn removing_an_interface_method_keeps_the_others_dispatching() {
    let runtime = Runtime::new(Settings::extended());
    let thread = runtime.attach_thread();
    let shapes = |methods: &[&str]| {
        let mut shapes = interface("demo/Shapes");
        for method in methods {
            add_method(
                &mut shapes,
                method,
                "()I",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                None,
            );
        }
        shapes
    };
    let shapes_id = runtime.define_class(&thread, shapes(&["a", "b"])).unwrap();

    let mut square = class("demo/Square", "java/lang/Object");
    square.interfaces.push(class_name("demo/Shapes"));
    add_virtual_int(&mut square, "a", 1);
    add_virtual_int(&mut square, "b", 2);
    let square_id = runtime.define_class(&thread, square).unwrap();

    let mut caller = class("demo/ShapeCaller", "java/lang/Object");
    let b = interface_method_ref(&mut caller, "demo/Shapes", "b", "()I");
    add_method(
        &mut caller,
        "b",
        "(Ldemo/Shapes;)I",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        Some(vec![
            Instruction::ALoad(0),
            Instruction::Invoke(InvokeType::Interface, b),
            Instruction::IReturn,
        ]),
    );
    let caller_id = runtime.define_class(&thread, caller).unwrap();
    let obj = runtime.new_instance(&thread, square_id).unwrap();
    let call_b = || {
        runtime
            .invoke_static(&thread, caller_id, "b", "(Ldemo/Shapes;)I", vec![Value::Object(obj.clone())])
            .unwrap()
    };
    assert_eq!(call_b(), Some(Value::Int(2)));

    // `b` moves up to the slot `a` had
    let summary = runtime.redefine_class(&thread, shapes_id, shapes(&["b"])).unwrap();
    assert!(summary.extensions_used);
    assert_eq!(summary.propagated, vec![square_id]);
    assert_eq!(call_b(), Some(Value::Int(2)));
    assert_eq!(
        runtime.invoke_virtual(&thread, &obj, "a", "()I", vec![]).unwrap(),
        Some(Value::Int(1))
    );
}

/// `demo/Color`, an enum with one constant per name
fn color(constants: &[&str]) -> CandidateClass {
    let mut color = class("demo/Color", "java/lang/Enum");
    color.access_flags |= ClassAccessFlags::FINAL | ClassAccessFlags::ENUM;
    for constant in constants {
        add_field(
            &mut color,
            constant,
            "Ldemo/Color;",
            FieldAccessFlags::PUBLIC
                | FieldAccessFlags::STATIC
                | FieldAccessFlags::FINAL
                | FieldAccessFlags::ENUM,
        );
    }
    color
}

#[test]
fn enum_constants_come_and_go_in_extended_mode() {
    let runtime = Runtime::new(Settings::extended());
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, color(&["RED", "BLUE"])).unwrap();
    let red = runtime.field_handle(id, "RED").unwrap();
    let blue = runtime.field_handle(id, "BLUE").unwrap();
    let red_value = Value::Object(runtime.new_instance(&thread, id).unwrap());
    runtime.put_static(&red, red_value.clone()).unwrap();

    let summary = runtime.redefine_class(&thread, id, color(&["RED", "GREEN"])).unwrap();
    assert!(summary.extensions_used);
    assert_eq!(summary.stale_handles, vec![blue.clone()]);

    // Kept constants keep their value, added ones start out null
    assert_eq!(runtime.get_static(&red).unwrap(), red_value);
    let green = runtime.field_handle(id, "GREEN").unwrap();
    assert_eq!(runtime.get_static(&green).unwrap(), Value::Null);
    assert!(matches!(runtime.get_static(&blue), Err(Error::StaleMember { .. })));

    runtime.redefine_class(&thread, id, color(&["GREEN"])).unwrap();
    assert!(matches!(runtime.get_static(&red), Err(Error::StaleMember { .. })));
    assert_eq!(runtime.get_static(&green).unwrap(), Value::Null);
}

#[test]
fn enum_cannot_become_a_plain_class() {
    let runtime = Runtime::new(Settings::extended());
    let thread = runtime.attach_thread();
    let id = runtime.define_class(&thread, color(&["RED"])).unwrap();

    let mut candidate = color(&["RED"]);
    candidate.access_flags.remove(ClassAccessFlags::ENUM);
    let err = runtime.redefine_class(&thread, id, candidate).unwrap_err();
    assert_eq!(
        err.rule(),
        Some(&ViolatedRule::ClassKindChanged {
            old: ClassKind::Enum,
            new: ClassKind::Class
        })
    );
    assert!(err.to_string().contains("class kind changed from Enum to Class"));
    assert_eq!(runtime.shape(id).unwrap().generation, 0);
}

#[test]
fn mirrors_reflect_the_current_version() {
    let runtime = Runtime::new(Settings::extended());
    let thread = runtime.attach_thread();
    let mut first = foo(0);
    first.annotations.push(annotation("demo/Version", 1));
    let id = runtime.define_class(&thread, first).unwrap();

    let mirror = runtime.mirror(&thread, id).unwrap();
    assert_eq!(mirror.generation, 0);
    assert!(mirror.declared_field("x").is_some());
    assert!(mirror.declared_method("m", &descriptor("()I")).is_some());
    assert_eq!(
        mirror.annotation(&class_name("demo/Version")).unwrap().elements[0].1,
        ConstantData::Integer(1)
    );
    assert!(Arc::ptr_eq(&mirror, &runtime.mirror(&thread, id).unwrap()));

    let mut second = class("demo/Foo", "java/lang/Object");
    add_field(&mut second, "x", "I", FieldAccessFlags::PRIVATE);
    add_field(&mut second, "z", "I", FieldAccessFlags::PRIVATE);
    add_virtual_int(&mut second, "m", 1);
    second.annotations.push(annotation("demo/Version", 2));
    runtime.redefine_class(&thread, id, second).unwrap();

    let mirror = runtime.mirror(&thread, id).unwrap();
    assert_eq!(mirror.generation, 1);
    assert!(mirror.declared_field("z").is_some());
    assert_eq!(
        mirror.annotation(&class_name("demo/Version")).unwrap().elements[0].1,
        ConstantData::Integer(2)
    );
    assert!(mirror.is_current(runtime.classes()));
}
