use hotswap::jvm::*;
use hotswap::model::*;
use hotswap::redefine::RedefinitionSummary;
use hotswap::runtime::{ClassId, MutatorThread, ObjectRef, RedefinitionListener, Value};
use hotswap::{CacheInvalidation, Error, Runtime, Settings};

use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use std::process;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const TARGET: &str = "stress/Target";
const VERSION: &str = "stress/Version";

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("Class redefinition stress driver")
        .version(crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Redefine a class over and over while other threads keep running its code")
        .arg(
            Arg::new("redefinitions")
                .long("redefinitions")
                .value_name("COUNT")
                .value_parser(value_parser!(u32))
                .default_value("500")
                .help("Number of redefinitions to perform"),
        )
        .arg(
            Arg::new("readers")
                .long("readers")
                .value_name("THREADS")
                .value_parser(value_parser!(usize))
                .default_value("4")
                .help("Number of threads calling into the class meanwhile"),
        )
        .arg(
            Arg::new("extended")
                .long("extended")
                .action(ArgAction::SetTrue)
                .help("Add and remove fields on every redefinition (needs the extended rules)"),
        )
        .arg(
            Arg::new("lazy")
                .long("lazy-mirrors")
                .action(ArgAction::SetTrue)
                .help("Validate cached reflection data on use instead of dropping it eagerly"),
        )
        .get_matches();

    let redefinitions = matches.get_one::<u32>("redefinitions").copied().unwrap_or(500);
    let readers = matches.get_one::<usize>("readers").copied().unwrap_or(4);
    let extended = matches.get_flag("extended");

    let mut settings = if extended {
        Settings::extended()
    } else {
        Settings::new()
    };
    if matches.get_flag("lazy") {
        settings.cache_invalidation = CacheInvalidation::Lazy;
    }

    let runtime = Runtime::new(settings);
    runtime.add_listener(Arc::new(Progress));
    let main_thread = runtime.attach_thread();
    let class = runtime.define_class(&main_thread, target(0, extended))?;
    let receiver = runtime.new_instance(&main_thread, class)?;

    log::info!(
        "Redefining {} {} times with {} readers",
        TARGET,
        redefinitions,
        readers
    );
    let start_time = Instant::now();
    let done = AtomicBool::new(false);
    let calls = AtomicUsize::new(0);
    let anomalies = AtomicUsize::new(0);

    let outcome = thread::scope(|s| {
        for reader in 0..readers {
            let (runtime, receiver) = (&runtime, &receiver);
            let (done, calls, anomalies) = (&done, &calls, &anomalies);
            s.spawn(move || {
                let thread = runtime.attach_thread();
                let mut last_seen = 0;
                while !done.load(Ordering::Acquire) {
                    match read_version(runtime, &thread, class, receiver, reader % 2 == 0) {
                        Ok(version) if version >= last_seen => last_seen = version,
                        Ok(version) => {
                            log::error!("Reader {} went back from {} to {}", reader, last_seen, version);
                            anomalies.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            log::error!("Reader {} failed: {}", reader, err);
                            anomalies.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    calls.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        let mut outcome = Ok(());
        for version in 1..=redefinitions {
            if let Err(err) = runtime.redefine_class(&main_thread, class, target(version, extended)) {
                outcome = Err(err);
                break;
            }
        }
        done.store(true, Ordering::Release);
        outcome
    });
    outcome?;

    let elapsed = start_time.elapsed();
    let anomalies = anomalies.into_inner();
    println!(
        "{} redefinitions, {} reads, {} anomalies in {:?} ({:?} per redefinition)",
        runtime.redefinition_count(),
        calls.into_inner(),
        anomalies,
        elapsed,
        elapsed / redefinitions.max(1),
    );
    if anomalies > 0 {
        process::exit(1);
    }
    Ok(())
}

/// Version `k` of the stressed class
///
/// `version()` returns `k` and the class carries `@Version(k)`. With `extended`, it also has a
/// field named after the version, so every redefinition adds one field and removes another.
fn target(version: u32, extended: bool) -> CandidateClass {
    let name = |s: &str| UnqualifiedName::from_string(String::from(s)).expect("valid name");
    let class_name = |s: &str| BinaryName::from_string(String::from(s)).expect("valid name");

    let mut class = CandidateClass::new(
        class_name(TARGET),
        Some(BinaryName::OBJECT),
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
    );
    class.add_field(Field::new(name("payload"), FieldType::int(), FieldAccessFlags::PRIVATE));
    if extended {
        class.add_field(Field::new(
            name(&format!("v{}", version)),
            FieldType::int(),
            FieldAccessFlags::PRIVATE,
        ));
    }

    let value = class.constants.push(ConstantData::Integer(version as i32));
    class.add_method(Method::new(
        name("version"),
        MethodDescriptor::parse("()I").expect("valid descriptor"),
        MethodAccessFlags::PUBLIC,
        Some(Code::new(vec![Instruction::Ldc(value), Instruction::IReturn])),
    ));
    class.annotations.push(Annotation {
        type_name: class_name(VERSION),
        elements: vec![(name("value"), ConstantData::Integer(version as i32))],
    });
    class
}

/// Read the current version, either by calling `version()` or through a mirror
///
/// A mirror also gets checked for internal consistency.
fn read_version(
    runtime: &Runtime,
    thread: &MutatorThread,
    class: ClassId,
    receiver: &ObjectRef,
    reflective: bool,
) -> Result<i32, String> {
    if !reflective {
        return match runtime.invoke_virtual(thread, receiver, "version", "()I", vec![]) {
            Ok(Some(Value::Int(version))) => Ok(version),
            Ok(other) => Err(format!("version() returned {:?}", other)),
            Err(err) => Err(err.to_string()),
        };
    }

    let mirror = runtime.mirror(thread, class).map_err(|err| err.to_string())?;
    let version = mirror
        .annotations
        .iter()
        .find(|a| a.type_name.as_str() == VERSION)
        .and_then(|a| match a.elements.first() {
            Some((_, ConstantData::Integer(version))) => Some(*version),
            _ => None,
        })
        .ok_or_else(|| format!("mirror of generation {} has no version", mirror.generation))?;
    if mirror.generation != version as u64 {
        return Err(format!(
            "mirror of generation {} says version {}",
            mirror.generation, version
        ));
    }
    let versioned_fields = mirror
        .declared_fields
        .iter()
        .filter(|f| f.name.as_str().starts_with('v'))
        .count();
    if versioned_fields > 1 {
        return Err(format!(
            "mirror of version {} mixes fields of several versions",
            version
        ));
    }
    Ok(version)
}

/// Logs every committed batch
struct Progress;

impl RedefinitionListener for Progress {
    fn classes_redefined(&self, summary: &RedefinitionSummary) {
        log::debug!(
            "Batch #{} committed: {} classes, {} methods replaced, {} stale handles",
            summary.redefinition_count,
            summary.classes.len(),
            summary.replaced_methods,
            summary.stale_handles.len()
        );
    }
}
