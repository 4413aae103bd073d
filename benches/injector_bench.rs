//! Benchmarks for module loading and resolution

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use module_injector::{create_injector, Injectable, Injector, Locals, ModuleRegistry};
use std::hint::black_box;
use std::sync::Arc;

struct SmallService {
    value: i32,
}

struct MediumService {
    name: String,
    values: Vec<i32>,
}

/// `app` with a value, a factory depending on it, and a service on top.
fn app_registry() -> ModuleRegistry {
    let registry = ModuleRegistry::new();
    registry
        .module("app", Vec::<String>::new())
        .unwrap()
        .value("small", SmallService { value: 42 })
        .factory(
            "medium",
            Injectable::new(["small"], |args| {
                Ok(MediumService {
                    name: "medium".to_string(),
                    values: vec![args.get::<SmallService>(0)?.value; 5],
                })
            }),
        )
        .service(
            "top",
            Injectable::constructor(["small", "medium"], |args| {
                Ok((args.get::<SmallService>(0)?, args.get::<MediumService>(1)?))
            }),
        );
    registry
}

/// A chain `m0 <- m1 <- ... <- m{depth-1}`, each registering one factory
/// depending on the previous module's.
fn chain_registry(depth: usize) -> ModuleRegistry {
    let registry = ModuleRegistry::new();
    for i in 0..depth {
        let requires: Vec<String> = if i == 0 { vec![] } else { vec![format!("m{}", i - 1)] };
        let deps: Vec<String> = if i == 0 { vec![] } else { vec![format!("s{}", i - 1)] };
        registry
            .module(&format!("m{i}"), requires)
            .unwrap()
            .factory(
                &format!("s{i}"),
                Injectable::new(deps, |args| Ok(args.len() as u64)),
            );
    }
    registry
}

fn built(registry: &ModuleRegistry, root: &str) -> Injector {
    create_injector(registry, [root], false).unwrap()
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("record_module", |b| {
        b.iter(|| {
            let registry = app_registry();
            black_box(registry)
        })
    });

    let registry = app_registry();
    group.bench_function("create_injector", |b| {
        b.iter(|| black_box(built(&registry, "app")))
    });

    for depth in [4usize, 16, 64] {
        let registry = chain_registry(depth);
        let root = format!("m{}", depth - 1);
        group.bench_with_input(BenchmarkId::new("load_chain", depth), &root, |b, root| {
            b.iter(|| black_box(built(&registry, root)))
        });
    }

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let injector = built(&app_registry(), "app");
    let _ = injector.get_any("top").unwrap();

    group.bench_function("get_cached", |b| {
        b.iter(|| {
            let service = injector.get::<SmallService>("small").unwrap();
            black_box(service)
        })
    });

    group.bench_function("get_any_cached", |b| {
        b.iter(|| black_box(injector.get_any("top").unwrap()))
    });

    group.bench_function("has", |b| b.iter(|| black_box(injector.has("medium"))));

    group.bench_function("try_get_not_found", |b| {
        b.iter(|| black_box(injector.try_get::<SmallService>("missing")))
    });

    let registry = app_registry();
    group.bench_function("first_resolution", |b| {
        b.iter_batched(
            || built(&registry, "app"),
            |injector| black_box(injector.get::<MediumService>("medium").unwrap()),
            BatchSize::SmallInput,
        )
    });

    let registry = chain_registry(32);
    group.bench_function("first_resolution_chain_32", |b| {
        b.iter_batched(
            || built(&registry, "m31"),
            |injector| black_box(injector.get_any("s31").unwrap()),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_invoke(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoke");
    group.throughput(Throughput::Elements(1));

    let injector = built(&app_registry(), "app");
    let handler = Injectable::new(["small", "medium"], |args| {
        Ok(args.get::<SmallService>(0)?.value + args.get::<MediumService>(1)?.values.len() as i32)
    });
    let locals = Locals::new().with("small", SmallService { value: 1 });

    group.bench_function("invoke", |b| {
        b.iter(|| black_box(injector.invoke(&handler).unwrap()))
    });

    group.bench_function("invoke_with_locals", |b| {
        b.iter(|| black_box(injector.invoke_with(&handler, None, Some(&locals), None).unwrap()))
    });

    group.bench_function("instantiate", |b| {
        let ty = Injectable::constructor(["medium"], |args| {
            Ok(args.get::<MediumService>(0)?.name.clone())
        });
        b.iter(|| black_box(injector.instantiate(&ty, None, None).unwrap()))
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let injector = Arc::new(built(&app_registry(), "app"));
        let _ = injector.get_any("top").unwrap();

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let injector = Arc::clone(&injector);
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let _ = injector.get::<SmallService>("small").unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution,
    bench_invoke,
    bench_concurrent,
);

criterion_main!(benches);
