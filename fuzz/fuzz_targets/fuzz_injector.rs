#![no_main]

//! Fuzz target for module loading and resolution
//!
//! Builds random module graphs (including cyclic `requires` and cyclic
//! service dependencies) and resolves random tokens. Every outcome must be a
//! value or an error; nothing may panic or overflow the stack.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use module_injector::{create_injector, DiError, Injectable, ModuleRegistry};
use std::sync::Arc;

const MODULES: usize = 6;
const SERVICES: usize = 8;

fn module_name(index: u8) -> String {
    format!("m{}", index as usize % MODULES)
}

fn service_name(index: u8) -> String {
    format!("s{}", index as usize % SERVICES)
}

/// One recorded registration
#[derive(Debug, Arbitrary)]
enum Registration {
    Value(u8, u32),
    Constant(u8, u32),
    Factory(u8, Vec<u8>),
    Decorator(u8, Vec<u8>),
    Config(Vec<u8>),
    Run(Vec<u8>),
}

#[derive(Debug, Arbitrary)]
struct ModuleSpec {
    requires: Vec<u8>,
    registrations: Vec<Registration>,
}

#[derive(Debug, Arbitrary)]
struct Input {
    modules: Vec<ModuleSpec>,
    roots: Vec<u8>,
    strict: bool,
    lookups: Vec<u8>,
    extra: Vec<u8>,
}

/// Sum of the `u32` dependencies; anything else counts as zero
fn summing(deps: &[u8]) -> Injectable {
    let tokens: Vec<String> = deps.iter().copied().map(service_name).collect();
    Injectable::new(tokens, |args| {
        Ok((0..args.len())
            .filter_map(|i| args.get::<u32>(i).ok())
            .fold(0u32, |acc, v| acc.wrapping_add(*v)))
    })
}

fn decorating(deps: &[u8]) -> Injectable {
    let tokens: Vec<String> = std::iter::once("$delegate".to_string())
        .chain(deps.iter().copied().map(service_name))
        .collect();
    Injectable::new(tokens, |args| {
        Ok(args.get::<u32>(0).map(|v| v.wrapping_mul(3)).unwrap_or(0))
    })
}

fn build(input: &Input) -> ModuleRegistry {
    let registry = ModuleRegistry::new();
    for (index, spec) in input.modules.iter().take(MODULES).enumerate() {
        let requires: Vec<String> = spec.requires.iter().copied().map(module_name).collect();
        let Ok(module) = registry.module(&format!("m{index}"), requires) else {
            continue;
        };
        for registration in &spec.registrations {
            match registration {
                Registration::Value(name, value) => {
                    module.value(&service_name(*name), *value);
                }
                Registration::Constant(name, value) => {
                    module.constant(&service_name(*name), *value);
                }
                Registration::Factory(name, deps) => {
                    module.factory(&service_name(*name), summing(deps));
                }
                Registration::Decorator(name, deps) => {
                    module.decorator(&service_name(*name), decorating(deps));
                }
                Registration::Config(deps) => {
                    let tokens: Vec<String> = deps
                        .iter()
                        .map(|d| format!("{}Provider", service_name(*d)))
                        .collect();
                    module.config(Injectable::new(tokens, |_| Ok(())));
                }
                Registration::Run(deps) => {
                    module.run(summing(deps));
                }
            }
        }
    }
    registry
}

fuzz_target!(|input: Input| {
    let registry = build(&input);
    let roots: Vec<String> = input.roots.iter().copied().map(module_name).collect();

    let injector = match create_injector(&registry, roots, input.strict) {
        Ok(injector) => injector,
        Err(err) => {
            // Display must terminate on arbitrarily nested load failures
            let _ = err.to_string();
            let _ = err.root_cause();
            return;
        }
    };

    for lookup in &input.lookups {
        let token = service_name(*lookup);
        match (injector.get_any(&token), injector.get_any(&token)) {
            (Ok(first), Ok(second)) => assert!(Arc::ptr_eq(&first, &second)),
            (Err(DiError::CircularDependency { path }), _) => assert!(path.contains(&token)),
            _ => {}
        }
    }

    let extra: Vec<String> = input.extra.iter().copied().map(module_name).collect();
    let _ = injector.load_new_modules(extra);
    for lookup in &input.lookups {
        let _ = injector.has(&service_name(*lookup));
    }
});
