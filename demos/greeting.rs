//! Modules, providers, config blocks and decorators
//!
//! Run with:
//!   cargo run --example greeting

use module_injector::{
    create_injector, DiError, Injectable, ModuleRegistry, ProviderObject, ServiceProvider,
};
use std::sync::Mutex;

/// Configurable during config blocks, produces the `greeter` service.
#[derive(Default)]
struct GreeterProvider {
    salutation: Mutex<String>,
}

impl ServiceProvider for GreeterProvider {
    fn factory(&self) -> Injectable {
        let salutation = self
            .salutation
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        Injectable::new(["name"], move |args| {
            Ok(format!("{salutation}, {}", args.get::<String>(0)?))
        })
    }
}

fn main() -> module_injector::Result<()> {
    println!("=== Module Injector Greeting Demo ===\n");

    let registry = ModuleRegistry::new();

    registry
        .module("greeting", Vec::<String>::new())?
        .provider("greeter", ProviderObject::new(GreeterProvider::default()))
        .value("name", String::from("world"));

    registry
        .module("app", ["greeting"])?
        .config(Injectable::new(["greeterProvider"], |args| {
            if let Ok(mut salutation) = args.get::<GreeterProvider>(0)?.salutation.lock() {
                *salutation = "Hello".into();
            }
            Ok(())
        }))
        .decorator(
            "greeter",
            Injectable::new(["$delegate"], |args| Ok(format!("{}!", args.get::<String>(0)?))),
        )
        .factory(
            "shout",
            Injectable::new(["greeter"], |args| Ok(args.get::<String>(0)?.to_uppercase())),
        )
        .run(Injectable::new(["shout"], |args| {
            println!("  [run] {}", args.get::<String>(0)?);
            Ok(())
        }));

    let injector = create_injector(&registry, ["app"], false)?;
    println!("  greeter: {}", injector.get::<String>("greeter")?);
    println!("  modules: {:?}", injector.modules());

    println!("\nUnknown module...");
    match create_injector(&registry, ["ng"], false) {
        Err(err) => {
            println!("  {err}");
            assert!(matches!(err.root_cause(), DiError::ModuleNotFound { .. }));
        }
        Ok(_) => unreachable!("ng is not registered"),
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
