//! Example demonstrating the container's tracing events
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use module_injector::{create_injector, Injectable, ModuleRegistry};

struct Database {
    url: String,
}

struct UserService {
    db: std::sync::Arc<Database>,
}

fn main() -> module_injector::Result<()> {
    // Container events only, down to trace level
    #[cfg(feature = "logging")]
    {
        module_injector::logging::builder().trace().injector_only().try_init();
    }

    println!("=== Module Injector Logging Demo ===\n");

    // Logs: "Registering module"
    let registry = ModuleRegistry::new();
    registry
        .module("storage", Vec::<String>::new())?
        .constant("url", "postgres://localhost/mydb")
        .factory(
            "database",
            Injectable::new(["url"], |args| {
                Ok(Database {
                    url: args.get::<&str>(0)?.to_string(),
                })
            }),
        );
    registry
        .module("app", ["storage"])?
        .service(
            "users",
            Injectable::constructor(["database"], |args| Ok(UserService { db: args.get(0)? })),
        )
        .run(Injectable::new(Vec::<String>::new(), |_| {
            println!("  [App] Run block invoked");
            Ok(())
        }));

    // Logs: "Creating injector", "Loading module", "Registering provider",
    // "Replaying queued call", "Modules loaded"
    let injector = create_injector(&registry, ["app"], false)?;

    // Logs: "Instantiating service from provider $get"
    let users = injector.get::<UserService>("users")?;
    println!("  [App] users connected to {}", users.db.url);

    // Logs: "Resolved from cache"
    let _again = injector.get::<UserService>("users")?;

    // Logs: "Unknown provider"
    let missing = injector.get_any("mailer");
    assert!(missing.is_err());

    // Logs: "Circular dependency detected"
    registry
        .module("cyclic", Vec::<String>::new())?
        .factory("a", Injectable::new(["b"], |_| Ok(())))
        .factory("b", Injectable::new(["a"], |_| Ok(())));
    injector.load_new_modules(["cyclic"])?;
    if let Err(err) = injector.get_any("a") {
        println!("  [App] {err}");
    }

    println!("\n=== Demo Complete ===");
    println!("Check the log output above to see structured logging in action!");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
    Ok(())
}
