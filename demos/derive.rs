//! Example demonstrating `#[derive(Inject)]` and `#[injectable]`
//!
//! Run with:
//!   cargo run --example derive --features derive

use module_injector::{create_injector, injectable, Inject, ModuleRegistry};
use std::sync::Arc;

// Dependencies
struct Database {
    url: String,
}

struct Cache {
    size: usize,
}

// Service with injected dependencies; tokens are explicit, so strict
// injectors accept it
#[derive(Inject)]
struct UserService {
    #[inject(token = "database")]
    db: Arc<Database>,
    #[inject(token = "cache")]
    cache: Arc<Cache>,
    #[inject(token = "region")]
    region: String,
    // Non-injected field uses Default
    request_count: u64,
}

impl UserService {
    fn describe(&self) -> String {
        format!(
            "UserService connected to {} in {} with cache size {} (requests: {})",
            self.db.url, self.region, self.cache.size, self.request_count
        )
    }
}

// Tokens inferred from field names
#[derive(Inject)]
struct ApiController {
    #[inject]
    users: Arc<UserService>,
}

// Tokens inferred from parameter names: ["database", "region"]
#[injectable]
fn banner(database: Arc<Database>, region: String) -> String {
    format!("{} ({region})", database.url)
}

fn main() -> module_injector::Result<()> {
    println!("=== Module Injector Derive Macro Demo ===\n");

    let registry = ModuleRegistry::new();
    registry
        .module("app", Vec::<String>::new())?
        .value("database", Database {
            url: "postgres://localhost:5432/myapp".into(),
        })
        .value("cache", Cache { size: 1024 })
        .constant("region", String::from("eu-west-1"))
        .service_type::<UserService>("users")
        .service_type::<ApiController>("api")
        .factory("banner", banner());

    let injector = create_injector(&registry, ["app"], false)?;

    println!("Resolving UserService...");
    let users = injector.get::<UserService>("users")?;
    println!("  {}", users.describe());

    println!("Resolving ApiController...");
    let api = injector.get::<ApiController>("api")?;
    println!("  shares UserService: {}", Arc::ptr_eq(&api.users, &users));

    println!("Resolving banner...");
    println!("  {}", injector.get::<String>("banner")?);
    println!();

    println!("Strict mode refuses inferred tokens...");
    let strict = create_injector(&registry, ["app"], true)?;
    println!("  users: {}", strict.get::<UserService>("users").is_ok());
    if let Err(err) = strict.get_any("api") {
        println!("  api: {err}");
    }
    if let Err(err) = strict.get_any("banner") {
        println!("  banner: {err}");
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
