//! # module-injector - Module-Based Dependency Injection for Rust
//!
//! A string-token service container built from declared modules. Modules
//! record registrations; building a container replays them depth first and
//! resolves services lazily, exactly once per build.
//!
//! ## Features
//!
//! - **Modules** - Named bundles of registrations with `requires` composition
//! - **Two tiers** - Providers are configured before the services they produce exist
//! - **Lazy singletons** - Each service is created on first request and cached
//! - **Cycle detection** - Re-entrant resolution fails with the full token path
//! - **Decorators** - Wrap any service, in registration order
//! - **Strict mode** - Refuse annotations inferred from parameter names
//! - **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use module_injector::{create_injector, Injectable, ModuleRegistry};
//!
//! let registry = ModuleRegistry::new();
//!
//! registry
//!     .module("app", Vec::<String>::new())?
//!     .value("greeting", String::from("hi"))
//!     .factory(
//!         "shout",
//!         Injectable::new(["greeting"], |args| Ok(args.get::<String>(0)?.to_uppercase())),
//!     );
//!
//! let injector = create_injector(&registry, ["app"], false)?;
//! assert_eq!(*injector.get::<String>("shout")?, "HI");
//! # Ok::<(), module_injector::DiError>(())
//! ```
//!
//! ## Providers and Config Blocks
//!
//! A provider is registered under `<name>Provider` and is visible to config
//! blocks, which run while modules load. Services are not visible there; the
//! provider's `$get` produces the service on first request.
//!
//! ```rust
//! use module_injector::{create_injector, Injectable, ModuleRegistry, ProviderObject, ServiceProvider};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct ApiProvider {
//!     base: Mutex<String>,
//! }
//!
//! impl ServiceProvider for ApiProvider {
//!     fn factory(&self) -> Injectable {
//!         let base = self.base.lock().map(|b| b.clone()).unwrap_or_default();
//!         Injectable::new(Vec::<String>::new(), move |_| Ok(format!("{base}/v1")))
//!     }
//! }
//!
//! let registry = ModuleRegistry::new();
//! registry
//!     .module("app", Vec::<String>::new())?
//!     .provider("api", ProviderObject::new(ApiProvider::default()))
//!     .config(Injectable::new(["apiProvider"], |args| {
//!         if let Ok(mut base) = args.get::<ApiProvider>(0)?.base.lock() {
//!             *base = "https://example.com".into();
//!         }
//!         Ok(())
//!     }));
//!
//! let injector = create_injector(&registry, ["app"], false)?;
//! assert_eq!(*injector.get::<String>("api")?, "https://example.com/v1");
//! # Ok::<(), module_injector::DiError>(())
//! ```
//!
//! ## Composition
//!
//! ```rust
//! use module_injector::{create_injector, Injectable, ModuleRegistry};
//!
//! let registry = ModuleRegistry::new();
//! registry.module("storage", Vec::<String>::new())?.value("url", "postgres://localhost");
//! registry.module("app", ["storage"])?.factory(
//!     "repo",
//!     Injectable::new(["url"], |args| Ok(format!("repo@{}", args.get::<&str>(0)?))),
//! );
//!
//! // `storage` is loaded first because `app` requires it
//! let injector = create_injector(&registry, ["app"], false)?;
//! assert_eq!(*injector.get::<String>("repo")?, "repo@postgres://localhost");
//! # Ok::<(), module_injector::DiError>(())
//! ```

// Lets `::module_injector::..` paths emitted by the derive macros resolve in
// this crate's own tests.
extern crate self as module_injector;

pub mod annotate;
mod error;
mod factory;
mod injector;
mod loader;
#[cfg(feature = "logging")]
pub mod logging;
mod module;
mod provide;
mod provider;
mod storage;
pub mod typed;

pub use annotate::{Annotation, ANONYMOUS};
pub use error::*;
pub use factory::*;
pub use injector::{Injector, Phase, Tier, INJECTOR, PROVIDE};
pub use loader::{create_injector, InjectorBuilder, ModuleRef};
pub use module::{
    Module, ModuleRegistry, ANIMATE_PROVIDER, COMPILE_PROVIDER, CONTROLLER_PROVIDER, FILTER_PROVIDER,
    RESERVED_NAME,
};
pub use provide::Provide;
pub use provider::*;
pub use typed::Token;

#[cfg(feature = "derive")]
pub use module_injector_derive::{injectable, Inject};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        create_injector, Arguments, Construct, DiError, Injectable, Injector, InjectorBuilder, Locals,
        Module, ModuleRegistry, Provide, ProviderObject, Result, ServiceProvider, Token,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Database {
        url: String,
    }

    struct UserService {
        db: Arc<Database>,
        name: String,
    }

    fn registry() -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        registry
            .module("storage", Vec::<String>::new())
            .unwrap()
            .constant("url", String::from("postgres://localhost"))
            .factory(
                "database",
                Injectable::new(["url"], |args| {
                    Ok(Database {
                        url: args.cloned::<String>(0)?,
                    })
                }),
            );
        registry
            .module("users", ["storage"])
            .unwrap()
            .service(
                "users",
                Injectable::constructor(["database"], |args| {
                    Ok(UserService {
                        db: args.get(0)?,
                        name: "users".into(),
                    })
                }),
            );
        registry
    }

    #[test]
    fn test_service_graph() {
        let injector = create_injector(&registry(), ["users"], false).unwrap();

        let users = injector.get::<UserService>("users").unwrap();
        assert_eq!(users.name, "users");
        assert_eq!(users.db.url, "postgres://localhost");
        assert!(Arc::ptr_eq(&users.db, &injector.get::<Database>("database").unwrap()));
    }

    #[test]
    fn test_multiple_resolve_same_instance() {
        let injector = create_injector(&registry(), ["users"], false).unwrap();

        let db1 = injector.get::<Database>("database").unwrap();
        let db2 = injector.get::<Database>("database").unwrap();

        // Same Arc instance
        assert!(Arc::ptr_eq(&db1, &db2));
    }

    #[test]
    fn test_lazy_singleton() {
        static CREATED: AtomicU32 = AtomicU32::new(0);

        let registry = ModuleRegistry::new();
        registry.module("app", Vec::<String>::new()).unwrap().factory(
            "lazy",
            Injectable::new(Vec::<String>::new(), |_| {
                CREATED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let injector = create_injector(&registry, ["app"], false).unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst), 0);

        injector.get_any("lazy").unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);

        // Second resolve doesn't create new instance
        injector.get_any("lazy").unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_not_found_error() {
        let injector = create_injector(&registry(), ["storage"], false).unwrap();
        let err = injector.get_any("users").unwrap_err();
        assert_eq!(err.to_string(), "Unknown provider: usersProvider <- users");
    }

    #[test]
    fn test_handles_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Injector>();
        assert_send_sync::<ModuleRegistry>();
        assert_send_sync::<Module>();
        assert_send_sync::<Injectable>();
        assert_send_sync::<Provide>();
        assert_send_sync::<DiError>();
    }

    #[test]
    fn test_resolution_from_threads() {
        let injector = create_injector(&registry(), ["users"], false).unwrap();
        let first = injector.get::<UserService>("users").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let injector = injector.clone();
                std::thread::spawn(move || injector.get::<UserService>("users").unwrap())
            })
            .collect();

        for handle in handles {
            assert!(Arc::ptr_eq(&first, &handle.join().unwrap()));
        }
    }
}

#[cfg(all(test, feature = "derive"))]
mod derive_tests {
    use super::*;

    struct Database {
        url: String,
    }

    #[derive(Inject)]
    struct Explicit {
        #[inject(token = "database")]
        db: Arc<Database>,
        #[inject(token = "retries")]
        retries: u8,
        calls: u64,
    }

    #[derive(Inject)]
    struct Inferred {
        #[inject]
        database: Arc<Database>,
        #[inject(token = "raw")]
        raw: Instance,
    }

    #[injectable]
    fn describe(database: Arc<Database>, retries: u8) -> String {
        format!("{}x{retries}", database.url)
    }

    #[injectable]
    fn checked(retries: u8) -> Result<u8> {
        if retries == 0 {
            return Err(DiError::creation_failed("checked", "no retries"));
        }
        Ok(retries)
    }

    #[injectable]
    fn nothing() -> &'static str {
        "nothing"
    }

    fn registry(retries: u8) -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        registry
            .module("app", Vec::<String>::new())
            .unwrap()
            .value("database", Database { url: "pg".into() })
            .value("retries", retries)
            .value("raw", 1u8)
            .service_type::<Explicit>("explicit")
            .service_type::<Inferred>("inferred")
            .factory("describe", describe())
            .factory("checked", checked())
            .factory("nothing", nothing());
        registry
    }

    #[test]
    fn test_derive_explicit_tokens() {
        assert_eq!(
            <Explicit as Construct>::annotation(),
            Annotation::explicit(["database", "retries"])
        );

        let injector = create_injector(&registry(3), ["app"], false).unwrap();
        let service = injector.get::<Explicit>("explicit").unwrap();
        assert_eq!(service.db.url, "pg");
        assert_eq!(service.retries, 3);
        assert_eq!(service.calls, 0);
    }

    #[test]
    fn test_derive_inferred_tokens() {
        assert_eq!(
            <Inferred as Construct>::annotation(),
            Annotation::inferred(["database", "raw"])
        );

        let injector = create_injector(&registry(3), ["app"], false).unwrap();
        let service = injector.get::<Inferred>("inferred").unwrap();
        assert!(Arc::ptr_eq(&service.database, &injector.get::<Database>("database").unwrap()));
        assert!(service.raw.is::<u8>());

        let strict = create_injector(&registry(3), ["app"], true).unwrap();
        assert!(matches!(
            strict.get_any("inferred"),
            Err(DiError::StrictModeViolation { .. })
        ));
        assert!(strict.get::<Explicit>("explicit").is_ok());
    }

    #[test]
    fn test_injectable_functions() {
        let injectable = describe();
        assert_eq!(injectable.name(), Some("describe"));
        assert_eq!(injectable.annotation(), &Annotation::inferred(["database", "retries"]));

        let injector = create_injector(&registry(2), ["app"], false).unwrap();
        assert_eq!(*injector.get::<String>("describe").unwrap(), "pgx2");
        assert_eq!(*injector.get::<u8>("checked").unwrap(), 2);
        assert_eq!(*injector.get::<&str>("nothing").unwrap(), "nothing");
    }

    #[test]
    fn test_injectable_result_is_propagated() {
        let injector = create_injector(&registry(0), ["app"], false).unwrap();
        assert!(matches!(
            injector.get_any("checked"),
            Err(DiError::CreationFailed { name, .. }) if name == "checked"
        ));
    }

    #[test]
    fn test_parameterless_injectable_is_strict_safe() {
        let injector = create_injector(&registry(1), ["app"], true).unwrap();
        assert_eq!(*injector.get::<&str>("nothing").unwrap(), "nothing");
        assert!(matches!(
            injector.get_any("describe"),
            Err(DiError::StrictModeViolation { name }) if name == "describe"
        ));
    }
}
