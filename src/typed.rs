//! Typed tokens
//!
//! The container is keyed by string tokens. A [`Token<T>`] pairs a token name
//! with the type registered under it, so registration and resolution through
//! the same `Token` cannot disagree about the type.
//!
//! # Example
//!
//! ```rust
//! use module_injector::{create_injector, ModuleRegistry, Token};
//!
//! struct Config {
//!     url: String,
//! }
//!
//! const CONFIG: Token<Config> = Token::new("config");
//!
//! let registry = ModuleRegistry::new();
//! registry
//!     .module("app", Vec::<String>::new())?
//!     .value_of(&CONFIG, Config { url: "postgres://localhost".into() });
//!
//! let injector = create_injector(&registry, ["app"], false)?;
//! assert_eq!(injector.resolve(&CONFIG)?.url, "postgres://localhost");
//! # Ok::<(), module_injector::DiError>(())
//! ```

use crate::module::Module;
use crate::provide::Provide;
use crate::{Injector, Result};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A token name bound to the type registered under it.
pub struct Token<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> Token<T> {
    /// Create a token
    #[inline]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    /// The token name
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Token<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Token<T> {}

impl<T> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token")
            .field(&self.name)
            .field(&std::any::type_name::<T>())
            .finish()
    }
}

impl<T> fmt::Display for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl<T> AsRef<str> for Token<T> {
    fn as_ref(&self) -> &str {
        self.name
    }
}

impl Injector {
    /// Resolve a typed token.
    #[inline]
    pub fn resolve<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Result<Arc<T>> {
        self.get::<T>(token.name)
    }

    /// Resolve a typed token, returning None on any failure.
    #[inline]
    pub fn try_resolve<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Option<Arc<T>> {
        self.try_get::<T>(token.name)
    }

    /// Check if a typed token can be resolved
    #[inline]
    pub fn has_token<T>(&self, token: &Token<T>) -> bool {
        self.has(token.name)
    }
}

impl Provide {
    /// Register a value under a typed token
    pub fn value_of<T: Send + Sync + 'static>(&self, token: &Token<T>, value: T) -> Result<()> {
        self.value(token.name, value)
    }

    /// Register a constant under a typed token
    pub fn constant_of<T: Send + Sync + 'static>(&self, token: &Token<T>, value: T) -> Result<()> {
        self.constant(token.name, value)
    }
}

impl Module {
    /// Record a value under a typed token
    pub fn value_of<T: Send + Sync + 'static>(&self, token: &Token<T>, value: T) -> &Self {
        self.value(token.name, value)
    }

    /// Record a constant under a typed token
    pub fn constant_of<T: Send + Sync + 'static>(&self, token: &Token<T>, value: T) -> &Self {
        self.constant(token.name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_injector, DiError, Injectable, ModuleRegistry};

    struct Database {
        url: String,
    }

    struct Cache {
        size: usize,
    }

    const DATABASE: Token<Database> = Token::new("database");
    const CACHE: Token<Cache> = Token::new("cache");
    const LIMIT: Token<u32> = Token::new("limit");

    #[test]
    fn test_token_is_const_and_copy() {
        let copy = DATABASE;
        assert_eq!(copy.name(), "database");
        assert_eq!(DATABASE.to_string(), "database");
        assert!(format!("{CACHE:?}").contains("Cache"));
    }

    #[test]
    fn test_resolve_typed_tokens() {
        let registry = ModuleRegistry::new();
        registry
            .module("app", Vec::<String>::new())
            .unwrap()
            .value_of(&DATABASE, Database { url: "pg".into() })
            .constant_of(&LIMIT, 5)
            .factory(
                CACHE.name(),
                Injectable::new([LIMIT.name()], |args| {
                    Ok(Cache {
                        size: *args.get::<u32>(0)? as usize * 100,
                    })
                }),
            );

        let injector = create_injector(&registry, ["app"], false).unwrap();
        assert_eq!(injector.resolve(&DATABASE).unwrap().url, "pg");
        assert_eq!(injector.resolve(&CACHE).unwrap().size, 500);
        assert!(injector.has_token(&LIMIT));
        assert!(Arc::ptr_eq(
            &injector.resolve(&CACHE).unwrap(),
            &injector.try_resolve(&CACHE).unwrap()
        ));
    }

    #[test]
    fn test_token_of_wrong_type() {
        const WRONG: Token<String> = Token::new("limit");

        let registry = ModuleRegistry::new();
        registry.module("app", Vec::<String>::new()).unwrap().value_of(&LIMIT, 1);

        let injector = create_injector(&registry, ["app"], false).unwrap();
        assert!(matches!(
            injector.resolve(&WRONG),
            Err(DiError::TypeMismatch { token, .. }) if token == "limit"
        ));
        assert!(injector.try_resolve(&WRONG).is_none());
    }

    #[test]
    fn test_provide_typed_registration() {
        let registry = ModuleRegistry::new();
        let injector = create_injector(&registry, Vec::<String>::new(), false).unwrap();
        let provide = injector
            .provider_injector()
            .get::<Provide>(crate::injector::PROVIDE)
            .unwrap();

        provide.value_of(&DATABASE, Database { url: "late".into() }).unwrap();
        provide.constant_of(&LIMIT, 9).unwrap();

        assert_eq!(injector.resolve(&DATABASE).unwrap().url, "late");
        assert_eq!(*injector.provider_injector().resolve(&LIMIT).unwrap(), 9);
    }
}
