//! Provider traits and provider records
//!
//! A provider is the unit registered with the container: an object exposing
//! a `$get` factory. The provider tier caches provider objects under
//! `<name>Provider`; the instance tier calls their `$get` once per token.

use crate::factory::{Instance, Locals};
use crate::{DiError, Injectable, Injector, Result};
use std::sync::Arc;

/// Suffix appended to a service name to form its provider token
pub const PROVIDER_SUFFIX: &str = "Provider";

/// Local under which decorators receive the decorated instance
pub const DELEGATE: &str = "$delegate";

/// Provider token for a service name (`greeting` -> `greetingProvider`)
#[inline]
pub fn provider_token(name: &str) -> String {
    format!("{name}{PROVIDER_SUFFIX}")
}

/// An object that can produce a service.
///
/// Config blocks receive the provider object itself (downcast to its
/// concrete type), so configuration state should use interior mutability.
///
/// # Examples
///
/// ```rust
/// use module_injector::{Injectable, ServiceProvider};
/// use std::sync::{Arc, Mutex};
///
/// #[derive(Default)]
/// struct GreeterProvider {
///     salutation: Arc<Mutex<String>>,
/// }
///
/// impl ServiceProvider for GreeterProvider {
///     fn factory(&self) -> Injectable {
///         let salutation = Arc::clone(&self.salutation);
///         Injectable::new(Vec::<String>::new(), move |_| {
///             Ok(salutation.lock().map(|s| s.clone()).unwrap_or_default())
///         })
///     }
/// }
/// ```
pub trait ServiceProvider: Send + Sync + 'static {
    /// The `$get` factory, invoked through the instance injector
    fn factory(&self) -> Injectable;

    /// Accept a forwarded recorder call such as `filter(name, definition)`.
    fn register(&self, method: &str, name: &str, definition: Injectable) -> Result<()> {
        let _ = (name, definition);
        Err(DiError::NotARegistrar {
            provider: std::any::type_name::<Self>().to_string(),
            method: method.to_string(),
        })
    }
}

/// A provider as the container stores it.
///
/// Holds the same object twice: erased (what `<name>Provider` resolves to)
/// and as a [`ServiceProvider`] (what `$get` is called on).
#[derive(Clone)]
pub struct ProviderObject {
    instance: Instance,
    provider: Arc<dyn ServiceProvider>,
}

impl ProviderObject {
    /// Wrap a provider value
    pub fn new<P: ServiceProvider>(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    /// Wrap a shared provider
    pub fn from_arc<P: ServiceProvider>(provider: Arc<P>) -> Self {
        Self {
            instance: Arc::clone(&provider) as Instance,
            provider,
        }
    }

    /// A provider whose only member is the given `$get`
    pub fn from_get(get: Injectable) -> Self {
        Self::new(FactoryProvider { get })
    }

    /// The erased provider object
    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The provider behind its trait
    #[inline]
    pub fn provider(&self) -> &Arc<dyn ServiceProvider> {
        &self.provider
    }
}

impl std::fmt::Debug for ProviderObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderObject").finish_non_exhaustive()
    }
}

/// What `provider(name, ..)` accepts.
#[derive(Clone, Debug)]
pub enum ProviderDef {
    /// A ready provider object
    Object(ProviderObject),
    /// Instantiated through the provider injector; must yield a [`ProviderObject`]
    Constructor(Injectable),
}

impl From<ProviderObject> for ProviderDef {
    fn from(object: ProviderObject) -> Self {
        Self::Object(object)
    }
}

impl From<Injectable> for ProviderDef {
    fn from(constructor: Injectable) -> Self {
        Self::Constructor(constructor)
    }
}

/// The `{ $get: fn }` literal behind `factory`, `service` and `value`.
pub(crate) struct FactoryProvider {
    get: Injectable,
}

impl ServiceProvider for FactoryProvider {
    #[inline]
    fn factory(&self) -> Injectable {
        self.get.clone()
    }
}

/// A provider whose `$get` passes the original result through a decorator.
pub(crate) struct DecoratedProvider {
    pub(crate) original: Arc<dyn ServiceProvider>,
    /// Receiver for the original `$get`
    pub(crate) receiver: Instance,
    pub(crate) decorator: Injectable,
}

impl ServiceProvider for DecoratedProvider {
    fn factory(&self) -> Injectable {
        let original = self.original.factory();
        let receiver = Arc::clone(&self.receiver);
        let decorator = self.decorator.clone();

        Injectable::erased([crate::INJECTOR], move |args| {
            let injector = args.get::<Injector>(0)?;
            let delegate = injector.invoke_with(&original, Some(Arc::clone(&receiver)), None, None)?;
            let locals = Locals::new().with_instance(DELEGATE, delegate);
            injector.invoke_with(&decorator, None, Some(&locals), None)
        })
    }

    fn register(&self, method: &str, name: &str, definition: Injectable) -> Result<()> {
        self.original.register(method, name, definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::instance;

    struct Plain;

    impl ServiceProvider for Plain {
        fn factory(&self) -> Injectable {
            Injectable::value(instance("plain"))
        }
    }

    #[test]
    fn test_provider_token() {
        assert_eq!(provider_token("greeting"), "greetingProvider");
    }

    #[test]
    fn test_object_shares_one_allocation() {
        let object = ProviderObject::new(Plain);
        assert!(object.instance().is::<Plain>());
        assert_eq!(
            Arc::as_ptr(object.instance()) as *const () as usize,
            Arc::as_ptr(object.provider()) as *const () as usize
        );
    }

    #[test]
    fn test_register_defaults_to_error() {
        let err = Plain
            .register("filter", "upper", Injectable::value(instance(())))
            .unwrap_err();
        assert!(matches!(err, DiError::NotARegistrar { ref method, .. } if method == "filter"));
    }

    #[test]
    fn test_from_get_returns_the_given_factory() {
        let get = Injectable::value(instance(5u8));
        let object = ProviderObject::from_get(get.clone());
        assert_eq!(object.provider().factory().id(), get.id());
        assert!(matches!(ProviderDef::from(object), ProviderDef::Object(_)));
    }
}
