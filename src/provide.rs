//! The `$provide` registration API
//!
//! [`Provide`] writes into the caches of one container build. Modules never
//! call it directly; they record calls that the loader replays against the
//! `$provide` resolved from the provider tier. Config blocks may request
//! `$provide` to register more services themselves.

use crate::factory::{instance, is_undefined, Instance};
use crate::injector::{downcast_handle, Tier, INJECTOR};
use crate::module::RESERVED_NAME;
use crate::provider::{provider_token, DecoratedProvider, ProviderDef, ProviderObject};
use crate::{DiError, Injectable, Injector, Result};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// A recorded `$provide` call, replayed when its module loads.
///
/// Every verb except `Decorator` carries a list of entries so one recorded
/// call can register many names.
#[derive(Clone, Debug)]
pub(crate) enum ProvideCall {
    Provider(Vec<(String, ProviderDef)>),
    Factory(Vec<(String, Injectable)>),
    Service(Vec<(String, Injectable)>),
    Value(Vec<(String, Instance)>),
    Constant(Vec<(String, Instance)>),
    Decorator(String, Injectable),
}

impl ProvideCall {
    /// Method name, as shown in logs
    pub(crate) fn method(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider",
            Self::Factory(_) => "factory",
            Self::Service(_) => "service",
            Self::Value(_) => "value",
            Self::Constant(_) => "constant",
            Self::Decorator(..) => "decorator",
        }
    }

    /// Stamp the recording module on every injectable in the call
    pub(crate) fn stamp(&self, module: &str) {
        match self {
            Self::Provider(entries) => {
                for (_, def) in entries {
                    if let ProviderDef::Constructor(ctor) = def {
                        ctor.set_module_name(module);
                    }
                }
            }
            Self::Factory(entries) | Self::Service(entries) => {
                for (_, f) in entries {
                    f.set_module_name(module);
                }
            }
            Self::Decorator(_, f) => f.set_module_name(module),
            Self::Value(_) | Self::Constant(_) => {}
        }
    }
}

fn check_name(name: &str, context: &'static str) -> Result<()> {
    if name == RESERVED_NAME {
        return Err(DiError::ReservedName { context });
    }
    Ok(())
}

/// Registration API of one container build, resolvable as `$provide`.
pub struct Provide {
    /// Provider tier of the build
    injector: Injector,
}

impl Provide {
    pub(crate) fn new(injector: Injector) -> Self {
        debug_assert_eq!(injector.tier(), Tier::Provider);
        Self { injector }
    }

    /// Register a provider under `<name>Provider`.
    ///
    /// A constructor is instantiated through the provider injector first and
    /// must produce a [`ProviderObject`].
    pub fn provider(&self, name: &str, def: impl Into<ProviderDef>) -> Result<()> {
        check_name(name, "service")?;

        let object = match def.into() {
            ProviderDef::Object(object) => object,
            ProviderDef::Constructor(ctor) => {
                let made = self.injector.instantiate(&ctor, None, Some(name))?;
                downcast_handle::<ProviderObject>(made, name)
                    .map(|object| (*object).clone())
                    .map_err(|_| DiError::missing_get(name))?
            }
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "module_injector",
            service = name,
            "Registering provider"
        );

        let token = provider_token(name);
        let core = self.injector.core();
        core.provider_cache.store(&token, Arc::clone(object.instance()));
        core.providers.insert(token, Arc::clone(object.provider()));
        Ok(())
    }

    /// Register a factory; `undefined` results are rejected.
    pub fn factory(&self, name: &str, factory: Injectable) -> Result<()> {
        self.provider(name, ProviderObject::from_get(enforce_return_value(name, factory)))
    }

    /// Register a factory without the `undefined` check.
    pub fn factory_unchecked(&self, name: &str, factory: Injectable) -> Result<()> {
        self.provider(name, ProviderObject::from_get(factory))
    }

    /// Register a service built from `constructor` by constructor injection.
    pub fn service(&self, name: &str, constructor: Injectable) -> Result<()> {
        let label = name.to_string();
        self.factory(
            name,
            Injectable::erased([INJECTOR], move |args| {
                args.get::<Injector>(0)?.instantiate(&constructor, None, Some(&label))
            }),
        )
    }

    /// Register a fixed value.
    pub fn value<T: Send + Sync + 'static>(&self, name: &str, value: T) -> Result<()> {
        self.value_instance(name, instance(value))
    }

    /// Register a fixed, already-erased value (which may be `undefined`).
    pub fn value_instance(&self, name: &str, value: Instance) -> Result<()> {
        self.factory_unchecked(name, Injectable::value(value))
    }

    /// Register a constant in both tiers.
    ///
    /// Constants bypass `$get`, are visible to provider constructors, and
    /// cannot be decorated.
    pub fn constant<T: Send + Sync + 'static>(&self, name: &str, value: T) -> Result<()> {
        self.constant_instance(name, instance(value))
    }

    /// Register an already-erased constant in both tiers.
    pub fn constant_instance(&self, name: &str, value: Instance) -> Result<()> {
        check_name(name, "constant")?;

        #[cfg(feature = "logging")]
        debug!(
            target: "module_injector",
            constant = name,
            "Registering constant"
        );

        let core = self.injector.core();
        core.provider_cache.store(name, Arc::clone(&value));
        core.instance_cache.store(name, value);
        Ok(())
    }

    /// Wrap the `$get` of an already registered service.
    ///
    /// The decorator is invoked with the previous result as `$delegate`;
    /// what it returns becomes the service. Decorating twice wraps twice.
    pub fn decorator(&self, name: &str, decorator: Injectable) -> Result<()> {
        let token = provider_token(name);
        let receiver = self.injector.get_any(&token)?;
        let core = self.injector.core();
        let original = core
            .providers
            .get(&token)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| DiError::missing_get(name))?;

        #[cfg(feature = "logging")]
        debug!(
            target: "module_injector",
            service = name,
            "Decorating service"
        );

        core.providers.insert(
            token,
            Arc::new(DecoratedProvider {
                original,
                receiver,
                decorator,
            }),
        );
        Ok(())
    }

    // =========================================================================
    // Many names per call
    // =========================================================================

    /// Register several providers
    pub fn providers<I, S, D>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, D)>,
        S: AsRef<str>,
        D: Into<ProviderDef>,
    {
        entries
            .into_iter()
            .try_for_each(|(name, def)| self.provider(name.as_ref(), def))
    }

    /// Register several factories
    pub fn factories<I, S>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Injectable)>,
        S: AsRef<str>,
    {
        entries
            .into_iter()
            .try_for_each(|(name, f)| self.factory(name.as_ref(), f))
    }

    /// Register several services
    pub fn services<I, S>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Injectable)>,
        S: AsRef<str>,
    {
        entries
            .into_iter()
            .try_for_each(|(name, ctor)| self.service(name.as_ref(), ctor))
    }

    /// Register several erased values
    pub fn values<I, S>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Instance)>,
        S: AsRef<str>,
    {
        entries
            .into_iter()
            .try_for_each(|(name, v)| self.value_instance(name.as_ref(), v))
    }

    /// Register several erased constants
    pub fn constants<I, S>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Instance)>,
        S: AsRef<str>,
    {
        entries
            .into_iter()
            .try_for_each(|(name, v)| self.constant_instance(name.as_ref(), v))
    }

    /// Replay a recorded call
    pub(crate) fn apply(&self, call: ProvideCall) -> Result<()> {
        match call {
            ProvideCall::Provider(entries) => self.providers(entries),
            ProvideCall::Factory(entries) => self.factories(entries),
            ProvideCall::Service(entries) => self.services(entries),
            ProvideCall::Value(entries) => self.values(entries),
            ProvideCall::Constant(entries) => self.constants(entries),
            ProvideCall::Decorator(name, decorator) => self.decorator(&name, decorator),
        }
    }
}

impl std::fmt::Debug for Provide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provide").finish_non_exhaustive()
    }
}

/// Wrap `factory` so an `undefined` result fails the resolution.
fn enforce_return_value(name: &str, factory: Injectable) -> Injectable {
    let name = name.to_string();
    Injectable::erased([INJECTOR], move |args| {
        let injector = args.get::<Injector>(0)?;
        let result = injector.invoke_with(&factory, args.receiver_instance(), None, Some(&name))?;
        if is_undefined(&result) {
            return Err(DiError::undefined_result(name.as_str()));
        }
        Ok(result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::undefined;
    use crate::injector::PROVIDE;
    use crate::{create_injector, ModuleRegistry, ServiceProvider};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn build() -> (Injector, Arc<Provide>) {
        let registry = ModuleRegistry::new();
        let injector = create_injector(&registry, Vec::<String>::new(), false).unwrap();
        let provide = injector.provider_injector().get::<Provide>(PROVIDE).unwrap();
        (injector, provide)
    }

    #[derive(Default)]
    struct PrefixProvider {
        prefix: Mutex<String>,
    }

    impl ServiceProvider for PrefixProvider {
        fn factory(&self) -> Injectable {
            let prefix = self.prefix.lock().map(|p| p.clone()).unwrap_or_default();
            Injectable::new(["name"], move |args| Ok(format!("{prefix}{}", args.get::<&str>(0)?)))
        }
    }

    #[test]
    fn test_provider_object_get_runs_through_instance_tier() {
        let (injector, provide) = build();
        provide.value("name", "world").unwrap();
        provide
            .provider("greeting", ProviderObject::new(PrefixProvider::default()))
            .unwrap();

        let provider = injector
            .provider_injector()
            .get::<PrefixProvider>("greetingProvider")
            .unwrap();
        *provider.prefix.lock().unwrap() = "hello ".into();

        assert_eq!(*injector.get::<String>("greeting").unwrap(), "hello world");
    }

    #[test]
    fn test_provider_constructor_sees_constants() {
        let (injector, provide) = build();
        provide.constant("prefix", String::from(">> ")).unwrap();
        provide.value("name", "x").unwrap();

        let ctor = Injectable::constructor(["prefix"], |args| {
            let prefix = args.cloned::<String>(0)?;
            Ok(ProviderObject::new(PrefixProvider {
                prefix: Mutex::new(prefix),
            }))
        });
        provide.provider("tagged", ctor).unwrap();

        assert_eq!(*injector.get::<String>("tagged").unwrap(), ">> x");
    }

    #[test]
    fn test_provider_constructor_must_yield_provider() {
        let (_, provide) = build();
        let ctor = Injectable::constructor(Vec::<String>::new(), |_| Ok(42u8));
        assert!(matches!(
            provide.provider("broken", ctor),
            Err(DiError::MissingGetFactory { name }) if name == "broken"
        ));
    }

    #[test]
    fn test_provider_constructor_unknown_dependency() {
        let (_, provide) = build();
        let ctor = Injectable::constructor(["nowhere"], |_| Ok(()));
        assert!(matches!(
            provide.provider("p", ctor),
            Err(DiError::UnknownProvider { path }) if path == "nowhere <- p"
        ));
    }

    #[test]
    fn test_factory_rejects_undefined() {
        let (injector, provide) = build();
        provide
            .factory("empty", Injectable::maybe(Vec::<String>::new(), |_| Ok(None::<u8>)))
            .unwrap();
        assert!(matches!(
            injector.get_any("empty"),
            Err(DiError::UndefinedFactoryResult { name }) if name == "empty"
        ));
        assert!(injector.core().instance_cache.ready("empty").is_none());
    }

    #[test]
    fn test_value_may_be_undefined() {
        let (injector, provide) = build();
        provide.value_instance("nothing", undefined()).unwrap();
        assert!(is_undefined(&injector.get_any("nothing").unwrap()));
    }

    #[test]
    fn test_service_constructs_once() {
        static BUILT: AtomicU32 = AtomicU32::new(0);

        struct Clock {
            zone: Arc<&'static str>,
        }

        let (injector, provide) = build();
        provide.value("zone", "UTC").unwrap();
        provide
            .service(
                "clock",
                Injectable::constructor(["zone"], |args| {
                    BUILT.fetch_add(1, Ordering::SeqCst);
                    Ok(Clock { zone: args.get(0)? })
                }),
            )
            .unwrap();

        let a = injector.get::<Clock>("clock").unwrap();
        let b = injector.get::<Clock>("clock").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a.zone, "UTC");
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_constant_in_both_tiers() {
        let (injector, provide) = build();
        provide.constant("limit", 10usize).unwrap();
        assert_eq!(*injector.get::<usize>("limit").unwrap(), 10);
        assert_eq!(*injector.provider_injector().get::<usize>("limit").unwrap(), 10);
    }

    #[test]
    fn test_decorators_compose_in_order() {
        let (injector, provide) = build();
        provide.value("x", String::from("base")).unwrap();

        let append = |suffix: &'static str| {
            Injectable::new(["$delegate"], move |args| {
                Ok(format!("{}{suffix}", args.get::<String>(0)?))
            })
        };
        provide.decorator("x", append("1")).unwrap();
        provide.decorator("x", append("2")).unwrap();

        assert_eq!(*injector.get::<String>("x").unwrap(), "base12");
    }

    #[test]
    fn test_decorator_can_use_other_services() {
        let (injector, provide) = build();
        provide.value("x", 2u32).unwrap();
        provide.value("factor", 21u32).unwrap();
        provide
            .decorator(
                "x",
                Injectable::new(["$delegate", "factor"], |args| {
                    Ok(*args.get::<u32>(0)? * *args.get::<u32>(1)?)
                }),
            )
            .unwrap();
        assert_eq!(*injector.get::<u32>("x").unwrap(), 42);
    }

    #[test]
    fn test_decorating_unknown_service_fails() {
        let (_, provide) = build();
        assert!(matches!(
            provide.decorator("ghost", Injectable::value(instance(()))),
            Err(DiError::UnknownProvider { .. })
        ));
    }

    #[test]
    fn test_constants_cannot_be_decorated() {
        let (_, provide) = build();
        provide.constant("c", 1u8).unwrap();
        assert!(provide.decorator("c", Injectable::value(instance(()))).is_err());
    }

    #[test]
    fn test_reserved_names() {
        let (_, provide) = build();
        assert!(matches!(
            provide.value(RESERVED_NAME, 1u8),
            Err(DiError::ReservedName { context: "service" })
        ));
        assert!(matches!(
            provide.constant(RESERVED_NAME, 1u8),
            Err(DiError::ReservedName { context: "constant" })
        ));
    }

    #[test]
    fn test_many_names_per_call() {
        let (injector, provide) = build();
        provide
            .values([("a", instance(1u8)), ("b", instance(2u8))])
            .unwrap();
        provide
            .factories([(
                "sum",
                Injectable::new(["a", "b"], |args| Ok(*args.get::<u8>(0)? + *args.get::<u8>(1)?)),
            )])
            .unwrap();
        provide.constants([("c", instance(3u8))]).unwrap();

        assert_eq!(*injector.get::<u8>("sum").unwrap(), 3);
        assert_eq!(*injector.get::<u8>("c").unwrap(), 3);
    }

    #[test]
    fn test_apply_dispatches_by_verb() {
        let (injector, provide) = build();
        let call = ProvideCall::Value(vec![("v".into(), instance(9u8))]);
        assert_eq!(call.method(), "value");
        provide.apply(call).unwrap();
        assert_eq!(*injector.get::<u8>("v").unwrap(), 9);
    }
}
