//! The two-tier injector
//!
//! One container build owns two caches. The *provider* tier holds provider
//! objects (`<name>Provider`), constants, and is what config blocks run
//! against. The *instance* tier holds service singletons; on a miss it looks
//! up `<name>Provider` in the provider tier and invokes that provider's
//! `$get` through itself, so services can depend on other services.
//!
//! Both tiers share one resolution path. A token being resolved is marked
//! `Instantiating` in its cache; meeting the marker again means a cycle.
//!
//! Cached values are read without locking. A cache miss takes the build's
//! reentrant resolution lock, so one thread at a time builds uncached values
//! and the path only ever holds that thread's tokens. A thread that misses on
//! a token another thread is building waits and then reads the finished value.

use crate::annotate;
use crate::factory::{Arguments, Instance, InvokeKind, Locals};
use crate::module::{Module, ModuleRegistry};
use crate::provide::Provide;
use crate::provider::{provider_token, ServiceProvider};
use crate::storage::{Slot, TokenCache};
use crate::{DiError, Injectable, Result};
use ahash::{AHashSet, RandomState};
use dashmap::DashMap;
use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Token under which each tier resolves its own injector
pub const INJECTOR: &str = "$injector";

/// Token under which the provider tier resolves the registration API
pub const PROVIDE: &str = "$provide";

/// Which cache an injector handle reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Provider objects and constants; used while modules load
    Provider,
    /// Service singletons; used at run time
    Instance,
}

/// Build state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Modules are being loaded; only the provider tier is meaningful
    Loading,
    /// Every requested module is loaded; services can be resolved
    Loaded,
}

/// Identity of an entry in the loaded-module set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ModuleKey {
    Name(String),
    Inline(usize),
}

/// State shared by both tiers of one container build.
pub(crate) struct Core {
    pub(crate) registry: ModuleRegistry,
    pub(crate) provider_cache: TokenCache,
    pub(crate) instance_cache: TokenCache,
    /// `$get` side of every provider in `provider_cache`, by provider token
    pub(crate) providers: DashMap<String, Arc<dyn ServiceProvider>, RandomState>,
    /// Tokens currently being resolved by the lock holder, oldest first
    resolving: ReentrantMutex<RefCell<Vec<String>>>,
    loaded: Mutex<AHashSet<ModuleKey>>,
    pub(crate) modules: DashMap<String, Arc<Module>, RandomState>,
    strict_di: bool,
    phase: AtomicU8,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Core {
    pub(crate) fn new(registry: ModuleRegistry, strict_di: bool) -> Self {
        Self {
            registry,
            provider_cache: TokenCache::new(),
            instance_cache: TokenCache::new(),
            providers: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            resolving: ReentrantMutex::new(RefCell::new(Vec::new())),
            loaded: Mutex::new(AHashSet::new()),
            modules: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            strict_di,
            phase: AtomicU8::new(Phase::Loading as u8),
        }
    }

    /// Record `key` as loaded; false if it already was.
    pub(crate) fn mark_loaded(&self, key: ModuleKey) -> bool {
        lock(&self.loaded).insert(key)
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn phase(&self) -> Phase {
        if self.phase.load(Ordering::Acquire) == Phase::Loaded as u8 {
            Phase::Loaded
        } else {
            Phase::Loading
        }
    }

    /// Hold the resolution lock; reentrant on the holding thread.
    pub(crate) fn resolving(&self) -> ReentrantMutexGuard<'_, RefCell<Vec<String>>> {
        self.resolving.lock()
    }

    fn push_path(&self, token: &str) {
        self.resolving().borrow_mut().push(token.to_string());
    }

    fn pop_path(&self) {
        self.resolving().borrow_mut().pop();
    }

    /// `token <- newest <- ... <- oldest`
    fn cycle_path(&self, token: &str) -> String {
        let guard = self.resolving();
        let path = guard.borrow();
        std::iter::once(token)
            .chain(path.iter().rev().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" <- ")
    }

    /// `newest <- ... <- oldest [<- caller]`
    fn unknown_path(&self, caller: Option<&str>) -> String {
        let guard = self.resolving();
        let path = guard.borrow();
        let mut parts: Vec<&str> = path.iter().rev().map(String::as_str).collect();
        if let Some(caller) = caller {
            if path.first().map(String::as_str) != Some(caller) {
                parts.push(caller);
            }
        }
        parts.join(" <- ")
    }
}

/// A handle on one tier of a container build.
///
/// Handles are cheap to clone; clones share the build. The handle returned
/// by [`create_injector`](crate::create_injector) is the instance tier.
///
/// # Examples
///
/// ```rust
/// use module_injector::{create_injector, Injectable, ModuleRegistry};
///
/// let registry = ModuleRegistry::new();
/// registry
///     .module("app", Vec::<String>::new())?
///     .value("greeting", String::from("hi"))
///     .factory(
///         "shout",
///         Injectable::new(["greeting"], |args| Ok(args.get::<String>(0)?.to_uppercase())),
///     );
///
/// let injector = create_injector(&registry, ["app"], false)?;
/// assert_eq!(*injector.get::<String>("shout")?, "HI");
/// # Ok::<(), module_injector::DiError>(())
/// ```
#[derive(Clone)]
pub struct Injector {
    core: Arc<Core>,
    tier: Tier,
}

impl Injector {
    pub(crate) fn from_core(core: Arc<Core>, tier: Tier) -> Self {
        Self { core, tier }
    }

    pub(crate) fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// The provider tier of this build
    #[inline]
    pub fn provider_injector(&self) -> Injector {
        Self::from_core(Arc::clone(&self.core), Tier::Provider)
    }

    /// The instance tier of this build
    #[inline]
    pub fn instance_injector(&self) -> Injector {
        Self::from_core(Arc::clone(&self.core), Tier::Instance)
    }

    /// Which tier this handle resolves against
    #[inline]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Whether parameter-name inference is refused
    #[inline]
    pub fn strict_di(&self) -> bool {
        self.core.strict_di
    }

    /// Current build phase
    #[inline]
    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    /// The registry modules are loaded from
    #[inline]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.core.registry
    }

    /// A named module loaded into this build
    pub fn module(&self, name: &str) -> Option<Arc<Module>> {
        self.core.modules.get(name).map(|m| Arc::clone(m.value()))
    }

    /// Names of every module loaded into this build
    pub fn modules(&self) -> Vec<String> {
        self.core.modules.iter().map(|m| m.key().clone()).collect()
    }

    /// Whether two handles belong to the same build
    #[inline]
    pub fn same_build(&self, other: &Injector) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    fn cache(&self) -> &TokenCache {
        match self.tier {
            Tier::Provider => &self.core.provider_cache,
            Tier::Instance => &self.core.instance_cache,
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a token to its erased value.
    #[inline]
    pub fn get_any(&self, token: &str) -> Result<Instance> {
        self.get_from(token, None)
    }

    /// Resolve a token on behalf of `caller`.
    ///
    /// The caller is appended to the path of an unknown-provider error.
    pub fn get_from(&self, token: &str, caller: Option<&str>) -> Result<Instance> {
        if let Some(builtin) = self.builtin(token) {
            return Ok(builtin);
        }

        let cache = self.cache();
        if let Some(Slot::Ready(value)) = cache.lookup(token) {
            #[cfg(feature = "logging")]
            trace!(
                target: "module_injector",
                token = token,
                tier = ?self.tier,
                "Resolved from cache"
            );
            return Ok(value);
        }

        // Only the lock holder writes markers, so a marker seen here is ours
        let _resolving = self.core.resolving();
        match cache.lookup(token) {
            // Built by another thread while this one waited
            Some(Slot::Ready(value)) => return Ok(value),
            Some(Slot::Instantiating) => {
                let path = self.core.cycle_path(token);

                #[cfg(feature = "logging")]
                debug!(
                    target: "module_injector",
                    token = token,
                    path = %path,
                    "Circular dependency detected"
                );

                return Err(DiError::circular(path));
            }
            None => {}
        }

        self.core.push_path(token);
        cache.begin(token);

        let result = self.on_miss(token, caller);
        match &result {
            Ok(value) => cache.store(token, Arc::clone(value)),
            Err(_) => {
                cache.abandon(token);
            }
        }

        self.core.pop_path();
        result
    }

    /// Resolve a token and downcast it.
    pub fn get<T: Send + Sync + 'static>(&self, token: &str) -> Result<Arc<T>> {
        self.get_any(token)?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(token))
    }

    /// Try to resolve, returning None on any failure.
    #[inline]
    pub fn try_get<T: Send + Sync + 'static>(&self, token: &str) -> Option<Arc<T>> {
        self.get::<T>(token).ok()
    }

    /// Check if `token` can be resolved from this tier without a new provider.
    ///
    /// True if `<token>Provider` is registered or this tier already caches
    /// `token`.
    pub fn has(&self, token: &str) -> bool {
        self.builtin_token(token)
            || self.core.provider_cache.contains(&provider_token(token))
            || self.cache().contains(token)
    }

    fn builtin_token(&self, token: &str) -> bool {
        token == INJECTOR || (self.tier == Tier::Provider && token == PROVIDE)
    }

    /// `$injector` and `$provide` are handles onto this build, synthesized
    /// rather than cached so the build holds no reference to itself.
    fn builtin(&self, token: &str) -> Option<Instance> {
        match (token, self.tier) {
            (INJECTOR, _) => Some(Arc::new(self.clone()) as Instance),
            (PROVIDE, Tier::Provider) => Some(Arc::new(Provide::new(self.clone())) as Instance),
            _ => None,
        }
    }

    fn on_miss(&self, token: &str, caller: Option<&str>) -> Result<Instance> {
        match self.tier {
            Tier::Provider => {
                let path = self.core.unknown_path(caller);

                #[cfg(feature = "logging")]
                debug!(
                    target: "module_injector",
                    token = token,
                    path = %path,
                    "Unknown provider"
                );

                Err(DiError::unknown_provider(path))
            }
            Tier::Instance => {
                let provider_key = provider_token(token);
                let receiver = self.provider_injector().get_from(&provider_key, caller)?;
                let provider = self
                    .core
                    .providers
                    .get(&provider_key)
                    .map(|p| Arc::clone(p.value()))
                    .ok_or_else(|| DiError::missing_get(token))?;

                #[cfg(feature = "logging")]
                debug!(
                    target: "module_injector",
                    service = token,
                    "Instantiating service from provider $get"
                );

                self.invoke_with(&provider.factory(), Some(receiver), None, Some(token))
            }
        }
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Derive the token list of `injectable`.
    ///
    /// `strict` defaults to this build's strict mode.
    pub fn annotate(&self, injectable: &Injectable, strict: Option<bool>) -> Result<Arc<[String]>> {
        annotate::derive_tokens(injectable, strict.unwrap_or(self.core.strict_di), None)
    }

    fn injection_args(
        &self,
        injectable: &Injectable,
        locals: Option<&Locals>,
        label: Option<&str>,
    ) -> Result<(Arc<[String]>, Vec<Instance>)> {
        let tokens = annotate::derive_tokens(injectable, self.core.strict_di, label)?;
        let values = tokens
            .iter()
            .map(|token| match locals.and_then(|l| l.get(token)) {
                Some(local) => Ok(Arc::clone(local)),
                None => self.get_from(token, label),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((tokens, values))
    }

    /// Invoke with no receiver, locals or label.
    #[inline]
    pub fn invoke(&self, injectable: &Injectable) -> Result<Instance> {
        self.invoke_with(injectable, None, None, None)
    }

    /// Invoke `injectable` with its dependencies resolved from this tier.
    ///
    /// Locals take precedence over the cache. `receiver` is passed to
    /// function bodies only; constructors never see one. `label` names the
    /// call in error messages.
    pub fn invoke_with(
        &self,
        injectable: &Injectable,
        receiver: Option<Instance>,
        locals: Option<&Locals>,
        label: Option<&str>,
    ) -> Result<Instance> {
        let (tokens, values) = self.injection_args(injectable, locals, label)?;
        let receiver = match injectable.kind() {
            InvokeKind::Function => receiver,
            InvokeKind::Constructor => None,
        };
        injectable.call(&Arguments::new(tokens, values, receiver))
    }

    /// Construct a new object from `ty`, whatever its kind.
    pub fn instantiate(&self, ty: &Injectable, locals: Option<&Locals>, label: Option<&str>) -> Result<Instance> {
        let (tokens, values) = self.injection_args(ty, locals, label)?;
        ty.call(&Arguments::new(tokens, values, None))
    }

    /// Construct a [`Construct`](crate::Construct) type.
    pub fn construct<T: crate::Construct>(&self, locals: Option<&Locals>) -> Result<Arc<T>> {
        self.instantiate(&Injectable::of::<T>(), locals, None)?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(std::any::type_name::<T>()))
    }

    /// Invoke and downcast the result.
    pub fn call<T: Send + Sync + 'static>(&self, injectable: &Injectable) -> Result<Arc<T>> {
        let label = injectable.name().unwrap_or(annotate::ANONYMOUS).to_string();
        self.invoke(injectable)?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(label))
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("tier", &self.tier)
            .field("phase", &self.core.phase())
            .field("strict_di", &self.core.strict_di)
            .field("providers", &self.core.provider_cache.len())
            .field("instances", &self.core.instance_cache.len())
            .finish()
    }
}

/// Downcast helper used by replay and the registration API.
pub(crate) fn downcast_handle<T: Any + Send + Sync>(value: Instance, token: &str) -> Result<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DiError::type_mismatch::<T>(token))
}
