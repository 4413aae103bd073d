//! Module registry
//!
//! A [`Module`] records registration calls instead of performing them. The
//! loader replays a module's queue into a container build after every module
//! it requires has been replayed, so modules can be declared in any order.
//!
//! The registry is an ordinary value: create one per application (or per
//! test) and pass it to [`create_injector`](crate::create_injector).

use crate::factory::{instance, Instance};
use crate::injector::{INJECTOR, PROVIDE};
use crate::provide::ProvideCall;
use crate::provider::ProviderDef;
use crate::{Construct, DiError, Injectable, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(feature = "logging")]
use tracing::debug;

/// Name no module or service may use
pub const RESERVED_NAME: &str = "hasOwnProperty";

/// Provider receiving `directive` and `component` registrations
pub const COMPILE_PROVIDER: &str = "$compileProvider";
/// Provider receiving `filter` registrations
pub const FILTER_PROVIDER: &str = "$filterProvider";
/// Provider receiving `controller` registrations
pub const CONTROLLER_PROVIDER: &str = "$controllerProvider";
/// Provider receiving `animation` registrations
pub const ANIMATE_PROVIDER: &str = "$animateProvider";

/// What a queued call does when replayed.
#[derive(Clone, Debug)]
pub(crate) enum Payload {
    /// A `$provide` verb
    Provide(ProvideCall),
    /// `$injector.invoke(block)` against the provider tier
    Invoke(Injectable),
    /// Forwarded to the target provider's `register`
    Register { name: String, definition: Injectable },
}

/// One recorded call: `(provider token, method, payload)`.
#[derive(Clone, Debug)]
pub(crate) struct QueuedCall {
    pub(crate) provider: &'static str,
    pub(crate) method: &'static str,
    pub(crate) payload: Payload,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A named bundle of recorded registrations.
///
/// Recorder methods return `&Self` so calls chain:
///
/// ```rust
/// use module_injector::{Injectable, ModuleRegistry};
///
/// let registry = ModuleRegistry::new();
/// registry
///     .module("app", ["core"])?
///     .constant("version", "1.0")
///     .value("greeting", String::from("hi"))
///     .run(Injectable::new(["greeting"], |_| Ok(())));
/// # Ok::<(), module_injector::DiError>(())
/// ```
pub struct Module {
    name: String,
    requires: Vec<String>,
    invoke_queue: Mutex<VecDeque<QueuedCall>>,
    config_blocks: Mutex<Vec<QueuedCall>>,
    run_blocks: Mutex<Vec<Injectable>>,
    info: Mutex<Option<Instance>>,
}

impl Module {
    fn new(name: String, requires: Vec<String>) -> Self {
        Self {
            name,
            requires,
            invoke_queue: Mutex::new(VecDeque::new()),
            config_blocks: Mutex::new(Vec::new()),
            run_blocks: Mutex::new(Vec::new()),
            info: Mutex::new(None),
        }
    }

    /// Module name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the modules loaded before this one
    #[inline]
    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    /// Opaque metadata attached with [`set_info`](Self::set_info)
    pub fn info(&self) -> Option<Instance> {
        lock(&self.info).clone()
    }

    /// Attach opaque metadata.
    pub fn set_info<T: Send + Sync + 'static>(&self, info: T) -> &Self {
        *lock(&self.info) = Some(instance(info));
        self
    }

    pub(crate) fn invoke_queue(&self) -> Vec<QueuedCall> {
        lock(&self.invoke_queue).iter().cloned().collect()
    }

    pub(crate) fn config_blocks(&self) -> Vec<QueuedCall> {
        lock(&self.config_blocks).clone()
    }

    pub(crate) fn run_blocks(&self) -> Vec<Injectable> {
        lock(&self.run_blocks).clone()
    }

    fn provide(&self, call: ProvideCall) -> &Self {
        call.stamp(&self.name);
        let queued = QueuedCall {
            provider: PROVIDE,
            method: call.method(),
            payload: Payload::Provide(call),
        };
        lock(&self.invoke_queue).push_back(queued);
        self
    }

    fn forward(&self, provider: &'static str, method: &'static str, name: &str, definition: Injectable) -> &Self {
        definition.set_module_name(&self.name);
        lock(&self.invoke_queue).push_back(QueuedCall {
            provider,
            method,
            payload: Payload::Register {
                name: name.to_string(),
                definition,
            },
        });
        self
    }

    // =========================================================================
    // `$provide` recorders
    // =========================================================================

    /// Record `$provide.provider(name, def)`
    pub fn provider(&self, name: &str, def: impl Into<ProviderDef>) -> &Self {
        self.provide(ProvideCall::Provider(vec![(name.to_string(), def.into())]))
    }

    /// Record `$provide.factory(name, f)`
    pub fn factory(&self, name: &str, factory: Injectable) -> &Self {
        self.provide(ProvideCall::Factory(vec![(name.to_string(), factory)]))
    }

    /// Record `$provide.service(name, constructor)`
    pub fn service(&self, name: &str, constructor: Injectable) -> &Self {
        self.provide(ProvideCall::Service(vec![(name.to_string(), constructor)]))
    }

    /// Record a service built from a [`Construct`] type
    pub fn service_type<T: Construct>(&self, name: &str) -> &Self {
        self.service(name, Injectable::of::<T>())
    }

    /// Record `$provide.value(name, value)`
    pub fn value<T: Send + Sync + 'static>(&self, name: &str, value: T) -> &Self {
        self.provide(ProvideCall::Value(vec![(name.to_string(), instance(value))]))
    }

    /// Record `$provide.constant(name, value)` at the front of the queue.
    ///
    /// Constants are therefore registered before any other call of this
    /// module, whatever the declaration order.
    pub fn constant<T: Send + Sync + 'static>(&self, name: &str, value: T) -> &Self {
        self.constants([(name, instance(value))])
    }

    /// Record `$provide.decorator(name, decorator)` as a config block.
    ///
    /// Decorators therefore apply after every registration in this module.
    pub fn decorator(&self, name: &str, decorator: Injectable) -> &Self {
        let call = ProvideCall::Decorator(name.to_string(), decorator);
        call.stamp(&self.name);
        lock(&self.config_blocks).push(QueuedCall {
            provider: PROVIDE,
            method: call.method(),
            payload: Payload::Provide(call),
        });
        self
    }

    /// Record several providers in one call
    pub fn providers<I, S, D>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: Into<ProviderDef>,
    {
        self.provide(ProvideCall::Provider(
            entries.into_iter().map(|(n, d)| (n.into(), d.into())).collect(),
        ))
    }

    /// Record several factories in one call
    pub fn factories<I, S>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (S, Injectable)>,
        S: Into<String>,
    {
        self.provide(ProvideCall::Factory(
            entries.into_iter().map(|(n, f)| (n.into(), f)).collect(),
        ))
    }

    /// Record several services in one call
    pub fn services<I, S>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (S, Injectable)>,
        S: Into<String>,
    {
        self.provide(ProvideCall::Service(
            entries.into_iter().map(|(n, c)| (n.into(), c)).collect(),
        ))
    }

    /// Record several erased values in one call
    pub fn values<I, S>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (S, Instance)>,
        S: Into<String>,
    {
        self.provide(ProvideCall::Value(
            entries.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        ))
    }

    /// Record several erased constants at the front of the queue
    pub fn constants<I, S>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (S, Instance)>,
        S: Into<String>,
    {
        let call = ProvideCall::Constant(entries.into_iter().map(|(n, v)| (n.into(), v)).collect());
        lock(&self.invoke_queue).push_front(QueuedCall {
            provider: PROVIDE,
            method: call.method(),
            payload: Payload::Provide(call),
        });
        self
    }

    // =========================================================================
    // Recorders forwarded to framework providers
    // =========================================================================

    /// Record a directive for `$compileProvider`
    pub fn directive(&self, name: &str, factory: Injectable) -> &Self {
        self.forward(COMPILE_PROVIDER, "directive", name, factory)
    }

    /// Record a component for `$compileProvider`
    pub fn component(&self, name: &str, definition: Injectable) -> &Self {
        self.forward(COMPILE_PROVIDER, "component", name, definition)
    }

    /// Record a filter for `$filterProvider`
    pub fn filter(&self, name: &str, factory: Injectable) -> &Self {
        self.forward(FILTER_PROVIDER, "register", name, factory)
    }

    /// Record a controller for `$controllerProvider`
    pub fn controller(&self, name: &str, constructor: Injectable) -> &Self {
        self.forward(CONTROLLER_PROVIDER, "register", name, constructor)
    }

    /// Record an animation for `$animateProvider`
    pub fn animation(&self, name: &str, factory: Injectable) -> &Self {
        self.forward(ANIMATE_PROVIDER, "register", name, factory)
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Record a config block, invoked through the provider injector.
    pub fn config(&self, block: Injectable) -> &Self {
        block.set_module_name(&self.name);
        lock(&self.config_blocks).push(QueuedCall {
            provider: INJECTOR,
            method: "invoke",
            payload: Payload::Invoke(block),
        });
        self
    }

    /// Record a run block, invoked through the instance injector once the
    /// whole build has loaded.
    pub fn run(&self, block: Injectable) -> &Self {
        block.set_module_name(&self.name);
        lock(&self.run_blocks).push(block);
        self
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("queued", &lock(&self.invoke_queue).len())
            .field("config_blocks", &lock(&self.config_blocks).len())
            .field("run_blocks", &lock(&self.run_blocks).len())
            .finish()
    }
}

/// Named table of modules.
///
/// Cloning shares the table.
#[derive(Clone)]
pub struct ModuleRegistry {
    modules: Arc<DashMap<String, Arc<Module>, RandomState>>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            modules: Arc::new(DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            )),
        }
    }

    /// Create a module, replacing any previous module of the same name.
    pub fn module<I, S>(&self, name: &str, requires: I) -> Result<Arc<Module>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if name == RESERVED_NAME {
            return Err(DiError::ReservedName { context: "module" });
        }

        let requires: Vec<String> = requires.into_iter().map(Into::into).collect();

        #[cfg(feature = "logging")]
        debug!(
            target: "module_injector",
            module = name,
            requires = ?requires,
            replaced = self.modules.contains_key(name),
            "Registering module"
        );

        let module = Arc::new(Module::new(name.to_string(), requires));
        self.modules.insert(name.to_string(), Arc::clone(&module));
        Ok(module)
    }

    /// Create a module whose first config block is `config`.
    pub fn module_with_config<I, S>(&self, name: &str, requires: I, config: Injectable) -> Result<Arc<Module>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let module = self.module(name, requires)?;
        module.config(config);
        Ok(module)
    }

    /// Retrieve a registered module.
    pub fn get(&self, name: &str) -> Result<Arc<Module>> {
        if name == RESERVED_NAME {
            return Err(DiError::ReservedName { context: "module" });
        }
        self.modules
            .get(name)
            .map(|m| Arc::clone(m.value()))
            .ok_or_else(|| DiError::module_not_found(name))
    }

    /// Check if a module is registered
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Names of all registered modules
    pub fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.key().clone()).collect()
    }

    /// Number of registered modules
    #[inline]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("count", &self.len())
            .finish()
    }
}
