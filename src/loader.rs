//! Module loading and container construction
//!
//! Loading a module replays, depth first, everything its `requires` recorded,
//! then its own invoke queue, then its config blocks, all against the
//! provider tier. Run blocks are collected along the way and invoked through
//! the instance tier once loading is done.

use crate::annotate::ANONYMOUS;
use crate::factory::{is_undefined, Instance};
use crate::injector::{downcast_handle, Core, ModuleKey, Phase, Tier};
use crate::module::{ModuleRegistry, Payload, QueuedCall};
use crate::provide::Provide;
use crate::{DiError, Injectable, Injector, Result};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// An entry of a modules-to-load list.
#[derive(Clone, Debug)]
pub enum ModuleRef {
    /// A module registered under this name
    Named(String),
    /// An inline config function, invoked through the provider injector
    Inline(Injectable),
    /// A value only known at run time; must hold a `String`, a `&'static str`
    /// or an [`Injectable`]
    Dynamic(Instance),
}

impl ModuleRef {
    /// Resolve `Dynamic` into one of the other two forms.
    fn classify(self) -> Result<Self> {
        let value = match self {
            Self::Dynamic(value) => value,
            other => return Ok(other),
        };

        if let Some(name) = value.downcast_ref::<String>() {
            return Ok(Self::Named(name.clone()));
        }
        if let Some(name) = value.downcast_ref::<&'static str>() {
            return Ok(Self::Named((*name).to_string()));
        }
        if let Some(injectable) = value.downcast_ref::<Injectable>() {
            return Ok(Self::Inline(injectable.clone()));
        }

        Err(DiError::NotAFunctionOrModule {
            argument: "module",
            found: describe(&value),
        })
    }

    /// How this entry is named in a load failure
    fn label(&self) -> String {
        match self {
            Self::Named(name) => name.clone(),
            Self::Inline(injectable) => injectable.name().unwrap_or(ANONYMOUS).to_string(),
            Self::Dynamic(value) => match self.clone().classify() {
                Ok(resolved) => resolved.label(),
                Err(_) => describe(value).to_string(),
            },
        }
    }
}

fn describe(value: &Instance) -> &'static str {
    if is_undefined(value) {
        "undefined"
    } else {
        "object"
    }
}

impl From<&str> for ModuleRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for ModuleRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<&String> for ModuleRef {
    fn from(name: &String) -> Self {
        Self::Named(name.clone())
    }
}

impl From<Injectable> for ModuleRef {
    fn from(injectable: Injectable) -> Self {
        Self::Inline(injectable)
    }
}

impl From<Instance> for ModuleRef {
    fn from(value: Instance) -> Self {
        Self::Dynamic(value)
    }
}

impl Injector {
    /// Load `modules` into this build and return the run blocks they collect.
    pub(crate) fn load_modules<I>(&self, modules: I) -> Result<Vec<Injectable>>
    where
        I: IntoIterator<Item = ModuleRef>,
    {
        let provider = self.provider_injector();
        let mut run_blocks = Vec::new();

        for module in modules {
            let label = module.label();
            provider
                .load_one(module, &mut run_blocks)
                .map_err(|cause| DiError::module_load_failed(label, cause))?;
        }

        Ok(run_blocks)
    }

    fn load_one(&self, module: ModuleRef, run_blocks: &mut Vec<Injectable>) -> Result<()> {
        match module.classify()? {
            ModuleRef::Named(name) => {
                if !self.core().mark_loaded(ModuleKey::Name(name.clone())) {
                    return Ok(());
                }
                self.load_named(&name, run_blocks)
            }
            ModuleRef::Inline(block) => {
                if !self.core().mark_loaded(ModuleKey::Inline(block.id())) {
                    return Ok(());
                }

                #[cfg(feature = "logging")]
                debug!(
                    target: "module_injector",
                    module = block.name().unwrap_or(ANONYMOUS),
                    "Invoking inline module"
                );

                let result = self.invoke(&block)?;
                if is_undefined(&result) {
                    return Ok(());
                }
                let run = downcast_handle::<Injectable>(result, block.name().unwrap_or(ANONYMOUS))
                    .map_err(|_| DiError::NotAFunctionOrModule {
                        argument: "fn",
                        found: "object",
                    })?;
                run_blocks.push((*run).clone());
                Ok(())
            }
            ModuleRef::Dynamic(_) => Err(DiError::Internal("unclassified module reference".into())),
        }
    }

    fn load_named(&self, name: &str, run_blocks: &mut Vec<Injectable>) -> Result<()> {
        let module = self.registry().get(name)?;
        self.core().modules.insert(name.to_string(), Arc::clone(&module));

        #[cfg(feature = "logging")]
        debug!(
            target: "module_injector",
            module = name,
            requires = ?module.requires(),
            "Loading module"
        );

        let required = self.load_modules(module.requires().iter().map(ModuleRef::from))?;
        run_blocks.extend(required);
        run_blocks.extend(module.run_blocks());

        self.replay(module.invoke_queue())?;
        self.replay(module.config_blocks())
    }

    /// Execute recorded calls against this (provider) tier.
    fn replay(&self, calls: Vec<QueuedCall>) -> Result<()> {
        for call in calls {
            #[cfg(feature = "logging")]
            trace!(
                target: "module_injector",
                provider = call.provider,
                method = call.method,
                "Replaying queued call"
            );

            let target = self.get_any(call.provider)?;
            match call.payload {
                Payload::Provide(verb) => {
                    downcast_handle::<Provide>(target, call.provider)?.apply(verb)?;
                }
                Payload::Invoke(block) => {
                    downcast_handle::<Injector>(target, call.provider)?.invoke(&block)?;
                }
                Payload::Register { name, definition } => {
                    let provider = self
                        .core()
                        .providers
                        .get(call.provider)
                        .map(|p| Arc::clone(p.value()))
                        .ok_or_else(|| DiError::NotARegistrar {
                            provider: call.provider.to_string(),
                            method: call.method.to_string(),
                        })?;
                    provider.register(call.method, &name, definition)?;
                }
            }
        }
        Ok(())
    }

    fn run_blocks(&self, blocks: Vec<Injectable>) -> Result<()> {
        let instance = self.instance_injector();
        for block in &blocks {
            instance.invoke(block)?;
        }
        Ok(())
    }

    /// Load more modules into an already built container.
    ///
    /// Modules already loaded are skipped. Services resolved before the call
    /// keep their cached values; run blocks of the new modules are invoked
    /// before this returns. Resolution of uncached services on other threads
    /// waits until loading is done.
    pub fn load_new_modules<I, M>(&self, modules: I) -> Result<()>
    where
        I: IntoIterator<Item = M>,
        M: Into<ModuleRef>,
    {
        let core = self.core();
        let _resolving = core.resolving();
        core.set_phase(Phase::Loading);
        let loaded = self.load_modules(modules.into_iter().map(Into::into));
        core.set_phase(Phase::Loaded);
        self.run_blocks(loaded?)
    }
}

/// Build a container from `modules` and run their run blocks.
///
/// The returned handle is the instance tier.
///
/// Every failure raised while loading a module comes back wrapped in
/// [`DiError::ModuleLoadFailure`], one layer per module on the way down. A
/// module that was never registered is therefore a `ModuleLoadFailure` whose
/// [`root_cause`](DiError::root_cause) is [`DiError::ModuleNotFound`]:
///
/// ```rust
/// use module_injector::{create_injector, DiError, ModuleRegistry};
///
/// let registry = ModuleRegistry::new();
/// let err = create_injector(&registry, ["ng"], false).unwrap_err();
///
/// assert!(matches!(err, DiError::ModuleLoadFailure { .. }));
/// assert!(matches!(err.root_cause(), DiError::ModuleNotFound { name } if name == "ng"));
/// ```
pub fn create_injector<I, M>(registry: &ModuleRegistry, modules: I, strict_di: bool) -> Result<Injector>
where
    I: IntoIterator<Item = M>,
    M: Into<ModuleRef>,
{
    InjectorBuilder::new(registry)
        .strict_di(strict_di)
        .modules(modules)
        .build()
}

/// Builder for one container build.
///
/// # Examples
///
/// ```rust
/// use module_injector::{InjectorBuilder, ModuleRegistry};
///
/// let registry = ModuleRegistry::new();
/// registry.module("app", Vec::<String>::new())?.value("port", 8080u16);
///
/// let injector = InjectorBuilder::new(&registry)
///     .strict_di(true)
///     .module("app")
///     .build()?;
/// assert_eq!(*injector.get::<u16>("port")?, 8080);
/// # Ok::<(), module_injector::DiError>(())
/// ```
#[derive(Debug, Clone)]
pub struct InjectorBuilder {
    registry: ModuleRegistry,
    strict_di: bool,
    modules: Vec<ModuleRef>,
}

impl InjectorBuilder {
    /// Start a build reading modules from `registry`
    pub fn new(registry: &ModuleRegistry) -> Self {
        Self {
            registry: registry.clone(),
            strict_di: false,
            modules: Vec::new(),
        }
    }

    /// Refuse parameter-name inference
    pub fn strict_di(mut self, enabled: bool) -> Self {
        self.strict_di = enabled;
        self
    }

    /// Append one module to load
    pub fn module(mut self, module: impl Into<ModuleRef>) -> Self {
        self.modules.push(module.into());
        self
    }

    /// Append several modules to load
    pub fn modules<I, M>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ModuleRef>,
    {
        self.modules.extend(modules.into_iter().map(Into::into));
        self
    }

    /// Append an inline config function
    pub fn inline(self, block: Injectable) -> Self {
        self.module(ModuleRef::Inline(block))
    }

    /// Load every module, then invoke the collected run blocks.
    pub fn build(self) -> Result<Injector> {
        #[cfg(feature = "logging")]
        debug!(
            target: "module_injector",
            modules = self.modules.len(),
            strict_di = self.strict_di,
            "Creating injector"
        );

        let core = Arc::new(Core::new(self.registry, self.strict_di));
        let injector = Injector::from_core(core, Tier::Instance);

        let run_blocks = injector.load_modules(self.modules)?;
        injector.core().set_phase(Phase::Loaded);

        #[cfg(feature = "logging")]
        debug!(
            target: "module_injector",
            modules = ?injector.modules(),
            run_blocks = run_blocks.len(),
            "Modules loaded"
        );

        injector.run_blocks(run_blocks)?;
        Ok(injector)
    }
}
