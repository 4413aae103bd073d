//! Injectable callables
//!
//! An [`Injectable`] is the unit the injector invokes: a body plus the
//! ordered list of tokens its arguments are resolved from. Everything the
//! container calls (provider constructors, `$get` factories, service
//! constructors, config and run blocks, decorators) is an `Injectable`.
//!
//! Bodies are type-erased to `Fn(&Arguments) -> Result<Instance>` so the
//! container stores them uniformly; the constructors below accept typed
//! closures and erase the output.

use crate::annotate::Annotation;
use crate::{DiError, Result};
use ahash::AHashMap;
use once_cell::sync::{Lazy, OnceCell};
use std::any::Any;
use std::sync::Arc;

/// A type-erased service value.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Marker stored in place of a value a factory did not produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Undefined;

static UNDEFINED: Lazy<Instance> = Lazy::new(|| Arc::new(Undefined) as Instance);

/// The shared `undefined` instance.
#[inline]
pub fn undefined() -> Instance {
    Arc::clone(&UNDEFINED)
}

/// Check whether an instance is the `undefined` marker.
#[inline]
pub fn is_undefined(instance: &Instance) -> bool {
    instance.is::<Undefined>()
}

/// Erase a value into an [`Instance`].
#[inline]
pub fn instance<T: Send + Sync + 'static>(value: T) -> Instance {
    Arc::new(value) as Instance
}

/// How the injector calls a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InvokeKind {
    /// Plain function call; receives the caller's receiver (`this`)
    #[default]
    Function,
    /// Constructs a new object; never receives a receiver
    Constructor,
}

type Body = Arc<dyn Fn(&Arguments) -> Result<Instance> + Send + Sync>;

struct InjectableInner {
    name: Option<String>,
    annotation: Annotation,
    kind: InvokeKind,
    body: Body,
    /// Normalized token list, filled on first derivation
    tokens: OnceCell<Arc<[String]>>,
    /// Module that recorded this injectable
    module: OnceCell<String>,
}

/// An annotated callable the injector can invoke.
///
/// # Examples
///
/// ```rust
/// use module_injector::Injectable;
///
/// // Array-literal form: tokens first, callable last
/// let shout = Injectable::new(["greeting"], |args| {
///     let greeting = args.get::<String>(0)?;
///     Ok(greeting.to_uppercase())
/// });
/// assert_eq!(shout.annotation().tokens(), ["greeting"]);
/// ```
#[derive(Clone)]
pub struct Injectable {
    inner: Arc<InjectableInner>,
}

impl Injectable {
    fn build(annotation: Annotation, kind: InvokeKind, body: Body) -> Self {
        Self {
            inner: Arc::new(InjectableInner {
                name: None,
                annotation,
                kind,
                body,
                tokens: OnceCell::new(),
                module: OnceCell::new(),
            }),
        }
    }

    /// Create a function with an explicit token list.
    pub fn new<I, S, T, F>(tokens: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> Result<T> + Send + Sync + 'static,
    {
        Self::erased(tokens, move |args| f(args).map(instance))
    }

    /// Create a function whose `None` result means `undefined`.
    pub fn maybe<I, S, T, F>(tokens: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> Result<Option<T>> + Send + Sync + 'static,
    {
        Self::erased(tokens, move |args| {
            Ok(f(args)?.map(instance).unwrap_or_else(undefined))
        })
    }

    /// Create a function that already returns an erased [`Instance`].
    pub fn erased<I, S, F>(tokens: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Arguments) -> Result<Instance> + Send + Sync + 'static,
    {
        Self::build(Annotation::explicit(tokens), InvokeKind::Function, Arc::new(f))
    }

    /// Create a constructor with an explicit token list.
    pub fn constructor<I, S, T, F>(tokens: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> Result<T> + Send + Sync + 'static,
    {
        Self::build(
            Annotation::explicit(tokens),
            InvokeKind::Constructor,
            Arc::new(move |args: &Arguments| f(args).map(instance)),
        )
    }

    /// Create a function whose tokens were inferred from parameter names.
    ///
    /// This is what `#[injectable]` expands to. Strict injectors refuse to
    /// invoke it unless it declares no parameters.
    pub fn inferred<I, S, T, F>(name: &str, params: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> Result<T> + Send + Sync + 'static,
    {
        Self::build(
            Annotation::inferred(params),
            InvokeKind::Function,
            Arc::new(move |args: &Arguments| f(args).map(instance)),
        )
        .named(name)
    }

    /// Constructor injectable for a [`Construct`] type.
    pub fn of<T: Construct>() -> Self {
        Self::build(
            T::annotation(),
            InvokeKind::Constructor,
            Arc::new(|args: &Arguments| T::construct(args).map(instance)),
        )
        .named(std::any::type_name::<T>())
    }

    /// A zero-dependency function returning `value` on every call.
    pub fn value(value: Instance) -> Self {
        Self::erased(std::iter::empty::<String>(), move |_| Ok(Arc::clone(&value)))
    }

    /// Attach a display name used in error messages.
    ///
    /// Returns a new record; clones of the original keep their identity.
    pub fn named(self, name: impl Into<String>) -> Self {
        let inner = &self.inner;
        Self {
            inner: Arc::new(InjectableInner {
                name: Some(name.into()),
                annotation: inner.annotation.clone(),
                kind: inner.kind,
                body: Arc::clone(&inner.body),
                tokens: OnceCell::new(),
                module: inner.module.clone(),
            }),
        }
    }

    /// Declared name, if any
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// The annotation the token list is derived from
    #[inline]
    pub fn annotation(&self) -> &Annotation {
        &self.inner.annotation
    }

    /// Function or constructor
    #[inline]
    pub fn kind(&self) -> InvokeKind {
        self.inner.kind
    }

    /// Module that recorded this injectable, if it was queued by one
    #[inline]
    pub fn module_name(&self) -> Option<&str> {
        self.inner.module.get().map(String::as_str)
    }

    /// Stamp the recording module; the first module wins.
    pub(crate) fn set_module_name(&self, module: &str) {
        let _ = self.inner.module.set(module.to_string());
    }

    pub(crate) fn memoized_tokens(&self) -> &OnceCell<Arc<[String]>> {
        &self.inner.tokens
    }

    /// Identity of the underlying record (shared by clones)
    #[inline]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Run the body against already-assembled arguments.
    #[inline]
    pub(crate) fn call(&self, args: &Arguments) -> Result<Instance> {
        (self.inner.body)(args)
    }
}

impl std::fmt::Debug for Injectable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injectable")
            .field("name", &self.inner.name)
            .field("annotation", &self.inner.annotation)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

/// A type the injector can build through constructor injection.
///
/// Usually derived with `#[derive(Inject)]`.
pub trait Construct: Sized + Send + Sync + 'static {
    /// Tokens of the constructor's dependencies
    fn annotation() -> Annotation;

    /// Build the value from resolved arguments
    fn construct(args: &Arguments) -> Result<Self>;
}

/// Resolved arguments handed to an injectable body.
pub struct Arguments {
    tokens: Arc<[String]>,
    values: Vec<Instance>,
    receiver: Option<Instance>,
}

impl Arguments {
    pub(crate) fn new(tokens: Arc<[String]>, values: Vec<Instance>, receiver: Option<Instance>) -> Self {
        Self {
            tokens,
            values,
            receiver,
        }
    }

    /// Number of arguments
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no arguments
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Token the argument at `index` was resolved from
    #[inline]
    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// All tokens, in argument order
    #[inline]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The erased argument at `index`.
    pub fn instance(&self, index: usize) -> Result<Instance> {
        self.values.get(index).cloned().ok_or_else(|| {
            DiError::Internal(format!(
                "argument {index} requested but only {} were injected",
                self.values.len()
            ))
        })
    }

    /// The argument at `index`, downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        self.instance(index)?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>(self.token(index).unwrap_or_default()))
    }

    /// A clone of the argument at `index`.
    pub fn cloned<T: Clone + Send + Sync + 'static>(&self, index: usize) -> Result<T> {
        self.get::<T>(index).map(|value| (*value).clone())
    }

    /// Whether the argument at `index` is `undefined`.
    pub fn is_undefined(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(is_undefined)
    }

    /// The erased receiver (`this`), if the caller supplied one.
    #[inline]
    pub fn receiver_instance(&self) -> Option<Instance> {
        self.receiver.clone()
    }

    /// The receiver downcast to `T`.
    pub fn receiver<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.receiver
            .clone()
            .ok_or_else(|| DiError::Internal("injectable was invoked without a receiver".into()))?
            .downcast::<T>()
            .map_err(|_| DiError::type_mismatch::<T>("this"))
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arguments")
            .field("tokens", &self.tokens)
            .field("has_receiver", &self.receiver.is_some())
            .finish()
    }
}

/// Per-call overrides consulted before the container.
#[derive(Clone, Default)]
pub struct Locals {
    values: AHashMap<String, Instance>,
}

impl Locals {
    /// Create an empty set of locals
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a typed local.
    pub fn with<T: Send + Sync + 'static>(self, token: impl Into<String>, value: T) -> Self {
        self.with_instance(token, instance(value))
    }

    /// Add an already-erased local.
    pub fn with_instance(mut self, token: impl Into<String>, value: Instance) -> Self {
        self.values.insert(token.into(), value);
        self
    }

    /// Look up a local by token
    #[inline]
    pub fn get(&self, token: &str) -> Option<&Instance> {
        self.values.get(token)
    }

    /// Check if a token is overridden
    #[inline]
    pub fn contains(&self, token: &str) -> bool {
        self.values.contains_key(token)
    }

    /// Number of locals
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Locals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str], values: Vec<Instance>) -> Arguments {
        let tokens: Arc<[String]> = tokens.iter().map(|t| t.to_string()).collect();
        Arguments::new(tokens, values, None)
    }

    #[test]
    fn test_typed_body_is_erased() {
        let add = Injectable::new(["a", "b"], |args| {
            Ok(*args.get::<i32>(0)? + *args.get::<i32>(1)?)
        });

        let result = add
            .call(&args(&["a", "b"], vec![instance(2), instance(40)]))
            .unwrap();
        assert_eq!(*result.downcast::<i32>().unwrap(), 42);
        assert_eq!(add.kind(), InvokeKind::Function);
    }

    #[test]
    fn test_maybe_none_is_undefined() {
        let nothing = Injectable::maybe(Vec::<String>::new(), |_| Ok(None::<u8>));
        let result = nothing.call(&args(&[], vec![])).unwrap();
        assert!(is_undefined(&result));
    }

    #[test]
    fn test_get_reports_type_mismatch_with_token() {
        let a = args(&["port"], vec![instance("8080")]);
        let err = a.get::<u16>(0).unwrap_err();
        assert!(matches!(err, DiError::TypeMismatch { ref token, .. } if token == "port"));
        assert_eq!(a.cloned::<&str>(0).unwrap(), "8080");
    }

    #[test]
    fn test_missing_argument_is_an_error() {
        let a = args(&[], vec![]);
        assert!(a.instance(0).is_err());
        assert!(a.receiver::<u8>().is_err());
    }

    #[test]
    fn test_clones_share_identity_but_named_does_not() {
        let f = Injectable::value(instance(1u8));
        let g = f.clone();
        assert_eq!(f.id(), g.id());

        let h = f.clone().named("one");
        assert_ne!(f.id(), h.id());
        assert_eq!(h.name(), Some("one"));
    }

    #[test]
    fn test_module_name_first_stamp_wins() {
        let f = Injectable::value(instance(()));
        f.set_module_name("core");
        f.set_module_name("app");
        assert_eq!(f.module_name(), Some("core"));
    }

    #[test]
    fn test_locals() {
        let locals = Locals::new().with("$scope", 7u32);
        assert!(locals.contains("$scope"));
        assert_eq!(locals.len(), 1);
        assert!(locals.get("$delegate").is_none());
    }
}
