//! Error types for dependency injection

use thiserror::Error;

/// Errors that can occur while registering modules, loading them, or
/// resolving services.
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No provider is registered for the requested token
    #[error("Unknown provider: {path}")]
    UnknownProvider { path: String },

    /// A token was requested while its own resolution was still in progress
    #[error("Circular dependency found: {path}")]
    CircularDependency { path: String },

    /// A provider definition did not produce a `$get` factory
    #[error("Provider '{name}' must define $get factory method.")]
    MissingGetFactory { name: String },

    /// A `factory` registration produced `undefined`
    #[error("Provider '{name}' must return a value from $get factory method.")]
    UndefinedFactoryResult { name: String },

    /// A declared dependency token is not a usable service name
    #[error("Incorrect injection token! Expected service name as string, got {token}")]
    InvalidInjectionToken { token: String },

    /// Parameter-name inference attempted with strict mode enabled
    #[error("{name} is not using explicit annotation and cannot be invoked in strict mode")]
    StrictModeViolation { name: String },

    /// A module was retrieved by name but never registered
    #[error(
        "Module '{name}' is not available! You either misspelled the module name or forgot to load it. \
         If registering a module ensure that you specify the dependencies as the second argument."
    )]
    ModuleNotFound { name: String },

    /// A module or registration name collides with a reserved identifier
    #[error("hasOwnProperty is not a valid {context} name")]
    ReservedName { context: &'static str },

    /// Loading a module failed; the cause is kept as the error source
    #[error("Failed to instantiate module {module} due to:\n{source}")]
    ModuleLoadFailure {
        module: String,
        #[source]
        source: Box<DiError>,
    },

    /// An entry of a modules-to-load list is neither a name nor an injectable
    #[error("Argument '{argument}' is not a function, got {found}")]
    NotAFunctionOrModule {
        argument: &'static str,
        found: &'static str,
    },

    /// A resolved value is not of the type the caller asked for
    #[error("Service '{token}' is not of type {expected}")]
    TypeMismatch {
        token: String,
        expected: &'static str,
    },

    /// A factory body failed to create its service
    #[error("Failed to create service {name}: {reason}")]
    CreationFailed { name: String, reason: String },

    /// A recorder call was forwarded to a provider that does not accept it
    #[error("Provider '{provider}' does not support '{method}' registrations")]
    NotARegistrar { provider: String, method: String },

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create an UnknownProvider error from a rendered resolution path
    #[inline]
    pub fn unknown_provider(path: impl Into<String>) -> Self {
        Self::UnknownProvider { path: path.into() }
    }

    /// Create a CircularDependency error from a rendered resolution path
    #[inline]
    pub fn circular(path: impl Into<String>) -> Self {
        Self::CircularDependency { path: path.into() }
    }

    /// Create a MissingGetFactory error
    #[inline]
    pub fn missing_get(name: impl Into<String>) -> Self {
        Self::MissingGetFactory { name: name.into() }
    }

    /// Create an UndefinedFactoryResult error
    #[inline]
    pub fn undefined_result(name: impl Into<String>) -> Self {
        Self::UndefinedFactoryResult { name: name.into() }
    }

    /// Create an InvalidInjectionToken error; the token is shown quoted
    #[inline]
    pub fn invalid_token(token: &str) -> Self {
        Self::InvalidInjectionToken {
            token: format!("{token:?}"),
        }
    }

    /// Create a StrictModeViolation error
    #[inline]
    pub fn strict(name: impl Into<String>) -> Self {
        Self::StrictModeViolation { name: name.into() }
    }

    /// Create a ModuleNotFound error
    #[inline]
    pub fn module_not_found(name: impl Into<String>) -> Self {
        Self::ModuleNotFound { name: name.into() }
    }

    /// Wrap a failure raised while loading `module`
    #[inline]
    pub fn module_load_failed(module: impl Into<String>, cause: DiError) -> Self {
        Self::ModuleLoadFailure {
            module: module.into(),
            source: Box::new(cause),
        }
    }

    /// Create a TypeMismatch error for `T`
    #[inline]
    pub fn type_mismatch<T: ?Sized + 'static>(token: impl Into<String>) -> Self {
        Self::TypeMismatch {
            token: token.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Follow nested module load failures down to the error that started them.
    pub fn root_cause(&self) -> &DiError {
        let mut current = self;
        while let Self::ModuleLoadFailure { source, .. } = current {
            current = source;
        }
        current
    }

    /// Names of the modules a load failure passed through, outermost first.
    pub fn module_chain(&self) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self;
        while let Self::ModuleLoadFailure { module, source } = current {
            chain.push(module.as_str());
            current = source;
        }
        chain
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
