//! Subscriber setup for the container's `tracing` events
//!
//! Every event is emitted under [`TARGET`]. Registration, module loading and
//! phase changes log at debug; cache hits and replayed calls at trace.
//!
//! Output needs `logging-json` or `logging-pretty`. With only `logging`
//! enabled the events are still emitted, and `init` installs nothing.
//!
//! ```rust,ignore
//! use module_injector::logging;
//!
//! logging::init();
//!
//! // or: container events only, down to trace, with source locations
//! logging::builder().trace().injector_only().with_location().pretty().init();
//! ```

use tracing::Level;

/// Target of every event the container emits
pub const TARGET: &str = "module_injector";

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    /// Multi-line, for reading at a terminal
    Pretty,
    Compact,
}

/// Subscriber configuration; finish with [`init`](Self::init) or
/// [`try_init`](Self::try_init).
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    location: bool,
    threads: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::default(),
            target: None,
            location: false,
            threads: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Include cache hits and replayed calls
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Registration and loading events only
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Keep events of `target` only
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Keep container events only
    pub fn injector_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Print the file and line of each event
    pub fn with_location(mut self) -> Self {
        self.location = true;
        self
    }

    /// Print the id and name of the emitting thread
    pub fn with_threads(mut self) -> Self {
        self.threads = true;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn json(self) -> Self {
        self.format(LogFormat::Json)
    }

    pub fn pretty(self) -> Self {
        self.format(LogFormat::Pretty)
    }

    pub fn compact(self) -> Self {
        self.format(LogFormat::Compact)
    }

    /// `EnvFilter` directive built from the level and target filter
    pub fn directive(&self) -> String {
        match self.target {
            Some(target) => format!("{}={}", target, self.level),
            None => self.level.to_string(),
        }
    }

    /// Install the subscriber globally.
    ///
    /// Panics if one is already set; [`try_init`](Self::try_init) does not.
    pub fn init(self) {
        #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
        {
            use tracing_subscriber::util::SubscriberInitExt;
            self.subscriber().init();
        }
    }

    /// Install the subscriber globally; false if one was already set or no
    /// output feature is enabled.
    pub fn try_init(self) -> bool {
        #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
        {
            use tracing_subscriber::util::SubscriberInitExt;
            self.subscriber().try_init().is_ok()
        }
        #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
        {
            false
        }
    }

    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    fn subscriber(self) -> Box<dyn tracing::Subscriber + Send + Sync + 'static> {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let layer = fmt::layer()
            .with_file(self.location)
            .with_line_number(self.location)
            .with_thread_ids(self.threads)
            .with_thread_names(self.threads)
            .with_target(true);
        let registry = tracing_subscriber::registry().with(EnvFilter::new(self.directive()));

        match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => Box::new(registry.with(layer.json())),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => Box::new(registry.with(layer)),
            LogFormat::Pretty => Box::new(registry.with(layer.pretty())),
            LogFormat::Compact => Box::new(registry.with(layer.compact())),
        }
    }
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install a debug-level subscriber: JSON with `logging-json`, pretty otherwise.
pub fn init() {
    let format = if cfg!(feature = "logging-json") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    builder().format(format).init();
}

/// Install a debug-level subscriber for container events only.
pub fn init_injector_only() {
    builder().injector_only().init();
}
