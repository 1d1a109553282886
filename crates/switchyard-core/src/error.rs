//! Error taxonomy.

/// Problems with handler or format declarations. Raised at registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("handler name is empty")]
    EmptyHandlerName,

    #[error("duplicate handler name: {0}")]
    DuplicateHandler(String),

    #[error("handler not registered: {0}")]
    UnknownHandler(String),

    #[error("malformed format '{format}': {reason}")]
    MalformedFormat { format: String, reason: String },

    #[error("format '{0}' is declared more than once")]
    DuplicateFormat(String),

    #[error("handler '{handler}' declares no formats")]
    NoFormats { handler: String },

    #[error("handler '{handler}' cannot service {from} -> {to}")]
    UnserviceablePair {
        handler: String,
        from: String,
        to: String,
    },

    #[error("handler '{handler}': {source}")]
    Handler {
        handler: String,
        #[source]
        source: Box<ConfigError>,
    },
}

/// A handler's capability probe failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("handler '{handler}' failed to initialize: {reason}")]
pub struct InitError {
    pub handler: String,
    pub reason: String,
}

impl InitError {
    pub fn new(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned by [`Handler::convert`](crate::Handler::convert).
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("unsupported conversion pair: {from} -> {to}")]
    UnsupportedPair { from: String, to: String },

    #[error("conversion failed: {0}")]
    Failed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("handler produced no output files")]
    EmptyOutput,

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ConvertError {
    pub fn unsupported(from: impl Into<String>, to: impl Into<String>) -> Self {
        ConvertError::UnsupportedPair {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Errors from path search.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("unsupported conversion: no route from '{from}' to '{to}'")]
    NoRoute { from: String, to: String },

    #[error("unknown format: {0}")]
    UnknownFormat(String),
}

/// Coarse classification of [`Error`], matching the documented taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Routing,
    Conversion,
    Request,
}

/// Result of a top-level conversion request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Routing(#[from] RouteError),

    #[error("stage {stage}: {source}")]
    HandlerUnavailable {
        handler: String,
        stage: usize,
        #[source]
        source: InitError,
    },

    #[error("stage {stage}: handler '{handler}' failed: {source}")]
    Conversion {
        handler: String,
        stage: usize,
        #[source]
        source: ConvertError,
    },

    #[error("conversion request has no input files")]
    EmptyInput,

    #[error("request cancelled before stage {stage}")]
    Cancelled { stage: usize },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Routing(_) => ErrorKind::Routing,
            // A probe failing mid-pipeline aborts the request like a codec fault.
            Error::HandlerUnavailable { .. } | Error::Conversion { .. } => ErrorKind::Conversion,
            Error::EmptyInput | Error::Cancelled { .. } => ErrorKind::Request,
        }
    }

    /// Name and stage of the handler the pipeline stopped at, if any.
    pub fn failed_stage(&self) -> Option<(&str, usize)> {
        match self {
            Error::HandlerUnavailable { handler, stage, .. }
            | Error::Conversion { handler, stage, .. } => Some((handler.as_str(), *stage)),
            _ => None,
        }
    }
}
