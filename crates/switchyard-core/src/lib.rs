//! Switchyard: format registry and conversion routing
//!
//! Handlers declare which formats they read and write. Switchyard turns
//! those declarations into a capability graph, finds the cheapest chain of
//! handlers between two formats and runs it as a pipeline over in-memory
//! file batches.

mod catalog;
mod engine;
mod error;
mod executor;
mod format;
mod graph;
mod handler;
mod registry;
mod router;

pub use catalog::Catalog;
pub use engine::{ConversionRequest, Engine, InitPolicy};
pub use error::{ConfigError, ConvertError, Error, ErrorKind, InitError, RouteError};
#[cfg(feature = "parallel")]
pub use executor::ParallelExecutor;
pub use executor::{
    CancelToken, ExecutionContext, ExecutionResult, ExecutionStats, Executor, Job,
    SequentialExecutor,
};
pub use format::{Category, Format, FormatOverrides, common};
pub use graph::{CapabilityGraph, ConversionEdge, HOP_COST, LOSSY_PENALTY};
pub use handler::{FileData, Handler, HandlerSlot, HandlerState};
pub use registry::Registry;
pub use router::{ConversionPath, DEFAULT_MAX_HOPS, Router};
