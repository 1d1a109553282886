//! Executor: runs conversion paths against file batches.
//!
//! The Executor trait separates WHAT to convert (Router) from HOW to run it.
//! A single request is always a sequential pipeline: stage i+1 consumes the
//! complete output of stage i. Independent requests may run concurrently.

use crate::error::{ConfigError, ConvertError, Error};
use crate::graph::ConversionEdge;
use crate::handler::FileData;
use crate::registry::Registry;
use crate::router::ConversionPath;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared flag a caller sets to abandon a request at the next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Context for executing conversion paths.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Registry the path's handler indices refer to.
    pub registry: Arc<Registry>,
    /// Optional cancellation flag, checked before every stage.
    pub cancel: Option<CancelToken>,
}

impl ExecutionContext {
    /// Create a new execution context with the given registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            cancel: None,
        }
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Result of executing a conversion path.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Output files of the last stage.
    pub files: Vec<FileData>,
    /// Execution statistics.
    pub stats: ExecutionStats,
}

/// Statistics from path execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    /// Total execution duration.
    pub duration: Duration,
    /// Largest batch size (bytes) seen between stages.
    pub peak_bytes: usize,
    /// Number of stages executed.
    pub stages_executed: usize,
}

/// A conversion job for batch processing.
#[derive(Debug)]
pub struct Job {
    /// The path to execute.
    pub path: ConversionPath,
    /// Input files.
    pub files: Vec<FileData>,
}

impl Job {
    /// Create a new job.
    pub fn new(path: ConversionPath, files: Vec<FileData>) -> Self {
        Self { path, files }
    }
}

/// Executor determines HOW a path runs.
///
/// - `SequentialExecutor`: runs jobs one after another (default)
/// - `ParallelExecutor`: runs independent jobs on a thread pool (requires
///   the `parallel` feature)
pub trait Executor: Send + Sync {
    /// Execute a single conversion path.
    fn execute(
        &self,
        ctx: &ExecutionContext,
        path: &ConversionPath,
        files: Vec<FileData>,
    ) -> Result<ExecutionResult, Error>;

    /// Execute a batch of independent jobs.
    ///
    /// Default implementation runs sequentially.
    fn execute_batch(
        &self,
        ctx: &ExecutionContext,
        jobs: Vec<Job>,
    ) -> Vec<Result<ExecutionResult, Error>> {
        jobs.into_iter()
            .map(|job| self.execute(ctx, &job.path, job.files))
            .collect()
    }
}

/// Sequential pipeline executor.
#[derive(Debug, Clone, Default)]
pub struct SequentialExecutor;

impl SequentialExecutor {
    /// Create a new sequential executor.
    pub fn new() -> Self {
        Self
    }
}

impl Executor for SequentialExecutor {
    fn execute(
        &self,
        ctx: &ExecutionContext,
        path: &ConversionPath,
        files: Vec<FileData>,
    ) -> Result<ExecutionResult, Error> {
        if files.is_empty() {
            return Err(Error::EmptyInput);
        }

        let start = Instant::now();
        let mut peak_bytes = batch_bytes(&files);
        let mut current = files;

        for (stage, edge) in path.edges.iter().enumerate() {
            if ctx.is_cancelled() {
                tracing::debug!(stage, "request cancelled");
                return Err(Error::Cancelled { stage });
            }

            let slot = ctx
                .registry
                .slot(edge.handler_index)
                .filter(|slot| slot.name() == edge.handler_name)
                .ok_or_else(|| ConfigError::UnknownHandler(edge.handler_name.clone()))?;

            slot.ensure_ready()
                .map_err(|source| Error::HandlerUnavailable {
                    handler: edge.handler_name.clone(),
                    stage,
                    source,
                })?;

            let output = slot
                .handler()
                .convert(&current, &edge.from, &edge.to)
                .map_err(|source| stage_error(edge, stage, source))?;

            if output.is_empty() {
                return Err(stage_error(edge, stage, ConvertError::EmptyOutput));
            }

            peak_bytes = peak_bytes.max(batch_bytes(&output));
            tracing::debug!(
                stage,
                handler = %edge.handler_name,
                from = %edge.from.internal_id,
                to = %edge.to.internal_id,
                inputs = current.len(),
                outputs = output.len(),
                "stage complete"
            );
            current = output;
        }

        Ok(ExecutionResult {
            files: current,
            stats: ExecutionStats {
                duration: start.elapsed(),
                peak_bytes,
                stages_executed: path.edges.len(),
            },
        })
    }
}

/// Classify a handler failure.
///
/// An unsupported pair means the handler's declarations lie about what it
/// can do, which is a configuration problem rather than a runtime one.
fn stage_error(edge: &ConversionEdge, stage: usize, source: ConvertError) -> Error {
    match source {
        ConvertError::UnsupportedPair { from, to } => {
            Error::Configuration(ConfigError::UnserviceablePair {
                handler: edge.handler_name.clone(),
                from,
                to,
            })
        }
        source => Error::Conversion {
            handler: edge.handler_name.clone(),
            stage,
            source,
        },
    }
}

fn batch_bytes(files: &[FileData]) -> usize {
    files.iter().map(FileData::len).sum()
}

// ============================================================================
// Parallel Executor (requires "parallel" feature)
// ============================================================================

/// Executor that runs independent jobs in parallel.
///
/// Each job is still a sequential pipeline; only whole jobs are spread over
/// rayon's thread pool.
#[cfg(feature = "parallel")]
#[derive(Debug, Clone, Default)]
pub struct ParallelExecutor {
    pool: Option<Arc<rayon::ThreadPool>>,
}

#[cfg(feature = "parallel")]
impl ParallelExecutor {
    /// Create a new parallel executor using rayon's global pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a dedicated pool with the given number of threads.
    ///
    /// The pool is built once, here. If it cannot be built the executor keeps
    /// using the global pool.
    pub fn with_threads(mut self, threads: usize) -> Self {
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => self.pool = Some(Arc::new(pool)),
            Err(e) => {
                tracing::warn!(threads, error = %e, "failed to build thread pool, using global pool");
                self.pool = None;
            }
        }
        self
    }

    /// Number of worker threads jobs will run on.
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

#[cfg(feature = "parallel")]
impl Executor for ParallelExecutor {
    fn execute(
        &self,
        ctx: &ExecutionContext,
        path: &ConversionPath,
        files: Vec<FileData>,
    ) -> Result<ExecutionResult, Error> {
        SequentialExecutor.execute(ctx, path, files)
    }

    fn execute_batch(
        &self,
        ctx: &ExecutionContext,
        jobs: Vec<Job>,
    ) -> Vec<Result<ExecutionResult, Error>> {
        use rayon::prelude::*;

        let run = |job: Job| SequentialExecutor.execute(ctx, &job.path, job.files);

        match &self.pool {
            Some(pool) => pool.install(|| jobs.into_par_iter().map(run).collect()),
            None => jobs.into_par_iter().map(run).collect(),
        }
    }
}
