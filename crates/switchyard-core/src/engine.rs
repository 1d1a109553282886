//! Conversion engine: the single entry point for callers.
//!
//! An [`Engine`] owns a frozen registry, a cached capability graph and an
//! executor. A request is routed against the current graph and then run as
//! a pipeline. The graph is rebuilt whenever a handler has failed since the
//! cached copy was built, so failures narrow future routing decisions.

use crate::error::{Error, InitError, RouteError};
use crate::executor::{CancelToken, ExecutionContext, ExecutionResult, Executor, Job};
use crate::format::Format;
use crate::graph::CapabilityGraph;
use crate::handler::FileData;
use crate::registry::Registry;
use crate::router::{ConversionPath, DEFAULT_MAX_HOPS, Router};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// When handlers run their capability probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitPolicy {
    /// Probe on first use. Routing may pick a handler that later fails.
    #[default]
    Lazy,
    /// Probe every handler up front so the first graph is exact.
    Eager,
}

/// One independent conversion request.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub from: String,
    pub to: String,
    pub files: Vec<FileData>,
}

impl ConversionRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, files: Vec<FileData>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            files,
        }
    }
}

/// Routes and executes conversion requests.
pub struct Engine {
    registry: Arc<Registry>,
    graph: RwLock<Option<Arc<CapabilityGraph>>>,
    executor: Box<dyn Executor>,
    init_policy: InitPolicy,
    max_hops: usize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("init_policy", &self.init_policy)
            .field("max_hops", &self.max_hops)
            .finish()
    }
}

impl Engine {
    /// Freeze a populated registry into an engine.
    pub fn new(registry: Registry) -> Self {
        #[cfg(feature = "parallel")]
        let executor: Box<dyn Executor> = Box::new(crate::executor::ParallelExecutor::new());
        #[cfg(not(feature = "parallel"))]
        let executor: Box<dyn Executor> = Box::new(crate::executor::SequentialExecutor::new());

        Self {
            registry: Arc::new(registry),
            graph: RwLock::new(None),
            executor,
            init_policy: InitPolicy::Lazy,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    /// Set the initialization policy.
    ///
    /// With [`InitPolicy::Eager`] every handler is probed before this returns.
    pub fn init_policy(mut self, policy: InitPolicy) -> Self {
        self.init_policy = policy;
        if policy == InitPolicy::Eager {
            self.initialize_all();
        }
        self
    }

    /// Set maximum path length.
    pub fn max_hops(mut self, hops: usize) -> Self {
        self.max_hops = hops;
        self
    }

    /// Replace the executor used for requests and batches.
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Probe every handler now and report the outcome per handler.
    pub fn initialize_all(&self) -> Vec<(String, Result<(), InitError>)> {
        let report = self.registry.initialize_all();
        let failed = report.iter().filter(|(_, r)| r.is_err()).count();
        tracing::debug!(
            handlers = report.len(),
            failed,
            "initialized all handlers"
        );
        report
    }

    /// Current capability graph, rebuilt if a handler failed since the
    /// cached one was built.
    pub fn graph(&self) -> Arc<CapabilityGraph> {
        let epoch = self.registry.failure_epoch();
        {
            let cache = self.graph.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(graph) = cache.as_ref().filter(|g| g.epoch() == epoch) {
                return Arc::clone(graph);
            }
        }

        let mut cache = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        let epoch = self.registry.failure_epoch();
        if let Some(graph) = cache.as_ref().filter(|g| g.epoch() == epoch) {
            return Arc::clone(graph);
        }

        let graph = Arc::new(CapabilityGraph::build(&self.registry));
        tracing::debug!(
            epoch = graph.epoch(),
            stale = cache.is_some(),
            "rebuilt capability graph"
        );
        *cache = Some(Arc::clone(&graph));
        graph
    }

    /// Look up a format by internal id.
    pub fn format(&self, internal_id: &str) -> Result<Format, Error> {
        self.registry
            .catalog()
            .get(internal_id)
            .cloned()
            .ok_or_else(|| RouteError::UnknownFormat(internal_id.to_string()).into())
    }

    /// All known formats in catalog order.
    pub fn formats(&self) -> impl Iterator<Item = &Format> {
        self.registry.catalog().iter()
    }

    /// Find the cheapest conversion path between two formats.
    pub fn route(&self, from: &str, to: &str) -> Result<ConversionPath, Error> {
        let graph = self.graph();
        let path = Router::new(&graph).max_hops(self.max_hops).route(from, to)?;
        Ok(path)
    }

    /// Convert a batch of files from one format to another.
    pub fn convert(
        &self,
        from: &str,
        to: &str,
        files: Vec<FileData>,
    ) -> Result<ExecutionResult, Error> {
        let job = self.prepare(from, to, files)?;
        self.executor
            .execute(&self.context(None), &job.path, job.files)
    }

    /// Like [`convert`](Self::convert), abandoning the request at the next
    /// stage boundary once `cancel` is set.
    pub fn convert_with(
        &self,
        from: &str,
        to: &str,
        files: Vec<FileData>,
        cancel: &CancelToken,
    ) -> Result<ExecutionResult, Error> {
        let job = self.prepare(from, to, files)?;
        self.executor
            .execute(&self.context(Some(cancel.clone())), &job.path, job.files)
    }

    /// Run independent requests. Results are returned in request order.
    pub fn convert_batch(
        &self,
        requests: Vec<ConversionRequest>,
    ) -> Vec<Result<ExecutionResult, Error>> {
        let mut results: Vec<Option<Result<ExecutionResult, Error>>> =
            Vec::with_capacity(requests.len());
        let mut positions = Vec::new();
        let mut jobs = Vec::new();

        for request in requests {
            match self.prepare(&request.from, &request.to, request.files) {
                Ok(job) => {
                    positions.push(results.len());
                    results.push(None);
                    jobs.push(job);
                }
                Err(err) => results.push(Some(Err(err))),
            }
        }

        let executed = self.executor.execute_batch(&self.context(None), jobs);
        for (position, result) in positions.into_iter().zip(executed) {
            results[position] = Some(result);
        }
        results.into_iter().flatten().collect()
    }

    fn prepare(&self, from: &str, to: &str, files: Vec<FileData>) -> Result<Job, Error> {
        if files.is_empty() {
            return Err(Error::EmptyInput);
        }
        let path = self.route(from, to)?;
        Ok(Job::new(path, files))
    }

    fn context(&self, cancel: Option<CancelToken>) -> ExecutionContext {
        let ctx = ExecutionContext::new(Arc::clone(&self.registry));
        match cancel {
            Some(token) => ctx.with_cancel(token),
            None => ctx,
        }
    }
}
