//! A generic, growable cluster of test nodes.

use crate::builder::{NodeBuilder, SingleNodeBuilder};
use crate::error::HookStage;
use crate::{Error, Execution, NameAllocator, Node, NodeFailure, Result};
use async_trait::async_trait;
use rigging_config::ClusterSettings;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Pause between two nodes when a cluster starts sequentially.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

const FIND_LABEL: &str = "node matching predicate";
const FILTER_LABEL: &str = "nodes matching predicate";

/// Cross-cutting setup around [`Cluster::start`].
///
/// Both hooks default to no-ops. They see the members being started, in
/// cluster order.
#[async_trait]
pub trait StartHooks<T: Node>: Send + Sync {
    async fn before_start(&self, _nodes: &[Arc<T>]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_start(&self, _nodes: &[Arc<T>]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<T: Node> StartHooks<T> for NoHooks {}

type Members<T> = Arc<RwLock<Vec<Arc<T>>>>;

fn snapshot<T>(members: &RwLock<Vec<Arc<T>>>) -> Vec<Arc<T>> {
    members
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// An ordered collection of nodes of one type with shared lifecycle and queries.
///
/// Members are only ever appended. Queries returning an [`Execution`] look
/// at the membership at evaluation time, not at the time they are built.
pub struct Cluster<T: Node> {
    nodes: Members<T>,
    parallel: bool,
    settle_delay: Duration,
    names: Arc<NameAllocator>,
    hooks: Arc<dyn StartHooks<T>>,
}

impl<T: Node> Cluster<T> {
    /// Creates a cluster seeded with already-named nodes.
    pub fn new(initial_nodes: Vec<T>, parallel: bool) -> Self {
        Self {
            nodes: Arc::new(RwLock::new(
                initial_nodes.into_iter().map(Arc::new).collect(),
            )),
            parallel,
            settle_delay: DEFAULT_SETTLE_DELAY,
            names: NameAllocator::process(),
            hooks: Arc::new(NoHooks),
        }
    }

    /// Creates an empty cluster.
    pub fn empty(parallel: bool) -> Self {
        Self::new(Vec::new(), parallel)
    }

    /// Creates a cluster whose start policy comes from configuration.
    pub fn from_settings(initial_nodes: Vec<T>, settings: &ClusterSettings) -> Self {
        Self::new(initial_nodes, settings.parallel).with_settle_delay(settings.settle_delay())
    }

    /// Uses `names` instead of the process-wide allocator.
    pub fn with_allocator(mut self, names: Arc<NameAllocator>) -> Self {
        self.names = names;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_hooks(mut self, hooks: impl StartHooks<T> + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Current members, in insertion order.
    pub fn nodes(&self) -> Vec<Arc<T>> {
        snapshot(&self.nodes)
    }

    pub fn hostnames(&self) -> Vec<String> {
        self.nodes()
            .iter()
            .map(|node| node.hostname().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts every current member.
    ///
    /// In parallel mode all starts run concurrently and every one of them is
    /// awaited before returning, so all failures are reported together. In
    /// sequential mode members start in order with the settle delay between
    /// them, and the first failure aborts the rest.
    pub async fn start(&self) -> Result<()> {
        let nodes = self.nodes();
        tracing::info!(
            count = nodes.len(),
            parallel = self.parallel,
            "starting cluster"
        );

        self.hooks
            .before_start(&nodes)
            .await
            .map_err(|error| Error::Hook {
                stage: HookStage::BeforeStart,
                error,
            })?;

        if self.parallel {
            start_parallel(&nodes).await?;
        } else {
            start_sequential(&nodes, self.settle_delay).await?;
        }

        self.hooks
            .after_start(&nodes)
            .await
            .map_err(|error| Error::Hook {
                stage: HookStage::AfterStart,
                error,
            })?;

        tracing::info!(count = nodes.len(), "cluster started");
        Ok(())
    }

    /// Clears every member in order. Members stay in the cluster, so it can
    /// be started again.
    pub async fn stop(&self) -> Result<()> {
        let nodes = self.nodes();
        tracing::info!(count = nodes.len(), "stopping cluster");

        let mut failures = Vec::new();
        for node in &nodes {
            match node.clear().await {
                Ok(()) => tracing::debug!(hostname = %node.hostname(), "node cleared"),
                Err(error) => {
                    tracing::warn!(
                        hostname = %node.hostname(),
                        error = %format!("{error:#}"),
                        "failed to clear node"
                    );
                    failures.push(NodeFailure::new(node.hostname(), error));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::StopFailed(failures))
        }
    }

    /// Builds a batch of nodes named after the current members and appends it.
    pub fn add(&mut self, builder: NodeBuilder<T>) -> Result<Vec<Arc<T>>> {
        let existing = self.hostnames();
        let built: Vec<Arc<T>> = builder
            .build(&existing, &self.names)?
            .into_iter()
            .map(Arc::new)
            .collect();

        self.append(&built);
        tracing::info!(
            prefix = builder.prefix(),
            added = built.len(),
            total = existing.len() + built.len(),
            "added nodes"
        );
        Ok(built)
    }

    /// Builds exactly one node and appends it.
    pub fn add_one(&mut self, builder: SingleNodeBuilder<T>) -> Result<Arc<T>> {
        let existing = self.hostnames();
        let node = Arc::new(builder.build_single(&existing, &self.names)?);

        self.append(std::slice::from_ref(&node));
        tracing::info!(hostname = %node.hostname(), total = existing.len() + 1, "added node");
        Ok(node)
    }

    fn append(&self, batch: &[Arc<T>]) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(batch.iter().cloned());
    }

    /// `host:port` of every member inside the test network, comma-separated.
    pub fn internal_connection_string(&self) -> String {
        self.nodes()
            .iter()
            .map(|node| node.internal_address())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Looks a member up by exact hostname.
    pub fn node(&self, hostname: &str) -> Result<Arc<T>> {
        let nodes = self.nodes();
        nodes
            .iter()
            .find(|node| node.hostname() == hostname)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound {
                hostname: hostname.to_string(),
                known: nodes
                    .iter()
                    .map(|node| node.hostname().to_string())
                    .collect(),
            })
    }

    /// Looks a member up by exact ip.
    pub fn node_from_ip(&self, ip: &str) -> Result<Arc<T>> {
        let nodes = self.nodes();
        nodes
            .iter()
            .find(|node| node.ip().as_deref() == Some(ip))
            .cloned()
            .ok_or_else(|| Error::NodeIpNotFound {
                ip: ip.to_string(),
                known: nodes.iter().filter_map(|node| node.ip()).collect(),
            })
    }

    /// First member, in cluster order, whose predicate holds.
    ///
    /// Nothing is evaluated here. Each evaluation of the returned execution
    /// rescans the current members and builds fresh predicates, and fails
    /// with [`Error::NoMatchingNode`] when none holds.
    pub fn find_node_which<F>(&self, predicate: F) -> Execution<Arc<T>>
    where
        F: Fn(&Arc<T>) -> Execution<bool> + Send + Sync + 'static,
    {
        let members = Arc::clone(&self.nodes);
        Execution::new(move || {
            for node in snapshot(&members) {
                if predicate(&node).execute()? {
                    return Ok(node);
                }
            }
            Err(Error::NoMatchingNode {
                label: FIND_LABEL.to_string(),
            })
        })
        .labeled(FIND_LABEL)
    }

    /// Every member whose predicate holds, in cluster order. Lazy like
    /// [`Cluster::find_node_which`]; an empty result is not a failure.
    pub fn filter_nodes_with_condition<F>(&self, predicate: F) -> Execution<Vec<Arc<T>>>
    where
        F: Fn(&Arc<T>) -> Execution<bool> + Send + Sync + 'static,
    {
        let members = Arc::clone(&self.nodes);
        Execution::new(move || {
            let mut matching = Vec::new();
            for node in snapshot(&members) {
                if predicate(&node).execute()? {
                    matching.push(node);
                }
            }
            Ok(matching)
        })
        .labeled(FILTER_LABEL)
    }
}

impl<T: Node> fmt::Debug for Cluster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("nodes", &self.hostnames())
            .field("parallel", &self.parallel)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

async fn start_parallel<T: Node>(nodes: &[Arc<T>]) -> Result<()> {
    let handles: Vec<_> = nodes
        .iter()
        .map(|node| {
            let node = Arc::clone(node);
            tokio::spawn(async move { node.start().await })
        })
        .collect();

    let mut failures = Vec::new();
    for (node, handle) in nodes.iter().zip(handles) {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(anyhow::anyhow!("start task did not complete: {join_error}")),
        };

        match outcome {
            Ok(()) => tracing::debug!(hostname = %node.hostname(), "node started"),
            Err(error) => {
                tracing::warn!(
                    hostname = %node.hostname(),
                    error = %format!("{error:#}"),
                    "failed to start node"
                );
                failures.push(NodeFailure::new(node.hostname(), error));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::StartFailed(failures))
    }
}

async fn start_sequential<T: Node>(nodes: &[Arc<T>], settle_delay: Duration) -> Result<()> {
    for (position, node) in nodes.iter().enumerate() {
        if let Err(error) = node.start().await {
            tracing::warn!(
                hostname = %node.hostname(),
                error = %format!("{error:#}"),
                "failed to start node"
            );
            return Err(Error::StartFailed(vec![NodeFailure::new(
                node.hostname(),
                error,
            )]));
        }

        if position + 1 < nodes.len() {
            tracing::debug!(
                hostname = %node.hostname(),
                settle_ms = settle_delay.as_millis() as u64,
                "node started, settling"
            );
            tokio::time::sleep(settle_delay).await;
        } else {
            tracing::debug!(hostname = %node.hostname(), "node started");
        }
    }
    Ok(())
}
