//! Test-cluster topology management.
//!
//! Models a cluster of test infrastructure nodes for integration tests:
//! - Unique, per-prefix hostname allocation
//! - Staged builders that name a whole batch before constructing any node
//! - Parallel or throttled sequential start, ordered teardown
//! - Lookups and lazy, re-evaluable predicate queries over the membership
//!
//! ```ignore
//! let mut cluster = Cluster::empty(true);
//! cluster.add(
//!     builder::nodes(3)
//!         .named("broker")
//!         .constructed_like(|names| Broker::new(names.to_vec())),
//! )?;
//! cluster.start().await?;
//!
//! let leader = cluster
//!     .find_node_which(|node| node.is_leader())
//!     .retry_async(&RetryPolicy::default())
//!     .await?;
//! ```

pub mod builder;
pub mod cluster;
pub mod docker;
pub mod error;
pub mod execution;
pub mod names;
pub mod node;
pub mod process;

#[cfg(test)]
mod testing;

pub use builder::{NodeBuilder, SingleNodeBuilder, nodes, one_node};
pub use cluster::{Cluster, DEFAULT_SETTLE_DELAY, NoHooks, StartHooks};
pub use docker::DockerCluster;
pub use error::{Error, HookStage, NodeFailure, Result};
pub use execution::{Execution, RetryPolicy};
pub use names::NameAllocator;
pub use node::{DockerNode, Node};
pub use process::{NodeStatus, ProcessNode, ProcessSpec};

use rigging_config::RiggingConfig;

/// Creates an empty cluster using the loaded configuration's start policy.
pub fn cluster_from_config<T: Node>(config: &RiggingConfig) -> Cluster<T> {
    Cluster::from_settings(Vec::new(), &config.cluster)
}

/// Creates an empty docker cluster using the loaded configuration.
pub fn docker_cluster_from_config<T: DockerNode>(config: &RiggingConfig) -> DockerCluster<T> {
    DockerCluster::from_settings(cluster_from_config(config), &config.docker)
}
