//! Staged node builders.
//!
//! A builder is specified in steps, `nodes(n)` or `one_node()`, then
//! `named(prefix)`, then `constructed_like(template)`, and only the last
//! step yields something a cluster can build from. Building is two-phase:
//! every hostname of the batch is allocated first, then each node is
//! constructed with the full list of names (existing members followed by
//! the new batch) so it can refer to its future peers, and finally named.
//!
//! ```ignore
//! let brokers = builder::nodes(3)
//!     .named("kafka")
//!     .constructed_like(|names| KafkaNode::new(names.join(",")));
//! cluster.add(brokers)?;
//! ```

use crate::{Error, NameAllocator, Node, Result};
use std::fmt;

/// Construction template: receives every hostname of the cluster-to-be.
pub type Template<T> = Box<dyn Fn(&[String]) -> T + Send + Sync>;

/// Starts a builder for `count` nodes.
pub fn nodes(count: usize) -> NodeCount {
    NodeCount { count }
}

/// Starts a builder for exactly one node.
pub fn one_node() -> OneNode {
    OneNode
}

/// First step of a multi-node builder: the count is known.
#[derive(Debug, Clone, Copy)]
pub struct NodeCount {
    count: usize,
}

impl NodeCount {
    /// Sets the hostname prefix; nodes are named `{prefix}-{index}`.
    pub fn named(self, prefix: impl Into<String>) -> NamedNodes {
        NamedNodes {
            count: self.count,
            prefix: prefix.into(),
        }
    }
}

/// Second step of a multi-node builder: count and prefix are known.
#[derive(Debug, Clone)]
pub struct NamedNodes {
    count: usize,
    prefix: String,
}

impl NamedNodes {
    /// Supplies the construction template and completes the builder.
    pub fn constructed_like<T, F>(self, template: F) -> NodeBuilder<T>
    where
        T: Node,
        F: Fn(&[String]) -> T + Send + Sync + 'static,
    {
        NodeBuilder {
            count: self.count,
            prefix: self.prefix,
            template: Box::new(template),
        }
    }
}

/// First step of a single-node builder.
#[derive(Debug, Clone, Copy)]
pub struct OneNode;

impl OneNode {
    pub fn named(self, prefix: impl Into<String>) -> NamedNode {
        NamedNode {
            prefix: prefix.into(),
        }
    }
}

/// Second step of a single-node builder.
#[derive(Debug, Clone)]
pub struct NamedNode {
    prefix: String,
}

impl NamedNode {
    pub fn constructed_like<T, F>(self, template: F) -> SingleNodeBuilder<T>
    where
        T: Node,
        F: Fn(&[String]) -> T + Send + Sync + 'static,
    {
        SingleNodeBuilder {
            inner: NodeBuilder {
                count: 1,
                prefix: self.prefix,
                template: Box::new(template),
            },
        }
    }
}

/// Fully specified builder for a batch of nodes.
pub struct NodeBuilder<T> {
    count: usize,
    prefix: String,
    template: Template<T>,
}

impl<T: Node> NodeBuilder<T> {
    /// Number of nodes each `build` produces.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Hostname prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Allocates fresh names and constructs a new batch of named nodes.
    ///
    /// `existing` are the hostnames already in the cluster; they come first
    /// in the name list handed to the template. Every call allocates new
    /// names, so calling twice yields two distinct batches.
    pub fn build(&self, existing: &[String], names: &NameAllocator) -> Result<Vec<T>> {
        if self.count == 0 {
            return Err(Error::InvalidNodeCount {
                prefix: self.prefix.clone(),
                count: self.count,
            });
        }

        // Phase 1: every name of the batch exists before any node does.
        let new_names = names.next_names(&self.prefix, self.count);
        let mut full_names = Vec::with_capacity(existing.len() + new_names.len());
        full_names.extend_from_slice(existing);
        full_names.extend(new_names.iter().cloned());

        // Phase 2: construct, then name.
        let nodes = new_names
            .into_iter()
            .map(|hostname| {
                let mut node = (self.template)(&full_names);
                node.set_hostname(hostname);
                node
            })
            .collect();

        Ok(nodes)
    }
}

impl<T> fmt::Debug for NodeBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBuilder")
            .field("count", &self.count)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Fully specified builder for exactly one node.
pub struct SingleNodeBuilder<T> {
    inner: NodeBuilder<T>,
}

impl<T: Node> SingleNodeBuilder<T> {
    pub fn prefix(&self) -> &str {
        self.inner.prefix()
    }

    /// Builds exactly one named node.
    pub fn build_single(&self, existing: &[String], names: &NameAllocator) -> Result<T> {
        if self.inner.count == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "single-node builder for prefix {} resolves to zero nodes",
                self.inner.prefix
            )));
        }

        self.inner
            .build(existing, names)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "single-node builder for prefix {} produced no node",
                    self.inner.prefix
                ))
            })
    }
}

impl<T> fmt::Debug for SingleNodeBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleNodeBuilder")
            .field("prefix", &self.inner.prefix)
            .finish_non_exhaustive()
    }
}
