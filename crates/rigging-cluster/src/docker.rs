//! Clusters of containerized nodes reachable from the host.

use crate::{Cluster, DockerNode};
use rigging_config::DockerSettings;
use std::ops::{Deref, DerefMut};

/// A [`Cluster`] whose members may publish their service port on the host.
///
/// Dereferences to the generic cluster, so lifecycle and queries are the
/// same; this type only adds host-side addressing.
#[derive(Debug)]
pub struct DockerCluster<T: DockerNode> {
    cluster: Cluster<T>,
    external_host: String,
}

impl<T: DockerNode> DockerCluster<T> {
    pub fn new(cluster: Cluster<T>, external_host: impl Into<String>) -> Self {
        Self {
            cluster,
            external_host: external_host.into(),
        }
    }

    pub fn from_settings(cluster: Cluster<T>, settings: &DockerSettings) -> Self {
        Self::new(cluster, settings.external_host.clone())
    }

    pub fn external_host(&self) -> &str {
        &self.external_host
    }

    /// `external_host:mapped_port` of every member that has a mapped port,
    /// comma-separated, in cluster order.
    pub fn external_connection_string(&self) -> String {
        self.cluster
            .nodes()
            .iter()
            .filter_map(|node| node.mapped_port())
            .map(|port| format!("{}:{port}", self.external_host))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn into_inner(self) -> Cluster<T> {
        self.cluster
    }
}

impl<T: DockerNode> Deref for DockerCluster<T> {
    type Target = Cluster<T>;

    fn deref(&self) -> &Self::Target {
        &self.cluster
    }
}

impl<T: DockerNode> DerefMut for DockerCluster<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.cluster
    }
}
