//! Capability contracts for cluster members.

use async_trait::async_trait;

/// One member of a test cluster.
///
/// A node is constructed without identity, named once by the builder right
/// after construction, then started and cleared by its cluster. Start and
/// clear take `&self` because the cluster shares members with deferred
/// queries; implementations keep their runtime state (ip, handles) behind
/// interior mutability.
#[async_trait]
pub trait Node: Send + Sync + 'static {
    /// Hostname inside the test network. Empty until the builder names it.
    fn hostname(&self) -> &str;

    /// Assigns the hostname. Called exactly once by the node builder.
    fn set_hostname(&mut self, hostname: String);

    /// Address assigned by the node's own start logic, if started.
    fn ip(&self) -> Option<String>;

    /// Port the service listens on inside the test network.
    fn service_port(&self) -> u16;

    /// Brings the node up.
    async fn start(&self) -> anyhow::Result<()>;

    /// Stops the node and releases its resources.
    ///
    /// Must be safe to call before `start` or when the ip is still unknown.
    async fn clear(&self) -> anyhow::Result<()>;

    /// `{hostname}:{service_port}`, as seen by other members of the network.
    fn internal_address(&self) -> String {
        format!("{}:{}", self.hostname(), self.service_port())
    }
}

/// A node running in a container that may publish its service port on the host.
pub trait DockerNode: Node {
    /// Host-side port mapped to the service port, once the container runs.
    fn mapped_port(&self) -> Option<u16>;
}
