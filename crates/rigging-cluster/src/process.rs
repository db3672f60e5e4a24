//! A node backed by a local child process.

use crate::Node;
use anyhow::{Context, bail};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::sleep;

/// How long `clear` waits for a killed process to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Status of a process-backed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Node is stopped.
    Stopped,

    /// Node is starting up.
    Starting,

    /// Node is running normally.
    Running,

    /// Node has crashed.
    Crashed,
}

/// What to run for each node.
///
/// Arguments may contain `{hostname}`, `{port}` and `{peers}` (the full,
/// comma-separated name list the builder handed to the node).
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub service_port: u16,
    /// The process must still be alive after this long for start to succeed.
    pub startup_grace: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, service_port: u16) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            service_port,
            startup_grace: Duration::from_millis(200),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }
}

struct ProcessState {
    child: Option<Child>,
    status: NodeStatus,
}

impl ProcessState {
    fn is_alive(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

/// A cluster member that runs as a child process on the test host.
pub struct ProcessNode {
    spec: ProcessSpec,
    hostname: String,
    peers: Vec<String>,
    state: tokio::sync::Mutex<ProcessState>,
    ip: Mutex<Option<String>>,
}

impl ProcessNode {
    /// Creates a node (not started, not yet named).
    pub fn new(spec: ProcessSpec, peers: Vec<String>) -> Self {
        Self {
            spec,
            hostname: String::new(),
            peers,
            state: tokio::sync::Mutex::new(ProcessState {
                child: None,
                status: NodeStatus::Stopped,
            }),
            ip: Mutex::new(None),
        }
    }

    /// Construction template for the staged builder.
    pub fn template(spec: ProcessSpec) -> impl Fn(&[String]) -> Self + Send + Sync + 'static {
        move |names| Self::new(spec.clone(), names.to_vec())
    }

    /// Names of every node known when this one was built, itself included.
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Current status, noticing a process that died since it started.
    pub async fn status(&self) -> NodeStatus {
        let mut state = self.state.lock().await;
        if state.status == NodeStatus::Running && !state.is_alive() {
            state.status = NodeStatus::Crashed;
        }
        state.status
    }

    fn render(&self, arg: &str) -> String {
        arg.replace("{hostname}", &self.hostname)
            .replace("{port}", &self.spec.service_port.to_string())
            .replace("{peers}", &self.peers.join(","))
    }

    fn set_ip(&self, ip: Option<String>) {
        *self.ip.lock().unwrap_or_else(PoisonError::into_inner) = ip;
    }
}

#[async_trait]
impl Node for ProcessNode {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn set_hostname(&mut self, hostname: String) {
        self.hostname = hostname;
    }

    fn ip(&self) -> Option<String> {
        self.ip.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn service_port(&self) -> u16 {
        self.spec.service_port
    }

    async fn start(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.is_alive() {
            bail!("node {} is already running", self.hostname);
        }

        state.status = NodeStatus::Starting;
        let args: Vec<String> = self.spec.args.iter().map(|arg| self.render(arg)).collect();

        let child = Command::new(&self.spec.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!("failed to spawn {} for node {}", self.spec.program, self.hostname)
            });
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                state.status = NodeStatus::Crashed;
                return Err(e);
            }
        };
        state.child = Some(child);

        sleep(self.spec.startup_grace).await;

        if state.is_alive() {
            state.status = NodeStatus::Running;
            self.set_ip(Some("127.0.0.1".to_string()));
            tracing::debug!(hostname = %self.hostname, program = %self.spec.program, "process started");
            Ok(())
        } else {
            state.status = NodeStatus::Crashed;
            state.child = None;
            bail!(
                "{} for node {} exited during startup",
                self.spec.program,
                self.hostname
            )
        }
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        self.set_ip(None);

        let Some(mut child) = state.child.take() else {
            state.status = NodeStatus::Stopped;
            return Ok(());
        };

        // Already-exited processes make kill fail; reaping below still applies.
        child.start_kill().ok();
        let reaped = tokio::time::timeout(REAP_TIMEOUT, child.wait()).await;
        state.status = NodeStatus::Stopped;

        match reaped {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e).with_context(|| format!("failed to reap node {}", self.hostname)),
            Err(_) => {
                tracing::warn!(hostname = %self.hostname, "process not reaped in time");
                Ok(())
            }
        }
    }
}
