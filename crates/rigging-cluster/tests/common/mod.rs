//! Shared fixtures for the rigging-cluster integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use rigging_cluster::{DockerNode, Node};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::time::Instant;

/// Installs a test-writer subscriber once per test binary (`RUST_LOG` filters).
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Ordered record of lifecycle events across every node of a test.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<(String, &'static str, Instant)>>>,
}

impl Journal {
    fn record(&self, hostname: &str, event: &'static str) {
        self.events
            .lock()
            .unwrap()
            .push((hostname.to_string(), event, Instant::now()));
    }

    pub fn events(&self, kind: &str) -> Vec<(String, Instant)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event, _)| *event == kind)
            .map(|(hostname, _, at)| (hostname.clone(), *at))
            .collect()
    }

    pub fn hostnames(&self, kind: &str) -> Vec<String> {
        self.events(kind).into_iter().map(|(h, _)| h).collect()
    }
}

/// A container-like node that takes `boot_time` to start and gets an ip
/// derived from its position in the peer list it was built with.
#[derive(Debug)]
pub struct FakeNode {
    hostname: String,
    peers: Vec<String>,
    port: u16,
    mapped_port: Option<u16>,
    boot_time: Duration,
    journal: Journal,
    ip: Mutex<Option<String>>,
    ready: AtomicBool,
}

impl FakeNode {
    pub fn new(peers: &[String], port: u16, journal: &Journal) -> Self {
        Self {
            hostname: String::new(),
            peers: peers.to_vec(),
            port,
            mapped_port: None,
            boot_time: Duration::from_millis(100),
            journal: journal.clone(),
            ip: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_mapped_port(mut self, port: u16) -> Self {
        self.mapped_port = Some(port);
        self
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Node for FakeNode {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn set_hostname(&mut self, hostname: String) {
        self.hostname = hostname;
    }

    fn ip(&self) -> Option<String> {
        self.ip.lock().unwrap().clone()
    }

    fn service_port(&self) -> u16 {
        self.port
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.journal.record(&self.hostname, "start");
        tokio::time::sleep(self.boot_time).await;

        let position = self
            .peers
            .iter()
            .position(|peer| *peer == self.hostname)
            .ok_or_else(|| anyhow::anyhow!("{} is not among its peers", self.hostname))?;
        *self.ip.lock().unwrap() = Some(format!("172.18.0.{}", position + 2));

        self.journal.record(&self.hostname, "started");
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.ip.lock().unwrap() = None;
        self.ready.store(false, Ordering::SeqCst);
        self.journal.record(&self.hostname, "cleared");
        Ok(())
    }
}

impl DockerNode for FakeNode {
    fn mapped_port(&self) -> Option<u16> {
        self.mapped_port
    }
}
