//! In-memory node used by the unit tests.

use crate::{DockerNode, Node};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct StubNode {
    hostname: String,
    port: u16,
    ip_on_start: Option<String>,
    ip: Mutex<Option<String>>,
    mapped_port: Option<u16>,
    fail_start: bool,
    fail_clear: bool,
    pub ready: AtomicBool,
    pub starts: AtomicUsize,
    pub clears: AtomicUsize,
}

impl StubNode {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn named(hostname: &str, port: u16) -> Self {
        let mut node = Self::new(port);
        node.set_hostname(hostname.to_string());
        node
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip_on_start = Some(ip.to_string());
        self
    }

    pub fn with_mapped_port(mut self, port: u16) -> Self {
        self.mapped_port = Some(port);
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_clear(mut self) -> Self {
        self.fail_clear = true;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Node for StubNode {
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
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            anyhow::bail!("refusing to start");
        }
        *self.ip.lock().unwrap() = self.ip_on_start.clone();
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        *self.ip.lock().unwrap() = None;
        if self.fail_clear {
            anyhow::bail!("refusing to clear");
        }
        Ok(())
    }
}

impl DockerNode for StubNode {
    fn mapped_port(&self) -> Option<u16> {
        self.mapped_port
    }
}
