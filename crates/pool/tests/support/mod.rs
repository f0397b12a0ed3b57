//! Instrumented connector shared by the pool integration tests.
//!
//! Each test binary uses a different slice of this module.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use ballast_pool::{ConnectError, Connector};

/// In-memory connection with a serial number so tests can tell instances
/// apart.
#[derive(Debug)]
pub struct TestConn {
    pub serial: u64,
}

/// Connector whose behavior tests can flip at runtime.
#[derive(Clone, Default)]
pub struct TestConnector {
    connects: Arc<AtomicU64>,
    fail_connect: Arc<AtomicBool>,
    unhealthy: Arc<AtomicBool>,
}

impl TestConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful `connect` calls so far.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_connect.store(failing, Ordering::SeqCst);
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for TestConnector {
    type Conn = TestConn;

    async fn connect(&self) -> Result<Self::Conn, ConnectError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectError::new("backend unavailable"));
        }
        let serial = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TestConn { serial })
    }

    async fn check(&self, _conn: &Self::Conn) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }
}
