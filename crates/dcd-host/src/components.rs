//! Component setup backend
//!
//! Components that are not registered as [`Integration`](crate::Integration)s
//! in this process (everything the default bundle would pull in: `stream`,
//! `backup`, `zeroconf`, ...) are handed to a [`ComponentSetup`]
//! implementation. A real host loads them; tools and tests record them.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::ConfigType;

/// Loads a component that has no in-process integration
#[async_trait]
pub trait ComponentSetup: Send + Sync {
    /// Set up `domain` with the global configuration, returning success
    async fn setup_component(&self, domain: &str, config: &ConfigType) -> bool;
}

/// Setup backend that only records which components were requested
#[derive(Debug, Default)]
pub struct RecordingComponentSetup {
    requested: Mutex<Vec<String>>,
}

impl RecordingComponentSetup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Components requested so far, in request order
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ComponentSetup for RecordingComponentSetup {
    async fn setup_component(&self, domain: &str, _config: &ConfigType) -> bool {
        info!(domain = %domain, "Setting up component");
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(domain.to_string());
        }
        true
    }
}
