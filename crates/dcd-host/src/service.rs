//! Service calls and the registry that routes them
//!
//! The only service the integration calls is `homeassistant.restart`, but the
//! registry is generic: the host (or a test) registers whatever handler should
//! run for a `domain.service` pair.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::context::Context;

/// Result type for service calls
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> BoxFuture<'static, ServiceResult> + Send + Sync>;

/// Errors that can occur when calling services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),
}

/// A call to a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g., "homeassistant")
    pub domain: String,

    /// The service name (e.g., "restart")
    pub service: String,

    /// Data passed to the service
    pub service_data: serde_json::Value,

    /// Context tracking who initiated this call
    pub context: Context,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Get the full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }
}

/// Registry of service handlers keyed by `domain.service`
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceHandler>,
}

impl ServiceRegistry {
    /// Create a new empty service registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous handler for the same service
    #[instrument(skip(self, domain, service, handler))]
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let domain = domain.into();
        let service = service.into();
        debug!(domain = %domain, service = %service, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as BoxFuture<'static, ServiceResult>);
        self.services
            .insert(format!("{}.{}", domain, service), handler);
    }

    /// Call a service
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        // Clone the handler out so the map shard is not locked across the await
        let handler = self
            .services
            .get(&key)
            .map(|h| h.value().clone())
            .ok_or_else(|| {
                warn!(domain = %domain, service = %service, "Service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;

        debug!(domain = %domain, service = %service, "Calling service");
        handler(ServiceCall::new(domain, service, service_data, context)).await
    }

    /// Check if a service exists
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    /// Unregister a service, returning whether it was registered
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        self.services
            .remove(&format!("{}.{}", domain, service))
            .is_some()
    }
}
