//! Integration registration table
//!
//! Instead of discovering entry points by name at runtime, an integration
//! hands the host an [`Integration`] value at startup: a table from
//! [`LifecycleEvent`] to handler, plus the flow factories it supports.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::debug;

use crate::config_entries::ConfigEntry;
use crate::flows::FlowHandler;
use crate::{ConfigType, HomeAssistant};

/// Error returned by integration handlers
pub type IntegrationError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a lifecycle handler; `Ok(false)` means "not set up"
pub type IntegrationResult = Result<bool, IntegrationError>;

/// Handler for the global setup event
pub type SetupFn =
    Arc<dyn Fn(Arc<HomeAssistant>, ConfigType) -> BoxFuture<'static, IntegrationResult> + Send + Sync>;

/// Handler for per-entry events
pub type EntryFn =
    Arc<dyn Fn(Arc<HomeAssistant>, ConfigEntry) -> BoxFuture<'static, IntegrationResult> + Send + Sync>;

/// Creates the config flow of an integration
pub type ConfigFlowFactory = Arc<dyn Fn() -> Box<dyn FlowHandler> + Send + Sync>;

/// Creates the options flow for a config entry
pub type OptionsFlowFactory = Arc<dyn Fn(&ConfigEntry) -> Box<dyn FlowHandler> + Send + Sync>;

/// Creates the fix flow for an issue, given its id and data
pub type FixFlowFactory =
    Arc<dyn Fn(&str, Option<&serde_json::Value>) -> Box<dyn FlowHandler> + Send + Sync>;

/// Lifecycle events an integration can handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Global setup with the YAML configuration
    Setup,
    /// A config entry is being set up
    SetupEntry,
    /// A config entry is being unloaded
    UnloadEntry,
}

/// A registered lifecycle handler
#[derive(Clone)]
pub enum LifecycleHandler {
    Setup(SetupFn),
    Entry(EntryFn),
}

/// An integration's registration table
#[derive(Clone)]
pub struct Integration {
    domain: String,
    handlers: HashMap<LifecycleEvent, LifecycleHandler>,
    config_flow: Option<ConfigFlowFactory>,
    options_flow: Option<OptionsFlowFactory>,
    fix_flow: Option<FixFlowFactory>,
}

impl Integration {
    /// Start an empty table for `domain`
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            handlers: HashMap::new(),
            config_flow: None,
            options_flow: None,
            fix_flow: None,
        }
    }

    /// Handle [`LifecycleEvent::Setup`]
    pub fn on_setup<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<HomeAssistant>, ConfigType) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IntegrationResult> + Send + 'static,
    {
        let handler: SetupFn = Arc::new(move |hass, config| {
            Box::pin(handler(hass, config)) as BoxFuture<'static, IntegrationResult>
        });
        self.handlers
            .insert(LifecycleEvent::Setup, LifecycleHandler::Setup(handler));
        self
    }

    /// Handle [`LifecycleEvent::SetupEntry`]
    pub fn on_setup_entry<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Arc<HomeAssistant>, ConfigEntry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IntegrationResult> + Send + 'static,
    {
        self.on_entry_event(LifecycleEvent::SetupEntry, handler)
    }

    /// Handle [`LifecycleEvent::UnloadEntry`]
    pub fn on_unload_entry<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Arc<HomeAssistant>, ConfigEntry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IntegrationResult> + Send + 'static,
    {
        self.on_entry_event(LifecycleEvent::UnloadEntry, handler)
    }

    fn on_entry_event<F, Fut>(mut self, event: LifecycleEvent, handler: F) -> Self
    where
        F: Fn(Arc<HomeAssistant>, ConfigEntry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IntegrationResult> + Send + 'static,
    {
        let handler: EntryFn = Arc::new(move |hass, entry| {
            Box::pin(handler(hass, entry)) as BoxFuture<'static, IntegrationResult>
        });
        self.handlers.insert(event, LifecycleHandler::Entry(handler));
        self
    }

    pub fn with_config_flow(mut self, factory: ConfigFlowFactory) -> Self {
        self.config_flow = Some(factory);
        self
    }

    pub fn with_options_flow(mut self, factory: OptionsFlowFactory) -> Self {
        self.options_flow = Some(factory);
        self
    }

    pub fn with_fix_flow(mut self, factory: FixFlowFactory) -> Self {
        self.fix_flow = Some(factory);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Look up the handler for an event
    pub fn handler(&self, event: LifecycleEvent) -> Option<&LifecycleHandler> {
        self.handlers.get(&event)
    }

    pub fn config_flow(&self) -> Option<&ConfigFlowFactory> {
        self.config_flow.as_ref()
    }

    pub fn options_flow(&self) -> Option<&OptionsFlowFactory> {
        self.options_flow.as_ref()
    }

    pub fn fix_flow(&self) -> Option<&FixFlowFactory> {
        self.fix_flow.as_ref()
    }
}

impl fmt::Debug for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.handlers.keys().collect();
        events.sort_by_key(|e| format!("{:?}", e));
        f.debug_struct("Integration")
            .field("domain", &self.domain)
            .field("events", &events)
            .field("config_flow", &self.config_flow.is_some())
            .field("options_flow", &self.options_flow.is_some())
            .field("fix_flow", &self.fix_flow.is_some())
            .finish()
    }
}

/// All integrations registered with the host, by domain
#[derive(Default)]
pub struct Integrations {
    by_domain: DashMap<String, Arc<Integration>>,
}

impl Integrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integration, replacing any previous one for the domain
    pub fn register(&self, integration: Integration) {
        debug!("Registered integration: {:?}", integration);
        self.by_domain
            .insert(integration.domain.clone(), Arc::new(integration));
    }

    pub fn get(&self, domain: &str) -> Option<Arc<Integration>> {
        self.by_domain.get(domain).map(|r| r.value().clone())
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.by_domain.contains_key(domain)
    }
}
