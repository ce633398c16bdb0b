//! Host collaborators for the default config disabler
//!
//! The integration never reaches for ambient globals. Everything it needs from
//! the running Home Assistant instance is modelled here and handed to it as an
//! explicit [`HomeAssistant`] context:
//!
//! - [`ConfigEntries`] - per-instance configuration with update listeners
//! - [`ServiceRegistry`] - service calls such as `homeassistant.restart`
//! - [`IssueRegistry`] - actionable notices surfaced through repairs
//! - [`Storage`] - versioned JSON persistence under `.storage/`
//! - [`Integrations`] - the registration table of lifecycle handlers
//! - [`FlowManager`] - config, options and repair (fix) flows
//! - [`ComponentSetup`] - the backend that actually loads other components

pub mod components;
pub mod config_entries;
mod context;
mod error;
pub mod flows;
mod hass;
pub mod integration;
pub mod issues;
pub mod service;
pub mod storage;

pub use components::{ComponentSetup, RecordingComponentSetup};
pub use config_entries::{
    ConfigEntries, ConfigEntriesError, ConfigEntriesResult, ConfigEntry, ConfigEntryState,
    ListenerId, UpdateListener,
};
pub use context::Context;
pub use error::{HostError, HostResult};
pub use flows::{
    FlowError, FlowHandler, FlowInput, FlowKind, FlowManager, FlowResult, FlowResultType,
    FlowStepResult, FormField,
};
pub use hass::HomeAssistant;
pub use integration::{
    ConfigFlowFactory, FixFlowFactory, Integration, IntegrationError, IntegrationResult,
    Integrations, LifecycleEvent, LifecycleHandler, OptionsFlowFactory,
};
pub use issues::{Issue, IssueRegistry, IssueSeverity};
pub use service::{ServiceCall, ServiceError, ServiceRegistry, ServiceResult};
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

/// Global configuration as loaded from `configuration.yaml`
pub type ConfigType = serde_yaml::Value;

/// Domain of the core integration that owns the restart service
pub const HOMEASSISTANT_DOMAIN: &str = "homeassistant";

/// Service that restarts Home Assistant
pub const SERVICE_RESTART: &str = "restart";

/// Name of the main configuration file inside the config directory
pub const YAML_CONFIG_FILE: &str = "configuration.yaml";
