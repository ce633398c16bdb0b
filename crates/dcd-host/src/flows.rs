//! Data entry flows
//!
//! Config flows create entries, options flows edit an entry's options, and
//! fix (repair) flows resolve an issue. All three are driven the same way:
//! the host calls the flow's current step with the user's input and acts on
//! the returned [`FlowResult`]:
//!
//! - `form` - show the form for `step_id`, wait for the next submission
//! - `create_entry` - finish: add the entry / store the options / delete the issue
//! - `abort` - finish without changes

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use ulid::Ulid;

use crate::config_entries::ConfigEntry;
use crate::error::{HostError, HostResult};
use crate::HomeAssistant;

/// User input submitted to a step
pub type FlowInput = serde_json::Map<String, serde_json::Value>;

/// Result of a single step
pub type FlowStepResult = Result<FlowResult, FlowError>;

/// Flow errors
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow not found: {0}")]
    UnknownFlow(String),

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("{domain} does not provide a {kind} flow")]
    NotSupported { domain: String, kind: &'static str },

    #[error("issue not found: {domain}.{issue_id}")]
    UnknownIssue { domain: String, issue_id: String },

    #[error("issue {domain}.{issue_id} is not fixable")]
    NotFixable { domain: String, issue_id: String },

    /// The step handler itself failed
    #[error("flow step failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Kind of result returned by a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResultType {
    Form,
    CreateEntry,
    Abort,
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Choices for select fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FormField {
    /// A multi-select field offering `options`
    pub fn multi_select(
        name: impl Into<String>,
        options: Vec<String>,
        default: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type: "multi_select".to_string(),
            required: Some(false),
            default: Some(serde_json::json!(default)),
            options,
        }
    }
}

/// Result of a flow step
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    /// Flow ID, filled in by the [`FlowManager`]
    pub flow_id: String,
    /// Handler (integration domain), filled in by the [`FlowManager`]
    pub handler: String,
    #[serde(rename = "type")]
    pub result_type: FlowResultType,
    /// Current step ID (for form type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Data schema for the form, empty if no fields
    pub data_schema: Vec<FormField>,
    /// Errors from the previous submission
    pub errors: Option<HashMap<String, String>>,
    /// Title (for create_entry type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Abort reason (for abort type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Entry data or options (for create_entry type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<FlowInput>,
}

impl FlowResult {
    fn empty(result_type: FlowResultType) -> Self {
        Self {
            flow_id: String::new(),
            handler: String::new(),
            result_type,
            step_id: None,
            data_schema: Vec::new(),
            errors: None,
            title: None,
            reason: None,
            data: None,
        }
    }

    /// Show a form for `step_id`
    pub fn form(step_id: impl Into<String>, data_schema: Vec<FormField>) -> Self {
        Self {
            step_id: Some(step_id.into()),
            data_schema,
            ..Self::empty(FlowResultType::Form)
        }
    }

    /// Finish the flow with `data`
    pub fn create_entry(title: impl Into<String>, data: FlowInput) -> Self {
        Self {
            title: Some(title.into()),
            data: Some(data),
            ..Self::empty(FlowResultType::CreateEntry)
        }
    }

    /// Finish the flow without changes
    pub fn abort(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::empty(FlowResultType::Abort)
        }
    }

    /// Attach per-field errors to a form
    pub fn with_errors(mut self, errors: HashMap<String, String>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.result_type != FlowResultType::Form
    }
}

/// A flow implementation provided by an integration
#[async_trait]
pub trait FlowHandler: Send + Sync {
    /// Step the host calls when the flow starts
    fn initial_step(&self) -> &'static str {
        "init"
    }

    /// Run `step_id` with the submitted input (`None` on first display)
    async fn async_step(
        &mut self,
        hass: &Arc<HomeAssistant>,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> FlowStepResult;
}

/// What a flow acts on when it finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowKind {
    /// Creates a config entry for the handler domain
    Config,
    /// Stores options of an existing entry
    Options { entry_id: String },
    /// Resolves an issue of the handler domain
    Repair { issue_id: String },
}

struct ActiveFlow {
    handler: String,
    kind: FlowKind,
    step_id: String,
    flow: Box<dyn FlowHandler>,
}

/// Tracks flows in progress and applies their results
#[derive(Default)]
pub struct FlowManager {
    flows: DashMap<String, ActiveFlow>,
}

impl FlowManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the config flow of `domain`
    pub async fn start_config_flow(
        &self,
        hass: &Arc<HomeAssistant>,
        domain: &str,
    ) -> HostResult<FlowResult> {
        let integration = hass
            .integrations()
            .get(domain)
            .ok_or_else(|| HostError::IntegrationNotFound(domain.to_string()))?;
        let factory = integration.config_flow().ok_or_else(|| FlowError::NotSupported {
            domain: domain.to_string(),
            kind: "config",
        })?;

        self.start(hass, domain, FlowKind::Config, factory()).await
    }

    /// Start the options flow of a config entry
    pub async fn start_options_flow(
        &self,
        hass: &Arc<HomeAssistant>,
        entry_id: &str,
    ) -> HostResult<FlowResult> {
        let entry: ConfigEntry = hass.config_entries().get(entry_id).ok_or_else(|| {
            HostError::ConfigEntries(crate::ConfigEntriesError::NotFound(entry_id.to_string()))
        })?;
        let integration = hass
            .integrations()
            .get(&entry.domain)
            .ok_or_else(|| HostError::IntegrationNotFound(entry.domain.clone()))?;
        let factory = integration.options_flow().ok_or_else(|| FlowError::NotSupported {
            domain: entry.domain.clone(),
            kind: "options",
        })?;

        let kind = FlowKind::Options {
            entry_id: entry_id.to_string(),
        };
        self.start(hass, &entry.domain, kind, factory(&entry)).await
    }

    /// Start the fix flow of an issue
    pub async fn start_fix_flow(
        &self,
        hass: &Arc<HomeAssistant>,
        domain: &str,
        issue_id: &str,
    ) -> HostResult<FlowResult> {
        let issue = hass
            .issues()
            .get(domain, issue_id)
            .ok_or_else(|| FlowError::UnknownIssue {
                domain: domain.to_string(),
                issue_id: issue_id.to_string(),
            })?;
        if !issue.is_fixable {
            return Err(FlowError::NotFixable {
                domain: domain.to_string(),
                issue_id: issue_id.to_string(),
            }
            .into());
        }

        let integration = hass
            .integrations()
            .get(domain)
            .ok_or_else(|| HostError::IntegrationNotFound(domain.to_string()))?;
        let factory = integration.fix_flow().ok_or_else(|| FlowError::NotSupported {
            domain: domain.to_string(),
            kind: "fix",
        })?;

        let flow = factory(issue_id, issue.data.as_ref());
        let kind = FlowKind::Repair {
            issue_id: issue_id.to_string(),
        };
        self.start(hass, domain, kind, flow).await
    }

    /// Submit input to the current step of a flow
    pub async fn progress(
        &self,
        hass: &Arc<HomeAssistant>,
        flow_id: &str,
        user_input: Option<FlowInput>,
    ) -> HostResult<FlowResult> {
        // Take the flow out of the map so no shard lock is held across the step
        let (_, active) = self
            .flows
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;

        let step_id = active.step_id.clone();
        self.run_step(hass, flow_id.to_string(), active, &step_id, user_input)
            .await
    }

    /// Number of flows waiting for input
    pub fn in_progress(&self) -> usize {
        self.flows.len()
    }

    async fn start(
        &self,
        hass: &Arc<HomeAssistant>,
        handler: &str,
        kind: FlowKind,
        flow: Box<dyn FlowHandler>,
    ) -> HostResult<FlowResult> {
        let flow_id = Ulid::new().to_string();
        let step_id = flow.initial_step().to_string();
        debug!(handler = %handler, flow_id = %flow_id, ?kind, "Starting flow");

        let active = ActiveFlow {
            handler: handler.to_string(),
            kind,
            step_id: step_id.clone(),
            flow,
        };
        self.run_step(hass, flow_id, active, &step_id, None).await
    }

    async fn run_step(
        &self,
        hass: &Arc<HomeAssistant>,
        flow_id: String,
        mut active: ActiveFlow,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> HostResult<FlowResult> {
        let mut result = active.flow.async_step(hass, step_id, user_input).await?;
        result.flow_id = flow_id.clone();
        result.handler = active.handler.clone();

        match result.result_type {
            FlowResultType::Form => {
                if let Some(ref next) = result.step_id {
                    active.step_id = next.clone();
                }
                self.flows.insert(flow_id, active);
            }
            FlowResultType::CreateEntry => {
                self.finish(hass, &active, &result).await?;
            }
            FlowResultType::Abort => {
                debug!(flow_id = %flow_id, reason = ?result.reason, "Flow aborted");
            }
        }
        Ok(result)
    }

    async fn finish(
        &self,
        hass: &Arc<HomeAssistant>,
        active: &ActiveFlow,
        result: &FlowResult,
    ) -> HostResult<()> {
        let data: HashMap<String, serde_json::Value> = result
            .data
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        match &active.kind {
            FlowKind::Config => {
                let title = result.title.clone().unwrap_or_default();
                let entry = ConfigEntry::new(&active.handler, title).with_data(data);
                hass.add_entry(entry).await?;
            }
            FlowKind::Options { entry_id } => {
                hass.update_entry_options(entry_id, data).await?;
            }
            FlowKind::Repair { issue_id } => {
                hass.issues().delete(&active.handler, issue_id);
                info!(domain = %active.handler, issue_id = %issue_id, "Issue repaired");
            }
        }
        Ok(())
    }
}
