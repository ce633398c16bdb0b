//! Restart-required repair

use std::sync::Arc;

use async_trait::async_trait;
use dcd_host::{
    FlowError, FlowHandler, FlowInput, FlowResult, FlowStepResult, HomeAssistant, Issue,
    IssueSeverity, HOMEASSISTANT_DOMAIN, SERVICE_RESTART,
};
use tracing::info;

use crate::consts::{DOMAIN, ISSUE_RESTART_REQUIRED};

/// Raise the restart-required issue; re-raising keeps a single issue
pub fn create_restart_issue(hass: &HomeAssistant) {
    hass.issues().create(
        Issue::new(DOMAIN, ISSUE_RESTART_REQUIRED)
            .fixable(true)
            .severity(IssueSeverity::Warning)
            .translation_key(ISSUE_RESTART_REQUIRED),
    );
}

pub fn delete_restart_issue(hass: &HomeAssistant) {
    hass.issues().delete(DOMAIN, ISSUE_RESTART_REQUIRED);
}

/// Fix flow asking the user to confirm a restart
#[derive(Debug, Default)]
pub struct RestartRequiredFixFlow;

impl RestartRequiredFixFlow {
    pub fn new() -> Self {
        Self
    }

    async fn async_step_confirm(
        &mut self,
        hass: &Arc<HomeAssistant>,
        user_input: Option<FlowInput>,
    ) -> FlowStepResult {
        if user_input.is_none() {
            return Ok(FlowResult::form("confirm", Vec::new()));
        }

        info!("Restart confirmed, restarting Home Assistant");
        hass.call_service(HOMEASSISTANT_DOMAIN, SERVICE_RESTART, serde_json::json!({}))
            .await
            .map_err(|e| FlowError::Handler(Box::new(e)))?;
        Ok(FlowResult::create_entry("", FlowInput::new()))
    }
}

#[async_trait]
impl FlowHandler for RestartRequiredFixFlow {
    async fn async_step(
        &mut self,
        hass: &Arc<HomeAssistant>,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> FlowStepResult {
        match step_id {
            "init" => self.async_step_confirm(hass, None).await,
            "confirm" => self.async_step_confirm(hass, user_input).await,
            other => Err(FlowError::UnknownStep(other.to_string())),
        }
    }
}
