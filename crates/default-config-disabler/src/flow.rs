//! Config flow and options flow

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dcd_host::{
    ConfigEntry, FlowError, FlowHandler, FlowInput, FlowResult, FlowStepResult, FormField,
    HomeAssistant,
};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::catalog::{disabled_components, pristine_components, ComponentName, DisabledSet};
use crate::consts::{CONF_COMPONENTS_TO_DISABLE, DOMAIN, TITLE};

static COMPONENT_NAME: OnceLock<Regex> = OnceLock::new();

fn component_name_pattern() -> &'static Regex {
    COMPONENT_NAME.get_or_init(|| Regex::new(r"^[a-z0-9_]+$").expect("valid regex"))
}

/// Parse the submitted component list
///
/// Returns `None` unless the value is a list of well-formed domains.
fn parse_components(value: Option<&Value>) -> Option<DisabledSet> {
    let items = match value {
        None => return Some(DisabledSet::new()),
        Some(value) => value.as_array()?,
    };

    items
        .iter()
        .map(|item| {
            item.as_str()
                .filter(|name| component_name_pattern().is_match(name))
                .map(ComponentName::from)
        })
        .collect()
}

/// Single-instance config flow
#[derive(Debug, Default)]
pub struct DisablerConfigFlow;

#[async_trait]
impl FlowHandler for DisablerConfigFlow {
    fn initial_step(&self) -> &'static str {
        "user"
    }

    async fn async_step(
        &mut self,
        hass: &Arc<HomeAssistant>,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> FlowStepResult {
        if step_id != "user" {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }

        if !hass.config_entries().get_by_domain(DOMAIN).is_empty() {
            return Ok(FlowResult::abort("single_instance_allowed"));
        }

        match user_input {
            None => Ok(FlowResult::form("user", Vec::new())),
            Some(_) => Ok(FlowResult::create_entry(TITLE, FlowInput::new())),
        }
    }
}

/// Options flow choosing the components to disable
#[derive(Debug)]
pub struct DisablerOptionsFlow {
    bundle_dir: PathBuf,
    current: DisabledSet,
}

impl DisablerOptionsFlow {
    pub fn new(bundle_dir: impl Into<PathBuf>, entry: &ConfigEntry) -> Self {
        Self {
            bundle_dir: bundle_dir.into(),
            current: disabled_components(entry),
        }
    }

    async fn async_step_init(
        &mut self,
        hass: &Arc<HomeAssistant>,
        user_input: Option<FlowInput>,
    ) -> FlowStepResult {
        let mut errors = HashMap::new();

        if let Some(input) = user_input {
            match parse_components(input.get(CONF_COMPONENTS_TO_DISABLE)) {
                Some(disabled) => {
                    debug!("Components to disable: {:?}", disabled);
                    let mut data = FlowInput::new();
                    data.insert(
                        CONF_COMPONENTS_TO_DISABLE.to_string(),
                        serde_json::json!(disabled),
                    );
                    return Ok(FlowResult::create_entry("", data));
                }
                None => {
                    errors.insert(
                        CONF_COMPONENTS_TO_DISABLE.to_string(),
                        "invalid_component".to_string(),
                    );
                }
            }
        }

        let catalog = pristine_components(hass, &self.bundle_dir)
            .await
            .map_err(|e| FlowError::Handler(Box::new(e)))?;

        let field = FormField::multi_select(
            CONF_COMPONENTS_TO_DISABLE,
            catalog.iter().map(ToString::to_string).collect(),
            self.current.iter().map(ToString::to_string).collect(),
        );
        let form = FlowResult::form("init", vec![field]);

        if errors.is_empty() {
            Ok(form)
        } else {
            Ok(form.with_errors(errors))
        }
    }
}

#[async_trait]
impl FlowHandler for DisablerOptionsFlow {
    async fn async_step(
        &mut self,
        hass: &Arc<HomeAssistant>,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> FlowStepResult {
        match step_id {
            "init" => self.async_step_init(hass, user_input).await,
            other => Err(FlowError::UnknownStep(other.to_string())),
        }
    }
}
