//! Subcommand implementations
//!
//! Every command starts a [`Host`]: the config entries are loaded from
//! `.storage` and set up, as Home Assistant does on start. Commands return
//! the text to print.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dcd_config::{load_configuration, DisablerSettings, PatchMode};
use dcd_host::{
    ConfigEntry, FlowInput, FlowResultType, HomeAssistant, RecordingComponentSetup, Storable,
    HOMEASSISTANT_DOMAIN, SERVICE_RESTART,
};
use default_config_disabler::{
    disabled_union, integration, patcher::config_file_path, pristine_components, ConfigToggle,
    ManifestBackup, CONF_COMPONENTS_TO_DISABLE, DOMAIN, ISSUE_RESTART_REQUIRED,
};
use tracing::{info, warn};

/// Settings from the command line, discovering the components directory if not given
pub fn settings(components_dir: Option<PathBuf>, patch_mode: PatchMode) -> Result<DisablerSettings> {
    let settings = match components_dir {
        Some(dir) => DisablerSettings::new(dir),
        None => DisablerSettings::discover()?,
    };
    Ok(settings.with_patch_mode(patch_mode))
}

/// The integration hosted against a configuration directory
pub struct Host {
    pub hass: Arc<HomeAssistant>,
    pub setup: Arc<RecordingComponentSetup>,
    pub settings: DisablerSettings,
}

impl Host {
    pub async fn start(config_dir: &Path, settings: DisablerSettings) -> Result<Self> {
        let setup = Arc::new(RecordingComponentSetup::new());
        let hass = Arc::new(HomeAssistant::new(config_dir, setup.clone()));

        // This process is not Home Assistant: a restart is left to the operator
        hass.services()
            .register(HOMEASSISTANT_DOMAIN, SERVICE_RESTART, |_call| async {
                warn!("Restart Home Assistant to apply changes");
                Ok(None)
            });
        hass.register_integration(integration(settings.clone()));

        hass.config_entries()
            .load()
            .await
            .context("failed to load config entries")?;

        Ok(Self {
            hass,
            setup,
            settings,
        })
    }

    fn entry(&self) -> Option<ConfigEntry> {
        self.hass
            .config_entries()
            .get_by_domain(DOMAIN)
            .into_iter()
            .next()
    }

    async fn setup_entries(&self) -> Result<()> {
        for entry in self.hass.config_entries().get_by_domain(DOMAIN) {
            self.hass
                .setup_entry(&entry.entry_id)
                .await
                .with_context(|| format!("failed to set up entry {}", entry.entry_id))?;
        }
        Ok(())
    }
}

/// List the bundle's components, marking the disabled ones
pub async fn components(host: &Host) -> Result<String> {
    let catalog = pristine_components(&host.hass, &host.settings.bundle_dir())
        .await
        .context("failed to read the default_config manifest")?;
    let disabled = disabled_union(&host.hass);

    let mut out = String::new();
    for component in &catalog {
        let marker = if disabled.contains(component) { "-" } else { "+" };
        writeln!(out, "{} {}", marker, component)?;
    }
    Ok(out.trim_end().to_string())
}

/// Global setup followed by entry setup, as on Home Assistant start
pub async fn setup(host: &Host) -> Result<String> {
    let config = load_configuration(host.hass.config_dir())
        .context("failed to load configuration.yaml")?;

    host.hass
        .async_setup_component(DOMAIN, &config)
        .await
        .context("global setup failed")?;
    host.setup_entries().await?;

    let requested = host.setup.requested();
    if requested.is_empty() {
        return Ok("No components set up".to_string());
    }
    Ok(format!("Set up: {}", requested.join(", ")))
}

/// Create the entry if needed, then store the components to disable
pub async fn disable(host: &Host, components: &[String]) -> Result<String> {
    host.setup_entries().await?;
    let flows = host.hass.flows();

    let entry = match host.entry() {
        Some(entry) => entry,
        None => {
            let form = flows.start_config_flow(&host.hass, DOMAIN).await?;
            let created = flows
                .progress(&host.hass, &form.flow_id, Some(FlowInput::new()))
                .await?;
            if created.result_type != FlowResultType::CreateEntry {
                bail!("config flow did not create an entry: {:?}", created.reason);
            }
            host.entry().context("config entry missing after config flow")?
        }
    };

    let form = flows.start_options_flow(&host.hass, &entry.entry_id).await?;
    let mut input = FlowInput::new();
    input.insert(
        CONF_COMPONENTS_TO_DISABLE.to_string(),
        serde_json::json!(components),
    );
    let result = flows
        .progress(&host.hass, &form.flow_id, Some(input))
        .await?;

    if let Some(errors) = result.errors.filter(|e| !e.is_empty()) {
        bail!("invalid options: {:?}", errors);
    }

    info!("Stored components to disable for entry {}", entry.entry_id);
    if components.is_empty() {
        Ok("No components disabled".to_string())
    } else {
        Ok(format!("Disabled: {}", components.join(", ")))
    }
}

/// Remove the entry, restoring the bundle
pub async fn remove(host: &Host) -> Result<String> {
    host.setup_entries().await?;

    let Some(entry) = host.entry() else {
        return Ok("No config entry".to_string());
    };
    host.hass
        .remove_entry(&entry.entry_id)
        .await
        .with_context(|| format!("failed to remove entry {}", entry.entry_id))?;

    Ok(format!("Removed config entry {}", entry.entry_id))
}

/// Confirm the restart-required repair, if one is pending
pub async fn repair(host: &Host) -> Result<String> {
    host.setup_entries().await?;

    if host
        .hass
        .issues()
        .get(DOMAIN, ISSUE_RESTART_REQUIRED)
        .is_none()
    {
        return Ok("Nothing to repair".to_string());
    }

    let flows = host.hass.flows();
    let form = flows
        .start_fix_flow(&host.hass, DOMAIN, ISSUE_RESTART_REQUIRED)
        .await?;
    flows
        .progress(&host.hass, &form.flow_id, Some(FlowInput::new()))
        .await?;

    Ok("Restart requested".to_string())
}

/// Describe the current state without changing anything
pub async fn status(host: &Host) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "Patch mode: {}", host.settings.patch_mode)?;
    writeln!(out, "Components dir: {}", host.settings.components_dir.display())?;

    match host.entry() {
        Some(entry) => writeln!(out, "Config entry: {} ({})", entry.title, entry.entry_id)?,
        None => writeln!(out, "Config entry: none")?,
    }

    let disabled: Vec<String> = disabled_union(&host.hass)
        .iter()
        .map(ToString::to_string)
        .collect();
    writeln!(out, "Disabled: {}", list_or_none(&disabled))?;

    match host.settings.patch_mode {
        PatchMode::Manifest => {
            let applied = host.hass.storage().exists(ManifestBackup::KEY).await;
            writeln!(out, "Manifest rewritten: {}", if applied { "yes" } else { "no" })?;
        }
        PatchMode::ConfigFile => {
            let toggle = ConfigToggle::new(config_file_path(&host.hass));
            let state = toggle
                .state()
                .map(|s| s.map(|s| format!("{:?}", s)).unwrap_or_else(|| "absent".to_string()))
                .unwrap_or_else(|e| format!("unreadable ({})", e));
            writeln!(out, "default_config line: {}", state)?;
        }
    }

    Ok(out.trim_end().to_string())
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
