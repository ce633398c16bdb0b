//! Lifecycle handlers
//!
//! The host calls these through the registration table built in
//! [`registration`](crate::registration):
//!
//! - global setup: suppress the bundle if it is configured, otherwise set up
//!   the bundle's components ourselves, minus the disabled ones
//! - entry setup: suppress, then listen for option updates
//! - entry unload: release whatever was suppressed
//! - options update: re-apply and ask for (or trigger) a restart

use std::sync::Arc;

use dcd_config::{has_top_level_key, DisablerSettings, PatchMode};
use dcd_host::{
    ConfigEntries, ConfigEntry, ConfigType, HomeAssistant, UpdateListener, HOMEASSISTANT_DOMAIN,
    SERVICE_RESTART,
};
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::catalog::{disabled_components, pristine_components, DisabledSet};
use crate::consts::{DEFAULT_CONFIG_DOMAIN, DOMAIN, RESTART_LOG_MESSAGE};
use crate::error::DisablerResult;
use crate::patcher::{patcher_for, Patcher};
use crate::repairs::{create_restart_issue, delete_restart_issue};

/// Union of the components disabled by every entry of the domain
pub fn disabled_union(hass: &HomeAssistant) -> DisabledSet {
    hass.config_entries()
        .get_by_domain(DOMAIN)
        .iter()
        .flat_map(disabled_components)
        .collect()
}

/// The integration's state: its settings and the patcher they select
pub struct Disabler {
    settings: DisablerSettings,
    patcher: Box<dyn Patcher>,
}

impl Disabler {
    pub fn new(settings: DisablerSettings) -> Self {
        let patcher = patcher_for(&settings);
        Self { settings, patcher }
    }

    pub fn settings(&self) -> &DisablerSettings {
        &self.settings
    }

    pub fn patcher(&self) -> &dyn Patcher {
        self.patcher.as_ref()
    }

    /// Global setup
    pub async fn async_setup(
        &self,
        hass: &Arc<HomeAssistant>,
        config: &ConfigType,
    ) -> DisablerResult<bool> {
        debug!("Setting up {}", DOMAIN);

        if has_top_level_key(config, DOMAIN) {
            warn!(
                "The {} integration does not support YAML configuration, \
                 remove it from configuration.yaml and configure it from the UI",
                DOMAIN
            );
        }

        if has_top_level_key(config, DEFAULT_CONFIG_DOMAIN) {
            self.suppress(hass).await?;
            return Ok(true);
        }

        delete_restart_issue(hass);

        let components = pristine_components(hass, &self.settings.bundle_dir()).await?;
        debug!("Got default_config dependencies: {:?}", components);

        let disabled = disabled_union(hass);
        debug!("Setting up dependencies except: {:?}", disabled);

        for component in components.iter().filter(|c| !disabled.contains(*c)) {
            hass.async_setup_component(component.as_str(), config)
                .await?;
        }

        debug!("Setup of default_config dependencies complete");
        Ok(true)
    }

    /// Config entry setup
    pub async fn async_setup_entry(
        self: &Arc<Self>,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> DisablerResult<bool> {
        debug!("Setting up {} entry {}", DOMAIN, entry.entry_id);
        self.suppress(hass).await?;

        let disabler = self.clone();
        let listener: UpdateListener =
            Arc::new(move |hass: Arc<HomeAssistant>, entry: ConfigEntry| {
                let disabler = disabler.clone();
                Box::pin(async move { disabler.update_listener(&hass, &entry).await })
                    as BoxFuture<'static, ()>
            });

        let listener_id = hass
            .config_entries()
            .add_update_listener(&entry.entry_id, listener);
        let entry_id = entry.entry_id.clone();
        hass.config_entries().async_on_unload(
            &entry.entry_id,
            Box::new(move |entries: &ConfigEntries| {
                entries.remove_update_listener(&entry_id, listener_id);
            }),
        );

        Ok(true)
    }

    /// Config entry unload
    pub async fn async_unload_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> DisablerResult<bool> {
        debug!("Unloading {} entry {}", DOMAIN, entry.entry_id);

        if self.patcher.release(hass).await? {
            warn!("Re-enabled default_config. {}", RESTART_LOG_MESSAGE);
            create_restart_issue(hass);
        } else {
            debug!("default_config is already enabled");
        }
        Ok(true)
    }

    /// Options of an entry changed
    pub async fn update_listener(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) {
        debug!("Options updated for entry {}", entry.entry_id);

        match self.patcher.mode() {
            PatchMode::ConfigFile => {
                if let Err(e) = self.patcher.suppress(hass, &disabled_union(hass)).await {
                    error!("Failed to disable default_config: {}", e);
                }
                // The global setup skips a different set on the next start
                warn!("Updated disabled components. {}", RESTART_LOG_MESSAGE);
                create_restart_issue(hass);
            }
            PatchMode::Manifest => {
                let disabled = disabled_union(hass);
                match self.patcher.suppress(hass, &disabled).await {
                    Ok(true) => self.restart(hass).await,
                    Ok(false) => debug!("Disabled components unchanged, no restart needed"),
                    Err(e) => error!("Failed to update default_config manifest: {}", e),
                }
            }
        }
    }

    async fn suppress(&self, hass: &HomeAssistant) -> DisablerResult<bool> {
        let disabled = disabled_union(hass);
        debug!(mode = %self.patcher.mode(), "Disabling default_config components: {:?}", disabled);

        let changed = self.patcher.suppress(hass, &disabled).await?;
        if changed {
            warn!("Disabled default_config components. {}", RESTART_LOG_MESSAGE);
            create_restart_issue(hass);
        } else {
            debug!("default_config is already disabled");
        }
        Ok(changed)
    }

    async fn restart(&self, hass: &HomeAssistant) {
        info!("Disabled components changed, restarting Home Assistant");
        if let Err(e) = hass
            .call_service(HOMEASSISTANT_DOMAIN, SERVICE_RESTART, serde_json::json!({}))
            .await
        {
            warn!("Restart failed ({}). {}", e, RESTART_LOG_MESSAGE);
            create_restart_issue(hass);
        }
    }
}
