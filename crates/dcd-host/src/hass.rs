//! The Home Assistant context handed to integrations

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, info, warn};

use crate::components::ComponentSetup;
use crate::config_entries::{ConfigEntries, ConfigEntriesError, ConfigEntry, ConfigEntryState};
use crate::context::Context;
use crate::error::{HostError, HostResult};
use crate::flows::FlowManager;
use crate::integration::{Integration, Integrations, LifecycleEvent, LifecycleHandler};
use crate::issues::IssueRegistry;
use crate::service::{ServiceRegistry, ServiceResult};
use crate::storage::Storage;
use crate::ConfigType;

/// The running host instance
///
/// Integrations receive it as `Arc<HomeAssistant>` in every handler.
pub struct HomeAssistant {
    config_dir: PathBuf,
    storage: Arc<Storage>,
    services: ServiceRegistry,
    config_entries: ConfigEntries,
    issues: IssueRegistry,
    integrations: Integrations,
    flows: FlowManager,
    /// Components set up so far (`hass.config.components`)
    components: DashSet<String>,
    component_setup: Arc<dyn ComponentSetup>,
}

impl HomeAssistant {
    /// Create a host rooted at `config_dir`
    pub fn new(config_dir: impl Into<PathBuf>, component_setup: Arc<dyn ComponentSetup>) -> Self {
        let config_dir = config_dir.into();
        let storage = Arc::new(Storage::new(&config_dir));

        Self {
            config_entries: ConfigEntries::new(storage.clone()),
            storage,
            config_dir,
            services: ServiceRegistry::new(),
            issues: IssueRegistry::new(),
            integrations: Integrations::new(),
            flows: FlowManager::new(),
            components: DashSet::new(),
            component_setup,
        }
    }

    /// Configuration directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of a file relative to the configuration directory
    pub fn config_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.config_dir.join(name)
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn config_entries(&self) -> &ConfigEntries {
        &self.config_entries
    }

    pub fn issues(&self) -> &IssueRegistry {
        &self.issues
    }

    pub fn integrations(&self) -> &Integrations {
        &self.integrations
    }

    pub fn flows(&self) -> &FlowManager {
        &self.flows
    }

    /// Register an integration's lifecycle table
    pub fn register_integration(&self, integration: Integration) {
        self.integrations.register(integration);
    }

    /// Whether a component has been set up
    pub fn is_loaded(&self, domain: &str) -> bool {
        self.components.contains(domain)
    }

    /// Run a blocking function on the blocking thread pool
    ///
    /// File I/O goes through here so the async scheduler never stalls on disk.
    pub async fn add_executor_job<F, T>(&self, job: F) -> HostResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        Ok(tokio::task::spawn_blocking(job).await?)
    }

    /// Call a service with a fresh context
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
    ) -> ServiceResult {
        self.services
            .call(domain, service, service_data, Context::new())
            .await
    }

    /// Set up a component once
    ///
    /// Registered integrations run their [`LifecycleEvent::Setup`] handler;
    /// anything else is handed to the [`ComponentSetup`] backend. Returns true
    /// if the component is (now) loaded.
    pub async fn async_setup_component(
        self: &Arc<Self>,
        domain: &str,
        config: &ConfigType,
    ) -> HostResult<bool> {
        if self.components.contains(domain) {
            return Ok(true);
        }

        let ok = match self.integrations.get(domain) {
            Some(integration) => match integration.handler(LifecycleEvent::Setup) {
                Some(LifecycleHandler::Setup(handler)) => {
                    debug!(domain = %domain, "Running integration setup");
                    handler(self.clone(), config.clone()).await.map_err(|e| {
                        HostError::SetupFailed {
                            domain: domain.to_string(),
                            reason: e.to_string(),
                        }
                    })?
                }
                _ => true,
            },
            None => self.component_setup.setup_component(domain, config).await,
        };

        if ok {
            self.components.insert(domain.to_string());
            info!(domain = %domain, "Setup of domain complete");
        } else {
            warn!(domain = %domain, "Setup of domain failed");
        }
        Ok(ok)
    }

    /// Add a config entry and set it up
    pub async fn add_entry(self: &Arc<Self>, entry: ConfigEntry) -> HostResult<ConfigEntry> {
        let entry = self.config_entries.add(entry).await?;
        self.setup_entry(&entry.entry_id).await?;
        Ok(self.config_entries.get(&entry.entry_id).unwrap_or(entry))
    }

    /// Set up a config entry through its integration's handler
    ///
    /// A failing handler leaves the entry in `SetupError` with the reason.
    pub async fn setup_entry(self: &Arc<Self>, entry_id: &str) -> HostResult<()> {
        let _lock = self.config_entries.setup_lock().lock().await;

        let entry = self
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.config_entries
            .set_state(entry_id, ConfigEntryState::SetupInProgress, None);

        let handler = self
            .integrations
            .get(&entry.domain)
            .and_then(|i| i.handler(LifecycleEvent::SetupEntry).cloned());

        let outcome = match handler {
            Some(LifecycleHandler::Entry(handler)) => {
                handler(self.clone(), entry.clone()).await.map_err(|e| e.to_string())
            }
            _ => {
                debug!("No setup handler for domain {}, marking as loaded", entry.domain);
                Ok(true)
            }
        };

        match outcome {
            Ok(true) => {
                self.config_entries
                    .set_state(entry_id, ConfigEntryState::Loaded, None);
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Ok(false) => self.fail_setup(&entry, "setup returned false".to_string()),
            Err(reason) => self.fail_setup(&entry, reason),
        }
    }

    fn fail_setup(&self, entry: &ConfigEntry, reason: String) -> HostResult<()> {
        warn!("Setup failed for entry {}: {}", entry.entry_id, reason);
        self.config_entries.set_state(
            &entry.entry_id,
            ConfigEntryState::SetupError,
            Some(reason.clone()),
        );
        Err(HostError::SetupFailed {
            domain: entry.domain.clone(),
            reason,
        })
    }

    /// Unload a config entry
    ///
    /// The unload handler runs for loaded entries and for entries whose setup
    /// failed; afterwards the callbacks registered with
    /// [`ConfigEntries::async_on_unload`] run.
    pub async fn unload_entry(self: &Arc<Self>, entry_id: &str) -> HostResult<()> {
        let _lock = self.config_entries.setup_lock().lock().await;

        let entry = self
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if !entry.state.needs_unload() {
            debug!("Entry {} is {:?}, nothing to unload", entry_id, entry.state);
            return Ok(());
        }

        self.config_entries
            .set_state(entry_id, ConfigEntryState::UnloadInProgress, None);

        let handler = self
            .integrations
            .get(&entry.domain)
            .and_then(|i| i.handler(LifecycleEvent::UnloadEntry).cloned());

        let outcome = match handler {
            Some(LifecycleHandler::Entry(handler)) => {
                handler(self.clone(), entry.clone()).await.map_err(|e| e.to_string())
            }
            _ => Ok(true),
        };

        match outcome {
            Ok(true) => {
                self.config_entries.run_unload_callbacks(entry_id);
                self.config_entries
                    .set_state(entry_id, ConfigEntryState::NotLoaded, None);
                info!("Unloaded entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Ok(false) => self.fail_unload(&entry, "unload returned false".to_string()),
            Err(reason) => self.fail_unload(&entry, reason),
        }
    }

    fn fail_unload(&self, entry: &ConfigEntry, reason: String) -> HostResult<()> {
        warn!("Unload failed for entry {}: {}", entry.entry_id, reason);
        self.config_entries.set_state(
            &entry.entry_id,
            ConfigEntryState::FailedUnload,
            Some(reason.clone()),
        );
        Err(HostError::UnloadFailed {
            domain: entry.domain.clone(),
            reason,
        })
    }

    /// Unload and delete a config entry
    pub async fn remove_entry(self: &Arc<Self>, entry_id: &str) -> HostResult<ConfigEntry> {
        self.unload_entry(entry_id).await?;
        Ok(self.config_entries.remove(entry_id).await?)
    }

    /// Store new options for an entry and fire its update listeners
    pub async fn update_entry_options(
        self: &Arc<Self>,
        entry_id: &str,
        options: HashMap<String, serde_json::Value>,
    ) -> HostResult<ConfigEntry> {
        let entry = self.config_entries.update_options(entry_id, options).await?;

        for listener in self.config_entries.update_listeners(entry_id) {
            listener(self.clone(), entry.clone()).await;
        }
        Ok(entry)
    }
}
