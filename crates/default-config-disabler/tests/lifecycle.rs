//! End-to-end tests driving the integration through the host

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dcd_config::{load_configuration, DisablerSettings, PatchMode};
use dcd_host::{
    ConfigEntry, ConfigEntryState, FlowInput, FlowResultType, HomeAssistant, HostError,
    RecordingComponentSetup, HOMEASSISTANT_DOMAIN, SERVICE_RESTART,
};
use default_config_disabler::{
    integration, pristine_components, CONF_COMPONENTS_TO_DISABLE, DOMAIN, ISSUE_RESTART_REQUIRED,
    TITLE,
};
use serde_json::json;
use tempfile::TempDir;

const MANIFEST: &str = r#"{
  "domain": "default_config",
  "name": "Default Config",
  "codeowners": ["@home-assistant/core"],
  "dependencies": ["stream", "backup", "zeroconf"],
  "documentation": "https://www.home-assistant.io/integrations/default_config",
  "integration_type": "system",
  "quality_scale": "internal"
}
"#;

struct TestHost {
    config_dir: TempDir,
    _core: TempDir,
    settings: DisablerSettings,
    hass: Arc<HomeAssistant>,
    setup: Arc<RecordingComponentSetup>,
    restarts: Arc<AtomicUsize>,
}

impl TestHost {
    fn new(mode: PatchMode) -> Self {
        let config_dir = TempDir::new().unwrap();
        let core = TempDir::new().unwrap();
        let components_dir = core.path().join("homeassistant/components");
        fs::create_dir_all(components_dir.join("default_config")).unwrap();
        fs::write(components_dir.join("default_config/manifest.json"), MANIFEST).unwrap();

        let settings = DisablerSettings::new(components_dir).with_patch_mode(mode);
        let (hass, setup, restarts) = start_hass(&config_dir, &settings);

        Self {
            config_dir,
            _core: core,
            settings,
            hass,
            setup,
            restarts,
        }
    }

    /// A fresh host on the same directories, as after a restart
    async fn restart(&mut self) {
        let (hass, setup, restarts) = start_hass(&self.config_dir, &self.settings);
        hass.config_entries().load().await.unwrap();
        self.hass = hass;
        self.setup = setup;
        self.restarts = restarts;
    }

    fn manifest_path(&self) -> PathBuf {
        self.settings.bundle_dir().join("manifest.json")
    }

    fn manifest_text(&self) -> String {
        fs::read_to_string(self.manifest_path()).unwrap()
    }

    fn dependencies(&self) -> Vec<String> {
        let manifest: serde_json::Value = serde_json::from_str(&self.manifest_text()).unwrap();
        serde_json::from_value(manifest["dependencies"].clone()).unwrap()
    }

    fn write_configuration(&self, content: &str) {
        fs::write(self.config_dir.path().join("configuration.yaml"), content).unwrap();
    }

    fn read_configuration(&self) -> String {
        fs::read_to_string(self.config_dir.path().join("configuration.yaml")).unwrap()
    }

    fn restart_issue_raised(&self) -> bool {
        self.hass.issues().get(DOMAIN, ISSUE_RESTART_REQUIRED).is_some()
    }

    fn restart_count(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    async fn add_entry(&self, disabled: &[&str]) -> ConfigEntry {
        self.hass
            .add_entry(ConfigEntry::new(DOMAIN, TITLE).with_options(options(disabled)))
            .await
            .unwrap()
    }

    async fn set_disabled(&self, entry_id: &str, disabled: &[&str]) {
        self.hass
            .update_entry_options(entry_id, options(disabled))
            .await
            .unwrap();
    }
}

fn start_hass(
    config_dir: &TempDir,
    settings: &DisablerSettings,
) -> (Arc<HomeAssistant>, Arc<RecordingComponentSetup>, Arc<AtomicUsize>) {
    let setup = Arc::new(RecordingComponentSetup::new());
    let hass = Arc::new(HomeAssistant::new(config_dir.path(), setup.clone()));

    let restarts = Arc::new(AtomicUsize::new(0));
    let counter = restarts.clone();
    hass.services()
        .register(HOMEASSISTANT_DOMAIN, SERVICE_RESTART, move |_call| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        });

    hass.register_integration(integration(settings.clone()));
    (hass, setup, restarts)
}

fn options(disabled: &[&str]) -> HashMap<String, serde_json::Value> {
    let mut options = HashMap::new();
    options.insert(CONF_COMPONENTS_TO_DISABLE.to_string(), json!(disabled));
    options
}

fn input(value: serde_json::Value) -> FlowInput {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_entry_setup_rewrites_manifest_and_unload_restores() {
    let host = TestHost::new(PatchMode::Manifest);

    let entry = host.add_entry(&["stream", "backup"]).await;
    assert!(entry.is_loaded());
    assert_eq!(host.dependencies(), ["zeroconf"]);
    assert!(host.restart_issue_raised());
    assert_eq!(host.restart_count(), 0);

    // Options change the manifest: restart right away
    host.set_disabled(&entry.entry_id, &["stream"]).await;
    assert_eq!(host.dependencies(), ["backup", "zeroconf"]);
    assert_eq!(host.restart_count(), 1);

    // Same options again: nothing to do
    host.set_disabled(&entry.entry_id, &["stream"]).await;
    assert_eq!(host.restart_count(), 1);

    // Unknown names leave the manifest alone
    host.set_disabled(&entry.entry_id, &["stream", "not_a_component"]).await;
    assert_eq!(host.restart_count(), 1);

    host.hass.remove_entry(&entry.entry_id).await.unwrap();
    assert_eq!(host.manifest_text(), MANIFEST);
    assert!(host.restart_issue_raised());
}

#[tokio::test]
async fn test_update_listener_removed_on_unload() {
    let host = TestHost::new(PatchMode::Manifest);

    let entry = host.add_entry(&["stream"]).await;
    assert_eq!(host.hass.config_entries().update_listeners(&entry.entry_id).len(), 1);

    host.hass.unload_entry(&entry.entry_id).await.unwrap();
    assert!(host
        .hass
        .config_entries()
        .update_listeners(&entry.entry_id)
        .is_empty());
    assert_eq!(
        host.hass.config_entries().get(&entry.entry_id).unwrap().state,
        ConfigEntryState::NotLoaded
    );

    host.set_disabled(&entry.entry_id, &["zeroconf"]).await;
    assert_eq!(host.manifest_text(), MANIFEST);
    assert_eq!(host.restart_count(), 0);
}

#[tokio::test]
async fn test_entry_without_options_leaves_manifest() {
    let host = TestHost::new(PatchMode::Manifest);

    host.hass
        .add_entry(ConfigEntry::new(DOMAIN, TITLE))
        .await
        .unwrap();

    assert_eq!(host.manifest_text(), MANIFEST);
    assert!(!host.restart_issue_raised());
    assert!(!host
        .hass
        .storage()
        .exists("default_config_disabler.manifest_backup")
        .await);
}

#[tokio::test]
async fn test_missing_manifest_fails_entry_setup() {
    let host = TestHost::new(PatchMode::Manifest);
    fs::remove_file(host.manifest_path()).unwrap();

    let result = host
        .hass
        .add_entry(ConfigEntry::new(DOMAIN, TITLE).with_options(options(&["stream"])))
        .await;
    assert!(matches!(result, Err(HostError::SetupFailed { .. })));

    let entry = host.hass.config_entries().get_by_domain(DOMAIN).remove(0);
    assert_eq!(entry.state, ConfigEntryState::SetupError);
}

#[tokio::test]
async fn test_global_setup_sets_up_enabled_components() {
    let mut host = TestHost::new(PatchMode::Manifest);
    host.write_configuration("homeassistant:\n  name: Home\n");
    host.add_entry(&["backup"]).await;
    assert_eq!(host.dependencies(), ["stream", "zeroconf"]);

    // The catalog still lists what the manifest shipped with
    let catalog = pristine_components(&host.hass, &host.settings.bundle_dir())
        .await
        .unwrap();
    assert_eq!(catalog.len(), 3);

    host.restart().await;
    assert!(host.hass.issues().is_empty());

    let config = load_configuration(host.config_dir.path()).unwrap();
    assert!(host
        .hass
        .async_setup_component(DOMAIN, &config)
        .await
        .unwrap());

    assert_eq!(host.setup.requested(), ["stream", "zeroconf"]);
    assert!(!host.restart_issue_raised());
}

#[tokio::test]
async fn test_config_file_mode_round_trip() {
    let mut host = TestHost::new(PatchMode::ConfigFile);
    let original = "homeassistant:\n  name: Home\n\ndefault_config:\n\nhttp:\n";
    host.write_configuration(original);

    // First start: the bundle is still configured, so it gets commented out
    let config = load_configuration(host.config_dir.path()).unwrap();
    host.hass
        .async_setup_component(DOMAIN, &config)
        .await
        .unwrap();
    host.add_entry(&["stream"]).await;

    assert_eq!(
        host.read_configuration(),
        "homeassistant:\n  name: Home\n\n# default_config:\n\nhttp:\n"
    );
    assert!(host.restart_issue_raised());
    assert!(host.setup.requested().is_empty());
    assert_eq!(host.manifest_text(), MANIFEST);

    // After the restart the integration loads the bundle minus the disabled part
    host.restart().await;
    let config = load_configuration(host.config_dir.path()).unwrap();
    host.hass
        .async_setup_component(DOMAIN, &config)
        .await
        .unwrap();
    assert_eq!(host.setup.requested(), ["backup", "zeroconf"]);
    assert!(!host.restart_issue_raised());

    // Entries are set up after the global setup
    let entry = host.hass.config_entries().get_by_domain(DOMAIN).remove(0);
    host.hass.setup_entry(&entry.entry_id).await.unwrap();
    assert!(!host.restart_issue_raised());

    // Option changes never restart in this mode, they ask for it
    host.set_disabled(&entry.entry_id, &["stream", "zeroconf"]).await;
    assert!(host.restart_issue_raised());
    assert_eq!(host.restart_count(), 0);

    host.hass.remove_entry(&entry.entry_id).await.unwrap();
    assert_eq!(host.read_configuration(), original);
}

#[tokio::test]
async fn test_yaml_section_only_warns() {
    let host = TestHost::new(PatchMode::Manifest);
    host.write_configuration("default_config_disabler:\nhttp:\n");

    let config = load_configuration(host.config_dir.path()).unwrap();
    assert!(host
        .hass
        .async_setup_component(DOMAIN, &config)
        .await
        .unwrap());
    assert_eq!(host.setup.requested(), ["stream", "backup", "zeroconf"]);
}

#[tokio::test]
async fn test_config_and_options_flows() {
    let host = TestHost::new(PatchMode::Manifest);
    let flows = host.hass.flows();

    let form = flows.start_config_flow(&host.hass, DOMAIN).await.unwrap();
    assert_eq!(form.result_type, FlowResultType::Form);
    assert_eq!(form.step_id.as_deref(), Some("user"));

    let created = flows
        .progress(&host.hass, &form.flow_id, Some(FlowInput::new()))
        .await
        .unwrap();
    assert_eq!(created.result_type, FlowResultType::CreateEntry);
    assert_eq!(created.title.as_deref(), Some(TITLE));

    let entry = host.hass.config_entries().get_by_domain(DOMAIN).remove(0);
    assert!(entry.is_loaded());

    // Only one entry is allowed
    let second = flows.start_config_flow(&host.hass, DOMAIN).await.unwrap();
    assert_eq!(second.result_type, FlowResultType::Abort);
    assert_eq!(second.reason.as_deref(), Some("single_instance_allowed"));

    // The options form offers the catalog
    let form = flows
        .start_options_flow(&host.hass, &entry.entry_id)
        .await
        .unwrap();
    assert_eq!(form.step_id.as_deref(), Some("init"));
    assert_eq!(form.data_schema.len(), 1);
    assert_eq!(form.data_schema[0].name, CONF_COMPONENTS_TO_DISABLE);
    assert_eq!(form.data_schema[0].options, ["stream", "backup", "zeroconf"]);

    // Malformed names re-show the form
    let rejected = flows
        .progress(
            &host.hass,
            &form.flow_id,
            Some(input(json!({ "components_to_disable": ["Stream!"] }))),
        )
        .await
        .unwrap();
    assert_eq!(rejected.result_type, FlowResultType::Form);
    assert_eq!(
        rejected.errors.as_ref().and_then(|e| e.get(CONF_COMPONENTS_TO_DISABLE)),
        Some(&"invalid_component".to_string())
    );
    assert_eq!(flows.in_progress(), 1);

    let done = flows
        .progress(
            &host.hass,
            &form.flow_id,
            Some(input(json!({ "components_to_disable": ["stream", "backup"] }))),
        )
        .await
        .unwrap();
    assert_eq!(done.result_type, FlowResultType::CreateEntry);
    assert_eq!(flows.in_progress(), 0);

    let entry = host.hass.config_entries().get(&entry.entry_id).unwrap();
    assert_eq!(
        entry.options.get(CONF_COMPONENTS_TO_DISABLE),
        Some(&json!(["stream", "backup"]))
    );
    assert_eq!(host.dependencies(), ["zeroconf"]);
    assert_eq!(host.restart_count(), 1);

    // Reopening the options shows the current selection
    let form = flows
        .start_options_flow(&host.hass, &entry.entry_id)
        .await
        .unwrap();
    assert_eq!(form.data_schema[0].default, Some(json!(["stream", "backup"])));
    assert_eq!(form.data_schema[0].options.len(), 3);
}

#[tokio::test]
async fn test_restart_repair_flow() {
    let host = TestHost::new(PatchMode::Manifest);
    host.add_entry(&["zeroconf"]).await;
    assert!(host.restart_issue_raised());

    let flows = host.hass.flows();
    let form = flows
        .start_fix_flow(&host.hass, DOMAIN, ISSUE_RESTART_REQUIRED)
        .await
        .unwrap();
    assert_eq!(form.result_type, FlowResultType::Form);
    assert_eq!(form.step_id.as_deref(), Some("confirm"));
    assert!(form.data_schema.is_empty());

    let done = flows
        .progress(&host.hass, &form.flow_id, Some(FlowInput::new()))
        .await
        .unwrap();
    assert_eq!(done.result_type, FlowResultType::CreateEntry);
    assert_eq!(host.restart_count(), 1);
    assert!(!host.restart_issue_raised());

    // The issue is gone, so there is nothing left to fix
    assert!(flows
        .start_fix_flow(&host.hass, DOMAIN, ISSUE_RESTART_REQUIRED)
        .await
        .is_err());
}
