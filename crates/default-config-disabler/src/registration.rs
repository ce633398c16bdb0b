//! Registration table handed to the host

use std::sync::Arc;

use dcd_config::DisablerSettings;
use dcd_host::{ConfigEntry, FlowHandler, Integration, IntegrationError};

use crate::consts::DOMAIN;
use crate::flow::{DisablerConfigFlow, DisablerOptionsFlow};
use crate::lifecycle::Disabler;
use crate::repairs::RestartRequiredFixFlow;

/// Build the integration for `settings`
pub fn integration(settings: DisablerSettings) -> Integration {
    integration_for(Arc::new(Disabler::new(settings)))
}

/// Build the integration around an existing [`Disabler`]
pub fn integration_for(disabler: Arc<Disabler>) -> Integration {
    let on_setup = disabler.clone();
    let on_setup_entry = disabler.clone();
    let on_unload_entry = disabler.clone();
    let bundle_dir = disabler.settings().bundle_dir();

    Integration::new(DOMAIN)
        .on_setup(move |hass, config| {
            let disabler = on_setup.clone();
            async move {
                disabler
                    .async_setup(&hass, &config)
                    .await
                    .map_err(IntegrationError::from)
            }
        })
        .on_setup_entry(move |hass, entry| {
            let disabler = on_setup_entry.clone();
            async move {
                disabler
                    .async_setup_entry(&hass, &entry)
                    .await
                    .map_err(IntegrationError::from)
            }
        })
        .on_unload_entry(move |hass, entry| {
            let disabler = on_unload_entry.clone();
            async move {
                disabler
                    .async_unload_entry(&hass, &entry)
                    .await
                    .map_err(IntegrationError::from)
            }
        })
        .with_config_flow(Arc::new(|| {
            Box::new(DisablerConfigFlow) as Box<dyn FlowHandler>
        }))
        .with_options_flow(Arc::new(move |entry: &ConfigEntry| {
            Box::new(DisablerOptionsFlow::new(bundle_dir.clone(), entry)) as Box<dyn FlowHandler>
        }))
        .with_fix_flow(Arc::new(
            |_issue_id: &str, _data: Option<&serde_json::Value>| {
                Box::new(RestartRequiredFixFlow::new()) as Box<dyn FlowHandler>
            },
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcd_host::{LifecycleEvent, LifecycleHandler};

    #[test]
    fn test_registration_table() {
        let integration = integration(DisablerSettings::new("/srv/components"));

        assert_eq!(integration.domain(), DOMAIN);
        assert!(matches!(
            integration.handler(LifecycleEvent::Setup),
            Some(LifecycleHandler::Setup(_))
        ));
        assert!(matches!(
            integration.handler(LifecycleEvent::SetupEntry),
            Some(LifecycleHandler::Entry(_))
        ));
        assert!(matches!(
            integration.handler(LifecycleEvent::UnloadEntry),
            Some(LifecycleHandler::Entry(_))
        ));
        assert!(integration.config_flow().is_some());
        assert!(integration.options_flow().is_some());

        let fix_flow = integration.fix_flow().unwrap();
        assert_eq!(fix_flow("restart_required", None).initial_step(), "init");
    }
}
