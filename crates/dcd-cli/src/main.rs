//! Default Config Disabler command line
//!
//! Hosts the integration against a Home Assistant configuration directory so
//! operators can inspect and change which default_config components load.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dcd_config::PatchMode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "default-config-disabler")]
#[command(version)]
#[command(about = "Selectively disable components of Home Assistant's default_config")]
struct Cli {
    /// Home Assistant configuration directory
    #[arg(short, long, global = true, default_value = ".")]
    config: PathBuf,

    /// Directory holding the integrations (default: $HA_CORE_PATH/homeassistant/components)
    #[arg(long, global = true)]
    components_dir: Option<PathBuf>,

    /// How components are disabled: manifest or config_file
    #[arg(long, global = true, default_value_t = PatchMode::Manifest)]
    patch_mode: PatchMode,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// List the components of the default bundle
    Components,
    /// Run the global setup against configuration.yaml
    Setup,
    /// Set the components to disable, creating the config entry if needed
    Disable {
        /// Component domains, e.g. stream zeroconf
        components: Vec<String>,
    },
    /// Remove the config entry and restore the bundle
    Remove,
    /// Confirm a pending restart-required repair
    Repair,
    /// Show the config entry, disabled components and pending issues
    Status,
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    debug!("Parsed arguments: {:?}", cli);

    let settings = commands::settings(cli.components_dir.clone(), cli.patch_mode)?;
    let host = commands::Host::start(&cli.config, settings).await?;

    let report = match cli.command {
        Command::Components => commands::components(&host).await?,
        Command::Setup => commands::setup(&host).await?,
        Command::Disable { components } => commands::disable(&host, &components).await?,
        Command::Remove => commands::remove(&host).await?,
        Command::Repair => commands::repair(&host).await?,
        Command::Status => commands::status(&host).await?,
    };
    println!("{}", report);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_disable() {
        let cli = Cli::try_parse_from([
            "default-config-disabler",
            "--config",
            "/config",
            "disable",
            "stream",
            "zeroconf",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/config"));
        assert_eq!(cli.patch_mode, PatchMode::Manifest);
        assert_eq!(
            cli.command,
            Command::Disable {
                components: vec!["stream".to_string(), "zeroconf".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_patch_mode() {
        let cli = Cli::try_parse_from([
            "default-config-disabler",
            "status",
            "--patch-mode",
            "config_file",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.patch_mode, PatchMode::ConfigFile);
        assert!(cli.verbose);
        assert_eq!(cli.command, Command::Status);

        assert!(Cli::try_parse_from(["default-config-disabler", "status", "--patch-mode", "yaml"])
            .is_err());
    }
}
