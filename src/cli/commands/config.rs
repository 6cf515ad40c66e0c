//! Config command - show configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::BinsmithResult;
use crate::ui::{self, UiContext};

const REDACTED: &str = "<redacted>";

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
) -> BinsmithResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }
    Ok(())
}

fn show_config(config: &Config) -> BinsmithResult<()> {
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

/// Copy of `config` with secrets masked
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if config.resolver.token.is_some() {
        config.resolver.token = Some(REDACTED.to_string());
    }
    if config.storage.token.is_some() {
        config.storage.token = Some(REDACTED.to_string());
    }
    config
}

async fn init_config(manager: &ConfigManager, force: bool) -> BinsmithResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );
    Ok(())
}
