//! Settings table and API key commands.

use std::path::PathBuf;

use tokio::runtime::Runtime;

use super::{SettingsCommand, open};
use crate::config::{self, EnrichmentSettings};
use crate::db::settings as keys;

/// Check a provider API key's format
pub fn cmd_validate_key(service: &str, key: &str) -> anyhow::Result<()> {
    let result = config::validate_provider_api_key(service, key)?;
    if result.valid {
        println!("OK: {}", result.message);
        Ok(())
    } else {
        anyhow::bail!("{}", result.message)
    }
}

/// Write the default config file
pub fn cmd_init_config(force: bool) -> anyhow::Result<()> {
    let path = config::config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    if path.exists() && !force {
        println!("Config already exists at {} (use --force to overwrite)", path.display());
        return Ok(());
    }
    config::save(&config::Config::default())?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Read or change the settings table
pub fn cmd_settings(
    rt: &Runtime,
    db_path: Option<&PathBuf>,
    action: &SettingsCommand,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let (config, pool) = open(db_path).await?;
        match action {
            SettingsCommand::List => {
                for (key, value) in keys::settings_with_prefix(&pool, "metadata.").await? {
                    println!("{} = {}", key, display_value(&key, &value));
                }
                let effective = EnrichmentSettings::from_config(&config)
                    .overlay_from_db(&pool)
                    .await?;
                println!();
                println!("Effective:");
                println!("  auto enrich:      {}", effective.auto_enrich_enabled);
                println!("  auto search:      {}", effective.auto_search.enabled);
                println!("  threshold:        {}", effective.auto_search.confidence_threshold);
                println!("  auto apply:       {}", effective.auto_search.auto_apply);
                println!("  last.fm key:      {}", configured(effective.lastfm_api_key.is_some()));
                println!("  fanart.tv key:    {}", configured(effective.fanart_api_key.is_some()));
            }
            SettingsCommand::Get { key } => match keys::get_setting(&pool, key).await? {
                Some(value) => println!("{}", display_value(key, &value)),
                None => println!("{} is not set", key),
            },
            SettingsCommand::Set { key, value } => {
                if key == keys::LASTFM_API_KEY || key == keys::FANART_API_KEY {
                    let service = if key == keys::LASTFM_API_KEY { "lastfm" } else { "fanart" };
                    let check = config::validate_provider_api_key(service, value)?;
                    if !check.valid {
                        anyhow::bail!("{}", check.message);
                    }
                }
                keys::set_setting(&pool, key, value).await?;

                // Refuse to leave the table in a state the service would reject
                let merged = EnrichmentSettings::from_config(&config)
                    .overlay_from_db(&pool)
                    .await?;
                if let Err(e) = merged.validate() {
                    keys::delete_setting(&pool, key).await?;
                    anyhow::bail!("{}", e);
                }
                println!("{} updated", key);
            }
            SettingsCommand::Unset { key } => {
                if keys::delete_setting(&pool, key).await? {
                    println!("{} removed", key);
                } else {
                    println!("{} was not set", key);
                }
            }
        }
        Ok(())
    })
}

fn display_value(key: &str, value: &str) -> String {
    if key.ends_with("api_key") {
        mask(value)
    } else {
        value.to_string()
    }
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}{}", visible, "*".repeat(secret.chars().count().saturating_sub(4)))
}

fn configured(set: bool) -> &'static str {
    if set { "configured" } else { "not set" }
}
