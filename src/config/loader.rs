//! Reading the YAML file, normalising the legacy single-pair layout and
//! applying environment overrides

use std::path::Path;

use serde::Deserialize;

use super::{Config, ConfigError, DatabaseConfig, PairConfig};

/// Name given to the pair built from a legacy single-pair file
pub const LEGACY_PAIR_NAME: &str = "default";

/// File layout: the canonical settings plus the legacy top-level pair fields
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    source_db: Option<DatabaseConfig>,
    #[serde(default)]
    target_db: Option<DatabaseConfig>,
    #[serde(default)]
    tables_to_monitor: Vec<String>,
    #[serde(flatten)]
    config: Config,
}

impl RawConfig {
    fn normalize(self) -> Config {
        let RawConfig {
            source_db,
            target_db,
            tables_to_monitor,
            mut config,
        } = self;

        let legacy_source = source_db.filter(|db| !db.host.is_empty());
        if let Some(source_db) = legacy_source {
            if config.database_pairs.is_empty() {
                config.database_pairs.push(PairConfig {
                    name: LEGACY_PAIR_NAME.to_string(),
                    source_db,
                    target_db: target_db.unwrap_or_default(),
                    tables_to_monitor,
                });
            }
        }

        config
    }
}

/// Load, normalise and validate the configuration file at `path`
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Parse configuration text, resolving overrides through `env`
pub fn parse_config<F>(content: &str, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw: RawConfig = serde_yaml::from_str(content)?;
    let mut config = raw.normalize();
    apply_env_overrides(&mut config, env);
    config.validate()?;
    Ok(config)
}

/// Credentials and hosts for the first pair may come from the environment
fn apply_env_overrides<F>(config: &mut Config, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let Some(pair) = config.database_pairs.first_mut() else {
        return;
    };

    let overrides: [(&str, &mut String); 6] = [
        ("SOURCE_DB_HOST", &mut pair.source_db.host),
        ("SOURCE_DB_USERNAME", &mut pair.source_db.username),
        ("SOURCE_DB_PASSWORD", &mut pair.source_db.password),
        ("TARGET_DB_HOST", &mut pair.target_db.host),
        ("TARGET_DB_USERNAME", &mut pair.target_db.username),
        ("TARGET_DB_PASSWORD", &mut pair.target_db.password),
    ];

    for (key, field) in overrides {
        if let Some(value) = env(key).filter(|v| !v.is_empty()) {
            tracing::debug!(key, "Applying environment override");
            *field = value;
        }
    }
}
