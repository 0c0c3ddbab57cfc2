//! Layered configuration: defaults, then the TOML file, then `KEYWARD_*`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use keyward_lifecycle::{LifecycleConfig, NotificationTarget};

/// Default rotation notification channel.
pub const DEFAULT_ROTATION_TARGET: &str = "iam-key-rotation-notify";
/// Default retirement notification channel.
pub const DEFAULT_RETIREMENT_TARGET: &str = "iam-key-deletion-notify";

const ENV_PREFIX: &str = "KEYWARD_";

fn defaults() -> LifecycleConfig {
    LifecycleConfig::new(
        NotificationTarget::new(DEFAULT_ROTATION_TARGET),
        NotificationTarget::new(DEFAULT_RETIREMENT_TARGET),
    )
}

/// Load and validate the effective configuration.
///
/// Nested keys come from the environment with `__` as separator, e.g.
/// `KEYWARD_ROTATION__TARGET` or `KEYWARD_THRESHOLD_DAYS`.
pub fn load(path: Option<&Path>) -> Result<LifecycleConfig> {
    let mut figment = Figment::from(Serialized::defaults(defaults()));
    if let Some(path) = path {
        if !path.is_file() {
            bail!("config file not found: {}", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: LifecycleConfig = figment
        .merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["config", "log", "log_format"])
                .split("__"),
        )
        .extract()
        .context("invalid configuration")?;
    config.validate()?;
    Ok(config)
}
