//! Settings file loading.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::RefreshSettings;
use crate::validate::validate_settings;

/// Load and validate settings from an optional YAML file.
///
/// Without a path the defaults apply.
///
/// # Errors
///
/// Returns an error when the file cannot be read, parsed, or validated.
pub fn load_settings(path: Option<&Path>) -> ConfigResult<RefreshSettings> {
    let Some(path) = path else {
        let settings = RefreshSettings::default();
        validate_settings(&settings)?;
        return Ok(settings);
    };

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::SettingsRead {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = parse_settings(&raw).map_err(|err| match err {
        ConfigError::SettingsParse { source, .. } => ConfigError::SettingsParse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    debug!(path = %path.display(), hooks = settings.hooks.len(), "loaded refresh settings");
    Ok(settings)
}

/// Parse and validate settings from YAML text.
///
/// # Errors
///
/// Returns an error when the text is not valid settings YAML or fails
/// validation.
pub fn parse_settings(raw: &str) -> ConfigResult<RefreshSettings> {
    let settings = if raw.trim().is_empty() {
        RefreshSettings::default()
    } else {
        serde_yaml::from_str::<RefreshSettings>(raw).map_err(|source| {
            ConfigError::SettingsParse {
                path: "<inline>".into(),
                source,
            }
        })?
    };
    validate_settings(&settings)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use envcopy_core::StageKind;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(parse_settings("").unwrap(), RefreshSettings::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let settings = parse_settings(
            "copy_concurrency: 2\nretry:\n  max_attempts: 4\nhooks:\n  start-destination:\n    program: ./start.sh\n",
        )
        .unwrap();
        assert_eq!(settings.copy_concurrency, 2);
        assert_eq!(settings.retry.max_attempts, 4);
        assert_eq!(settings.retry.initial_delay_secs, 5);
        assert_eq!(
            settings
                .hook_for(StageKind::StartDestination)
                .map(|hook| hook.program.as_str()),
            Some("./start.sh")
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = parse_settings("copy_concurency: 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::SettingsParse { .. }));
    }

    #[test]
    fn unknown_stage_keys_are_rejected() {
        assert!(parse_settings("hooks:\n  reboot-world:\n    program: x\n").is_err());
    }
}
