use std::io::Write;

use anyhow::Result;
use envcopy_config::{ConfigError, load_settings};
use envcopy_core::StageKind;
use tempfile::NamedTempFile;

#[test]
fn settings_file_round_trips_through_loader() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        "product: acme\nroot_namespace: shared\npoll_interval_secs: 10\ncapacity:\n  safety_margin_percent: 20\nhooks:\n  stop-destination:\n    program: kubectl\n    args: [scale, --replicas=0]\n    timeout_secs: 120\n"
    )?;

    let settings = load_settings(Some(file.path()))?;
    assert_eq!(settings.product.as_deref(), Some("acme"));
    assert_eq!(settings.root_namespace, "shared");
    assert_eq!(settings.poll_interval_secs, 10);
    assert_eq!(settings.capacity.safety_margin_percent, 20);
    let hook = settings
        .hook_for(StageKind::StopDestination)
        .ok_or_else(|| anyhow::anyhow!("hook missing"))?;
    assert_eq!(hook.display(), "kubectl scale --replicas=0");
    Ok(())
}

#[test]
fn missing_file_reports_read_error() {
    let err = load_settings(Some(std::path::Path::new("/nonexistent/envcopy.yaml")))
        .expect_err("missing file must fail");
    assert!(matches!(err, ConfigError::SettingsRead { .. }));
    assert!(err.hint().contains("--config"));
}

#[test]
fn malformed_file_reports_path() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "copy_concurrency: [not, a, number]")?;
    let err = load_settings(Some(file.path())).expect_err("malformed file must fail");
    match err {
        ConfigError::SettingsParse { path, .. } => assert_eq!(path, file.path()),
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn absent_path_uses_defaults() -> Result<()> {
    let settings = load_settings(None)?;
    assert_eq!(settings.copy_concurrency, 5);
    Ok(())
}
