//! Validation of refresh requests and settings.
//!
//! # Design
//! - Every check here runs before any cloud call is made.
//! - Time parsing is pure given `now`, so callers inject the clock.

use std::sync::LazyLock;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use envcopy_core::Namespace;
use regex::Regex;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{RefreshRequest, RefreshSettings, RequestInput, default_max_wait_minutes};

static TOKEN_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").ok());
static OFFSET_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:UTC|GMT)?([+-])(\d{2}):?(\d{2})?$").ok());

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Timezone a naive restore time is interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeZoneSpec {
    /// Coordinated universal time.
    Utc,
    /// The operator's local timezone.
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

/// Validate raw invocation parameters into a [`RefreshRequest`].
///
/// # Errors
///
/// Returns the first violated safety rule.
pub fn validate_request(
    input: &RequestInput,
    settings: &RefreshSettings,
    now: DateTime<Utc>,
) -> ConfigResult<RefreshRequest> {
    let source_environment = token("source", &input.source)?;
    let destination_environment = token("destination", &input.destination)?;
    if source_environment != destination_environment {
        return Err(ConfigError::EnvironmentMismatch {
            source_environment,
            destination_environment,
        });
    }

    let source_alias = token("source_namespace", &input.source_namespace)?;
    let destination_alias = token("destination_namespace", &input.destination_namespace)?;
    if source_alias == destination_alias {
        return Err(ConfigError::SameNamespace {
            namespace: source_alias,
        });
    }

    let source_namespace = Namespace::parse(&source_alias, &settings.root_namespace);
    let destination_namespace = Namespace::parse(&destination_alias, &settings.root_namespace);
    if destination_namespace.is_root() {
        return Err(ConfigError::RootDestination {
            namespace: destination_alias,
        });
    }
    if source_namespace == destination_namespace {
        return Err(ConfigError::SameNamespace {
            namespace: source_alias,
        });
    }

    let max_wait_minutes = input
        .max_wait_minutes
        .unwrap_or_else(default_max_wait_minutes);
    if max_wait_minutes == 0 {
        return Err(ConfigError::InvalidField {
            field: "max_wait_minutes",
            value: Some("0".into()),
            reason: "must be greater than zero",
        });
    }

    let instance_alias = optional_token("instance_alias", input.instance_alias.as_deref())?;
    let instance_alias_to_remove = optional_token(
        "instance_alias_to_remove",
        input.instance_alias_to_remove.as_deref(),
    )?;

    let timezone = match input.timezone.as_deref() {
        Some(value) if !value.trim().is_empty() => parse_timezone(value)?,
        _ => TimeZoneSpec::Local,
    };
    let restore_point = parse_restore_point(
        input.restore_date_time.as_deref(),
        timezone,
        now,
        settings.restore.lookback_minutes,
    )?;

    Ok(RefreshRequest {
        source_environment,
        destination_environment,
        source_namespace,
        destination_namespace,
        dry_run: input.dry_run,
        max_wait: std::time::Duration::from_secs(max_wait_minutes.saturating_mul(60)),
        restore_point,
        instance_alias,
        instance_alias_to_remove,
    })
}

/// Validate loaded settings.
///
/// # Errors
///
/// Returns an error for zero concurrency, attempts, or poll interval, an
/// out-of-range safety margin, or a malformed hook entry.
pub fn validate_settings(settings: &RefreshSettings) -> ConfigResult<()> {
    if settings.copy_concurrency == 0 {
        return Err(invalid("copy_concurrency", "0", "must be at least 1"));
    }
    if settings.poll_interval_secs == 0 {
        return Err(invalid("poll_interval_secs", "0", "must be at least 1"));
    }
    if settings.credential_refresh_minutes == 0 {
        return Err(invalid("credential_refresh_minutes", "0", "must be at least 1"));
    }
    if settings.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts", "0", "must be at least 1"));
    }
    if settings.retry.multiplier == 0 {
        return Err(invalid("retry.multiplier", "0", "must be at least 1"));
    }
    if settings.capacity.safety_margin_percent > 100 {
        return Err(invalid(
            "capacity.safety_margin_percent",
            &settings.capacity.safety_margin_percent.to_string(),
            "must be between 0 and 100",
        ));
    }
    if settings.restore.suffix.trim().is_empty() {
        return Err(invalid("restore.suffix", "", "must not be empty"));
    }
    if settings.restore.lookback_minutes < 0 {
        return Err(invalid(
            "restore.lookback_minutes",
            &settings.restore.lookback_minutes.to_string(),
            "must not be negative",
        ));
    }
    if settings.root_namespace.trim().is_empty() {
        return Err(invalid("root_namespace", "", "must not be empty"));
    }
    if let Some(product) = &settings.product {
        token("product", product)?;
    }
    for (stage, hook) in &settings.hooks {
        if !stage.is_hooked() {
            return Err(ConfigError::HookNotAllowed {
                stage: stage.to_string(),
            });
        }
        if hook.program.trim().is_empty() {
            return Err(invalid("hooks.program", stage.as_str(), "must not be empty"));
        }
    }
    Ok(())
}

/// Parse a timezone designator: `UTC`, `local`, or a fixed offset such as
/// `+02:00`.
///
/// # Errors
///
/// Returns an error for any other designator or an offset beyond ±23:59.
pub fn parse_timezone(value: &str) -> ConfigResult<TimeZoneSpec> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
        return Ok(TimeZoneSpec::Utc);
    }
    if trimmed.eq_ignore_ascii_case("local") {
        return Ok(TimeZoneSpec::Local);
    }

    let unsupported = || ConfigError::InvalidField {
        field: "timezone",
        value: Some(trimmed.to_string()),
        reason: "expected UTC, local, or an offset such as +02:00",
    };
    let captures = OFFSET_PATTERN
        .as_ref()
        .and_then(|pattern| pattern.captures(trimmed))
        .ok_or_else(unsupported)?;
    let hours: i32 = captures[2].parse().map_err(|_| unsupported())?;
    let minutes: i32 = captures
        .get(3)
        .map_or(Ok(0), |m| m.as_str().parse())
        .map_err(|_| unsupported())?;
    if minutes >= 60 {
        return Err(unsupported());
    }
    let seconds = (hours * 60 + minutes) * 60;
    let signed = if &captures[1] == "-" { -seconds } else { seconds };
    FixedOffset::east_opt(signed)
        .map(TimeZoneSpec::Fixed)
        .ok_or_else(unsupported)
}

/// Resolve the restore point for a run.
///
/// An absent value yields `now` minus the lookback. RFC 3339 values carry
/// their own offset; naive values are read in `timezone`.
///
/// # Errors
///
/// Returns an error for unparseable or nonexistent local times and for
/// points in the future.
pub fn parse_restore_point(
    value: Option<&str>,
    timezone: TimeZoneSpec,
    now: DateTime<Utc>,
    lookback_minutes: i64,
) -> ConfigResult<DateTime<Utc>> {
    let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(now - ChronoDuration::minutes(lookback_minutes));
    };

    let resolved = if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        parsed.with_timezone(&Utc)
    } else {
        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .ok_or_else(|| ConfigError::InvalidField {
                field: "restore_date_time",
                value: Some(raw.to_string()),
                reason: "expected RFC 3339 or YYYY-MM-DD HH:MM[:SS]",
            })?;
        localize(naive, timezone).ok_or_else(|| ConfigError::InvalidField {
            field: "restore_date_time",
            value: Some(raw.to_string()),
            reason: "time does not exist in the given timezone",
        })?
    };

    if resolved > now {
        return Err(ConfigError::InvalidField {
            field: "restore_date_time",
            value: Some(raw.to_string()),
            reason: "restore point lies in the future",
        });
    }
    Ok(resolved)
}

fn localize(naive: NaiveDateTime, timezone: TimeZoneSpec) -> Option<DateTime<Utc>> {
    match timezone {
        TimeZoneSpec::Utc => Some(Utc.from_utc_datetime(&naive)),
        TimeZoneSpec::Local => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
        TimeZoneSpec::Fixed(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

fn token(field: &'static str, value: &str) -> ConfigResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidField {
            field,
            value: None,
            reason: "must not be empty",
        });
    }
    let matches = TOKEN_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(trimmed));
    if !matches {
        return Err(ConfigError::InvalidField {
            field,
            value: Some(trimmed.to_string()),
            reason: "must be lowercase alphanumeric with inner hyphens",
        });
    }
    Ok(trimmed.to_string())
}

fn optional_token(field: &'static str, value: Option<&str>) -> ConfigResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => token(field, value).map(Some),
    }
}

fn invalid(field: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidField {
        field,
        value: (!value.is_empty()).then(|| value.to_string()),
        reason,
    }
}
