//! `derive-name` command: evaluate name derivation for one source name.

use envcopy_config::RefreshSettings;
use envcopy_core::{NameDerivationRequest, Namespace, derive_name, infer_service};
use serde::Serialize;

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, to_json};

/// Tokens collected from the command line.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeriveInput {
    pub(crate) source_name: String,
    pub(crate) product: String,
    pub(crate) service: Option<String>,
    pub(crate) source_namespace: String,
    pub(crate) destination_namespace: String,
    pub(crate) source_environment: String,
    pub(crate) destination_environment: Option<String>,
    pub(crate) source_region: String,
    pub(crate) destination_region: Option<String>,
    pub(crate) source_tier: String,
    pub(crate) destination_tier: Option<String>,
}

#[derive(Debug, Serialize)]
struct Derivation {
    source_name: String,
    expected_pattern: String,
    destination_name: String,
}

pub(crate) fn handle_derive_name(
    input: DeriveInput,
    settings: &RefreshSettings,
    format: OutputFormat,
) -> CliResult<()> {
    println!("{}", derive(input, settings, format)?);
    Ok(())
}

fn derive(input: DeriveInput, settings: &RefreshSettings, format: OutputFormat) -> CliResult<String> {
    let service = match input.service {
        Some(service) => service,
        None => infer_service(&input.source_name, &input.product, &input.source_tier).ok_or_else(
            || {
                CliError::validation(format!(
                    "cannot infer the service of '{}': no segment follows '{}-{}' (hint: pass --service)",
                    input.source_name, input.product, input.source_tier
                ))
            },
        )?,
    };
    let request = NameDerivationRequest {
        product: input.product,
        service,
        source_namespace: Namespace::parse(&input.source_namespace, &settings.root_namespace),
        destination_namespace: Namespace::parse(
            &input.destination_namespace,
            &settings.root_namespace,
        ),
        destination_environment: input
            .destination_environment
            .unwrap_or_else(|| input.source_environment.clone()),
        source_environment: input.source_environment,
        destination_region: input
            .destination_region
            .unwrap_or_else(|| input.source_region.clone()),
        source_region: input.source_region,
        destination_tier: input
            .destination_tier
            .unwrap_or_else(|| input.source_tier.clone()),
        source_tier: input.source_tier,
        source_name: input.source_name,
    };
    let expected_pattern = request.expected_pattern();
    let destination_name = derive_name(&request).ok_or_else(|| {
        CliError::validation(format!(
            "'{}' does not contain '{expected_pattern}' on segment boundaries (hint: check the namespace, environment and region tokens)",
            request.source_name
        ))
    })?;

    match format {
        OutputFormat::Table => Ok(destination_name),
        OutputFormat::Json => to_json(&Derivation {
            source_name: request.source_name,
            expected_pattern,
            destination_name,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn input(source_name: &str) -> DeriveInput {
        DeriveInput {
            source_name: source_name.into(),
            product: "acme".into(),
            source_namespace: "manufacturo".into(),
            destination_namespace: "test".into(),
            source_environment: "qa2".into(),
            source_region: "eastus".into(),
            source_tier: "prod".into(),
            ..DeriveInput::default()
        }
    }

    #[test]
    fn root_names_gain_the_destination_namespace() {
        let name = derive(
            input("db-acme-prod-core-qa2-eastus"),
            &RefreshSettings::default(),
            OutputFormat::Table,
        )
        .expect("derives");
        assert_eq!(name, "db-acme-prod-core-test-qa2-eastus");
    }

    #[test]
    fn explicit_service_and_json_output() {
        let mut request = input("db-acme-prod-core-qa2-eastus");
        request.service = Some("core".into());
        request.destination_region = Some("westus".into());
        let text = derive(request, &RefreshSettings::default(), OutputFormat::Json).expect("derives");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["expected_pattern"], "acme-prod-core-qa2-eastus");
        assert_eq!(value["destination_name"], "db-acme-prod-core-test-qa2-westus");
    }

    #[test]
    fn mismatches_report_the_expected_pattern() {
        let mut request = input("db-acme-prod-core-other-qa2-eastus");
        request.service = Some("core".into());
        let err = derive(request, &RefreshSettings::default(), OutputFormat::Table)
            .expect_err("mismatch");
        let message = err.display_message();
        assert!(message.contains("acme-prod-core-qa2-eastus"), "{message}");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn uninferable_service_asks_for_the_flag() {
        let err = derive(
            input("unrelated"),
            &RefreshSettings::default(),
            OutputFormat::Table,
        )
        .expect_err("no service");
        assert!(err.display_message().contains("--service"));
    }
}
