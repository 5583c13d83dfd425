//! Destination name derivation.
//!
//! Resource names embed a span `{product}-{tier}-{service}-{env}-{region}`
//! where `{env}` is the bare environment for the root namespace and
//! `{namespace}-{environment}` for named namespaces. Derivation locates that
//! span in the source name on segment boundaries and rewrites its environment,
//! region, and tier segments in that order. Text outside the span is kept
//! verbatim, so a token value that also appears in the prefix or suffix is
//! never substituted twice.

use serde::{Deserialize, Serialize};

use crate::model::NAME_DELIMITER;

/// Reserved alias of the shared default deployment.
pub const ROOT_NAMESPACE: &str = "manufacturo";

/// Tenancy a resource belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "alias")]
pub enum Namespace {
    /// Shared default deployment.
    Root,
    /// Named customer deployment.
    Named(String),
}

impl Namespace {
    /// Interpret an alias, mapping the reserved root alias (or an empty value)
    /// to [`Namespace::Root`].
    #[must_use]
    pub fn parse(alias: &str, root_alias: &str) -> Self {
        let trimmed = alias.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(root_alias) {
            Self::Root
        } else {
            Self::Named(trimmed.to_ascii_lowercase())
        }
    }

    /// Whether this is the root namespace.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    /// Alias of a named namespace.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Named(alias) => Some(alias),
        }
    }

    /// Segment standing for the environment inside resource names.
    #[must_use]
    pub fn environment_segment(&self, environment: &str) -> String {
        match self {
            Self::Root => environment.to_ascii_lowercase(),
            Self::Named(alias) => format!("{alias}{NAME_DELIMITER}{}", environment.to_ascii_lowercase()),
        }
    }
}

/// Inputs to [`derive_name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameDerivationRequest {
    /// Name of the source object.
    pub source_name: String,
    /// Product token.
    pub product: String,
    /// Service token of the object.
    pub service: String,
    /// Namespace the source lives in.
    pub source_namespace: Namespace,
    /// Namespace the destination lives in.
    pub destination_namespace: Namespace,
    /// Source environment token.
    pub source_environment: String,
    /// Destination environment token.
    pub destination_environment: String,
    /// Source region token.
    pub source_region: String,
    /// Destination region token.
    pub destination_region: String,
    /// Source tier token.
    pub source_tier: String,
    /// Destination tier token.
    pub destination_tier: String,
}

impl NameDerivationRequest {
    /// Span a matching source name must contain.
    #[must_use]
    pub fn expected_pattern(&self) -> String {
        join_segments(&[
            &self.product.to_ascii_lowercase(),
            &self.source_tier.to_ascii_lowercase(),
            &self.service.to_ascii_lowercase(),
            &self
                .source_namespace
                .environment_segment(&self.source_environment),
            &self.source_region.to_ascii_lowercase(),
        ])
    }
}

/// Produce the destination name, or `None` when the source name does not
/// belong to the source namespace/environment (a benign mismatch).
#[must_use]
pub fn derive_name(request: &NameDerivationRequest) -> Option<String> {
    let pattern = request.expected_pattern();
    let (start, end) = find_on_boundary(&request.source_name, &pattern)?;

    let mut span = SpanSegments {
        product: request.product.to_ascii_lowercase(),
        tier: request.source_tier.to_ascii_lowercase(),
        service: request.service.to_ascii_lowercase(),
        environment: request
            .source_namespace
            .environment_segment(&request.source_environment),
        region: request.source_region.to_ascii_lowercase(),
    };
    span.environment = request
        .destination_namespace
        .environment_segment(&request.destination_environment);
    span.region = request.destination_region.to_ascii_lowercase();
    span.tier = request.destination_tier.to_ascii_lowercase();

    let prefix = &request.source_name[..start];
    let suffix = &request.source_name[end..];
    Some(format!("{prefix}{}{suffix}", span.join()))
}

/// Service token of a name: the segment following `{product}-{tier}-`.
#[must_use]
pub fn infer_service(name: &str, product: &str, tier: &str) -> Option<String> {
    let anchor = join_segments(&[&product.to_ascii_lowercase(), &tier.to_ascii_lowercase()]);
    let (_, end) = find_on_boundary(name, &anchor)?;
    let rest = name[end..].strip_prefix(NAME_DELIMITER)?;
    rest.split(NAME_DELIMITER)
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
}

struct SpanSegments {
    product: String,
    tier: String,
    service: String,
    environment: String,
    region: String,
}

impl SpanSegments {
    fn join(&self) -> String {
        join_segments(&[
            &self.product,
            &self.tier,
            &self.service,
            &self.environment,
            &self.region,
        ])
    }
}

fn join_segments(segments: &[&str]) -> String {
    let mut joined = String::new();
    for (index, segment) in segments.iter().enumerate() {
        if index > 0 {
            joined.push(NAME_DELIMITER);
        }
        joined.push_str(segment);
    }
    joined
}

/// First case-insensitive occurrence of `pattern` bounded by the delimiter or
/// the ends of `name`.
fn find_on_boundary(name: &str, pattern: &str) -> Option<(usize, usize)> {
    if pattern.is_empty() || !name.is_ascii() {
        return None;
    }
    let haystack = name.to_ascii_lowercase();
    haystack.match_indices(pattern).find_map(|(start, matched)| {
        let end = start + matched.len();
        let left_ok = start == 0 || haystack[..start].ends_with(NAME_DELIMITER);
        let right_ok = end == haystack.len() || haystack[end..].starts_with(NAME_DELIMITER);
        (left_ok && right_ok).then_some((start, end))
    })
}
