//! Required tag rules applied to copied objects.

use crate::model::Tags;
use crate::naming::Namespace;

/// Environment the object belongs to.
pub const TAG_ENVIRONMENT: &str = "Environment";
/// Owning team.
pub const TAG_OWNER: &str = "Owner";
/// Service token.
pub const TAG_SERVICE: &str = "Service";
/// Object type or topology role.
pub const TAG_TYPE: &str = "Type";
/// Customer alias for named namespaces.
pub const TAG_CLIENT_NAME: &str = "ClientName";

const ROOT_REQUIRED: &[&str] = &[TAG_ENVIRONMENT, TAG_OWNER, TAG_SERVICE, TAG_TYPE];
const NAMED_REQUIRED: &[&str] = &[
    TAG_ENVIRONMENT,
    TAG_OWNER,
    TAG_SERVICE,
    TAG_TYPE,
    TAG_CLIENT_NAME,
];

/// Tags every object in the namespace must carry. Doubles as the allowlist of
/// tags that are re-applied after a copy.
#[must_use]
pub const fn required_tag_keys(namespace: &Namespace) -> &'static [&'static str] {
    match namespace {
        Namespace::Root => ROOT_REQUIRED,
        Namespace::Named(_) => NAMED_REQUIRED,
    }
}

/// Required keys that are absent or blank.
#[must_use]
pub fn missing_required_tags(tags: &Tags, namespace: &Namespace) -> Vec<&'static str> {
    required_tag_keys(namespace)
        .iter()
        .copied()
        .filter(|key| tags.get_non_empty(key).is_none())
        .collect()
}

/// Destination facts that override captured tag values.
#[derive(Debug, Clone, Copy)]
pub struct TagContext<'a> {
    /// Destination environment token.
    pub destination_environment: &'a str,
    /// Destination namespace.
    pub destination_namespace: &'a Namespace,
}

/// Tags to write after a copy, and what was left out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagPlan {
    /// Allowlisted tags to apply.
    pub apply: Tags,
    /// Captured keys outside the allowlist.
    pub dropped: Vec<String>,
    /// Required keys with no value from any source.
    pub unresolved: Vec<&'static str>,
}

/// Build the tag set for a freshly copied object.
///
/// Value precedence per required key: destination facts (`Environment`,
/// `ClientName`), then tags captured from the replaced destination object,
/// then the copy source's tags.
#[must_use]
pub fn plan_tag_restore(saved: Option<&Tags>, source: &Tags, context: TagContext<'_>) -> TagPlan {
    let required = required_tag_keys(context.destination_namespace);
    let mut plan = TagPlan::default();

    for key in required {
        let value = match *key {
            TAG_ENVIRONMENT => Some(context.destination_environment),
            TAG_CLIENT_NAME => context.destination_namespace.alias(),
            _ => saved
                .and_then(|tags| tags.get_non_empty(key))
                .or_else(|| source.get_non_empty(key)),
        };
        match value {
            Some(value) => {
                plan.apply.insert(*key, value);
            }
            None => plan.unresolved.push(*key),
        }
    }

    if let Some(saved) = saved {
        plan.dropped = saved
            .keys()
            .filter(|key| !required.contains(key))
            .map(str::to_string)
            .collect();
    }

    plan
}
