use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A parsed Azure Resource Manager resource identifier.
///
/// The original string is kept as-is; parsing never changes its casing.
/// Supported shapes:
///
/// ```text
/// /subscriptions/{sub}
/// /subscriptions/{sub}/resourceGroups/{rg}
/// /subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}[/{type}/{name}...]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    raw: String,
    subscription_id: String,
    resource_group: Option<String>,
    provider: Option<String>,
    resource_type: String,
    name: String,
}

impl ResourceId {
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let invalid = |reason: &str| DomainError::InvalidResourceId {
            id: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim_end_matches('/');
        let rest = trimmed
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        let segs: Vec<&str> = rest.split('/').collect();
        if segs.iter().any(|s| s.is_empty()) {
            return Err(invalid("contains an empty segment"));
        }

        match segs.first() {
            Some(first) if first.eq_ignore_ascii_case("subscriptions") => {}
            _ => return Err(invalid("must start with '/subscriptions/'")),
        }
        let subscription_id = segs
            .get(1)
            .ok_or_else(|| invalid("missing subscription id"))?
            .to_string();

        let mut idx = 2;
        let mut resource_group = None;
        if segs.get(idx).is_some_and(|s| s.eq_ignore_ascii_case("resourceGroups")) {
            let rg = segs
                .get(idx + 1)
                .ok_or_else(|| invalid("missing resource group name"))?;
            resource_group = Some(rg.to_string());
            idx += 2;
        }

        if idx == segs.len() {
            let (resource_type, name) = match &resource_group {
                Some(rg) => ("resourceGroups".to_string(), rg.clone()),
                None => ("subscriptions".to_string(), subscription_id.clone()),
            };
            return Ok(Self {
                raw: s.to_string(),
                subscription_id,
                resource_group,
                provider: None,
                resource_type,
                name,
            });
        }

        if !segs[idx].eq_ignore_ascii_case("providers") {
            return Err(invalid("expected 'providers' segment"));
        }
        let provider = segs
            .get(idx + 1)
            .ok_or_else(|| invalid("missing provider namespace"))?
            .to_string();

        let typed = &segs[idx + 2..];
        if typed.is_empty() || typed.len() % 2 != 0 {
            return Err(invalid("expected type/name pairs after the provider namespace"));
        }
        let resource_type = typed
            .chunks(2)
            .map(|pair| pair[0])
            .collect::<Vec<_>>()
            .join("/");
        let name = typed[typed.len() - 1].to_string();

        Ok(Self {
            raw: s.to_string(),
            subscription_id,
            resource_group,
            provider: Some(provider),
            resource_type,
            name,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Resource type without the namespace, child types joined by `/`.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unicode case-insensitive comparison against another id string.
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        eq_fold(&self.raw, other)
    }
}

/// Case-insensitive string equality, folding one char against one char.
///
/// Chars are compared pairwise, so a char whose lowercase form expands to
/// several chars (such as 'İ') never matches that expansion spelled out.
pub fn eq_fold(a: &str, b: &str) -> bool {
    let mut left = a.chars();
    let mut right = b.chars();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) => {
                if x != y && !x.to_lowercase().eq(y.to_lowercase()) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

impl FromStr for ResourceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> String {
        id.raw
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}
