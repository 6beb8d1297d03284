use std::collections::HashSet;

/// Operator-controlled behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// The MSI dataplane is a mock that does not report certificate expiry.
    UseMockMsiRp,
}

impl Feature {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UseMockMsiRp" => Some(Feature::UseMockMsiRp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::UseMockMsiRp => write!(f, "UseMockMsiRp"),
        }
    }
}

pub trait FeatureFlags: Send + Sync {
    fn is_set(&self, feature: Feature) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet(HashSet<Feature>);

impl FeatureSet {
    pub fn new(features: impl IntoIterator<Item = Feature>) -> Self {
        FeatureSet(features.into_iter().collect())
    }
}

impl FeatureFlags for FeatureSet {
    fn is_set(&self, feature: Feature) -> bool {
        self.0.contains(&feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_and_unknown() {
        assert_eq!(Feature::parse("UseMockMsiRp"), Some(Feature::UseMockMsiRp));
        assert_eq!(Feature::parse("usemockmsirp"), None);
    }

    #[test]
    fn feature_set_membership() {
        assert!(!FeatureSet::default().is_set(Feature::UseMockMsiRp));
        assert!(FeatureSet::new([Feature::UseMockMsiRp]).is_set(Feature::UseMockMsiRp));
    }
}
