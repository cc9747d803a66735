use std::collections::HashSet;

const DEFAULT_ORIGINS: &str = "http://127.0.0.1:4200,http://localhost:4200";

/// Allow-list for the `Origin` header of upgrade requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    #[default]
    AllowAll,
    AllowList(HashSet<String>),
}

impl OriginPolicy {
    /// Parse a comma-separated list. `*` anywhere allows every origin; an
    /// empty value falls back to the local development origins.
    pub fn parse(raw: &str) -> Self {
        let raw = if raw.trim().is_empty() {
            DEFAULT_ORIGINS
        } else {
            raw
        };

        let mut allowed = HashSet::new();
        for origin in raw.split(',').map(str::trim) {
            if origin == "*" {
                return OriginPolicy::AllowAll;
            }
            if !origin.is_empty() {
                allowed.insert(origin.to_string());
            }
        }
        OriginPolicy::AllowList(allowed)
    }

    /// Exact match only. A missing header is checked as the empty string.
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match self {
            OriginPolicy::AllowAll => true,
            OriginPolicy::AllowList(allowed) => allowed.contains(origin.unwrap_or_default()),
        }
    }
}
