//! Metadata-driven serving policy: the block rule and the passthrough whitelist.

use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;

use super::object::ObjectAttributes;

/// Prefix prepended to whitelisted metadata keys when exposed as headers.
pub const PASSTHROUGH_HEADER_PREFIX: &str = "X-Goog-Meta-";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unexpected block-if argument: {0}")]
pub struct BlockRuleError(pub String);

/// Hides every object whose metadata `key` equals `value`.
///
/// Parsed from `key:value`; anything other than exactly one `:` is rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRule {
    pub key: String,
    pub value: String,
}

impl FromStr for BlockRule {
    type Err = BlockRuleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split(':').collect();
        match parts.as_slice() {
            [key, value] => Ok(Self {
                key: key.to_ascii_lowercase(),
                value: (*value).to_string(),
            }),
            _ => Err(BlockRuleError(raw.to_string())),
        }
    }
}

impl BlockRule {
    /// Exact value comparison; an absent key compares as "".
    pub fn matches(&self, attrs: &ObjectAttributes) -> bool {
        attrs.metadata_value(&self.key) == self.value
    }
}

/// Metadata keys that may be exposed as response headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassthroughSet(HashSet<String>);

impl PassthroughSet {
    /// Build from a comma-separated list. Empty entries are dropped, so ""
    /// yields an empty set.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .filter(|key| !key.is_empty())
                .map(str::to_ascii_lowercase)
                .collect(),
        )
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Header name/value pairs for the whitelisted, non-empty metadata entries.
    pub fn headers<'a>(
        &'a self,
        attrs: &'a ObjectAttributes,
    ) -> impl Iterator<Item = (String, &'a str)> + 'a {
        attrs
            .metadata
            .iter()
            .filter(|(key, value)| self.contains(key) && !value.is_empty())
            .map(|(key, value)| (format!("{PASSTHROUGH_HEADER_PREFIX}{key}"), value.as_str()))
    }
}
