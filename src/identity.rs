use fancy_regex::Regex;
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;
use thiserror::Error;

static RESOURCE_GROUP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/resource[Gg]roups/(.*?)/").expect("valid resource group pattern"));
static CONTAINER_GROUP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/container[Gg]roups/(.*?)$").expect("valid container group pattern"));

const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode an identity component for use inside a request path.
pub(crate) fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string()
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("no resource group segment found in resource uri {0}")]
    MissingResourceGroup(String),
    #[error("no container group segment found in resource uri {0}")]
    MissingContainerGroup(String),
    #[error("failed to evaluate identity pattern against {uri}: {reason}")]
    Pattern { uri: String, reason: String },
}

/// The (resource group, container group) pair addressing one tracked row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    pub resource_group: String,
    pub container_group: String,
}

impl ResourceIdentity {
    pub fn new(resource_group: impl Into<String>, container_group: impl Into<String>) -> Self {
        ResourceIdentity {
            resource_group: resource_group.into(),
            container_group: container_group.into(),
        }
    }

    /// Extract the identity from an ARM resource id such as
    /// `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.ContainerInstance/containerGroups/{cg}`.
    pub fn parse(resource_uri: &str) -> Result<Self, ParseError> {
        let resource_group = capture(&RESOURCE_GROUP_PATTERN, resource_uri)?
            .ok_or_else(|| ParseError::MissingResourceGroup(resource_uri.to_string()))?;
        let container_group = capture(&CONTAINER_GROUP_PATTERN, resource_uri)?
            .ok_or_else(|| ParseError::MissingContainerGroup(resource_uri.to_string()))?;

        Ok(ResourceIdentity {
            resource_group,
            container_group,
        })
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.container_group)
    }
}

// empty captures count as a miss
fn capture(pattern: &Regex, haystack: &str) -> Result<Option<String>, ParseError> {
    let captures = pattern
        .captures(haystack)
        .map_err(|e| ParseError::Pattern {
            uri: haystack.to_string(),
            reason: e.to_string(),
        })?;

    Ok(captures
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty()))
}
