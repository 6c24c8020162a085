use crate::errors::GatewayError;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static ISSUE_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9]+-[0-9]+$").expect("valid issue key pattern"));

static ATTACHMENT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid attachment id pattern"));

/// A Jira issue key such as `ABC-123`.
///
/// Construction is the only validation point, so holding an `IssueKey` means
/// the value is safe to put into an upstream URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IssueKey(String);

impl IssueKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for IssueKey {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if ISSUE_KEY_PATTERN.is_match(trimmed) {
            Ok(IssueKey(trimmed.to_string()))
        } else {
            Err(GatewayError::InvalidIssueKey(s.to_string()))
        }
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric Jira attachment id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AttachmentId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if ATTACHMENT_ID_PATTERN.is_match(s) {
            Ok(AttachmentId(s.to_string()))
        } else {
            Err(GatewayError::InvalidAttachmentId(s.to_string()))
        }
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
