use serde::Serialize;

/// Stable representation of a Jira issue returned to callers.
///
/// Every scalar is optional and serializes as `null` when Jira did not
/// provide it; lists are always present.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NormalizedIssue {
    pub issue_key: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub comments: Vec<Comment>,
    pub attachments: Vec<AttachmentRef>,
    pub changelog: Vec<ChangelogEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Comment {
    pub id: Option<String>,
    pub author: Option<String>,
    pub body: Option<String>,
    pub created: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttachmentRef {
    pub id: String,
    pub filename: Option<String>,
    pub size: Option<u64>,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
    /// Gateway-relative download path, never the upstream URL.
    pub download_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChangelogEntry {
    pub id: Option<String>,
    pub author: Option<String>,
    pub created: Option<String>,
    pub items: Vec<ChangeItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChangeItem {
    pub field: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Upstream metadata for one attachment. Kept server-side only.
#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentSource {
    pub id: String,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub content_url: Option<String>,
}

/// What the cache stores per issue: the public view plus the attachment
/// sources needed to serve downloads.
#[derive(Clone, Debug, PartialEq)]
pub struct IssueRecord {
    pub issue: NormalizedIssue,
    pub sources: Vec<AttachmentSource>,
}

impl IssueRecord {
    pub fn attachment(&self, id: &str) -> Option<&AttachmentSource> {
        self.sources.iter().find(|source| source.id == id)
    }
}
