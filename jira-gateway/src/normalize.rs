//! Maps raw Jira issue payloads onto [`NormalizedIssue`].
//!
//! Only an unparseable body or a non-object top level is an error. Every
//! field-level oddity degrades to `None` or an empty list, and single broken
//! list entries are skipped with a warning.

use crate::issue_key::IssueKey;
use crate::types::{
    AttachmentRef, AttachmentSource, ChangeItem, ChangelogEntry, Comment, IssueRecord,
    NormalizedIssue,
};
use crate::upstream::{UpstreamError, UpstreamResponse};
use serde_json::{Map, Value};

pub fn normalize(
    response: &UpstreamResponse,
    requested: &IssueKey,
) -> Result<IssueRecord, UpstreamError> {
    let payload: Value = serde_json::from_slice(&response.body)
        .map_err(|e| UpstreamError::MalformedPayload(format!("body is not JSON ({e})")))?;
    let Value::Object(issue) = payload else {
        return Err(UpstreamError::MalformedPayload(
            "top-level value is not an object".to_string(),
        ));
    };

    Ok(normalize_issue(&issue, requested))
}

fn normalize_issue(issue: &Map<String, Value>, requested: &IssueKey) -> IssueRecord {
    let empty = Map::new();
    let fields = issue.get("fields").and_then(Value::as_object).unwrap_or(&empty);
    let rendered = issue
        .get("renderedFields")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let issue_key = issue
        .get("key")
        .and_then(text)
        .and_then(|key| key.parse::<IssueKey>().ok())
        .unwrap_or_else(|| requested.clone())
        .to_string();

    // Download links resolve through the same cache entry as this read.
    let (attachments, sources) = extract_attachments(fields, &requested.to_string());

    let normalized = NormalizedIssue {
        summary: fields.get("summary").and_then(text),
        description: extract_description(fields, rendered),
        status: nested_text(fields, &["status", "name"]),
        issue_type: nested_text(fields, &["issuetype", "name"]),
        priority: nested_text(fields, &["priority", "name"]),
        assignee: nested_text(fields, &["assignee", "displayName"]),
        reporter: nested_text(fields, &["reporter", "displayName"]),
        created: fields.get("created").and_then(text),
        updated: fields.get("updated").and_then(text),
        comments: extract_comments(fields, rendered),
        attachments,
        changelog: extract_changelog(issue.get("changelog")),
        issue_key,
    };

    IssueRecord {
        issue: normalized,
        sources,
    }
}

/// Scalars as strings. Objects, arrays and null are treated as absent.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn nested<'a>(map: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = map.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

fn nested_text(map: &Map<String, Value>, path: &[&str]) -> Option<String> {
    nested(map, path).and_then(text)
}

fn list<'a>(map: &'a Map<String, Value>, path: &[&str]) -> &'a [Value] {
    nested(map, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn size(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn extract_description(
    fields: &Map<String, Value>,
    rendered: &Map<String, Value>,
) -> Option<String> {
    if let Some(Value::String(html)) = rendered.get("description")
        && !html.trim().is_empty()
    {
        return Some(html.clone());
    }
    fields.get("description").and_then(adf_text)
}

/// Plain text of an Atlassian Document Format tree. A bare string is taken
/// as-is.
pub fn adf_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(doc) => {
            let mut fragments = Vec::new();
            if let Some(content) = doc.get("content") {
                collect_text(content, &mut fragments);
            }
            let joined = fragments.join(" ");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    }
}

fn collect_text<'a>(node: &'a Value, fragments: &mut Vec<&'a str>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    fragments.push(trimmed);
                }
            }
            if let Some(content) = map.get("content") {
                collect_text(content, fragments);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_text(item, fragments);
            }
        }
        _ => {}
    }
}

fn extract_comments(fields: &Map<String, Value>, rendered: &Map<String, Value>) -> Vec<Comment> {
    let raw = list(fields, &["comment", "comments"]);
    let rendered = list(rendered, &["comment", "comments"]);

    raw.iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let Some(comment) = entry.as_object() else {
                tracing::warn!(index, "Skipping comment that is not an object");
                return None;
            };

            let id = comment.get("id").and_then(text);
            let rendered_body = rendered_comment(rendered, id.as_deref(), index)
                .and_then(|c| c.get("body"))
                .and_then(Value::as_str)
                .filter(|body| !body.trim().is_empty())
                .map(str::to_string);

            Some(Comment {
                author: nested_text(comment, &["author", "displayName"]),
                body: rendered_body.or_else(|| comment.get("body").and_then(adf_text)),
                created: comment.get("created").and_then(text),
                id,
            })
        })
        .collect()
}

/// Rendered counterpart of a raw comment: by id when both sides have one,
/// by position otherwise.
fn rendered_comment<'a>(
    rendered: &'a [Value],
    id: Option<&str>,
    index: usize,
) -> Option<&'a Map<String, Value>> {
    if let Some(id) = id {
        let by_id = rendered.iter().filter_map(Value::as_object).find(|candidate| {
            candidate.get("id").and_then(text).as_deref() == Some(id)
        });
        if by_id.is_some() {
            return by_id;
        }
    }

    let positional = rendered.get(index)?.as_object()?;
    match (id, positional.get("id").and_then(text)) {
        // Ids on both sides that disagree: not the same comment
        (Some(id), Some(other)) if id != other => None,
        _ => Some(positional),
    }
}

fn extract_attachments(
    fields: &Map<String, Value>,
    issue_key: &str,
) -> (Vec<AttachmentRef>, Vec<AttachmentSource>) {
    let mut refs = Vec::new();
    let mut sources = Vec::new();

    for (index, entry) in list(fields, &["attachment"]).iter().enumerate() {
        let Some(attachment) = entry.as_object() else {
            tracing::warn!(issue_key, index, "Skipping attachment that is not an object");
            continue;
        };
        let Some(id) = attachment
            .get("id")
            .and_then(text)
            .filter(|id| !id.trim().is_empty())
        else {
            tracing::warn!(issue_key, index, "Skipping attachment without an id");
            continue;
        };

        let source = AttachmentSource {
            filename: attachment.get("filename").and_then(text),
            mime_type: attachment.get("mimeType").and_then(text),
            size: attachment.get("size").and_then(size),
            content_url: attachment.get("content").and_then(Value::as_str).map(str::to_string),
            id,
        };

        refs.push(AttachmentRef {
            download_url: format!("/jira/{}/attachments/{}", issue_key, source.id),
            id: source.id.clone(),
            filename: source.filename.clone(),
            size: source.size,
            mime_type: source.mime_type.clone(),
        });
        sources.push(source);
    }

    (refs, sources)
}

fn extract_changelog(changelog: Option<&Value>) -> Vec<ChangelogEntry> {
    let Some(changelog) = changelog.and_then(Value::as_object) else {
        return Vec::new();
    };

    list(changelog, &["histories"])
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let Some(history) = entry.as_object() else {
                tracing::warn!(index, "Skipping changelog entry that is not an object");
                return None;
            };

            let items = list(history, &["items"])
                .iter()
                .filter_map(Value::as_object)
                .map(|item| ChangeItem {
                    field: item.get("field").and_then(text),
                    from: item.get("fromString").and_then(text),
                    to: item.get("toString").and_then(text),
                })
                .collect();

            Some(ChangelogEntry {
                id: history.get("id").and_then(text),
                author: nested_text(history, &["author", "displayName"]),
                created: history.get("created").and_then(text),
                items,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};
    use serde_json::json;

    fn response(body: impl Into<Bytes>) -> UpstreamResponse {
        UpstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    fn normalize_value(value: Value) -> IssueRecord {
        let body = serde_json::to_vec(&value).unwrap();
        normalize(&response(body), &"ABC-123".parse().unwrap()).unwrap()
    }

    fn adf(texts: &[&str]) -> Value {
        let nodes: Vec<Value> = texts
            .iter()
            .map(|t| json!({"type": "text", "text": t}))
            .collect();
        json!({
            "type": "doc",
            "version": 1,
            "content": [{"type": "paragraph", "content": nodes}]
        })
    }

    #[test]
    fn test_full_payload() {
        let record = normalize_value(json!({
            "key": "ABC-123",
            "fields": {
                "summary": "Login fails",
                "description": adf(&["raw"]),
                "status": {"name": "In Progress"},
                "issuetype": {"name": "Bug"},
                "priority": {"name": "High"},
                "assignee": {"displayName": "Dana"},
                "reporter": {"displayName": "Sam"},
                "created": "2024-01-01T10:00:00.000+0000",
                "updated": "2024-01-02T10:00:00.000+0000",
                "comment": {"comments": [
                    {"id": "1", "author": {"displayName": "Dana"}, "body": adf(&["first"]), "created": "c1"},
                    {"id": "2", "author": {"displayName": "Sam"}, "body": adf(&["second"]), "created": "c2"}
                ]},
                "attachment": [{
                    "id": "10001",
                    "filename": "trace.log",
                    "size": 2048,
                    "mimeType": "text/plain",
                    "content": "https://example.atlassian.net/rest/api/3/attachment/content/10001"
                }]
            },
            "renderedFields": {
                "description": "<p>Rendered</p>",
                "comment": {"comments": [
                    {"id": "2", "body": "<p>second rendered</p>"},
                    {"id": "1", "body": "<p>first rendered</p>"}
                ]}
            },
            "changelog": {"histories": [{
                "id": "500",
                "author": {"displayName": "Dana"},
                "created": "h1",
                "items": [{"field": "status", "fromString": "To Do", "toString": "In Progress"}]
            }]}
        }));

        let issue = &record.issue;
        assert_eq!(issue.issue_key, "ABC-123");
        assert_eq!(issue.summary.as_deref(), Some("Login fails"));
        assert_eq!(issue.description.as_deref(), Some("<p>Rendered</p>"));
        assert_eq!(issue.status.as_deref(), Some("In Progress"));
        assert_eq!(issue.issue_type.as_deref(), Some("Bug"));
        assert_eq!(issue.priority.as_deref(), Some("High"));
        assert_eq!(issue.assignee.as_deref(), Some("Dana"));
        assert_eq!(issue.reporter.as_deref(), Some("Sam"));

        // Rendered bodies are matched by id, not position
        assert_eq!(issue.comments.len(), 2);
        assert_eq!(issue.comments[0].body.as_deref(), Some("<p>first rendered</p>"));
        assert_eq!(issue.comments[1].body.as_deref(), Some("<p>second rendered</p>"));
        assert_eq!(issue.comments[1].author.as_deref(), Some("Sam"));

        let attachment = &issue.attachments[0];
        assert_eq!(attachment.id, "10001");
        assert_eq!(attachment.size, Some(2048));
        assert_eq!(attachment.download_url, "/jira/ABC-123/attachments/10001");
        assert_eq!(record.attachment("10001").unwrap().filename.as_deref(), Some("trace.log"));

        assert_eq!(issue.changelog.len(), 1);
        assert_eq!(issue.changelog[0].items[0].from.as_deref(), Some("To Do"));
        assert_eq!(issue.changelog[0].items[0].to.as_deref(), Some("In Progress"));
    }

    #[test]
    fn test_sparse_payload() {
        let record = normalize_value(json!({"fields": {"summary": "Only a summary"}}));
        let issue = record.issue;

        // Falls back to the requested key
        assert_eq!(issue.issue_key, "ABC-123");
        assert_eq!(issue.summary.as_deref(), Some("Only a summary"));
        assert_eq!(issue.description, None);
        assert_eq!(issue.assignee, None);
        assert!(issue.comments.is_empty());
        assert!(issue.attachments.is_empty());
        assert!(issue.changelog.is_empty());

        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["description"], Value::Null);
        assert_eq!(value["comments"], json!([]));
    }

    #[test]
    fn test_description_fallbacks() {
        // Blank rendered description falls back to ADF text
        let record = normalize_value(json!({
            "fields": {"description": adf(&["  Hello ", "world", "   "])},
            "renderedFields": {"description": "   "}
        }));
        assert_eq!(record.issue.description.as_deref(), Some("Hello world"));

        let record = normalize_value(json!({"fields": {"description": "plain text"}}));
        assert_eq!(record.issue.description.as_deref(), Some("plain text"));

        let record = normalize_value(json!({"fields": {"description": adf(&[])}}));
        assert_eq!(record.issue.description, None);

        let record = normalize_value(json!({"fields": {"description": ["unexpected"]}}));
        assert_eq!(record.issue.description, None);
    }

    #[test]
    fn test_nested_adf() {
        let doc = json!({
            "type": "doc",
            "content": [
                {"type": "heading", "content": [{"type": "text", "text": "Title"}]},
                {"type": "bulletList", "content": [
                    {"type": "listItem", "content": [
                        {"type": "paragraph", "content": [{"type": "text", "text": "one"}]}
                    ]},
                    {"type": "listItem", "content": [
                        {"type": "paragraph", "content": [{"type": "text", "text": "two"}]}
                    ]}
                ]}
            ]
        });
        assert_eq!(adf_text(&doc).as_deref(), Some("Title one two"));
        assert_eq!(adf_text(&Value::Null), None);
    }

    #[test]
    fn test_type_coercion() {
        let record = normalize_value(json!({
            "key": 42,
            "fields": {
                "summary": 7,
                "created": true,
                "status": {"name": {"nested": "object"}},
                "assignee": "not an object",
                "attachment": [{"id": 9, "size": "1024"}, {"id": "10", "size": "huge"}]
            }
        }));
        let issue = record.issue;

        assert_eq!(issue.issue_key, "ABC-123");
        assert_eq!(issue.summary.as_deref(), Some("7"));
        assert_eq!(issue.created.as_deref(), Some("true"));
        assert_eq!(issue.status, None);
        assert_eq!(issue.assignee, None);
        assert_eq!(issue.attachments[0].id, "9");
        assert_eq!(issue.attachments[0].size, Some(1024));
        assert_eq!(issue.attachments[1].size, None);
        assert_eq!(issue.attachments[0].download_url, "/jira/ABC-123/attachments/9");
    }

    #[test]
    fn test_download_links_use_requested_key() {
        let record = normalize_value(json!({
            "key": "not a key/..",
            "fields": {"attachment": [{"id": "7"}]}
        }));
        assert_eq!(record.issue.issue_key, "ABC-123");
        assert_eq!(
            record.issue.attachments[0].download_url,
            "/jira/ABC-123/attachments/7"
        );
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let record = normalize_value(json!({
            "fields": {
                "comment": {"comments": ["oops", {"id": "1", "body": "kept"}]},
                "attachment": [{"filename": "no-id.txt"}, 3, {"id": "7", "filename": "ok.txt"}]
            },
            "changelog": {"histories": [null, {"id": "1", "items": "bad"}]}
        }));
        let issue = record.issue;

        assert_eq!(issue.comments.len(), 1);
        assert_eq!(issue.comments[0].body.as_deref(), Some("kept"));
        assert_eq!(issue.attachments.len(), 1);
        assert_eq!(issue.attachments[0].id, "7");
        assert_eq!(record.sources.len(), 1);
        assert_eq!(issue.changelog.len(), 1);
        assert!(issue.changelog[0].items.is_empty());
    }

    #[test]
    fn test_positional_comment_match() {
        let record = normalize_value(json!({
            "fields": {"comment": {"comments": [{"body": adf(&["raw"])}, {"body": adf(&["raw two"])}]}},
            "renderedFields": {"comment": {"comments": [{"body": "<p>one</p>"}]}}
        }));
        let comments = record.issue.comments;

        assert_eq!(comments[0].body.as_deref(), Some("<p>one</p>"));
        assert_eq!(comments[1].body.as_deref(), Some("raw two"));
    }

    #[test]
    fn test_malformed_payload() {
        let key: IssueKey = "ABC-1".parse().unwrap();

        let err = normalize(&response("<html>oops</html>"), &key).unwrap_err();
        assert_eq!(err.kind(), "MALFORMED_UPSTREAM_PAYLOAD");

        let err = normalize(&response("[1, 2]"), &key).unwrap_err();
        assert!(matches!(err, UpstreamError::MalformedPayload(_)));
    }
}
