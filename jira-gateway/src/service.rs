use crate::attachments::{self, AttachmentStream};
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::errors::{GatewayError, Result};
use crate::issue_key::{AttachmentId, IssueKey};
use crate::normalize::normalize;
use crate::types::{IssueRecord, NormalizedIssue};
use crate::upstream::UpstreamClient;
use std::sync::Arc;

/// Composes the upstream client, cache and normalizer behind the two
/// operations the HTTP layer exposes. Cheap to clone.
#[derive(Clone)]
pub struct IssueService {
    inner: Arc<Inner>,
}

struct Inner {
    client: UpstreamClient,
    cache: ResponseCache<IssueRecord>,
}

impl IssueService {
    pub fn new(client: UpstreamClient, cache: ResponseCache<IssueRecord>) -> Self {
        IssueService {
            inner: Arc::new(Inner { client, cache }),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = UpstreamClient::new(config)?;
        let cache = ResponseCache::from_config(&config.cache);
        Ok(Self::new(client, cache))
    }

    pub async fn get_issue(&self, raw_key: &str) -> Result<NormalizedIssue> {
        let key: IssueKey = raw_key.parse()?;
        let record = self.issue_record(&key).await?;
        Ok(record.issue)
    }

    /// Checks the attachment against the issue's (cached) attachment list
    /// before opening anything upstream.
    pub async fn stream_attachment(
        &self,
        raw_key: &str,
        raw_attachment_id: &str,
    ) -> Result<AttachmentStream> {
        let key: IssueKey = raw_key.parse()?;
        let attachment_id: AttachmentId = raw_attachment_id.parse()?;

        let record = self.issue_record(&key).await?;
        let Some(source) = record.attachment(attachment_id.as_str()) else {
            tracing::info!(
                issue_key = %key,
                attachment_id = %attachment_id,
                "Attachment is not listed on the issue"
            );
            return Err(GatewayError::AttachmentNotFound {
                issue_key: key.to_string(),
                attachment_id: attachment_id.to_string(),
            });
        };

        attachments::open(&self.inner.client, &key, source).await
    }

    async fn issue_record(&self, key: &IssueKey) -> Result<IssueRecord> {
        let Inner { client, cache } = &*self.inner;
        let cache_key = format!("issue:{key}");

        let record = cache
            .get_or_compute(&cache_key, cache.ttl(), || async move {
                let response = client.fetch_issue(key).await?;
                normalize(&response, key)
            })
            .await
            .inspect_err(|err| {
                tracing::warn!(issue_key = %key, kind = err.kind(), error = %err, "Issue fetch failed");
            })?;

        Ok(record)
    }
}
