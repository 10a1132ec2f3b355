use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Url};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::SubjectUpdate;
use crate::session::UpdateSink;

use super::roster::SubjectRecord;

/// HTTP client for a relay. Also the production `UpdateSink`.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    base_url: Url,
}

impl RelayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid relay url '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("relay url '{base_url}' cannot be a base"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build relay HTTP client")?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn post_update(&self, update: &SubjectUpdate) -> Result<()> {
        let url = self.endpoint(&["api", "subjects", &update.subject_id]);
        self.client
            .post(url)
            .json(update)
            .send()
            .await
            .context("relay request failed")?
            .error_for_status()
            .context("relay rejected update")?;
        Ok(())
    }

    /// Returns false when the relay did not know the subject.
    pub async fn remove_subject(&self, subject_id: &str) -> Result<bool> {
        let url = self.endpoint(&["api", "subjects", subject_id]);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("relay request failed")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response.error_for_status().context("relay rejected removal")?;
        Ok(true)
    }

    pub async fn roster(&self) -> Result<BTreeMap<String, SubjectRecord>> {
        let url = self.endpoint(&["api", "subjects"]);
        self.client
            .get(url)
            .send()
            .await
            .context("relay request failed")?
            .error_for_status()
            .context("relay rejected roster request")?
            .json()
            .await
            .context("failed to decode roster")
    }
}

impl UpdateSink for RelayClient {
    async fn send_update(&self, update: SubjectUpdate) -> Result<()> {
        self.post_update(&update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_ids_are_path_encoded() {
        let client = RelayClient::new("http://127.0.0.1:3001/", Duration::from_secs(1)).unwrap();
        let url = client.endpoint(&["api", "subjects", "a b/c"]);
        assert_eq!(url.as_str(), "http://127.0.0.1:3001/api/subjects/a%20b%2Fc");
    }

    #[test]
    fn non_http_urls_are_rejected() {
        assert!(RelayClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(RelayClient::new("mailto:relay@example.com", Duration::from_secs(1)).is_err());
    }
}
