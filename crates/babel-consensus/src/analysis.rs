// crates/babel-consensus/src/analysis.rs
//
// HTTP client for the external content analysis service.

use std::time::Duration;

use async_trait::async_trait;
use babel_core::error::BabelError;
use babel_core::traits::AnalysisService;
use babel_core::{
    BatchAnalysisRequest, BatchAnalysisResponse, UserActivityRequest, UserAnalysisResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Posts batch analysis requests to `{base_url}/analyze/batch` and user
/// activity to `{base_url}/analyze/user/activity`.
#[derive(Debug, Clone)]
pub struct HttpAnalysisClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAnalysisClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn batch_url(&self) -> String {
        format!("{}/analyze/batch", self.base_url)
    }

    pub fn user_activity_url(&self) -> String {
        format!("{}/analyze/user/activity", self.base_url)
    }

    async fn post<Req, Resp>(&self, url: &str, request: &Req) -> Result<Resp, BabelError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let resp = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BabelError::Timeout(format!("analysis request to {}", url))
                } else {
                    BabelError::Analysis(format!("request to {} failed: {}", url, e))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BabelError::Analysis(format!(
                "analysis service returned status {}",
                status
            )));
        }

        resp.json()
            .await
            .map_err(|e| BabelError::Analysis(format!("invalid analysis response: {}", e)))
    }
}

fn service_failure(error: Option<&str>) -> BabelError {
    BabelError::Analysis(format!(
        "analysis failed: {}",
        error.unwrap_or("unknown error")
    ))
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn analyze_batch(
        &self,
        request: &BatchAnalysisRequest,
    ) -> Result<BatchAnalysisResponse, BabelError> {
        let url = self.batch_url();
        tracing::debug!(url = %url, items = request.items.len(), "Sending batch analysis request");

        let body: BatchAnalysisResponse = self.post(&url, request).await?;
        if !body.is_success() {
            return Err(service_failure(body.error.as_deref()));
        }
        Ok(body)
    }

    async fn analyze_user(
        &self,
        request: &UserActivityRequest,
    ) -> Result<UserAnalysisResponse, BabelError> {
        let url = self.user_activity_url();
        tracing::debug!(
            url = %url,
            user_id = %request.user_id,
            votes = request.votes.len(),
            evidence = request.evidence.len(),
            "Sending user activity analysis request"
        );

        let body: UserAnalysisResponse = self.post(&url, request).await?;
        if !body.is_success() {
            return Err(service_failure(body.error.as_deref()));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_url_trims_slash() {
        let client = HttpAnalysisClient::new("http://127.0.0.1:5000/", Duration::from_secs(30));
        assert_eq!(client.batch_url(), "http://127.0.0.1:5000/analyze/batch");
        assert_eq!(
            client.user_activity_url(),
            "http://127.0.0.1:5000/analyze/user/activity"
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let client = HttpAnalysisClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        let result = client.analyze_batch(&BatchAnalysisRequest::new(vec![])).await;
        assert!(matches!(
            result,
            Err(BabelError::Analysis(_)) | Err(BabelError::Timeout(_))
        ));
    }
}
