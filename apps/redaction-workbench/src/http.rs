//! HTTP client for the redaction service
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Call             | Request                                        |
//! |------------------|------------------------------------------------|
//! | start_detection  | `POST /documents/{doc}/detect`                 |
//! | job_status       | `GET  /jobs/{job}`                             |
//! | cancel_job       | `POST /jobs/{job}/cancel`                      |
//! | list_matches     | `GET  /documents/{doc}/jobs/{job}/matches`     |
//! | set_approval     | `POST /documents/{doc}/matches/approval`       |
//! | finalize         | `POST /documents/{doc}/finalize`               |

use std::time::Duration;

use async_trait::async_trait;
use redaction_core::{
    Approval, FinalizeReceipt, FinalizeRequest, JobId, JobStatus, MatchId, RedactionMatch,
};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::service::RedactionService;

pub struct HttpRedactionService {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pages: Option<&'a [u32]>,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    job_id: JobId,
}

#[derive(Debug, Serialize)]
struct ApprovalRequest<'a> {
    match_ids: &'a [MatchId],
    approval: Approval,
}

impl HttpRedactionService {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-2xx response into `ServiceError::Status`, keeping the body
/// as the message when the server sent one.
async fn check(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body
    };
    Err(ServiceError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RedactionService for HttpRedactionService {
    #[instrument(skip(self, pages))]
    async fn start_detection(
        &self,
        document_id: &str,
        pages: Option<&[u32]>,
    ) -> Result<JobId, ServiceError> {
        let response = self
            .client
            .post(self.url(&format!("/documents/{}/detect", document_id)))
            .json(&DetectRequest { pages })
            .send()
            .await?;
        let body: DetectResponse = check(response).await?.json().await?;
        debug!(job_id = %body.job_id, "Detection started");
        Ok(body.job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, ServiceError> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{}", job_id)))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    #[instrument(skip(self))]
    async fn cancel_job(&self, job_id: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.url(&format!("/jobs/{}/cancel", job_id)))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_matches(
        &self,
        document_id: &str,
        job_id: &str,
    ) -> Result<Vec<RedactionMatch>, ServiceError> {
        let response = self
            .client
            .get(self.url(&format!(
                "/documents/{}/jobs/{}/matches",
                document_id, job_id
            )))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn set_approval(
        &self,
        document_id: &str,
        ids: &[MatchId],
        approval: Approval,
    ) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.url(&format!("/documents/{}/matches/approval", document_id)))
            .json(&ApprovalRequest {
                match_ids: ids,
                approval,
            })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(document_id = %request.document_id))]
    async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeReceipt, ServiceError> {
        let response = self
            .client
            .post(self.url(&format!("/documents/{}/finalize", request.document_id)))
            .json(request)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}
