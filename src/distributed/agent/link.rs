use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::distributed::protocol::{
    AckResponse, ErrorResponse, HEARTBEAT_PATH, HeartbeatRequest, REGISTER_PATH, REPORT_PATH,
    RegisterRequest, RegisterResponse, ReportPayload,
};
use crate::error::CoordinationError;

const LINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Agent-side view of the coordinator.
#[async_trait]
pub trait CoordinatorLink: Send + Sync {
    async fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterResponse, CoordinationError>;

    async fn push_report(&self, report: &ReportPayload) -> Result<(), CoordinationError>;

    async fn heartbeat(&self, client_id: &str) -> Result<(), CoordinationError>;
}

/// JSON over HTTP to a coordinator base URL.
#[derive(Debug, Clone)]
pub struct HttpCoordinatorLink {
    client: Client,
    base: Url,
}

impl HttpCoordinatorLink {
    /// # Errors
    ///
    /// Returns [`CoordinationError::BuildClientFailed`] when the HTTP client
    /// cannot be created.
    pub fn new(base: Url) -> Result<Self, CoordinationError> {
        let client = Client::builder()
            .timeout(LINK_TIMEOUT)
            .build()
            .map_err(|err| CoordinationError::BuildClientFailed { source: err })?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, CoordinationError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| CoordinationError::Request {
                url: url.clone(),
                source: err,
            })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| CoordinationError::Request {
                url: url.clone(),
                source: err,
            })?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&bytes).map_or_else(
                |_err| String::from_utf8_lossy(&bytes).into_owned(),
                |error| error.error,
            );
            return Err(CoordinationError::Rejected {
                url,
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_slice(&bytes).map_err(|err| CoordinationError::Deserialize {
            context: "coordinator response",
            source: err,
        })
    }
}

#[async_trait]
impl CoordinatorLink for HttpCoordinatorLink {
    async fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterResponse, CoordinationError> {
        self.post(REGISTER_PATH, request).await
    }

    async fn push_report(&self, report: &ReportPayload) -> Result<(), CoordinationError> {
        let _ack: AckResponse = self.post(REPORT_PATH, report).await?;
        Ok(())
    }

    async fn heartbeat(&self, client_id: &str) -> Result<(), CoordinationError> {
        let request = HeartbeatRequest {
            client_id: client_id.to_owned(),
        };
        let _ack: AckResponse = self.post(HEARTBEAT_PATH, &request).await?;
        Ok(())
    }
}
