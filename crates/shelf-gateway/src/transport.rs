//! Gateway transport boundary
//!
//! [`GatewayTransport`] is the seam between sync orchestration and the
//! network. [`HttpGateway`] speaks JSON over HTTP with reqwest.

use std::future::Future;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shelf_core::JobRequest;
use shelf_engine::config::GatewaySettings;

use crate::error::GatewayError;
use crate::protocol::{
    LayoutPayload, PendingJobsRequest, PendingJobsResponse, ShelfComplete, ShelfIdRequest,
    ShelfIdResponse, StatePayload,
};

/// One round trip per operation
pub trait GatewayTransport: Send + Sync {
    fn fetch_layout(
        &self,
        shelf_id: &str,
    ) -> impl Future<Output = Result<LayoutPayload, GatewayError>> + Send;

    fn push_layout(
        &self,
        payload: &LayoutPayload,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn fetch_state(
        &self,
        shelf_id: &str,
    ) -> impl Future<Output = Result<StatePayload, GatewayError>> + Send;

    fn push_state(
        &self,
        payload: &StatePayload,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn fetch_pending_jobs(
        &self,
        shelf_id: &str,
    ) -> impl Future<Output = Result<Vec<JobRequest>, GatewayError>> + Send;

    fn notify_complete(
        &self,
        complete: &ShelfComplete,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn request_shelf_id(
        &self,
        shelf_ip: Option<&str>,
    ) -> impl Future<Output = Result<ShelfIdResponse, GatewayError>> + Send;
}

/// HTTP/JSON Gateway client
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    settings: GatewaySettings,
}

impl HttpGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("HTTP client: {e}")))?;
        log::info!(
            "[Gateway] HTTP transport to {} (timeout {:?})",
            settings.base_url,
            settings.timeout()
        );
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, GatewayError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        log::debug!("[Gateway] POST {}", url);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// POST where only the status matters
    async fn post_ack<B>(&self, path: &str, body: &B) -> Result<(), GatewayError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let _: serde_json::Value = self.post(path, body).await?;
        Ok(())
    }
}

impl GatewayTransport for HttpGateway {
    async fn fetch_layout(&self, shelf_id: &str) -> Result<LayoutPayload, GatewayError> {
        self.post(&self.settings.layout_path, &LayoutPayload::read(shelf_id))
            .await
    }

    async fn push_layout(&self, payload: &LayoutPayload) -> Result<(), GatewayError> {
        self.post_ack(&self.settings.layout_path, payload).await
    }

    async fn fetch_state(&self, shelf_id: &str) -> Result<StatePayload, GatewayError> {
        self.post(&self.settings.state_path, &StatePayload::read(shelf_id))
            .await
    }

    async fn push_state(&self, payload: &StatePayload) -> Result<(), GatewayError> {
        self.post_ack(&self.settings.state_path, payload).await
    }

    async fn fetch_pending_jobs(&self, shelf_id: &str) -> Result<Vec<JobRequest>, GatewayError> {
        let request = PendingJobsRequest {
            shelf_id: shelf_id.to_string(),
        };
        let response: PendingJobsResponse =
            self.post(&self.settings.pending_jobs_path, &request).await?;
        if !response.success {
            return Err(GatewayError::InvalidPayload(
                "pending jobs request not successful".into(),
            ));
        }
        Ok(response.jobs)
    }

    async fn notify_complete(&self, complete: &ShelfComplete) -> Result<(), GatewayError> {
        self.post_ack(&self.settings.complete_path, complete).await
    }

    async fn request_shelf_id(&self, shelf_ip: Option<&str>) -> Result<ShelfIdResponse, GatewayError> {
        let request = ShelfIdRequest {
            shelf_ip: shelf_ip.map(str::to_string),
        };
        self.post(&self.settings.shelf_id_path, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join() {
        let settings = GatewaySettings {
            base_url: "http://gw:8000/".into(),
            ..GatewaySettings::default()
        };
        let gateway = HttpGateway::new(settings).unwrap();
        assert_eq!(gateway.url("/shelf/layout"), "http://gw:8000/shelf/layout");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_unavailable() {
        let settings = GatewaySettings {
            // reserved port, nothing listens
            base_url: "http://127.0.0.1:9".into(),
            timeout_ms: 500,
            ..GatewaySettings::default()
        };
        let gateway = HttpGateway::new(settings).unwrap();
        let err = gateway.fetch_layout("PC2").await.unwrap_err();
        assert!(err.is_unavailable(), "{err:?}");
    }
}
