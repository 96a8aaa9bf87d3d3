//! Push proxy wire client (spec §6.3).

use async_trait::async_trait;

use crate::models::PushNotification;

#[async_trait]
pub trait PushProxyClient: Send + Sync {
    async fn send_push(&self, notification: &PushNotification);
}

/// POSTs JSON to `<push_server>/api/v1/send_push` over the shared outbound
/// `reqwest::Client` (SPEC_FULL §4.E [AMBIENT] — bounded timeout, no
/// redirects, same client instance the webhook dispatcher uses). The
/// response body is drained and discarded exactly as spec §6.3 describes;
/// failures are logged, never surfaced to the caller (spec §5 cancellation
/// & timeouts).
pub struct HttpPushProxyClient {
    client: reqwest::Client,
    push_server: String,
}

impl HttpPushProxyClient {
    pub fn new(client: reqwest::Client, push_server: String) -> Self {
        HttpPushProxyClient {
            client,
            push_server,
        }
    }
}

#[async_trait]
impl PushProxyClient for HttpPushProxyClient {
    async fn send_push(&self, notification: &PushNotification) {
        let url = format!("{}/api/v1/send_push", self.push_server.trim_end_matches('/'));
        match self.client.post(&url).json(notification).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    tracing::warn!(status = %resp.status(), %url, "push proxy returned non-success status");
                }
                let _ = resp.bytes().await;
            }
            Err(e) => {
                tracing::warn!(error = ?e, %url, "push proxy request failed");
            }
        }
    }
}
