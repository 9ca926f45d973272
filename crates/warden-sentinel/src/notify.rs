//! Operator notifications
//!
//! Messages are tagged with the host's identity and sent through an SMS
//! provider. Missing credentials turn dispatch into a logged no-op; delivery
//! failures are logged and swallowed so they never abort the caller.

use crate::error::{Result, SentinelError};
use crate::policy::{NotificationCredentials, PolicyHandle};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{error, info};

/// Production messaging API base
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the provider
    Sent { sid: String },
    /// Not attempted because the channel is not configured
    Skipped,
    /// Attempted and failed
    Failed(String),
}

impl Delivery {
    /// `true` when the provider accepted the message
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent { .. })
    }
}

/// Operator-facing message channel
///
/// Implementations never fail the caller: every problem is folded into the
/// returned [`Delivery`].
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message`, tagged as the implementation sees fit
    async fn send(&self, message: &str) -> Delivery;
}

/// Notifier that only logs; used when no channel is wanted
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Delivery {
        info!("Notification (not delivered): {}", message);
        Delivery::Skipped
    }
}

/// Best-effort local address used to identify this host in messages.
///
/// Connecting a UDP socket only performs a route lookup; nothing is sent.
/// Looked up per message so a new DHCP lease shows up in the next SMS.
pub async fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .await
        .ok()?;
    socket
        .connect(SocketAddr::from((Ipv4Addr::new(8, 8, 8, 8), 80)))
        .await
        .ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}

/// Prefix a message with the host tag
pub fn tag_message(host: Option<IpAddr>, message: &str) -> String {
    let host = host
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    format!("Message from Internet-Rebooter ({}) {}", host, message)
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// SMS dispatch through the Twilio Messages API
pub struct TwilioNotifier {
    client: reqwest::Client,
    policy: PolicyHandle,
    api_base: String,
}

impl TwilioNotifier {
    /// Notifier against the production API; credentials come from each snapshot
    pub fn new(policy: PolicyHandle) -> Self {
        Self::with_api_base(policy, TWILIO_API_BASE)
    }

    /// Point at a different API host (tests, regional endpoints)
    pub fn with_api_base(policy: PolicyHandle, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn deliver(&self, creds: NotificationCredentials<'_>, body: &str) -> Result<String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, creds.account_sid
        );
        let response = self
            .client
            .post(&url)
            .basic_auth(creds.account_sid, Some(creds.auth_token))
            .form(&[
                ("To", creds.to_number),
                ("From", creds.from_number),
                ("Body", body),
            ])
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SentinelError::NotificationRejected(format!(
                "HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let resource: MessageResource = response.json().await?;
        Ok(resource.sid)
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, message: &str) -> Delivery {
        let policy = self.policy.snapshot();
        let Some(creds) = policy.notification_credentials() else {
            info!("Twilio config incomplete, skipping SMS.");
            return Delivery::Skipped;
        };

        let body = tag_message(local_ip().await, message);
        match self.deliver(creds, &body).await {
            Ok(sid) => {
                info!("SMS sent successfully: SID {}", sid);
                Delivery::Sent { sid }
            }
            Err(e) => {
                error!("Error sending SMS: {}", e);
                Delivery::Failed(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for TwilioNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioNotifier")
            .field("api_base", &self.api_base)
            .finish()
    }
}
