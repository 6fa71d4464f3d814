use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::models::{IntentItems, NotificationIntent, NotificationType};

/// Delivery seam. Implementations only send; bookkeeping is the dispatcher's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, user_id: &str, intent: &NotificationIntent) -> EngineResult<()>;
}

// display cap; the matcher never truncates
const MAX_LISTED: usize = 3;

/// Plain-text body for an intent.
pub fn render_text(intent: &NotificationIntent) -> String {
    let cat = intent.category.as_ref().to_uppercase();
    let mut out = match intent.kind {
        NotificationType::PriceDrop => format!("{cat} price drop"),
        NotificationType::NewProduct => format!("New {cat} listings"),
        NotificationType::PriceVolatility => format!("{cat} prices moved sharply"),
    };
    if let Some(max) = intent.max_price {
        out.push_str(&format!(" (budget NT${max})"));
    }
    out.push('\n');

    match &intent.items {
        IntentItems::Listings(entries) => {
            for e in entries.iter().take(MAX_LISTED) {
                let price = e
                    .current_price
                    .map(|p| format!("NT${p}"))
                    .unwrap_or_else(|| "price unknown".to_string());
                match e.previous_price {
                    Some(old) if e.change_pct.is_some() => {
                        out.push_str(&format!("- {}: NT${old} -> {price}\n", e.title))
                    }
                    _ => out.push_str(&format!("- {}: {price}\n", e.title)),
                }
            }
        }
        IntentItems::Volatility(events) => {
            for ev in events.iter().take(MAX_LISTED) {
                out.push_str(&format!(
                    "- {}: {:+.1}% (now NT${})\n",
                    ev.title, ev.change_pct, ev.new_price
                ));
            }
        }
    }

    let n = intent.items.len();
    if n > MAX_LISTED {
        out.push_str(&format!("... and {} more\n", n - MAX_LISTED));
    }
    out
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<TextMessage>,
}

#[derive(Serialize)]
struct TextMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

/// LINE Messaging API push client.
#[derive(Clone)]
pub struct LineClient {
    http: Client,
    base: String,
    token: String,
}

impl LineClient {
    pub fn new(base: String, token: String) -> Self {
        Self {
            http: Client::new(),
            base,
            token,
        }
    }

    fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

#[async_trait]
impl Transport for LineClient {
    async fn send(&self, user_id: &str, intent: &NotificationIntent) -> EngineResult<()> {
        if !self.has_token() {
            return Err(EngineError::TransportFailure(
                "LINE_CHANNEL_TOKEN is missing in .env".to_string(),
            ));
        }

        let url = format!("{}/v2/bot/message/push", self.base.trim_end_matches('/'));
        let body = PushRequest {
            to: user_id,
            messages: vec![TextMessage {
                kind: "text",
                text: render_text(intent),
            }],
        };

        let res = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(EngineError::TransportFailure(format!(
                "LINE push failed: {status} {body}"
            )));
        }

        Ok(())
    }
}
