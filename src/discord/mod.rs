//! # Discord Presentation
//!
//! Turns rendered status pages into Discord message payloads and posts them
//! through a webhook.
//!
//! ## Message Structure
//!
//! - **Content**: the page text produced by [`crate::pagination::render_page`]
//! - **Components**: one action row holding either
//!   - a button per page (`page_<i>`), the current page in the primary style, or
//!   - a string select (`select_page`) listing every page when there are more
//!     than three
//!
//! Interactions raised by those components come back as
//! [`crate::pagination::NavigationEvent`]s carrying the same custom ids.
//!
//! ## Environment Configuration
//!
//! Set `DISCORD_WEBHOOK_URL` to enable posting. Without it every send is a
//! logged no-op.

use anyhow::{Result, bail};
use reqwest::Client;
use tracing::{info, warn};

use crate::models::{DiscordActionRow, DiscordComponent, DiscordMessage, DiscordSelectOption};
use crate::pagination::{Controls, RenderedPage};

const ACTION_ROW: u8 = 1;
const BUTTON: u8 = 2;
const STRING_SELECT: u8 = 3;
const STYLE_PRIMARY: u8 = 1;
const STYLE_SECONDARY: u8 = 2;

/// Builds the message payload for a rendered page.
pub fn message_for(page: &RenderedPage) -> DiscordMessage {
    let components = match &page.controls {
        Controls::Buttons(buttons) if buttons.is_empty() => Vec::new(),
        Controls::Buttons(buttons) => buttons
            .iter()
            .map(|b| DiscordComponent::Button {
                kind: BUTTON,
                style: if b.active { STYLE_PRIMARY } else { STYLE_SECONDARY },
                label: b.label.clone(),
                custom_id: b.custom_id.clone(),
            })
            .collect(),
        Controls::Menu {
            custom_id,
            placeholder,
            options,
        } => vec![DiscordComponent::Select {
            kind: STRING_SELECT,
            custom_id: custom_id.clone(),
            placeholder: placeholder.clone(),
            options: options
                .iter()
                .map(|o| DiscordSelectOption {
                    label: o.label.clone(),
                    description: o.description.clone(),
                    value: o.value.clone(),
                })
                .collect(),
        }],
    };

    DiscordMessage {
        content: page.content.clone(),
        components: if components.is_empty() {
            Vec::new()
        } else {
            vec![DiscordActionRow {
                kind: ACTION_ROW,
                components,
            }]
        },
    }
}

/// Webhook client for posting status pages and reports.
///
/// Cheap to clone; the underlying `reqwest::Client` shares its connection pool.
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,

    /// If `None`, sends are skipped with a log line
    webhook_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            warn!("DISCORD_WEBHOOK_URL not set - Discord notifications will be disabled");
        }

        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Posts a page with its navigation controls.
    pub async fn send_page(&self, page: &RenderedPage) -> Result<()> {
        self.send(&message_for(page)).await
    }

    /// Posts plain text, such as the invalid-target report.
    pub async fn send_text(&self, content: &str) -> Result<()> {
        self.send(&DiscordMessage {
            content: content.to_string(),
            components: Vec::new(),
        })
        .await
    }

    async fn send(&self, message: &DiscordMessage) -> Result<()> {
        let Some(webhook_url) = &self.webhook_url else {
            info!("Discord disabled, not sending message");
            return Ok(());
        };

        let response = self.client.post(webhook_url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Discord rejected the message ({status}): {body}");
        }

        info!("Discord message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buttons_serialize_as_action_row() {
        let page = RenderedPage {
            content: "page one".to_string(),
            controls: Controls::for_pages(0, 2),
        };

        let payload = serde_json::to_value(message_for(&page)).unwrap();
        assert_eq!(
            payload,
            json!({
                "content": "page one",
                "components": [{
                    "type": 1,
                    "components": [
                        {"type": 2, "style": 1, "label": "1", "custom_id": "page_0"},
                        {"type": 2, "style": 2, "label": "2", "custom_id": "page_1"}
                    ]
                }]
            })
        );
    }

    #[test]
    fn many_pages_serialize_as_select() {
        let page = RenderedPage {
            content: "page".to_string(),
            controls: Controls::for_pages(0, 5),
        };

        let payload = serde_json::to_value(message_for(&page)).unwrap();
        let select = &payload["components"][0]["components"][0];
        assert_eq!(select["type"], 3);
        assert_eq!(select["custom_id"], "select_page");
        assert_eq!(select["placeholder"], "Select Page (1-5)");
        assert_eq!(select["options"].as_array().map(Vec::len), Some(5));
        assert_eq!(select["options"][4]["value"], "4");
    }

    #[tokio::test]
    async fn disabled_notifier_is_a_no_op() {
        let notifier = DiscordNotifier::new(None);
        assert!(!notifier.is_enabled());
        notifier.send_text("hello").await.unwrap();
    }

    /// Answers a single request with `status_line` and returns the webhook URL.
    async fn webhook_answering(status_line: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            // read the whole request so closing the socket does not reset it
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .filter_map(|l| l.split_once(':'))
                        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let body = r#"{"message": "Invalid Form Body"}"#;
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{addr}/api/webhooks/1/token")
    }

    #[tokio::test]
    async fn rejected_webhook_is_an_error() {
        let url = webhook_answering("HTTP/1.1 400 Bad Request").await;
        let notifier = DiscordNotifier::new(Some(url));

        let page = RenderedPage {
            content: "page".to_string(),
            controls: Controls::for_pages(0, 2),
        };
        let err = notifier.send_page(&page).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("400"), "{message}");
        assert!(message.contains("Invalid Form Body"), "{message}");
    }

    #[tokio::test]
    async fn accepted_webhook_is_ok() {
        let url = webhook_answering("HTTP/1.1 200 OK").await;
        let notifier = DiscordNotifier::new(Some(url));
        notifier.send_text("all good").await.unwrap();
    }
}
