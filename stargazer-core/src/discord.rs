//! Discord channels as notification destinations.
//!
//! The bot announces in one channel per guild it has joined, chosen by name
//! when the announcement goes out. Guilds without a matching channel are
//! skipped.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::error::DeliveryError;
use crate::notifier::{Destination, DestinationDirectory, Notification};

pub const DEFAULT_DISCORD_API: &str = "https://discord.com/api/v10/";

const GUILD_TEXT: u8 = 0;
const GUILD_ANNOUNCEMENT: u8 = 5;
const EMBED_COLOR: u32 = 0xF5A623;
const EMBED_FOOTER: &str = "Keep pushing the revolution!";
/// Largest page `GET /users/@me/guilds` will return.
const GUILD_PAGE_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
struct Guild {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Clone)]
struct DiscordApi {
    client: Client,
    api_base: Url,
    token: String,
    request_timeout: Duration,
}

impl DiscordApi {
    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, DeliveryError> {
        let url = self.api_base.join(path)?;
        Ok(self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .timeout(self.request_timeout))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, DeliveryError> {
        let response = self.request(reqwest::Method::GET, path)?.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected { status });
        }
        Ok(response.json().await?)
    }

    /// Every guild the bot has joined, following `after` cursors until a
    /// short page comes back.
    async fn guilds(&self) -> Result<Vec<Guild>, DeliveryError> {
        let mut guilds: Vec<Guild> = Vec::new();
        loop {
            let path = match guilds.last() {
                Some(last) => format!(
                    "users/@me/guilds?limit={}&after={}",
                    GUILD_PAGE_LIMIT, last.id
                ),
                None => format!("users/@me/guilds?limit={}", GUILD_PAGE_LIMIT),
            };
            let page: Vec<Guild> = self.get_json(&path).await?;
            let done = page.len() < GUILD_PAGE_LIMIT;
            guilds.extend(page);
            if done {
                return Ok(guilds);
            }
        }
    }
}

/// Enumerates one announcement channel per connected guild.
#[derive(Debug, Clone)]
pub struct DiscordDirectory {
    api: DiscordApi,
    channel_names: Vec<String>,
}

impl DiscordDirectory {
    pub fn new(client: Client, api_base: Url, token: impl Into<String>) -> Self {
        Self {
            api: DiscordApi {
                client,
                api_base,
                token: token.into(),
                request_timeout: Duration::from_secs(10),
            },
            channel_names: vec!["announcements".to_owned(), "general".to_owned()],
        }
    }

    /// Channel names to look for, most preferred first.
    pub fn with_channel_names(mut self, names: Vec<String>) -> Self {
        self.channel_names = names;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.api.request_timeout = timeout;
        self
    }

    fn pick_channel<'a>(&self, channels: &'a [Channel]) -> Option<&'a Channel> {
        self.channel_names.iter().find_map(|wanted| {
            channels.iter().find(|channel| {
                matches!(channel.kind, GUILD_TEXT | GUILD_ANNOUNCEMENT)
                    && channel.name.as_deref() == Some(wanted.as_str())
            })
        })
    }
}

#[async_trait]
impl DestinationDirectory for DiscordDirectory {
    async fn destinations(&self) -> Result<Vec<Box<dyn Destination>>, DeliveryError> {
        let guilds = self.api.guilds().await?;
        let mut destinations: Vec<Box<dyn Destination>> = Vec::with_capacity(guilds.len());

        for guild in guilds {
            let channels: Vec<Channel> =
                match self.api.get_json(&format!("guilds/{}/channels", guild.id)).await {
                    Ok(channels) => channels,
                    Err(err) => {
                        warn!(guild = %guild.name, error = %err, "failed to list guild channels");
                        continue;
                    }
                };

            match self.pick_channel(&channels) {
                Some(channel) => destinations.push(Box::new(DiscordChannel {
                    api: self.api.clone(),
                    channel_id: channel.id.clone(),
                    label: format!(
                        "{}#{}",
                        guild.name,
                        channel.name.as_deref().unwrap_or_default()
                    ),
                })),
                None => debug!(guild = %guild.name, "no announcement channel in guild"),
            }
        }

        Ok(destinations)
    }
}

/// A single Discord text channel.
#[derive(Debug, Clone)]
pub struct DiscordChannel {
    api: DiscordApi,
    channel_id: String,
    label: String,
}

#[async_trait]
impl Destination for DiscordChannel {
    fn id(&self) -> String {
        self.label.clone()
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let response = self
            .api
            .request(
                reqwest::Method::POST,
                &format!("channels/{}/messages", self.channel_id),
            )?
            .json(&embed_message(notification))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected { status })
        }
    }
}

fn embed_message(notification: &Notification) -> serde_json::Value {
    json!({
        "embeds": [{
            "title": notification.title,
            "description": notification.description,
            "color": EMBED_COLOR,
            "fields": [
                {
                    "name": "Total Stars",
                    "value": group_thousands(notification.stars),
                    "inline": true,
                },
                {
                    "name": "Repository",
                    "value": format!("[View on GitHub]({})", notification.repo_url),
                    "inline": true,
                },
            ],
            "footer": { "text": EMBED_FOOTER },
            "timestamp": notification.reached_at.to_rfc3339(),
        }]
    })
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_digits_by_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn prefers_announcements_over_general() {
        let directory = DiscordDirectory::new(
            Client::new(),
            Url::parse(DEFAULT_DISCORD_API).unwrap(),
            "token",
        );
        let channel = |id: &str, name: &str, kind: u8| Channel {
            id: id.to_owned(),
            name: Some(name.to_owned()),
            kind,
        };
        let channels = vec![
            channel("1", "general", GUILD_TEXT),
            channel("2", "announcements", GUILD_ANNOUNCEMENT),
            channel("3", "announcements", 2),
        ];
        let picked = |list: &[Channel]| directory.pick_channel(list).map(|c| c.id.clone());
        assert_eq!(picked(&channels), Some("2".to_owned()));
        assert_eq!(picked(&channels[..1]), Some("1".to_owned()));
        assert!(directory.pick_channel(&channels[2..]).is_none());
    }
}
