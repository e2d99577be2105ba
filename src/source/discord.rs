use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::{
    config::DiscordConfig,
    schema::{Author, Cursor, Partition, PartitionKind, RawItem},
    util::deserialize_snowflake,
};

use super::{MessageSource, SourceError};

/// Hard cap the REST API applies to one message request.
const MAX_MESSAGES_PER_REQUEST: usize = 100;

/// Used when a 429 arrives without a parsable `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Discord REST source
///
/// Discord API:
/// https://discord.com/developers/docs/resources/message#get-channel-messages
///
/// One logical page may span several REST calls because the
/// API never returns more than 100 messages per request.
pub struct DiscordSource {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordSource {
    pub fn new(cfg: &DiscordConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                "DiscordBot (chat-archive-collector, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
        })
    }

    /// GET `path` (with any query string already appended).
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = format!("{}{}", self.api_base, path);

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        if !status.is_success() {
            debug!("GET {} -> {}", path, status);
            return Err(classify_status(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl MessageSource for DiscordSource {

    async fn list_partitions(&self, guild_id: u64) -> Result<Vec<Partition>, SourceError> {
        let channels: Vec<ChannelDto> = self
            .get_json(&format!("/guilds/{}/channels", guild_id))
            .await?;

        Ok(channels.into_iter().map(ChannelDto::into_partition).collect())
    }

    async fn fetch_page(
        &self,
        partition: &Partition,
        after: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<RawItem>, SourceError> {
        // Snowflake 0 precedes every message, so it doubles as
        // "from the very beginning".
        let mut after_id = after.map_or(0, Cursor::item_id);
        let mut items = Vec::new();

        while items.len() < limit {
            let want = (limit - items.len()).min(MAX_MESSAGES_PER_REQUEST);

            let path = format!(
                "/channels/{}/messages?limit={}&after={}",
                partition.id, want, after_id
            );
            let mut batch: Vec<MessageDto> = self.get_json(&path).await?;

            if batch.is_empty() {
                break;
            }

            // The API returns newest-first even when paging forward
            batch.sort_by_key(|m| m.id);

            let got = batch.len();
            after_id = batch[got - 1].id;

            for msg in batch {
                items.push(msg.into_item(partition.id)?);
            }

            if got < want {
                break;
            }
        }

        Ok(items)
    }
}

/// Maps a non-success response onto the error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> SourceError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = serde_json::from_str::<RateLimitDto>(body)
                .ok()
                .and_then(|r| Duration::try_from_secs_f64(r.retry_after).ok())
                .unwrap_or(DEFAULT_RETRY_AFTER);
            SourceError::RateLimited { retry_after }
        }
        StatusCode::UNAUTHORIZED => SourceError::Unauthorized,
        StatusCode::FORBIDDEN => SourceError::Forbidden,
        StatusCode::NOT_FOUND => SourceError::NotFound,
        s if s.is_server_error() => SourceError::Server(s.as_u16()),
        s => SourceError::Status(s.as_u16()),
    }
}

// ------------------------------------------------------------
// Wire types
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChannelDto {
    #[serde(deserialize_with = "deserialize_snowflake")]
    id: u64,

    #[serde(rename = "type")]
    kind: u8,

    #[serde(default)]
    name: Option<String>,
}

impl ChannelDto {
    fn into_partition(self) -> Partition {
        Partition {
            id: self.id,
            name: self.name.unwrap_or_default(),
            kind: PartitionKind::from_code(self.kind),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageDto {
    #[serde(deserialize_with = "deserialize_snowflake")]
    id: u64,

    author: AuthorDto,

    #[serde(default)]
    content: String,

    /// ISO-8601 creation time
    timestamp: String,
}

impl MessageDto {
    fn into_item(self, partition_id: u64) -> Result<RawItem, SourceError> {
        let created_at = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| SourceError::Decode(format!("timestamp {:?}: {}", self.timestamp, e)))?
            .with_timezone(&Utc);

        Ok(RawItem {
            id: self.id,
            partition_id,
            author: Author {
                id: self.author.id,
                username: self.author.username,
                discriminator: self.author.discriminator,
            },
            content: self.content,
            created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AuthorDto {
    #[serde(deserialize_with = "deserialize_snowflake")]
    id: u64,

    username: String,

    #[serde(default = "default_discriminator")]
    discriminator: String,
}

fn default_discriminator() -> String {
    "0".to_string()
}

#[derive(Debug, Deserialize)]
struct RateLimitDto {
    retry_after: f64,
}
