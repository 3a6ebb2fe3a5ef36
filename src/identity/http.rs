//! Reqwest-backed identity lookup against the public game-platform APIs.
//!
//! Owns transport concerns only: request shape, bounded timeout, status
//! mapping and JSON decoding.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::lookup::{AvatarEntry, ExternalAccount, IdentityLookup, LookupError};

const AVATAR_SIZE: &str = "150x150";
const USER_AGENT: &str = "adcredits-identity/0.1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsernamesRequest<'a> {
    usernames: [&'a str; 1],
    exclude_banned_users: bool,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdDto {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: IdDto,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvatarDto {
    #[serde(default)]
    image_url: Option<String>,
}

pub struct HttpIdentityLookup {
    client: Client,
    users_url: Url,
    avatar_url: Url,
}

impl HttpIdentityLookup {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(users_url: Url, avatar_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            users_url,
            avatar_url,
        })
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, LookupError> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "identity lookup returned error status");
            return Err(LookupError::Unavailable(format!("upstream status {status}")));
        }
        let body = response.bytes().await.map_err(map_transport_error)?;
        Ok(body.to_vec())
    }
}

fn map_transport_error(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Unavailable("request timed out".into())
    } else {
        LookupError::Unavailable(e.to_string())
    }
}

fn parse_user(body: &[u8]) -> Result<Option<ExternalAccount>, LookupError> {
    let envelope: DataEnvelope<UserDto> =
        serde_json::from_slice(body).map_err(|e| LookupError::Decode(e.to_string()))?;
    Ok(envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|u| ExternalAccount {
            id: match u.id {
                IdDto::Number(n) => n.to_string(),
                IdDto::Text(s) => s,
            },
            name: u.name,
        }))
}

fn parse_avatar(body: &[u8]) -> Result<Option<AvatarEntry>, LookupError> {
    let envelope: DataEnvelope<AvatarDto> =
        serde_json::from_slice(body).map_err(|e| LookupError::Decode(e.to_string()))?;
    Ok(envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|a| AvatarEntry {
            image_url: a.image_url.filter(|url| !url.is_empty()),
        }))
}

#[async_trait]
impl IdentityLookup for HttpIdentityLookup {
    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<ExternalAccount>, LookupError> {
        let request = self.client.post(self.users_url.clone()).json(&UsernamesRequest {
            usernames: [username],
            exclude_banned_users: true,
        });
        let body = self.fetch(request).await?;
        let account = parse_user(&body)?;
        debug!(username, found = account.is_some(), "username lookup finished");
        Ok(account)
    }

    async fn avatar(&self, external_id: &str) -> Result<Option<AvatarEntry>, LookupError> {
        let request = self.client.get(self.avatar_url.clone()).query(&[
            ("userIds", external_id),
            ("size", AVATAR_SIZE),
            ("format", "Png"),
            ("isCircular", "false"),
        ]);
        let body = self.fetch(request).await?;
        parse_avatar(&body)
    }
}
