use async_trait::async_trait;
use thiserror::Error;

/// Account as returned by the username search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAccount {
    pub id: String,
    pub name: String,
}

/// First entry of the avatar response. `image_url` is null while the
/// thumbnail is still pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvatarEntry {
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Transport failure, timeout or non-success status.
    #[error("identity lookup unavailable: {0}")]
    Unavailable(String),
    /// Payload did not match the expected shape.
    #[error("identity lookup returned an unexpected payload: {0}")]
    Decode(String),
}

/// Username → account → avatar resolution against the game platform.
/// `Ok(None)` means the service answered with an absent or empty `data`
/// array.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<ExternalAccount>, LookupError>;

    async fn avatar(&self, external_id: &str) -> Result<Option<AvatarEntry>, LookupError>;
}
