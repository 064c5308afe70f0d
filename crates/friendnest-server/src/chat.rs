//! Chat provider port.
//!
//! Groups and users are mirrored into a hosted chat service (Stream Chat).
//! The provider is never authoritative: every call made through [`Chat`] is
//! bounded by a timeout, and failures are logged and dropped so the primary
//! mutation always succeeds.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use reqwest::Method;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use friendnest_shared::constants::CHANNEL_TYPE;
use friendnest_store::User;

use crate::config::StreamCredentials;
use crate::error::ServerError;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("chat integration is disabled")]
    Disabled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The user profile mirrored into the chat service.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
    /// Only admins get an explicit role; everyone else keeps the
    /// provider's default permissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
}

impl From<&User> for ChatUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.full_name.clone(),
            image: user.profile_pic.clone(),
            role: user.role.is_admin().then_some("admin"),
        }
    }
}

#[async_trait]
pub trait ChannelProvider: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn upsert_user(&self, user: &ChatUser) -> Result<(), ChannelError>;

    async fn delete_user(&self, user_id: Uuid) -> Result<(), ChannelError>;

    async fn create_channel(
        &self,
        channel_id: &str,
        name: &str,
        created_by: Uuid,
        members: &[Uuid],
    ) -> Result<(), ChannelError>;

    async fn add_members(&self, channel_id: &str, members: &[Uuid]) -> Result<(), ChannelError>;

    async fn remove_members(&self, channel_id: &str, members: &[Uuid])
        -> Result<(), ChannelError>;

    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), ChannelError>;

    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChannelError>;

    /// Mint a client token for `user_id`. Purely local, no network call.
    fn user_token(&self, user_id: Uuid) -> Result<String, ChannelError>;
}

// ---------------------------------------------------------------------------
// Best-effort facade
// ---------------------------------------------------------------------------

/// Timeout-bounded, failure-absorbing wrapper around a [`ChannelProvider`].
#[derive(Clone)]
pub struct Chat {
    provider: Arc<dyn ChannelProvider>,
    timeout: Duration,
}

impl Chat {
    pub fn new(provider: Arc<dyn ChannelProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_enabled()
    }

    /// Run one provider call. Returns `true` if it completed successfully.
    async fn attempt<F>(&self, operation: &'static str, call: F) -> bool
    where
        F: Future<Output = Result<(), ChannelError>>,
    {
        if !self.provider.is_enabled() {
            return false;
        }
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(())) => {
                debug!(operation, "chat call succeeded");
                true
            }
            Ok(Err(e)) => {
                warn!(operation, error = %e, "chat call failed, continuing");
                false
            }
            Err(_) => {
                warn!(operation, timeout = ?self.timeout, "chat call timed out, continuing");
                false
            }
        }
    }

    pub async fn upsert_user(&self, user: &User) -> bool {
        let chat_user = ChatUser::from(user);
        self.attempt("upsert_user", self.provider.upsert_user(&chat_user))
            .await
    }

    pub async fn delete_user(&self, user_id: Uuid) -> bool {
        self.attempt("delete_user", self.provider.delete_user(user_id))
            .await
    }

    /// Provision `channel_id` with the given members. Returns `true` when the
    /// channel is ready and its id may be stored.
    pub async fn create_channel(
        &self,
        channel_id: &str,
        name: &str,
        created_by: Uuid,
        members: &[Uuid],
    ) -> bool {
        self.attempt(
            "create_channel",
            self.provider
                .create_channel(channel_id, name, created_by, members),
        )
        .await
    }

    pub async fn add_member(&self, channel_id: &str, user_id: Uuid) -> bool {
        if channel_id.is_empty() {
            return false;
        }
        self.attempt("add_members", self.provider.add_members(channel_id, &[user_id]))
            .await
    }

    pub async fn remove_member(&self, channel_id: &str, user_id: Uuid) -> bool {
        if channel_id.is_empty() {
            return false;
        }
        self.attempt(
            "remove_members",
            self.provider.remove_members(channel_id, &[user_id]),
        )
        .await
    }

    pub async fn rename_channel(&self, channel_id: &str, name: &str) -> bool {
        if channel_id.is_empty() {
            return false;
        }
        self.attempt("rename_channel", self.provider.rename_channel(channel_id, name))
            .await
    }

    pub async fn delete_channel(&self, channel_id: &str) -> bool {
        if channel_id.is_empty() {
            return false;
        }
        self.attempt("delete_channel", self.provider.delete_channel(channel_id))
            .await
    }

    /// Delete several channels concurrently.
    pub async fn delete_channels(&self, channel_ids: &[String]) {
        futures::future::join_all(channel_ids.iter().map(|id| self.delete_channel(id))).await;
    }

    pub fn user_token(&self, user_id: Uuid) -> Result<String, ServerError> {
        match self.provider.user_token(user_id) {
            Ok(token) => Ok(token),
            Err(ChannelError::Disabled) => Err(ServerError::ChatUnavailable),
            Err(e) => Err(ServerError::Internal(format!("chat token: {e}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Disabled provider
// ---------------------------------------------------------------------------

/// Used when no chat credentials are configured.
pub struct NoopChannelProvider;

#[async_trait]
impl ChannelProvider for NoopChannelProvider {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn upsert_user(&self, _user: &ChatUser) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled)
    }

    async fn delete_user(&self, _user_id: Uuid) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled)
    }

    async fn create_channel(
        &self,
        _channel_id: &str,
        _name: &str,
        _created_by: Uuid,
        _members: &[Uuid],
    ) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled)
    }

    async fn add_members(&self, _channel_id: &str, _members: &[Uuid]) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled)
    }

    async fn remove_members(
        &self,
        _channel_id: &str,
        _members: &[Uuid],
    ) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled)
    }

    async fn rename_channel(&self, _channel_id: &str, _name: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled)
    }

    async fn delete_channel(&self, _channel_id: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Disabled)
    }

    fn user_token(&self, _user_id: Uuid) -> Result<String, ChannelError> {
        Err(ChannelError::Disabled)
    }
}

// ---------------------------------------------------------------------------
// Stream Chat REST client
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ServerClaims {
    server: bool,
}

#[derive(Serialize, serde::Deserialize)]
struct UserClaims {
    user_id: String,
}

pub struct StreamChatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    key: EncodingKey,
}

impl StreamChatProvider {
    pub fn new(
        credentials: &StreamCredentials,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
            key: EncodingKey::from_secret(credentials.api_secret.as_bytes()),
        })
    }

    fn server_token(&self) -> Result<String, ChannelError> {
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &ServerClaims { server: true },
            &self.key,
        )?)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .header("Authorization", self.server_token()?)
            .header("stream-auth-type", "jwt");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Api {
            status: status.as_u16(),
            body,
        })
    }

    fn channel_path(channel_id: &str) -> String {
        format!("/channels/{CHANNEL_TYPE}/{channel_id}")
    }
}

fn member_ids(members: &[Uuid]) -> Vec<String> {
    members.iter().map(Uuid::to_string).collect()
}

#[async_trait]
impl ChannelProvider for StreamChatProvider {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn upsert_user(&self, user: &ChatUser) -> Result<(), ChannelError> {
        let mut users = serde_json::Map::new();
        users.insert(user.id.clone(), serde_json::to_value(user)?);
        let body = json!({ "users": users });
        self.send(Method::POST, "/users", &[], Some(body)).await
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), ChannelError> {
        self.send(
            Method::DELETE,
            &format!("/users/{user_id}"),
            &[("hard_delete", "true")],
            None,
        )
        .await
    }

    async fn create_channel(
        &self,
        channel_id: &str,
        name: &str,
        created_by: Uuid,
        members: &[Uuid],
    ) -> Result<(), ChannelError> {
        let body = json!({
            "data": {
                "name": name,
                "created_by_id": created_by.to_string(),
                "members": member_ids(members),
            }
        });
        self.send(
            Method::POST,
            &format!("{}/query", Self::channel_path(channel_id)),
            &[],
            Some(body),
        )
        .await
    }

    async fn add_members(&self, channel_id: &str, members: &[Uuid]) -> Result<(), ChannelError> {
        let body = json!({ "add_members": member_ids(members) });
        self.send(Method::POST, &Self::channel_path(channel_id), &[], Some(body))
            .await
    }

    async fn remove_members(
        &self,
        channel_id: &str,
        members: &[Uuid],
    ) -> Result<(), ChannelError> {
        let body = json!({ "remove_members": member_ids(members) });
        self.send(Method::POST, &Self::channel_path(channel_id), &[], Some(body))
            .await
    }

    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), ChannelError> {
        let body = json!({ "set": { "name": name } });
        self.send(Method::PATCH, &Self::channel_path(channel_id), &[], Some(body))
            .await
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChannelError> {
        self.send(
            Method::DELETE,
            &Self::channel_path(channel_id),
            &[("hard_delete", "true")],
            None,
        )
        .await
    }

    fn user_token(&self, user_id: Uuid) -> Result<String, ChannelError> {
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &UserClaims {
                user_id: user_id.to_string(),
            },
            &self.key,
        )?)
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Records every call; can be switched to fail all network calls.
    #[derive(Default)]
    pub(crate) struct RecordingProvider {
        calls: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl RecordingProvider {
        pub(crate) fn failing() -> Self {
            let provider = Self::default();
            provider.fail.store(true, Ordering::SeqCst);
            provider
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<(), ChannelError> {
            self.calls.lock().unwrap().push(call);
            if self.fail.load(Ordering::SeqCst) {
                Err(ChannelError::Api {
                    status: 500,
                    body: "injected failure".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ChannelProvider for RecordingProvider {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn upsert_user(&self, user: &ChatUser) -> Result<(), ChannelError> {
            self.record(format!("upsert_user {}", user.id))
        }

        async fn delete_user(&self, user_id: Uuid) -> Result<(), ChannelError> {
            self.record(format!("delete_user {user_id}"))
        }

        async fn create_channel(
            &self,
            channel_id: &str,
            _name: &str,
            _created_by: Uuid,
            members: &[Uuid],
        ) -> Result<(), ChannelError> {
            self.record(format!("create_channel {channel_id} {}", members.len()))
        }

        async fn add_members(
            &self,
            channel_id: &str,
            members: &[Uuid],
        ) -> Result<(), ChannelError> {
            self.record(format!("add_members {channel_id} {}", member_ids(members).join(",")))
        }

        async fn remove_members(
            &self,
            channel_id: &str,
            members: &[Uuid],
        ) -> Result<(), ChannelError> {
            self.record(format!(
                "remove_members {channel_id} {}",
                member_ids(members).join(",")
            ))
        }

        async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), ChannelError> {
            self.record(format!("rename_channel {channel_id} {name}"))
        }

        async fn delete_channel(&self, channel_id: &str) -> Result<(), ChannelError> {
            self.record(format!("delete_channel {channel_id}"))
        }

        fn user_token(&self, user_id: Uuid) -> Result<String, ChannelError> {
            Ok(format!("token-{user_id}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::RecordingProvider;
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};

    struct SlowProvider;

    #[async_trait]
    impl ChannelProvider for SlowProvider {
        fn is_enabled(&self) -> bool {
            true
        }
        async fn upsert_user(&self, _user: &ChatUser) -> Result<(), ChannelError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
        async fn delete_user(&self, _user_id: Uuid) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn create_channel(
            &self,
            _channel_id: &str,
            _name: &str,
            _created_by: Uuid,
            _members: &[Uuid],
        ) -> Result<(), ChannelError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
        async fn add_members(&self, _c: &str, _m: &[Uuid]) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn remove_members(&self, _c: &str, _m: &[Uuid]) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn rename_channel(&self, _c: &str, _n: &str) -> Result<(), ChannelError> {
            Ok(())
        }
        async fn delete_channel(&self, _c: &str) -> Result<(), ChannelError> {
            Ok(())
        }
        fn user_token(&self, _user_id: Uuid) -> Result<String, ChannelError> {
            Err(ChannelError::Disabled)
        }
    }

    #[tokio::test]
    async fn test_timeout_is_absorbed() {
        let chat = Chat::new(Arc::new(SlowProvider), Duration::from_millis(20));
        assert!(
            !chat
                .create_channel("group-1", "Club", Uuid::new_v4(), &[])
                .await
        );
    }

    #[tokio::test]
    async fn test_failure_is_absorbed() {
        let provider = Arc::new(RecordingProvider::failing());
        let chat = Chat::new(provider.clone(), Duration::from_secs(1));
        assert!(!chat.delete_channel("group-1").await);
        assert_eq!(provider.calls(), vec!["delete_channel group-1".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_channel_id_is_skipped() {
        let provider = Arc::new(RecordingProvider::default());
        let chat = Chat::new(provider.clone(), Duration::from_secs(1));
        assert!(!chat.add_member("", Uuid::new_v4()).await);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_provider() {
        let chat = Chat::new(Arc::new(NoopChannelProvider), Duration::from_secs(1));
        assert!(!chat.is_enabled());
        assert!(!chat.delete_channel("group-1").await);
        assert!(matches!(
            chat.user_token(Uuid::new_v4()),
            Err(ServerError::ChatUnavailable)
        ));
    }

    #[test]
    fn test_stream_user_token_claims() {
        let creds = StreamCredentials {
            api_key: "key".into(),
            api_secret: "secret".into(),
        };
        let provider =
            StreamChatProvider::new(&creds, "http://localhost", Duration::from_secs(1)).unwrap();
        let user_id = Uuid::new_v4();
        let token = provider.user_token(user_id).unwrap();

        let mut validation = Validation::default();
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        let decoded = jsonwebtoken::decode::<UserClaims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims.user_id, user_id.to_string());
    }

    #[test]
    fn test_chat_user_role_only_for_admins() {
        use friendnest_shared::Role;
        let mut user = User {
            id: Uuid::new_v4(),
            full_name: "Ana".into(),
            email: "ana@example.com".into(),
            password_hash: String::new(),
            bio: String::new(),
            profile_pic: String::new(),
            native_language: String::new(),
            learning_language: String::new(),
            location: String::new(),
            is_onboarded: true,
            role: Role::User,
            settings: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(ChatUser::from(&user).role, None);
        user.role = Role::Admin;
        assert_eq!(ChatUser::from(&user).role, Some("admin"));
    }
}
