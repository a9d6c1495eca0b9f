//! API client for communicating with the scraplook backend.
//!
//! This module provides the `ApiClient` struct for signing in, checking and
//! refreshing tokens, and fetching users and messages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::{ApiError, Authenticator};
use crate::auth::{refresh_if_needed, SessionStore, TickOutcome, TokenBackend};
use crate::models::{Message, MessageInput, NewUser, RefreshedToken, TokenPair, User, UserProfile};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the scraplook backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    authenticator: Authenticator,
}

impl ApiClient {
    /// Create a client whose requests are authenticated from `session`.
    pub fn new(base_url: &str, session: Arc<SessionStore>) -> Result<Self, ApiError> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| ApiError::Configuration(format!("backend URL {}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Configuration(format!(
                "backend URL must be http or https: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authenticator: Authenticator::new(session),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.authenticator.session()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of `collection` with `id` appended as one percent-encoded segment.
    fn item_url(&self, collection: &str, id: &str) -> Result<String, ApiError> {
        let mut url = Url::parse(&self.url(collection))
            .map_err(|e| ApiError::Configuration(format!("backend URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Configuration(format!("backend URL cannot have paths: {}", self.base_url)))?
            .pop_if_empty()
            .push(id);
        Ok(url.into())
    }

    // ===== Sending =====

    /// Build the request, let the authenticator attach the session's
    /// credential, then send it.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let mut request = builder.build()?;
        self.authenticator.apply(&mut request)?;
        debug!(method = %request.method(), url = %request.url(), "Sending request");
        Ok(self.client.execute(request).await?)
    }

    /// Send with an explicit bearer token instead of the session's access
    /// token.
    async fn send_with_bearer(&self, builder: RequestBuilder, token: &str) -> Result<Response, ApiError> {
        let mut request = builder.build()?;
        Authenticator::set_bearer(&mut request, token)?;
        debug!(method = %request.method(), url = %request.url(), "Sending request");
        Ok(self.client.execute(request).await?)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_url(&self.url(path), &[]).await
    }

    async fn get_url<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.send(self.client.get(url).query(query)).await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            let response = Self::check_response(response).await?;
            return Self::parse_json(response, url).await;
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(self.client.post(&url).json(body)).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, &url).await
    }

    // ===== Authentication =====

    /// Exchange username and password for a token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let url = self.url("/auth/token");
        let builder = self
            .client
            .post(&url)
            .form(&[("username", username), ("password", password)]);

        // Credentials are the proof here; no bearer is attached
        let request = builder.build()?;
        debug!(url = %request.url(), "Sending login request");
        let response = self.client.execute(request).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, &url).await
    }

    /// Log in and store the issued tokens in the session.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let tokens = self.login(username, password).await?;
        let refresh_token = tokens.refresh_token.ok_or(ApiError::NoRefreshTokenIssued)?;
        self.session().login(&tokens.access_token, &refresh_token, username);
        Ok(())
    }

    /// Run one refresh tick now, so a one-off request does not go out with
    /// an access token that has already lapsed.
    pub async fn refresh_session(&self) -> Result<TickOutcome, ApiError> {
        refresh_if_needed(self.session(), self).await
    }

    /// Forget the session locally. The backend keeps no session state.
    pub fn sign_out(&self) {
        self.session().logout();
    }

    /// Ask the backend whether `access_token` should be renewed.
    ///
    /// Only a body of exactly `true` means renewal is required.
    pub async fn check_refresh_access_token(&self, access_token: &str) -> Result<bool, ApiError> {
        let url = self.url("/auth/check_refresh_access_token");
        let response = self
            .send_with_bearer(self.client.get(&url), access_token)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::CheckFailed { status });
        }

        let body = response.text().await?;
        let needs_refresh = body == "true";
        debug!(needs_refresh, "Access token checked");
        Ok(needs_refresh)
    }

    /// Exchange `refresh_token` for a new access token.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, ApiError> {
        let url = self.url("/auth/refresh_access_token");
        let response = self
            .send_with_bearer(self.client.post(&url), refresh_token)
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Access token refresh rejected");
            return Err(ApiError::refresh_failed(&body));
        }

        let refreshed: RefreshedToken = Self::parse_json(response, &url).await?;
        info!("Received new access token");
        Ok(refreshed.access_token)
    }

    /// Fetch the signed-in user.
    pub async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.get("/auth/me").await
    }

    // ===== Users =====

    pub async fn fetch_users(&self) -> Result<Vec<User>, ApiError> {
        self.get("/user/all").await
    }

    pub async fn fetch_user(&self, user_id: &str) -> Result<User, ApiError> {
        self.get_url(&self.item_url("/user", user_id)?, &[]).await
    }

    pub async fn create_user(&self, name: &str, password: &str) -> Result<User, ApiError> {
        let body = NewUser {
            name: name.to_string(),
            password: password.to_string(),
        };
        self.post("/user/", &body).await
    }

    // ===== Messages =====

    pub async fn fetch_sent_messages(&self, email_address_id: &str) -> Result<Vec<Message>, ApiError> {
        self.get_url(
            &self.url("/messages/sent_messages"),
            &[("id_email_address", email_address_id)],
        )
        .await
    }

    pub async fn fetch_received_messages(&self, email_address_id: &str) -> Result<Vec<Message>, ApiError> {
        self.get_url(
            &self.url("/messages/received_messages"),
            &[("id_email_address", email_address_id)],
        )
        .await
    }

    pub async fn fetch_message(&self, message_id: &str) -> Result<Message, ApiError> {
        self.get_url(&self.item_url("/messages", message_id)?, &[]).await
    }

    /// Send a message. The backend answers 201 with an empty body.
    pub async fn send_message(&self, message: &MessageInput) -> Result<(), ApiError> {
        let url = self.url("/messages/");
        let response = self.send(self.client.post(&url).json(message)).await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenBackend for ApiClient {
    async fn check_refresh_access_token(&self, access_token: &str) -> Result<bool, ApiError> {
        ApiClient::check_refresh_access_token(self, access_token).await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, ApiError> {
        ApiClient::refresh_access_token(self, refresh_token).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::auth::storage::MemoryStorage;

    fn client(server: &MockServer) -> ApiClient {
        let session = Arc::new(SessionStore::new(Box::new(MemoryStorage::new())));
        ApiClient::new(&server.uri(), session).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        let session = Arc::new(SessionStore::new(Box::new(MemoryStorage::new())));
        assert!(matches!(
            ApiClient::new("not a url", Arc::clone(&session)),
            Err(ApiError::Configuration(_))
        ));
        assert!(matches!(
            ApiClient::new("ftp://example.com", session),
            Err(ApiError::Configuration(_))
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let session = Arc::new(SessionStore::new(Box::new(MemoryStorage::new())));
        let api = ApiClient::new("http://localhost:8000/", session).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/auth/me"), "http://localhost:8000/auth/me");
    }

    #[tokio::test]
    async fn test_requests_carry_session_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/all"))
            .and(header("authorization", "Bearer access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "u1", "name": "alice"},
                {"id": "u2", "name": "bob"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let api = client(&server);
        api.session().login("access", "refresh", "alice");

        let users = api.fetch_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].name, "bob");
    }

    #[tokio::test]
    async fn test_unauthenticated_requests_have_no_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/u1"))
            .respond_with(|req: &Request| {
                if req.headers.contains_key("authorization") {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_json(json!({"id": "u1", "name": "alice"}))
                }
            })
            .mount(&server)
            .await;

        let user = client(&server).fetch_user("u1").await.unwrap();
        assert_eq!(user.name, "alice");
    }

    #[tokio::test]
    async fn test_sign_in_stores_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .and(body_string_contains("username=alice"))
            .and(body_string_contains("password=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        api.sign_in("alice", "secret").await.unwrap();

        let session = api.session();
        assert!(session.is_authenticated());
        assert_eq!(session.access_token().as_deref(), Some("access"));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh"));
        assert_eq!(session.user_name(), "alice");
    }

    #[tokio::test]
    async fn test_sign_in_rejected_leaves_session_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "detail": "Nom d'utilisateur ou mot de passe incorrect"
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        let result = api.sign_in("alice", "wrong").await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert!(!api.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_in_without_refresh_token_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        let result = api.sign_in("alice", "secret").await;
        let err = result.unwrap_err();
        assert!(matches!(err, ApiError::NoRefreshTokenIssued));
        assert!(err.to_string().contains("refresh_token"));
        assert!(!api.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_check_uses_given_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/check_refresh_access_token"))
            .and(header("authorization", "Bearer explicit"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .mount(&server)
            .await;

        let api = client(&server);
        api.session().login("session-token", "refresh", "alice");
        assert!(api.check_refresh_access_token("explicit").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_only_exact_true_means_refresh() {
        for body in ["false", "TRUE", " true", "1", ""] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/auth/check_refresh_access_token"))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;

            let needs_refresh = client(&server)
                .check_refresh_access_token("access")
                .await
                .unwrap();
            assert!(!needs_refresh, "body {:?} should not require refresh", body);
        }
    }

    #[tokio::test]
    async fn test_check_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/check_refresh_access_token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client(&server).check_refresh_access_token("access").await;
        match result {
            Err(ApiError::CheckFailed { status }) => assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_uses_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh_access_token"))
            .and(header("authorization", "Bearer refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "NEW",
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let token = client(&server).refresh_access_token("refresh").await.unwrap();
        assert_eq!(token, "NEW");
    }

    #[tokio::test]
    async fn test_refresh_failure_uses_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh_access_token"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "detail": [{"loc": ["header", "authorization"], "msg": "Field required", "type": "missing"}]
            })))
            .mount(&server)
            .await;

        let result = client(&server).refresh_access_token("refresh").await;
        match result {
            Err(ApiError::RefreshFailed(msg)) => assert_eq!(msg, "Field required"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_with_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh_access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = client(&server).refresh_access_token("refresh").await;
        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_current_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u1",
                "name": "alice",
                "password": "",
                "token": {"access_token": "access", "token_type": "bearer"}
            })))
            .mount(&server)
            .await;

        let api = client(&server);
        api.session().login("access", "refresh", "alice");
        let profile = api.current_user().await.unwrap();
        assert_eq!(profile.user.id, "u1");
    }

    #[tokio::test]
    async fn test_not_found_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Message not found"})))
            .mount(&server)
            .await;

        let result = client(&server).fetch_message("missing").await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_received_messages_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/received_messages"))
            .and(query_param("id_email_address", "e1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "m1", "subject": "Hi", "body": "hello", "fromId": "e2"}
            ])))
            .mount(&server)
            .await;

        let messages = client(&server).fetch_received_messages("e1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject_display(), "Hi");
    }

    #[tokio::test]
    async fn test_ids_are_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/a%2Fb%20c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a/b c", "name": "alice"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/messages/sent_messages"))
            .and(query_param("id_email_address", "e1&x=1#y"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let api = client(&server);
        assert_eq!(api.fetch_user("a/b c").await.unwrap().id, "a/b c");
        assert!(api.fetch_sent_messages("e1&x=1#y").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_session_renews_stale_token_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/check_refresh_access_token"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh_access_token"))
            .and(header("authorization", "Bearer refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "NEW"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/all"))
            .and(header("authorization", "Bearer NEW"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let api = client(&server);
        api.session().login("stale", "refresh", "alice");

        assert_eq!(api.refresh_session().await.unwrap(), TickOutcome::Refreshed);
        assert!(api.fetch_users().await.unwrap().is_empty());
        assert_eq!(api.session().refresh_token().as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_send_message_accepts_empty_created_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/"))
            .and(body_string_contains("\"fromId\":\"e1\""))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let message = MessageInput {
            subject: Some("Hi".to_string()),
            body: "hello".to_string(),
            from_id: "e1".to_string(),
            recipients: vec![],
        };
        client(&server).send_message(&message).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_user_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/"))
            .and(body_string_contains("\"name\":\"carol\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u3", "name": "carol"})))
            .expect(1)
            .mount(&server)
            .await;

        let user = client(&server).create_user("carol", "pw").await.unwrap();
        assert_eq!(user.id, "u3");
    }

    #[tokio::test]
    async fn test_rate_limited_get_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/all"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let users = client(&server).fetch_users().await.unwrap();
        assert!(users.is_empty());
    }
}
