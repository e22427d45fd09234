//! `IdentityClient` over the hosted Supabase REST surface:
//! GoTrue under `/auth/v1`, PostgREST under `/rest/v1`, Storage under `/storage/v1`.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::provider::{Filter, IdentityClient, ProviderError, Row, RowQuery, Upload};
use super::session::{gen_token, AuthEvent, Session, SessionStore};
use super::user::AuthUser;
use crate::config::ClientConfig;

pub struct SupabaseClient {
    base: Url,
    anon_key: String,
    http: reqwest::Client,
    sessions: SessionStore,
    pkce_verifier: Mutex<Option<String>>,
}

impl SupabaseClient {
    pub fn new(cfg: &ClientConfig) -> Result<Self, ProviderError> {
        let base = Url::parse(&cfg.supabase_url)?;
        let http = reqwest::Client::builder().build()?;
        info!(target: "ecoquest::supabase", base = %base, "supabase client ready");
        Ok(Self {
            base,
            anon_key: cfg.anon_key.clone(),
            http,
            sessions: SessionStore::default(),
            pkce_verifier: Mutex::new(None),
        })
    }

    /// Start an OAuth redirect flow. The returned URL goes to the browser; the verifier is
    /// kept so the later `exchange_code_for_session` can prove it started the flow.
    pub fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<Url, ProviderError> {
        let verifier = gen_token();
        let mut url = self.endpoint("/auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", &verifier)
            .append_pair("code_challenge_method", "plain");
        *self.pkce_verifier.lock() = Some(verifier);
        Ok(url)
    }

    /// For flows started elsewhere (e.g. a verifier persisted by another process).
    pub fn set_code_verifier<S: Into<String>>(&self, verifier: S) {
        *self.pkce_verifier.lock() = Some(verifier.into());
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self.base.join(path)?)
    }

    fn headers(&self, bearer: Option<&str>) -> Result<HeaderMap, ProviderError> {
        let mut h = HeaderMap::new();
        h.insert("apikey", header_value(&self.anon_key)?);
        let token = bearer.unwrap_or(&self.anon_key);
        h.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        Ok(h)
    }

    /// Headers carrying the signed-in user's token when there is one, so row-level
    /// security sees the right identity.
    async fn session_headers(&self) -> Result<HeaderMap, ProviderError> {
        let current = self.live_session().await?;
        self.headers(current.as_ref().map(|s| s.access_token.as_str()))
    }

    /// Current session, rotated through the refresh grant once its access token has expired.
    /// A refresh token the provider no longer accepts ends the session locally.
    async fn live_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(current) = self.sessions.current() else { return Ok(None) };
        if !current.is_expired_at(Utc::now().timestamp()) {
            return Ok(Some(current));
        }
        match self.token_grant("refresh_token", json!({"refresh_token": current.refresh_token})).await {
            Ok(fresh) => {
                debug!(target: "ecoquest::supabase", user = %fresh.user.id, "access token refreshed");
                self.sessions.refresh(fresh.clone());
                Ok(Some(fresh))
            }
            Err(ProviderError::Auth { message }) => {
                warn!(target: "ecoquest::supabase", user = %current.user.id, error = %message, "refresh token rejected, signing out");
                self.sessions.sign_out();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn rest_url(&self, q: &RowQuery, with_select: bool) -> Result<Url, ProviderError> {
        let mut url = self.endpoint(&format!("/rest/v1/{}", q.table))?;
        {
            let mut pairs = url.query_pairs_mut();
            if with_select {
                pairs.append_pair("select", &q.columns);
            }
            for f in &q.filters {
                let (op, v) = match f {
                    Filter::Eq(_, v) => ("eq", v),
                    Filter::Neq(_, v) => ("neq", v),
                };
                pairs.append_pair(f.column(), &format!("{}.{}", op, filter_literal(v)));
            }
        }
        Ok(url)
    }

    pub(crate) fn object_url(&self, bucket: &str, path: &str) -> Result<Url, ProviderError> {
        self.endpoint(&format!("/storage/v1/object/{}/{}", urlencoding::encode(bucket), encode_path(path)))
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, ProviderError> {
        let mut url = self.endpoint("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let resp = self.http.post(url).headers(self.headers(None)?).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(error_from(resp, true).await);
        }
        Ok(resp.json::<Session>().await?)
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Option<AuthUser>, ProviderError> {
        let url = self.endpoint("/auth/v1/user")?;
        let resp = self.http.get(url).headers(self.headers(Some(access_token))?).send().await?;
        match resp.status() {
            s if s.is_success() => Ok(Some(resp.json::<AuthUser>().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => Err(error_from(resp, false).await),
        }
    }
}

#[async_trait]
impl IdentityClient for SupabaseClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let session = self.token_grant("password", json!({"email": email, "password": password})).await?;
        info!(target: "ecoquest::supabase", user = %session.user.id, "password sign-in");
        self.sessions.sign_in(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(current) = self.sessions.current() else {
            self.sessions.sign_out();
            return Ok(());
        };
        let url = self.endpoint("/auth/v1/logout")?;
        let sent = self.http.post(url).headers(self.headers(Some(&current.access_token))?).send().await;
        // The local session goes regardless of what the server said.
        self.sessions.sign_out();
        let resp = sent?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(error_from(resp, false).await),
        }
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, ProviderError> {
        let verifier = self.pkce_verifier.lock().take();
        let Some(verifier) = verifier else {
            return Err(ProviderError::Auth { message: "no PKCE code verifier; start the flow with authorize_url".into() });
        };
        let session = self.token_grant("pkce", json!({"auth_code": code, "code_verifier": verifier})).await?;
        info!(target: "ecoquest::supabase", user = %session.user.id, "code exchanged for session");
        self.sessions.sign_in(session.clone());
        Ok(session)
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session, ProviderError> {
        let Some(user) = self.fetch_user(access_token).await? else {
            return Err(ProviderError::Auth { message: "access token rejected".into() });
        };
        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            token_type: Some("bearer".into()),
            expires_at: None,
            user,
        };
        self.sessions.sign_in(session.clone());
        Ok(session)
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, ProviderError> {
        let Some(current) = self.live_session().await? else { return Ok(None) };
        self.fetch_user(&current.access_token).await
    }

    fn current_session(&self) -> Option<Session> { self.sessions.current() }

    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, ProviderError> {
        let url = self.rest_url(query, true)?;
        debug!(target: "ecoquest::supabase", table = %query.table, url = %url, "select");
        let resp = self.http.get(url).headers(self.session_headers().await?).send().await?;
        if !resp.status().is_success() {
            return Err(error_from(resp, false).await);
        }
        Ok(resp.json::<Vec<Row>>().await?)
    }

    async fn update(&self, query: &RowQuery, values: Row) -> Result<(), ProviderError> {
        let url = self.rest_url(query, false)?;
        debug!(target: "ecoquest::supabase", table = %query.table, url = %url, "update");
        let mut headers = self.session_headers().await?;
        headers.insert("prefer", HeaderValue::from_static("return=minimal"));
        let resp = self.http.patch(url).headers(headers).json(&Value::Object(values)).send().await?;
        if !resp.status().is_success() {
            return Err(error_from(resp, false).await);
        }
        Ok(())
    }

    async fn upload(&self, upload: Upload) -> Result<(), ProviderError> {
        let url = self.object_url(&upload.bucket, &upload.path)?;
        let mut headers = self.session_headers().await?;
        headers.insert(CONTENT_TYPE, header_value(&upload.content_type)?);
        headers.insert("x-upsert", HeaderValue::from_static(if upload.upsert { "true" } else { "false" }));
        let size = upload.bytes.len();
        let resp = self.http.post(url).headers(headers).body(upload.bytes).send().await?;
        if !resp.status().is_success() {
            let err = error_from(resp, false).await;
            warn!(target: "ecoquest::supabase", path = %upload.path, error = %err, "upload failed");
            return Err(err);
        }
        info!(target: "ecoquest::supabase", bucket = %upload.bucket, path = %upload.path, bytes = size, "uploaded object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        let base = self.base.as_str().trim_end_matches('/');
        format!("{}/storage/v1/object/public/{}/{}", base, urlencoding::encode(bucket), encode_path(path))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> { self.sessions.subscribe() }
}

fn header_value(s: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(s).map_err(|e| ProviderError::Transport(format!("invalid header value: {}", e)))
}

fn filter_literal(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn encode_path(path: &str) -> String {
    path.split('/').map(|seg| urlencoding::encode(seg).into_owned()).collect::<Vec<_>>().join("/")
}

/// First human-readable message among the error shapes GoTrue, PostgREST and Storage use.
pub(crate) fn provider_message(body: &Value) -> Option<String> {
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

async fn error_from(resp: reqwest::Response, auth_endpoint: bool) -> ProviderError {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let message = provider_message(&body).unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
    if auth_endpoint && status.is_client_error() {
        ProviderError::Auth { message }
    } else {
        ProviderError::Http { status: status.as_u16(), message }
    }
}
