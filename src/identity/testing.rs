//! In-memory `IdentityClient` for driving screens without a backend.
//!
//! Accounts, rows and authorization codes are seeded up front; every call is recorded so
//! tests can assert on what did (and did not) reach the backend. Individual operations can
//! be scripted to fail once.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use super::provider::{IdentityClient, ProviderError, Row, RowQuery, Upload};
use super::session::{gen_token, AuthEvent, Session, SessionStore};
use super::user::AuthUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SignIn,
    SignOut,
    ExchangeCode,
    SetSession,
    GetUser,
    Select,
    Update,
    Upload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SignIn { email: String },
    SignOut,
    ExchangeCode { code: String },
    SetSession { access_token: String },
    GetUser,
    Select(RowQuery),
    Update { query: RowQuery, values: Row },
    Upload { bucket: String, path: String, size: usize },
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::SignIn { .. } => Op::SignIn,
            Call::SignOut => Op::SignOut,
            Call::ExchangeCode { .. } => Op::ExchangeCode,
            Call::SetSession { .. } => Op::SetSession,
            Call::GetUser => Op::GetUser,
            Call::Select(_) => Op::Select,
            Call::Update { .. } => Op::Update,
            Call::Upload { .. } => Op::Upload,
        }
    }
}

struct Account {
    password: String,
    user: AuthUser,
}

#[derive(Default)]
pub struct MockIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    codes: Mutex<HashMap<String, AuthUser>>,
    tokens: Mutex<HashMap<String, AuthUser>>,
    tables: Mutex<HashMap<String, Vec<Row>>>,
    objects: Mutex<HashMap<String, Upload>>,
    failures: Mutex<HashMap<Op, ProviderError>>,
    calls: Mutex<Vec<Call>>,
    latency: Duration,
    sessions: SessionStore,
}

impl MockIdentity {
    pub fn new() -> Self { Self::default() }

    pub fn with_account(self, email: &str, password: &str, user: AuthUser) -> Self {
        self.accounts.lock().insert(email.to_string(), Account { password: password.to_string(), user });
        self
    }

    pub fn with_row(self, table: &str, row: Value) -> Self {
        if let Value::Object(map) = row {
            self.tables.lock().entry(table.to_string()).or_default().push(map);
        }
        self
    }

    /// Authorization code that `exchange_code_for_session` will accept.
    pub fn with_code(self, code: &str, user: AuthUser) -> Self {
        self.codes.lock().insert(code.to_string(), user);
        self
    }

    /// Access token that `set_session` will accept.
    pub fn with_access_token(self, token: &str, user: AuthUser) -> Self {
        self.tokens.lock().insert(token.to_string(), user);
        self
    }

    /// Start already signed in (before any subscriber exists).
    pub fn signed_in_as(self, user: AuthUser) -> Self {
        let s = session_for(user);
        self.sessions.sign_in(s);
        self
    }

    /// Table and storage calls take this long to answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Issue fresh tokens for the signed-in user, as the provider does on refresh.
    /// Returns the new session, or `None` when nobody is signed in.
    pub fn rotate_tokens(&self) -> Option<Session> {
        let current = self.sessions.current()?;
        let fresh = Session { access_token: gen_token(), refresh_token: gen_token(), ..current };
        self.sessions.refresh(fresh.clone());
        Some(fresh)
    }

    /// Next call of `op` fails with `err`.
    pub fn fail_next(&self, op: Op, err: ProviderError) {
        self.failures.lock().insert(op, err);
    }

    pub fn calls(&self) -> Vec<Call> { self.calls.lock().clone() }

    pub fn count(&self, op: Op) -> usize { self.calls.lock().iter().filter(|c| c.op() == op).count() }

    pub fn rows(&self, table: &str) -> Vec<Row> { self.tables.lock().get(table).cloned().unwrap_or_default() }

    pub fn object(&self, path: &str) -> Option<Upload> { self.objects.lock().get(path).cloned() }

    fn record(&self, call: Call) -> Result<(), ProviderError> {
        let op = call.op();
        self.calls.lock().push(call);
        match self.failures.lock().remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn session_for(user: AuthUser) -> Session {
    Session {
        access_token: format!("access-{}", user.id),
        refresh_token: format!("refresh-{}", user.id),
        token_type: Some("bearer".into()),
        expires_at: None,
        user,
    }
}

#[async_trait]
impl IdentityClient for MockIdentity {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        self.record(Call::SignIn { email: email.to_string() })?;
        let user = {
            let accounts = self.accounts.lock();
            match accounts.get(email) {
                Some(a) if a.password == password => a.user.clone(),
                _ => return Err(ProviderError::Auth { message: "Invalid login credentials".into() }),
            }
        };
        let s = session_for(user);
        self.sessions.sign_in(s.clone());
        Ok(s)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.record(Call::SignOut)?;
        self.sessions.sign_out();
        Ok(())
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, ProviderError> {
        self.record(Call::ExchangeCode { code: code.to_string() })?;
        let user = self.codes.lock().remove(code);
        let Some(user) = user else {
            return Err(ProviderError::Auth { message: "invalid flow state, no valid flow state found".into() });
        };
        let s = session_for(user);
        self.sessions.sign_in(s.clone());
        Ok(s)
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session, ProviderError> {
        self.record(Call::SetSession { access_token: access_token.to_string() })?;
        let user = self.tokens.lock().get(access_token).cloned();
        let Some(user) = user else {
            return Err(ProviderError::Auth { message: "access token rejected".into() });
        };
        let s = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            token_type: Some("bearer".into()),
            expires_at: None,
            user,
        };
        self.sessions.sign_in(s.clone());
        Ok(s)
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, ProviderError> {
        self.record(Call::GetUser)?;
        Ok(self.sessions.current().map(|s| s.user))
    }

    fn current_session(&self) -> Option<Session> { self.sessions.current() }

    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, ProviderError> {
        self.record(Call::Select(query.clone()))?;
        self.pause().await;
        let tables = self.tables.lock();
        let rows = tables.get(&query.table).map(|v| v.as_slice()).unwrap_or(&[]);
        let projected = rows
            .iter()
            .filter(|r| query.matches(r))
            .map(|r| project(r, &query.columns))
            .collect();
        Ok(projected)
    }

    async fn update(&self, query: &RowQuery, values: Row) -> Result<(), ProviderError> {
        self.record(Call::Update { query: query.clone(), values: values.clone() })?;
        self.pause().await;
        let mut tables = self.tables.lock();
        if let Some(rows) = tables.get_mut(&query.table) {
            for r in rows.iter_mut().filter(|r| query.matches(r)) {
                for (k, v) in values.iter() {
                    r.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(())
    }

    async fn upload(&self, upload: Upload) -> Result<(), ProviderError> {
        self.record(Call::Upload { bucket: upload.bucket.clone(), path: upload.path.clone(), size: upload.bytes.len() })?;
        self.pause().await;
        self.objects.lock().insert(upload.path.clone(), upload);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://storage.test/{}/{}", bucket, path)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> { self.sessions.subscribe() }
}

fn project(row: &Row, columns: &str) -> Row {
    if columns.trim() == "*" {
        return row.clone();
    }
    columns
        .split(',')
        .map(|c| c.trim())
        .filter_map(|c| row.get(c).map(|v| (c.to_string(), v.clone())))
        .collect()
}
