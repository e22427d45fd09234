use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

use super::session::{AuthEvent, Session};
use super::user::AuthUser;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Credential or token rejection, message as reported by the provider.
    #[error("{message}")]
    Auth { message: String },
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("expected exactly one row, found {0}")]
    NotSingle(usize),
    #[error("no active session")]
    NoSession,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() { ProviderError::Decode(e.to_string()) } else { ProviderError::Transport(e.to_string()) }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self { ProviderError::Decode(e.to_string()) }
}

impl From<url::ParseError> for ProviderError {
    fn from(e: url::ParseError) -> Self { ProviderError::Transport(format!("bad url: {}", e)) }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self { Filter::Eq(c, _) | Filter::Neq(c, _) => c }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(c, v) => row.get(c) == Some(v),
            Filter::Neq(c, v) => row.get(c) != Some(v),
        }
    }
}

/// Table read/update target: `SELECT columns FROM table WHERE filters...`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
}

impl RowQuery {
    pub fn from<S: Into<String>>(table: S) -> Self {
        Self { table: table.into(), columns: "*".into(), filters: Vec::new() }
    }

    pub fn select<S: Into<String>>(mut self, columns: S) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn eq<C: Into<String>, V: Into<Value>>(mut self, col: C, val: V) -> Self {
        self.filters.push(Filter::Eq(col.into(), val.into()));
        self
    }

    pub fn neq<C: Into<String>, V: Into<Value>>(mut self, col: C, val: V) -> Self {
        self.filters.push(Filter::Neq(col.into(), val.into()));
        self
    }

    pub fn matches(&self, row: &Row) -> bool { self.filters.iter().all(|f| f.matches(row)) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub bucket: String,
    pub path: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub upsert: bool,
}

/// Everything the app consumes from the hosted backend: auth, tables and object storage.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError>;
    async fn sign_out(&self) -> Result<(), ProviderError>;
    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, ProviderError>;
    /// Adopt tokens delivered in a redirect fragment.
    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session, ProviderError>;
    async fn get_user(&self) -> Result<Option<AuthUser>, ProviderError>;
    fn current_session(&self) -> Option<Session>;

    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, ProviderError>;
    async fn update(&self, query: &RowQuery, values: Row) -> Result<(), ProviderError>;

    /// Exactly one matching row, otherwise `NotSingle`.
    async fn select_single(&self, query: &RowQuery) -> Result<Row, ProviderError> {
        let mut rows = self.select(query).await?;
        if rows.len() != 1 {
            return Err(ProviderError::NotSingle(rows.len()));
        }
        Ok(rows.remove(0))
    }

    async fn upload(&self, upload: Upload) -> Result<(), ProviderError>;
    fn public_url(&self, bucket: &str, path: &str) -> String;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
