//! Client configuration sourced from `ECOQUEST_*` environment variables.
//! The binary layers CLI flags on top; library callers can build a config directly.

use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::profile::DEFAULT_MAX_AVATAR_BYTES;

pub const ENV_SUPABASE_URL: &str = "ECOQUEST_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "ECOQUEST_SUPABASE_ANON_KEY";
pub const ENV_AVATAR_BUCKET: &str = "ECOQUEST_AVATAR_BUCKET";
pub const ENV_PROFILE_TABLE: &str = "ECOQUEST_PROFILE_TABLE";
pub const ENV_REDIRECT_DELAY_MS: &str = "ECOQUEST_REDIRECT_DELAY_MS";
pub const ENV_SETTLE_DELAY_MS: &str = "ECOQUEST_SETTLE_DELAY_MS";
pub const ENV_MAX_AVATAR_BYTES: &str = "ECOQUEST_MAX_AVATAR_BYTES";

pub const DEFAULT_AVATAR_BUCKET: &str = "quest-images";
pub const DEFAULT_PROFILE_TABLE: &str = "user_details";
pub const DEFAULT_REDIRECT_DELAY_MS: u64 = 1500;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub supabase_url: String,
    pub anon_key: String,
    pub avatar_bucket: String,
    pub profile_table: String,
    /// How long a role-mismatch warning stays visible before redirecting.
    pub redirect_delay: Duration,
    /// Grace period for fragment tokens to turn into a session on the callback screen.
    pub settle_delay: Duration,
    pub max_avatar_bytes: u64,
}

impl ClientConfig {
    pub fn new<S: Into<String>>(supabase_url: S, anon_key: S) -> Self {
        Self {
            supabase_url: supabase_url.into(),
            anon_key: anon_key.into(),
            avatar_bucket: DEFAULT_AVATAR_BUCKET.to_string(),
            profile_table: DEFAULT_PROFILE_TABLE.to_string(),
            redirect_delay: Duration::from_millis(DEFAULT_REDIRECT_DELAY_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            max_avatar_bytes: DEFAULT_MAX_AVATAR_BYTES,
        }
    }

    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup so tests never touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_SUPABASE_URL).filter(|s| !s.trim().is_empty());
        let key = lookup(ENV_SUPABASE_ANON_KEY).filter(|s| !s.trim().is_empty());
        let (Some(url), Some(key)) = (url, key) else {
            return Err(AppError::validation(
                "config_missing".to_string(),
                format!("{} and {} must both be set", ENV_SUPABASE_URL, ENV_SUPABASE_ANON_KEY),
            ));
        };
        let mut cfg = Self::new(url.trim(), key.trim());
        if let Some(b) = lookup(ENV_AVATAR_BUCKET).filter(|s| !s.is_empty()) { cfg.avatar_bucket = b; }
        if let Some(t) = lookup(ENV_PROFILE_TABLE).filter(|s| !s.is_empty()) { cfg.profile_table = t; }
        if let Some(ms) = parse_u64(&lookup, ENV_REDIRECT_DELAY_MS)? { cfg.redirect_delay = Duration::from_millis(ms); }
        if let Some(ms) = parse_u64(&lookup, ENV_SETTLE_DELAY_MS)? { cfg.settle_delay = Duration::from_millis(ms); }
        if let Some(n) = parse_u64(&lookup, ENV_MAX_AVATAR_BYTES)? { cfg.max_avatar_bytes = n; }
        Ok(cfg)
    }

    /// Zero delays; handy for driving screens in tests.
    pub fn without_delays(mut self) -> Self {
        self.redirect_delay = Duration::ZERO;
        self.settle_delay = Duration::ZERO;
        self
    }
}

fn parse_u64<F>(lookup: &F, name: &str) -> AppResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(v) => v.trim().parse::<u64>().map(Some).map_err(|_| {
            AppError::validation("config_invalid".to_string(), format!("{} must be a non-negative integer, got '{}'", name, v))
        }),
    }
}
