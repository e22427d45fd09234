//! Role resolution.
//!
//! A user's role is recorded twice: as a `role` claim in the session's user metadata and as
//! the `role` column of their profile record. The two can disagree and nothing reconciles
//! them. `RoleResolver` walks its sources in order and returns the first one that yields
//! a role; the standard chain is claims first, then the profile table.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::provider::{IdentityClient, ProviderError, RowQuery};
use super::user::AuthUser;
use crate::routes::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    /// Only the exact string `admin` is an admin; anything else is a student.
    pub fn parse(s: &str) -> Role {
        if s == "admin" { Role::Admin } else { Role::Student }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(role: Option<Role>) -> bool { role == Some(Role::Admin) }
}

#[async_trait]
pub trait RoleSource: Send + Sync {
    fn name(&self) -> &'static str;
    /// `Ok(None)` means this source has no opinion and the next one should be asked.
    async fn role_for(&self, user: &AuthUser) -> Result<Option<Role>, ProviderError>;
}

/// `user_metadata.role` on the signed-in user.
pub struct ClaimsRole;

#[async_trait]
impl RoleSource for ClaimsRole {
    fn name(&self) -> &'static str { "claims" }

    async fn role_for(&self, user: &AuthUser) -> Result<Option<Role>, ProviderError> {
        Ok(user.claim_str("role").filter(|s| !s.trim().is_empty()).map(Role::parse))
    }
}

/// `role` column of the profile row whose `auth_id` is the user's id.
pub struct ProfileTableRole {
    client: Arc<dyn IdentityClient>,
    table: String,
}

impl ProfileTableRole {
    pub fn new<S: Into<String>>(client: Arc<dyn IdentityClient>, table: S) -> Self {
        Self { client, table: table.into() }
    }
}

#[async_trait]
impl RoleSource for ProfileTableRole {
    fn name(&self) -> &'static str { "profile_table" }

    async fn role_for(&self, user: &AuthUser) -> Result<Option<Role>, ProviderError> {
        let q = RowQuery::from(self.table.as_str()).select("role").eq("auth_id", user.id.as_str());
        let rows = self.client.select(&q).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get("role"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(Role::parse))
    }
}

pub struct RoleResolver {
    sources: Vec<Box<dyn RoleSource>>,
}

impl RoleResolver {
    pub fn new(sources: Vec<Box<dyn RoleSource>>) -> Self { Self { sources } }

    /// Claims, then a single profile-table lookup.
    pub fn standard<S: Into<String>>(client: Arc<dyn IdentityClient>, table: S) -> Self {
        Self::new(vec![Box::new(ClaimsRole), Box::new(ProfileTableRole::new(client, table))])
    }

    pub fn claims_only() -> Self { Self::new(vec![Box::new(ClaimsRole)]) }

    /// First defined role across the chain. A failing source counts as undefined.
    pub async fn resolve(&self, user: &AuthUser) -> Option<Role> {
        for src in &self.sources {
            match src.role_for(user).await {
                Ok(Some(role)) => {
                    debug!(target: "ecoquest::auth", user = %user.id, source = src.name(), role = role.as_str(), "role resolved");
                    return Some(role);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "ecoquest::auth", user = %user.id, source = src.name(), error = %e, "role source failed");
                }
            }
        }
        None
    }
}

/// Home screen for a role after password sign-in.
pub fn home_route(role: Role) -> Route {
    match role {
        Role::Student => Route::Homepage,
        Role::Admin => Route::Admin,
    }
}
