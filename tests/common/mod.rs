#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use ecoquest::auth_state::AuthContext;
use ecoquest::config::ClientConfig;
use ecoquest::identity::testing::MockIdentity;
use ecoquest::identity::{AuthUser, RoleResolver};
use ecoquest::routes::RecordingNavigator;

pub const TABLE: &str = "user_details";
pub const PASSWORD: &str = "password1";

pub fn config() -> ClientConfig {
    ClientConfig::new("https://project.supabase.test", "anon-key").without_delays()
}

pub fn admin_by_claim() -> AuthUser { AuthUser::new("admin-1").with_email("admin@eco.test").with_claim("role", "admin") }

pub fn admin_by_table() -> AuthUser { AuthUser::new("admin-2").with_email("ops@eco.test") }

pub fn student() -> AuthUser { AuthUser::new("kid-1").with_email("kid@eco.test") }

/// Accounts for all three users plus their profile rows.
pub fn backend() -> MockIdentity {
    MockIdentity::new()
        .with_account("admin@eco.test", PASSWORD, admin_by_claim())
        .with_account("ops@eco.test", PASSWORD, admin_by_table())
        .with_account("kid@eco.test", PASSWORD, student())
        .with_row(TABLE, json!({"user_id": 1, "auth_id": "admin-1", "username": "root"}))
        .with_row(TABLE, json!({"user_id": 2, "auth_id": "admin-2", "username": "ops", "role": "admin"}))
        .with_row(TABLE, json!({"user_id": 3, "auth_id": "kid-1", "username": "leaf", "role": "student"}))
}

pub async fn start(mock: &Arc<MockIdentity>) -> Arc<AuthContext> {
    AuthContext::start(mock.clone(), RoleResolver::standard(mock.clone(), TABLE)).await
}

pub fn navigator() -> Arc<RecordingNavigator> { Arc::new(RecordingNavigator::new()) }
