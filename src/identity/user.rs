use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form claims set at signup (`role` lives here).
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl AuthUser {
    pub fn new<S: Into<String>>(id: S) -> Self { Self { id: id.into(), ..Default::default() } }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_claim<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }

    pub fn claim_str(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).and_then(|v| v.as_str())
    }
}
