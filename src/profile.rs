//! Profile record model: decoding from `user_details` rows, field limits, the editable
//! subset written back on save, and avatar validation/path rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::identity::Row;

pub const USERNAME_MAX_CHARS: usize = 30;
pub const NAME_MAX_CHARS: usize = 50;
pub const BIO_MAX_CHARS: usize = 200;
pub const DEFAULT_MAX_AVATAR_BYTES: u64 = 5 * 1024 * 1024;
pub const AVATAR_DIR: &str = "profiles";

/// The client-side view of a profile row. Doubles as the pending edit buffer and the
/// last-saved snapshot; the two are compared with `==`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub name: String,
    pub bio: String,
    pub profile_picture: Option<String>,
    pub points: i64,
    pub quest_completed: i64,
    pub total_points_earned: i64,
    pub total_points_donated: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// A decoded row: the record key plus the profile fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    /// Primary key; kept as raw JSON since the backend may use integers or UUIDs.
    pub user_id: Value,
    pub auth_id: Option<String>,
    pub profile: Profile,
}

impl ProfileRecord {
    pub fn from_row(row: &Row) -> AppResult<Self> {
        let user_id = match row.get("user_id") {
            Some(v) if !v.is_null() => v.clone(),
            _ => return Err(AppError::not_found("profile_without_id", "profile row has no user_id")),
        };
        let profile = Profile {
            username: str_field(row, "username"),
            name: str_field(row, "name"),
            bio: str_field(row, "bio"),
            profile_picture: row.get("profile_picture").and_then(|v| v.as_str()).filter(|s| !s.is_empty()).map(|s| s.to_string()),
            points: int_field(row, "points"),
            quest_completed: int_field(row, "quest_completed"),
            total_points_earned: int_field(row, "total_points_earned"),
            total_points_donated: int_field(row, "total_points_donated"),
            created_at: row.get("created_at").and_then(|v| v.as_str()).and_then(parse_timestamp),
        };
        let auth_id = row.get("auth_id").and_then(|v| v.as_str()).map(|s| s.to_string());
        Ok(Self { user_id, auth_id, profile })
    }

    /// `user_id` rendered for storage paths: strings as-is, numbers in decimal.
    pub fn id_string(&self) -> String { id_string(&self.user_id) }
}

pub fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn str_field(row: &Row, key: &str) -> String {
    row.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string()
}

fn int_field(row: &Row, key: &str) -> i64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Postgres `timestamptz` without the `T` separator, e.g. "2024-03-01 10:00:00+00"
    DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z").ok().map(|dt| dt.with_timezone(&Utc))
}

impl Profile {
    /// The columns a save writes, trimmed. Counters and timestamps are backend-owned.
    pub fn editable_columns(&self) -> Row {
        let v = json!({
            "username": self.username.trim(),
            "name": self.name.trim(),
            "bio": self.bio.trim(),
            "profile_picture": self.profile_picture,
        });
        match v {
            Value::Object(m) => m,
            _ => Row::new(),
        }
    }

    /// Copy with the editable text fields trimmed.
    pub fn trimmed(&self) -> Profile {
        let mut p = self.clone();
        p.username = p.username.trim().to_string();
        p.name = p.name.trim().to_string();
        p.bio = p.bio.trim().to_string();
        p
    }

    /// Placeholder glyph when there is no avatar.
    pub fn initial(&self) -> char {
        self.name.chars().next().and_then(|c| c.to_uppercase().next()).unwrap_or('?')
    }

    pub fn joined_label(&self) -> String { format_join_date(self.created_at) }
}

/// "March 1, 2024" style, or "Unknown".
pub fn format_join_date(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(dt) => dt.format("%B %-d, %Y").to_string(),
        None => "Unknown".to_string(),
    }
}

/// Keep at most `max` characters (not bytes).
pub fn clamp_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvatarFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl AvatarFile {
    pub fn size(&self) -> u64 { self.bytes.len() as u64 }

    /// Text after the last `.`; the whole name when there is none.
    pub fn extension(&self) -> &str {
        self.file_name.rsplit('.').next().unwrap_or(&self.file_name)
    }
}

pub const MSG_NOT_AN_IMAGE: &str = "Please select an image file";
pub const MSG_IMAGE_TOO_LARGE: &str = "Image must be less than 5MB";

pub fn validate_avatar(file: &AvatarFile, max_bytes: u64) -> AppResult<()> {
    if !file.content_type.starts_with("image/") {
        return Err(AppError::validation("avatar_not_image", MSG_NOT_AN_IMAGE));
    }
    if file.size() > max_bytes {
        return Err(AppError::validation("avatar_too_large", MSG_IMAGE_TOO_LARGE));
    }
    Ok(())
}

/// `profiles/{userId}_{epochMillis}.{ext}`
pub fn avatar_path(user_id: &str, epoch_millis: i64, file: &AvatarFile) -> String {
    format!("{}/{}_{}.{}", AVATAR_DIR, user_id, epoch_millis, file.extension())
}
