//! Profile screen: load the signed-in user's record, edit it in a buffer, upload an
//! avatar, and save with a username uniqueness check.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info};

use super::ScreenMessage;
use crate::auth_state::AuthContext;
use crate::config::ClientConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{RowQuery, Upload};
use crate::liveness::MountScope;
use crate::profile::{
    avatar_path, clamp_chars, id_string, validate_avatar, AvatarFile, Profile, ProfileRecord, BIO_MAX_CHARS,
    NAME_MAX_CHARS, USERNAME_MAX_CHARS,
};
use crate::routes::{Navigation, Navigator, Route};

pub const MSG_LOAD_FAILED: &str = "Failed to load profile";
pub const MSG_UPLOAD_OK: &str = "Image uploaded! Click Save to confirm changes.";
pub const MSG_UPLOAD_FAILED: &str = "Failed to upload image";
pub const MSG_USERNAME_REQUIRED: &str = "Username is required";
pub const MSG_USERNAME_TAKEN: &str = "Username is already taken";
pub const MSG_SAVE_OK: &str = "Profile updated successfully!";
pub const MSG_SAVE_FAILED: &str = "Failed to save profile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Quests,
    Community,
    Redeem,
    Profile,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Quests, Tab::Community, Tab::Redeem, Tab::Profile];

    pub fn label(&self) -> &'static str {
        match self {
            Tab::Quests => "Quests",
            Tab::Community => "Community",
            Tab::Redeem => "Redeem",
            Tab::Profile => "Profile",
        }
    }

    pub fn route(&self) -> Route {
        match self {
            Tab::Quests => Route::App,
            Tab::Community => Route::Community,
            Tab::Redeem => Route::Redeem,
            Tab::Profile => Route::Profile,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileView {
    pub loading: bool,
    pub saving: bool,
    pub uploading: bool,
    /// Record key of the loaded row.
    pub user_id: Option<Value>,
    pub buffer: Profile,
    /// Last loaded or saved state; `None` until a fetch succeeds.
    pub snapshot: Option<Profile>,
    pub message: Option<ScreenMessage>,
}

impl Default for ProfileView {
    fn default() -> Self {
        Self {
            loading: true,
            saving: false,
            uploading: false,
            user_id: None,
            buffer: Profile::default(),
            snapshot: None,
            message: None,
        }
    }
}

impl ProfileView {
    pub fn has_changes(&self) -> bool {
        self.snapshot.as_ref().map(|s| *s != self.buffer).unwrap_or(false)
    }

    pub fn can_save(&self) -> bool { self.has_changes() && !self.saving }

    pub fn can_cancel(&self) -> bool { self.can_save() }
}

pub struct ProfileScreen {
    auth: Arc<AuthContext>,
    nav: Arc<dyn Navigator>,
    table: String,
    bucket: String,
    max_avatar_bytes: u64,
    scope: MountScope,
    state: Mutex<ProfileView>,
}

impl ProfileScreen {
    pub fn new(auth: Arc<AuthContext>, nav: Arc<dyn Navigator>, config: &ClientConfig) -> Self {
        Self {
            auth,
            nav,
            table: config.profile_table.clone(),
            bucket: config.avatar_bucket.clone(),
            max_avatar_bytes: config.max_avatar_bytes,
            scope: MountScope::new(),
            state: Mutex::new(ProfileView::default()),
        }
    }

    pub fn view(&self) -> ProfileView { self.state.lock().clone() }

    pub fn tabs(&self) -> [Tab; 4] { Tab::ALL }

    pub fn active_tab(&self) -> Tab { Tab::Profile }

    pub fn unmount(&self) { self.scope.unmount(); }

    pub async fn fetch(&self) {
        let live = self.scope.token();
        let user = match self.auth.client().get_user().await {
            Ok(u) => u,
            Err(e) => {
                error!(target: "ecoquest::profile", error = %e, "could not read current user");
                None
            }
        };
        let Some(user) = user else {
            if live.is_alive() {
                self.state.lock().loading = false;
                self.nav.navigate(Navigation::push(Route::Login));
            }
            return;
        };
        let query = RowQuery::from(self.table.as_str()).eq("auth_id", user.id.as_str());
        let loaded = match self.auth.client().select_single(&query).await {
            Ok(row) => ProfileRecord::from_row(&row),
            Err(e) => Err(AppError::from(e)),
        };
        if !live.is_alive() {
            return;
        }
        let mut st = self.state.lock();
        st.loading = false;
        match loaded {
            Ok(rec) => {
                debug!(target: "ecoquest::profile", user = %user.id, user_id = %rec.id_string(), "profile loaded");
                st.user_id = Some(rec.user_id);
                st.buffer = rec.profile.clone();
                st.snapshot = Some(rec.profile);
            }
            Err(e) => {
                error!(target: "ecoquest::profile", user = %user.id, kind = e.kind(), error = %e, "profile load failed");
                st.message = Some(ScreenMessage::error(MSG_LOAD_FAILED));
            }
        }
    }

    pub fn set_username(&self, v: &str) { self.state.lock().buffer.username = clamp_chars(v, USERNAME_MAX_CHARS); }

    pub fn set_name(&self, v: &str) { self.state.lock().buffer.name = clamp_chars(v, NAME_MAX_CHARS); }

    pub fn set_bio(&self, v: &str) { self.state.lock().buffer.bio = clamp_chars(v, BIO_MAX_CHARS); }

    /// Upload an avatar and stage its public URL in the buffer. Returns the URL.
    pub async fn upload_avatar(&self, file: AvatarFile) -> AppResult<String> {
        let live = self.scope.token();
        let user_id = {
            let mut st = self.state.lock();
            if st.uploading {
                return Err(AppError::validation("upload_in_progress", "Upload already in progress"));
            }
            if let Err(e) = validate_avatar(&file, self.max_avatar_bytes) {
                st.message = Some(ScreenMessage::error(e.message()));
                return Err(e);
            }
            let Some(id) = st.user_id.as_ref().map(id_string) else {
                st.message = Some(ScreenMessage::error(MSG_UPLOAD_FAILED));
                return Err(AppError::not_found("profile_not_loaded", MSG_UPLOAD_FAILED));
            };
            st.uploading = true;
            st.message = None;
            id
        };
        let path = avatar_path(&user_id, Utc::now().timestamp_millis(), &file);
        let upload = Upload {
            bucket: self.bucket.clone(),
            path: path.clone(),
            content_type: file.content_type,
            bytes: file.bytes,
            upsert: true,
        };
        let res = self.auth.client().upload(upload).await;
        if !live.is_alive() {
            return res.map(|()| self.auth.client().public_url(&self.bucket, &path)).map_err(AppError::from);
        }
        match res {
            Ok(()) => {
                let url = self.auth.client().public_url(&self.bucket, &path);
                info!(target: "ecoquest::profile", path = %path, "avatar uploaded");
                let mut st = self.state.lock();
                st.uploading = false;
                st.buffer.profile_picture = Some(url.clone());
                st.message = Some(ScreenMessage::success(MSG_UPLOAD_OK));
                Ok(url)
            }
            Err(e) => {
                error!(target: "ecoquest::profile", path = %path, error = %e, "avatar upload failed");
                let mut st = self.state.lock();
                st.uploading = false;
                st.message = Some(ScreenMessage::error(MSG_UPLOAD_FAILED));
                Err(AppError::io("avatar_upload_failed", MSG_UPLOAD_FAILED))
            }
        }
    }

    pub async fn save(&self) -> AppResult<()> {
        let live = self.scope.token();
        let (user_id, sent, previous_username) = {
            let mut st = self.state.lock();
            if st.saving {
                return Err(AppError::validation("save_in_progress", "Save already in progress"));
            }
            if !st.can_save() {
                return Err(AppError::validation("nothing_to_save", "No changes to save"));
            }
            if st.buffer.username.trim().is_empty() {
                st.message = Some(ScreenMessage::error(MSG_USERNAME_REQUIRED));
                return Err(AppError::validation("username_required", MSG_USERNAME_REQUIRED));
            }
            let Some(id) = st.user_id.clone() else {
                st.message = Some(ScreenMessage::error(MSG_SAVE_FAILED));
                return Err(AppError::not_found("profile_not_loaded", MSG_SAVE_FAILED));
            };
            st.saving = true;
            st.message = None;
            let previous = st.snapshot.as_ref().map(|s| s.username.clone()).unwrap_or_default();
            (id, st.buffer.trimmed(), previous)
        };
        let res = self.write(&user_id, &sent, &previous_username).await;
        if !live.is_alive() {
            return res;
        }
        let mut st = self.state.lock();
        st.saving = false;
        match &res {
            Ok(()) => {
                info!(target: "ecoquest::profile", user_id = %id_string(&user_id), "profile saved");
                if st.buffer.trimmed() == sent {
                    st.buffer = sent.clone();
                }
                st.snapshot = Some(sent);
                st.message = Some(ScreenMessage::success(MSG_SAVE_OK));
            }
            Err(e) => {
                debug!(target: "ecoquest::profile", user_id = %id_string(&user_id), kind = e.kind(), code = e.code_str(), "profile save rejected");
                st.message = Some(ScreenMessage::error(e.message()));
            }
        }
        res
    }

    async fn write(&self, user_id: &Value, sent: &Profile, previous_username: &str) -> AppResult<()> {
        let client = self.auth.client();
        if sent.username != previous_username {
            let clash = RowQuery::from(self.table.as_str())
                .select("user_id")
                .eq("username", sent.username.as_str())
                .neq("user_id", user_id.clone());
            let rows = client.select(&clash).await.map_err(|e| {
                error!(target: "ecoquest::profile", error = %e, "username check failed");
                AppError::io("profile_save_failed", MSG_SAVE_FAILED)
            })?;
            if !rows.is_empty() {
                debug!(target: "ecoquest::profile", username = %sent.username, "username taken");
                return Err(AppError::validation("username_taken", MSG_USERNAME_TAKEN));
            }
        }
        let target = RowQuery::from(self.table.as_str()).eq("user_id", user_id.clone());
        client.update(&target, sent.editable_columns()).await.map_err(|e| {
            error!(target: "ecoquest::profile", error = %e, "profile update failed");
            AppError::io("profile_save_failed", MSG_SAVE_FAILED)
        })
    }

    /// Drop pending edits. Refused when there is nothing to drop or a save is in flight.
    pub fn cancel(&self) -> bool {
        let mut st = self.state.lock();
        if !st.can_cancel() {
            return false;
        }
        if let Some(s) = st.snapshot.clone() {
            st.buffer = s;
        }
        st.message = None;
        true
    }

    pub async fn logout(&self) {
        let live = self.scope.token();
        // failure is logged by the auth context; local state is cleared regardless
        let _ = self.auth.sign_out().await;
        if live.is_alive() {
            self.nav.navigate(Navigation::push(Route::Login));
        }
    }

    pub fn open_tab(&self, tab: Tab) {
        if tab != self.active_tab() {
            self.nav.navigate(Navigation::push(tab.route()));
        }
    }
}
