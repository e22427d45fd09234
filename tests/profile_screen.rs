mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use ecoquest::identity::testing::{Call, MockIdentity, Op};
use ecoquest::identity::{AuthUser, IdentityClient, ProviderError};
use ecoquest::profile::{AvatarFile, MSG_IMAGE_TOO_LARGE, MSG_NOT_AN_IMAGE};
use ecoquest::routes::{Navigation, RecordingNavigator, Route};
use ecoquest::screens::profile::{
    MSG_LOAD_FAILED, MSG_SAVE_FAILED, MSG_SAVE_OK, MSG_UPLOAD_FAILED, MSG_UPLOAD_OK, MSG_USERNAME_REQUIRED,
    MSG_USERNAME_TAKEN,
};
use ecoquest::screens::{ProfileScreen, Tab};

use common::*;

fn backend_with_profiles() -> MockIdentity {
    MockIdentity::new()
        .signed_in_as(AuthUser::new("auth-1"))
        .with_row(
            TABLE,
            json!({
                "user_id": 1, "auth_id": "auth-1", "username": "oldname", "name": "Moss",
                "bio": "", "profile_picture": null, "points": 40, "quest_completed": 3,
                "total_points_earned": 90, "total_points_donated": 50,
                "created_at": "2024-03-01T10:00:00+00:00"
            }),
        )
        .with_row(TABLE, json!({"user_id": 2, "auth_id": "auth-2", "username": "newname"}))
}

async fn loaded() -> (Arc<MockIdentity>, Arc<RecordingNavigator>, ProfileScreen) {
    loaded_from(backend_with_profiles()).await
}

async fn loaded_from(backend: MockIdentity) -> (Arc<MockIdentity>, Arc<RecordingNavigator>, ProfileScreen) {
    let mock = Arc::new(backend);
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = ProfileScreen::new(auth, nav.clone(), &config());
    screen.fetch().await;
    (mock, nav, screen)
}

fn png(len: usize) -> AvatarFile {
    AvatarFile { file_name: "me.png".into(), content_type: "image/png".into(), bytes: vec![7; len] }
}

#[tokio::test]
async fn fetch_loads_the_users_row() {
    let (_mock, nav, screen) = loaded().await;
    let v = screen.view();
    assert!(!v.loading);
    assert_eq!(v.user_id, Some(json!(1)));
    assert_eq!(v.buffer.username, "oldname");
    assert_eq!(v.buffer.points, 40);
    assert_eq!(v.buffer.joined_label(), "March 1, 2024");
    assert_eq!(v.buffer.initial(), 'M');
    assert_eq!(v.snapshot.as_ref(), Some(&v.buffer));
    assert!(v.message.is_none());
    assert!(nav.history().is_empty());
}

#[tokio::test]
async fn fetch_without_user_goes_to_login() {
    let mock = Arc::new(MockIdentity::new());
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = ProfileScreen::new(auth, nav.clone(), &config());
    screen.fetch().await;
    assert_eq!(nav.history(), vec![Navigation::push(Route::Login)]);
    assert!(!screen.view().loading);
    assert_eq!(mock.count(Op::Select), 0);
}

#[tokio::test]
async fn fetch_failure_shows_message() {
    let mock = Arc::new(backend_with_profiles());
    let auth = start(&mock).await;
    mock.fail_next(Op::Select, ProviderError::Http { status: 500, message: "boom".into() });
    let screen = ProfileScreen::new(auth, navigator(), &config());
    screen.fetch().await;
    let v = screen.view();
    assert!(!v.loading);
    assert_eq!(v.message.as_ref().unwrap().text, MSG_LOAD_FAILED);
    assert!(v.snapshot.is_none());
}

#[tokio::test]
async fn missing_row_is_a_load_failure() {
    let mock = Arc::new(MockIdentity::new().signed_in_as(AuthUser::new("ghost")));
    let auth = start(&mock).await;
    let screen = ProfileScreen::new(auth, navigator(), &config());
    screen.fetch().await;
    assert_eq!(screen.view().message.unwrap().text, MSG_LOAD_FAILED);
}

#[tokio::test]
async fn save_is_enabled_only_with_changes() {
    let (_mock, _nav, screen) = loaded().await;
    assert!(!screen.view().can_save());
    assert!(!screen.view().can_cancel());
    screen.set_bio("likes trees");
    assert!(screen.view().can_save());
    screen.set_bio("");
    assert!(!screen.view().can_save());
}

#[tokio::test]
async fn save_without_changes_makes_no_update() {
    let (mock, _nav, screen) = loaded().await;
    let err = screen.save().await.unwrap_err();
    assert_eq!(err.code_str(), "nothing_to_save");
    assert!(screen.view().message.is_none());
    assert_eq!(mock.count(Op::Update), 0);

    screen.set_bio("x");
    screen.set_bio("");
    assert_eq!(screen.save().await.unwrap_err().code_str(), "nothing_to_save");
    assert_eq!(mock.count(Op::Update), 0);
    assert!(!screen.cancel());
}

#[tokio::test(start_paused = true)]
async fn cancel_is_refused_while_saving() {
    let (mock, _nav, screen) = loaded_from(backend_with_profiles().with_latency(Duration::from_millis(300))).await;
    screen.set_name("Fern");

    let (saved, ()) = tokio::join!(screen.save(), async {
        while !screen.view().saving {
            tokio::task::yield_now().await;
        }
        assert!(!screen.view().can_cancel());
        assert!(!screen.cancel());
        assert_eq!(screen.view().buffer.name, "Fern");
        assert_eq!(screen.save().await.unwrap_err().code_str(), "save_in_progress");
    });
    saved.unwrap();

    let v = screen.view();
    assert!(!v.saving);
    assert_eq!(v.buffer.name, "Fern");
    assert_eq!(v.snapshot.as_ref(), Some(&v.buffer));
    assert_eq!(mock.count(Op::Update), 1);
}

#[tokio::test]
async fn taken_username_blocks_update() {
    let (mock, _nav, screen) = loaded().await;
    screen.set_username("newname");
    let err = screen.save().await.unwrap_err();
    assert_eq!(err.message(), MSG_USERNAME_TAKEN);
    let v = screen.view();
    assert_eq!(v.message.as_ref().unwrap().text, MSG_USERNAME_TAKEN);
    assert!(!v.saving);
    assert_eq!(mock.count(Op::Update), 0);

    let check = mock
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Select(q) if q.columns == "user_id" => Some(q),
            _ => None,
        })
        .last()
        .unwrap();
    assert!(check.matches(&json!({"username": "newname", "user_id": 2}).as_object().cloned().unwrap()));
    assert!(!check.matches(&json!({"username": "newname", "user_id": 1}).as_object().cloned().unwrap()));
}

#[tokio::test]
async fn save_writes_trimmed_fields_and_adopts_snapshot() {
    let (mock, _nav, screen) = loaded().await;
    screen.set_username("  sprout ");
    screen.set_bio(" planting things ");
    screen.save().await.unwrap();

    let v = screen.view();
    assert_eq!(v.message.as_ref().unwrap().text, MSG_SAVE_OK);
    assert!(!v.message.as_ref().unwrap().is_error());
    assert_eq!(v.buffer.username, "sprout");
    assert_eq!(v.snapshot.as_ref(), Some(&v.buffer));
    assert!(!v.can_save());

    let updates: Vec<_> = mock.calls().into_iter().filter(|c| c.op() == Op::Update).collect();
    assert_eq!(updates.len(), 1);
    if let Call::Update { query, values } = &updates[0] {
        assert!(query.matches(&json!({"user_id": 1}).as_object().cloned().unwrap()));
        assert_eq!(
            Value::Object(values.clone()),
            json!({"username": "sprout", "name": "Moss", "bio": "planting things", "profile_picture": null})
        );
    }
    let row = mock.rows(TABLE).into_iter().find(|r| r.get("user_id") == Some(&json!(1))).unwrap();
    assert_eq!(row.get("username"), Some(&json!("sprout")));
    assert_eq!(row.get("points"), Some(&json!(40)));
}

#[tokio::test]
async fn unchanged_username_skips_uniqueness_check() {
    let (mock, _nav, screen) = loaded().await;
    let selects_before = mock.count(Op::Select);
    screen.set_name("Moss Green");
    screen.save().await.unwrap();
    assert_eq!(mock.count(Op::Select), selects_before);
    assert_eq!(mock.count(Op::Update), 1);
}

#[tokio::test]
async fn blank_username_is_required() {
    let (mock, _nav, screen) = loaded().await;
    screen.set_username("   ");
    assert_eq!(screen.save().await.unwrap_err().message(), MSG_USERNAME_REQUIRED);
    assert_eq!(mock.count(Op::Update), 0);
}

#[tokio::test]
async fn failed_update_reports_generic_message() {
    let (mock, _nav, screen) = loaded().await;
    mock.fail_next(Op::Update, ProviderError::Transport("timeout".into()));
    screen.set_name("Other");
    screen.save().await.unwrap_err();
    let v = screen.view();
    assert_eq!(v.message.as_ref().unwrap().text, MSG_SAVE_FAILED);
    assert!(v.has_changes());
}

#[tokio::test]
async fn oversized_avatar_never_reaches_storage() {
    let (mock, _nav, screen) = loaded().await;
    let err = screen.upload_avatar(png(6 * 1024 * 1024)).await.unwrap_err();
    assert_eq!(err.message(), MSG_IMAGE_TOO_LARGE);
    assert_eq!(screen.view().message.unwrap().text, MSG_IMAGE_TOO_LARGE);
    assert_eq!(mock.count(Op::Upload), 0);

    let pdf = AvatarFile { file_name: "cv.pdf".into(), content_type: "application/pdf".into(), bytes: vec![1; 10] };
    assert_eq!(screen.upload_avatar(pdf).await.unwrap_err().message(), MSG_NOT_AN_IMAGE);
    assert_eq!(mock.count(Op::Upload), 0);
}

#[tokio::test]
async fn avatar_upload_stages_public_url_in_buffer_only() {
    let (mock, _nav, screen) = loaded().await;
    let url = screen.upload_avatar(png(1024)).await.unwrap();

    let uploaded: Vec<_> = mock
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Upload { bucket, path, size } => Some((bucket, path, size)),
            _ => None,
        })
        .collect();
    assert_eq!(uploaded.len(), 1);
    let (bucket, path, size) = &uploaded[0];
    assert_eq!(bucket, "quest-images");
    assert!(path.starts_with("profiles/1_") && path.ends_with(".png"), "{}", path);
    assert_eq!(*size, 1024);
    assert!(mock.object(path).unwrap().upsert);
    assert_eq!(url, format!("https://storage.test/quest-images/{}", path));

    let v = screen.view();
    assert_eq!(v.buffer.profile_picture.as_deref(), Some(url.as_str()));
    assert_eq!(v.snapshot.as_ref().unwrap().profile_picture, None);
    assert_eq!(v.message.as_ref().unwrap().text, MSG_UPLOAD_OK);
    assert!(!v.uploading);
    assert!(screen.view().can_save());
    assert_eq!(mock.count(Op::Update), 0);
}

#[tokio::test(start_paused = true)]
async fn second_upload_is_refused_while_uploading() {
    let (mock, _nav, screen) = loaded_from(backend_with_profiles().with_latency(Duration::from_millis(300))).await;
    let (first, second) = tokio::join!(screen.upload_avatar(png(64)), async {
        while !screen.view().uploading {
            tokio::task::yield_now().await;
        }
        screen.upload_avatar(png(32)).await
    });
    let url = first.unwrap();
    assert_eq!(second.unwrap_err().code_str(), "upload_in_progress");
    assert_eq!(mock.count(Op::Upload), 1);
    let v = screen.view();
    assert!(!v.uploading);
    assert_eq!(v.buffer.profile_picture.as_deref(), Some(url.as_str()));
}

#[tokio::test]
async fn failed_upload_reports_generic_message() {
    let (mock, _nav, screen) = loaded().await;
    mock.fail_next(Op::Upload, ProviderError::Http { status: 413, message: "too big".into() });
    screen.upload_avatar(png(10)).await.unwrap_err();
    let v = screen.view();
    assert_eq!(v.message.as_ref().unwrap().text, MSG_UPLOAD_FAILED);
    assert!(v.buffer.profile_picture.is_none());
    assert!(!v.uploading);
}

#[tokio::test]
async fn cancel_restores_snapshot_and_clears_message() {
    let (_mock, _nav, screen) = loaded().await;
    screen.set_username("newname");
    let _ = screen.save().await;
    assert!(screen.view().message.is_some());
    assert!(screen.cancel());
    let v = screen.view();
    assert_eq!(v.buffer.username, "oldname");
    assert!(v.message.is_none());
    assert!(!v.has_changes());
}

#[tokio::test]
async fn edits_are_truncated_to_field_limits() {
    let (_mock, _nav, screen) = loaded().await;
    screen.set_username(&"x".repeat(40));
    screen.set_name(&"n".repeat(80));
    screen.set_bio(&"b".repeat(250));
    let v = screen.view();
    assert_eq!(v.buffer.username.chars().count(), 30);
    assert_eq!(v.buffer.name.chars().count(), 50);
    assert_eq!(v.buffer.bio.chars().count(), 200);
}

#[tokio::test]
async fn logout_signs_out_and_pushes_login() {
    let (mock, nav, screen) = loaded().await;
    screen.logout().await;
    assert_eq!(mock.count(Op::SignOut), 1);
    assert!(mock.current_session().is_none());
    assert_eq!(nav.last(), Some(Navigation::push(Route::Login)));
}

#[tokio::test]
async fn tabs_navigate_except_the_current_one() {
    let (_mock, nav, screen) = loaded().await;
    assert_eq!(screen.tabs().len(), 4);
    screen.open_tab(Tab::Profile);
    assert!(nav.history().is_empty());
    screen.open_tab(Tab::Redeem);
    screen.open_tab(Tab::Quests);
    assert_eq!(nav.history(), vec![Navigation::push(Route::Redeem), Navigation::push(Route::App)]);
}

#[tokio::test]
async fn unmounted_screen_ignores_late_results() {
    let mock = Arc::new(backend_with_profiles());
    let auth = start(&mock).await;
    let screen = ProfileScreen::new(auth, navigator(), &config());
    screen.unmount();
    screen.fetch().await;
    let v = screen.view();
    assert!(v.loading);
    assert!(v.snapshot.is_none());
}
