mod common;

use std::sync::Arc;
use std::time::Duration;

use ecoquest::error::AppError;
use ecoquest::identity::testing::{MockIdentity, Op};
use ecoquest::identity::{IdentityClient, Role};
use ecoquest::routes::{Navigation, Route};
use ecoquest::screens::guard::{MSG_ADMIN_ACCOUNT_REJECTED, MSG_ADMIN_ON_STUDENT_SCREEN, MSG_NOT_AN_ADMIN, MSG_STUDENT_ON_ADMIN_SCREEN};
use ecoquest::screens::{CredentialScreen, GuardState};

use common::*;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn admin_session_on_student_screen_is_signed_out_and_redirected() {
    let mock = Arc::new(backend().signed_in_as(admin_by_claim()));
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::student(auth.clone(), nav.clone(), Duration::ZERO);

    let st = tokio::time::timeout(WAIT, screen.watch_until_exit()).await.unwrap();
    assert_eq!(st, GuardState::AuthenticatedMismatched);
    let view = screen.view();
    assert_eq!(view.error.as_deref(), Some(MSG_ADMIN_ON_STUDENT_SCREEN));
    assert!(!view.shows_form());
    assert_eq!(mock.count(Op::SignOut), 1);
    assert!(mock.current_session().is_none());

    screen.settle().await;
    assert_eq!(nav.history(), vec![Navigation::replace(Route::AdminLogin)]);
}

#[tokio::test]
async fn student_session_on_admin_screen_never_reaches_dashboard() {
    let mock = Arc::new(backend().signed_in_as(student()));
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::admin(auth.clone(), nav.clone(), Duration::ZERO);

    let st = tokio::time::timeout(WAIT, screen.watch_until_exit()).await.unwrap();
    assert_eq!(st, GuardState::AuthenticatedMismatched);
    assert_eq!(screen.view().error.as_deref(), Some(MSG_STUDENT_ON_ADMIN_SCREEN));
    screen.settle().await;
    assert_eq!(nav.last(), Some(Navigation::replace(Route::Login)));
    assert!(!nav.visited(Route::Admin));
    assert!(auth.snapshot().session.is_none());
}

#[tokio::test]
async fn unknown_role_counts_as_student_on_admin_screen() {
    let stranger = ecoquest::identity::AuthUser::new("nobody");
    let mock = Arc::new(MockIdentity::new().signed_in_as(stranger));
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::admin(auth, nav.clone(), Duration::ZERO);
    tokio::time::timeout(WAIT, screen.watch_until_exit()).await.unwrap();
    screen.settle().await;
    assert_eq!(nav.history(), vec![Navigation::replace(Route::Login)]);
}

#[tokio::test]
async fn matching_sessions_enter_their_home() {
    let mock = Arc::new(backend().signed_in_as(admin_by_table()));
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::admin(auth, nav.clone(), Duration::ZERO);
    let st = tokio::time::timeout(WAIT, screen.watch_until_exit()).await.unwrap();
    assert_eq!(st, GuardState::AuthenticatedMatching);
    assert_eq!(nav.history(), vec![Navigation::replace(Route::Admin)]);
    assert_eq!(mock.count(Op::SignOut), 0);

    let mock = Arc::new(backend().signed_in_as(student()));
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::student(auth, nav.clone(), Duration::ZERO);
    tokio::time::timeout(WAIT, screen.watch_until_exit()).await.unwrap();
    assert_eq!(nav.history(), vec![Navigation::replace(Route::Homepage)]);
}

#[tokio::test]
async fn no_session_shows_the_form() {
    let mock = Arc::new(backend());
    let auth = start(&mock).await;
    let screen = CredentialScreen::student(auth.clone(), navigator(), Duration::ZERO);
    let st = screen.on_auth_change(&auth.settled().await).await;
    assert_eq!(st, GuardState::Unauthenticated);
    assert!(screen.view().shows_form());
    assert_eq!(screen.submit_label(), "Sign In");
}

#[tokio::test]
async fn admin_form_without_any_admin_source_signs_out_with_inline_error() {
    let mock = Arc::new(backend());
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::admin(auth.clone(), nav.clone(), Duration::ZERO);
    screen.set_email("kid@eco.test");
    screen.set_password(PASSWORD);

    let err = screen.submit().await.unwrap_err();
    assert!(matches!(err, AppError::Authorization { .. }));
    assert_eq!(err.message(), MSG_NOT_AN_ADMIN);
    assert_eq!(screen.view().error.as_deref(), Some(MSG_NOT_AN_ADMIN));
    assert!(!screen.view().submitting);
    assert_eq!(mock.count(Op::SignOut), 1);
    assert!(mock.current_session().is_none());

    let snap = tokio::time::timeout(WAIT, auth.settled()).await.unwrap();
    assert!(snap.session.is_none() || !snap.is_admin());
    assert!(!nav.visited(Route::Admin));
}

#[tokio::test]
async fn admin_account_on_student_form_is_rejected() {
    let mock = Arc::new(backend());
    let auth = start(&mock).await;
    let screen = CredentialScreen::student(auth, navigator(), Duration::ZERO);
    screen.set_email("admin@eco.test");
    screen.set_password(PASSWORD);
    let err = screen.submit().await.unwrap_err();
    assert_eq!(err.message(), MSG_ADMIN_ACCOUNT_REJECTED);
    assert_eq!(mock.count(Op::SignOut), 1);
}

#[tokio::test]
async fn table_role_admits_admin_and_guard_enters_dashboard() {
    let mock = Arc::new(backend());
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::admin(auth, nav.clone(), Duration::ZERO);
    screen.set_email("ops@eco.test");
    screen.set_password(PASSWORD);

    assert_eq!(screen.submit().await.unwrap(), Role::Admin);
    assert!(screen.view().error.is_none());
    let st = tokio::time::timeout(WAIT, screen.watch_until_exit()).await.unwrap();
    assert_eq!(st, GuardState::AuthenticatedMatching);
    assert_eq!(nav.last(), Some(Navigation::replace(Route::Admin)));
}

#[tokio::test]
async fn provider_credential_message_is_shown_verbatim() {
    let mock = Arc::new(backend());
    let auth = start(&mock).await;
    let screen = CredentialScreen::student(auth, navigator(), Duration::ZERO);
    screen.set_email("kid@eco.test");
    screen.set_password("wrong-password");
    let err = screen.submit().await.unwrap_err();
    assert!(matches!(err, AppError::Credential { .. }));
    assert_eq!(screen.view().error.as_deref(), Some("Invalid login credentials"));
    assert_eq!(mock.count(Op::SignOut), 0);
}

#[tokio::test]
async fn invalid_input_never_reaches_the_provider() {
    let mock = Arc::new(backend());
    let auth = start(&mock).await;
    let screen = CredentialScreen::student(auth, navigator(), Duration::ZERO);
    screen.set_email("   ");
    screen.set_password(PASSWORD);
    assert_eq!(screen.submit().await.unwrap_err().message(), "Email is required");
    screen.set_email("kid@eco.test");
    screen.set_password("short");
    assert_eq!(screen.submit().await.unwrap_err().message(), "Password must be at least 8 characters");
    assert_eq!(mock.count(Op::SignIn), 0);
}

#[tokio::test(start_paused = true)]
async fn eviction_redirect_waits_for_the_delay() {
    let mock = Arc::new(backend().signed_in_as(admin_by_claim()));
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::student(auth, nav.clone(), Duration::from_millis(1500));
    screen.watch_until_exit().await;

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(nav.history().is_empty());
    screen.settle().await;
    assert_eq!(nav.history(), vec![Navigation::replace(Route::AdminLogin)]);
}

#[tokio::test(start_paused = true)]
async fn unmounted_screen_drops_pending_redirect() {
    let mock = Arc::new(backend().signed_in_as(admin_by_claim()));
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::student(auth, nav.clone(), Duration::from_millis(1500));
    screen.watch_until_exit().await;
    screen.unmount();
    screen.settle().await;
    assert!(nav.history().is_empty());
    assert_eq!(mock.count(Op::SignOut), 1);
}

#[tokio::test]
async fn uppercase_admin_claim_is_not_an_admin() {
    let shouting = ecoquest::identity::AuthUser::new("loud-1").with_claim("role", "ADMIN");
    let mock = Arc::new(MockIdentity::new().signed_in_as(shouting));
    let auth = start(&mock).await;
    let nav = navigator();
    let screen = CredentialScreen::admin(auth.clone(), nav.clone(), Duration::ZERO);

    let st = tokio::time::timeout(WAIT, screen.watch_until_exit()).await.unwrap();
    assert_eq!(st, GuardState::AuthenticatedMismatched);
    screen.settle().await;
    assert_eq!(nav.history(), vec![Navigation::replace(Route::Login)]);
    assert!(!nav.visited(Route::Admin));
    assert_eq!(mock.count(Op::SignOut), 1);
}

#[tokio::test]
async fn signup_link_follows_the_audience() {
    let mock = Arc::new(backend());
    let auth = start(&mock).await;
    let nav = navigator();
    let student = CredentialScreen::student(auth.clone(), nav.clone(), Duration::ZERO);
    let admin = CredentialScreen::admin(auth, nav.clone(), Duration::ZERO);
    assert_eq!(student.view().signup, Route::Signup);
    assert_eq!(admin.view().signup, Route::AdminSignup);

    admin.open_signup();
    assert_eq!(nav.history(), vec![Navigation::push(Route::AdminSignup)]);
    student.unmount();
    student.open_signup();
    assert_eq!(nav.history().len(), 1);
}
