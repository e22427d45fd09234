use super::*;

#[test]
fn provider_auth_message_passes_through_verbatim() {
    let err: AppError = ProviderError::Auth { message: "Invalid login credentials".into() }.into();
    assert_eq!(err.kind(), "credential");
    assert_eq!(err.message(), "Invalid login credentials");
}

#[test]
fn transport_failures_map_to_io() {
    let err: AppError = ProviderError::Transport("connection refused".into()).into();
    assert_eq!(err.kind(), "io");
    assert_eq!(err.code_str(), "backend_io");

    let err: AppError = ProviderError::Http { status: 500, message: "boom".into() }.into();
    assert_eq!(err.kind(), "io");
    assert!(err.message().contains("500"));
}

#[test]
fn single_row_miss_maps_to_not_found() {
    let err: AppError = ProviderError::NotSingle(0).into();
    assert_eq!(err.kind(), "not_found");
}

#[test]
fn only_validation_is_local() {
    assert!(AppError::validation("username_required", "Username is required").is_local());
    assert!(!AppError::io("x", "y").is_local());
    assert!(!AppError::authorization("x", "y").is_local());
}

#[test]
fn display_includes_code_and_message() {
    let e = AppError::validation("avatar_too_large", "Image must be less than 5MB");
    assert_eq!(e.to_string(), "avatar_too_large: Image must be less than 5MB");
}

#[test]
fn serializes_with_type_tag() {
    let e = AppError::authorization("wrong_audience", "nope");
    let v = serde_json::to_value(&e).unwrap();
    assert_eq!(v["type"], "authorization");
    assert_eq!(v["code"], "wrong_audience");
}
