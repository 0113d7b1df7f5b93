//! Tests for the account handlers.

use actix_web::http::StatusCode;
use actix_web::http::header::AUTHORIZATION;
use actix_web::test as actix_test;
use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::inbound::http::test_utils::{
    PASSWORD, api_app, login_cookie, memory_services, register,
};

#[actix_web::test]
async fn signup_creates_the_account_without_secrets() {
    let services = memory_services();
    let app = actix_test::init_service(api_app(&services)).await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/signup")
        .set_json(json!({
            "full_name": "Ada Lovelace",
            "username": "ada",
            "email": "Ada@Example.com",
            "password": "engine",
        }))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["username"], "ada");
    assert_eq!(body["email"], "ada@example.com");
    assert!(body.get("password_hash").is_none());
    assert!(body.get("reset_token").is_none());
    assert!(body.get("session_token").is_none());
}

#[actix_web::test]
async fn signup_with_taken_username_conflicts() {
    let services = memory_services();
    register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/signup")
        .set_json(json!({
            "full_name": "Another Ada",
            "username": "ada",
            "email": "other@example.com",
            "password": "engine",
        }))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[rstest]
#[case(json!({"full_name": " ", "username": "ada", "email": "ada@example.com", "password": "pw"}), "full_name")]
#[case(json!({"full_name": "Ada", "username": "a", "email": "ada@example.com", "password": "pw"}), "username")]
#[case(json!({"full_name": "Ada", "username": "ada", "email": "not-an-email", "password": "pw"}), "email")]
#[case(json!({"full_name": "Ada", "username": "ada", "email": "ada@example.com", "password": ""}), "password")]
#[actix_web::test]
async fn signup_rejects_invalid_fields(#[case] body: Value, #[case] field: &str) {
    let services = memory_services();
    let app = actix_test::init_service(api_app(&services)).await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/signup")
        .set_json(body)
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["code"], "invalid_request");
    assert_eq!(body["details"]["field"], field);
}

#[actix_web::test]
async fn login_returns_a_token_and_sets_the_session() {
    let services = memory_services();
    register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"email": "ada@example.com", "password": PASSWORD}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .response()
            .cookies()
            .any(|cookie| cookie.name() == "session")
    );
    let body: LoginResponse = actix_test::read_body_json(response).await;
    assert_eq!(body.user.username.as_str(), "ada");

    let stored = services
        .relationships
        .find_by_username("ada")
        .await
        .expect("lookup")
        .expect("user");
    assert_eq!(stored.session_token, Some(body.token));
}

#[actix_web::test]
async fn wrong_password_is_unauthorised() {
    let services = memory_services();
    register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"email": "ada@example.com", "password": "wrong"}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["code"], "unauthorized");
}

#[actix_web::test]
async fn user_info_requires_authentication() {
    let services = memory_services();
    let app = actix_test::init_service(api_app(&services)).await;

    let request = actix_test::TestRequest::get()
        .uri("/api/user/user_info")
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn bearer_token_authenticates_without_a_cookie() {
    let services = memory_services();
    let ada = register(&services, "ada").await;
    let credentials =
        LoginCredentials::try_from_parts("ada@example.com", PASSWORD).expect("credentials");
    let (token, _) = services.auth.login(&credentials).await.expect("login");
    let app = actix_test::init_service(api_app(&services)).await;

    let request = actix_test::TestRequest::get()
        .uri("/api/user/user_info")
        .insert_header((AUTHORIZATION, format!("Bearer {token}")))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: UserResponse = actix_test::read_body_json(response).await;
    assert_eq!(body.id, ada.id);
}

#[actix_web::test]
async fn logout_revokes_the_bearer_token() {
    let services = memory_services();
    register(&services, "ada").await;
    let credentials =
        LoginCredentials::try_from_parts("ada@example.com", PASSWORD).expect("credentials");
    let (token, _) = services.auth.login(&credentials).await.expect("login");
    let app = actix_test::init_service(api_app(&services)).await;
    let bearer = (AUTHORIZATION, format!("Bearer {token}"));

    let sign_out = actix_test::TestRequest::post()
        .uri("/api/user/logout")
        .insert_header(bearer.clone())
        .to_request();
    assert_eq!(
        actix_test::call_service(&app, sign_out).await.status(),
        StatusCode::OK
    );

    let again = actix_test::TestRequest::get()
        .uri("/api/user/user_info")
        .insert_header(bearer)
        .to_request();
    assert_eq!(
        actix_test::call_service(&app, again).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn password_reset_round_trip() {
    let services = memory_services();
    register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/password/reset_token")
        .set_json(json!({"email": "ada@example.com"}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let issued: ResetTokenResponse = actix_test::read_body_json(response).await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/password/reset")
        .set_json(json!({
            "email": "ada@example.com",
            "reset_token": issued.reset_token,
            "password": "new secret",
        }))
        .to_request();
    assert_eq!(
        actix_test::call_service(&app, request).await.status(),
        StatusCode::OK
    );

    let request = actix_test::TestRequest::post()
        .uri("/api/user/login")
        .set_json(json!({"email": "ada@example.com", "password": "new secret"}))
        .to_request();
    assert_eq!(
        actix_test::call_service(&app, request).await.status(),
        StatusCode::OK
    );
}

#[actix_web::test]
async fn password_reset_rejects_a_wrong_token() {
    let services = memory_services();
    register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/password/reset")
        .set_json(json!({
            "email": "ada@example.com",
            "reset_token": "deadbeef",
            "password": "new secret",
        }))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn location_can_be_set_and_cleared() {
    let services = memory_services();
    let ada = register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/update_location")
        .cookie(cookie.clone())
        .set_json(json!({"latitude": 51.5, "longitude": -0.12}))
        .to_request();
    assert_eq!(
        actix_test::call_service(&app, request).await.status(),
        StatusCode::OK
    );
    let stored = services.relationships.load(&ada.id).await.expect("user");
    assert_eq!(
        stored.location.map(|p| (p.latitude(), p.longitude())),
        Some((51.5, -0.12))
    );

    let request = actix_test::TestRequest::delete()
        .uri("/api/user/location")
        .cookie(cookie)
        .to_request();
    assert_eq!(
        actix_test::call_service(&app, request).await.status(),
        StatusCode::OK
    );
    let stored = services.relationships.load(&ada.id).await.expect("user");
    assert!(stored.location.is_none());
}

#[actix_web::test]
async fn out_of_range_location_is_rejected() {
    let services = memory_services();
    register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/update_location")
        .cookie(cookie)
        .set_json(json!({"latitude": 91.0, "longitude": 0.0}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["details"]["field"], "latitude");
}

#[actix_web::test]
async fn profile_update_changes_only_given_fields() {
    let services = memory_services();
    register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/profile")
        .cookie(cookie)
        .set_json(json!({"full_name": "Augusta Ada King"}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: UserResponse = actix_test::read_body_json(response).await;
    assert_eq!(body.full_name, "Augusta Ada King");
    assert_eq!(body.username.as_str(), "ada");
}

#[rstest]
#[case(ProfileRequest { full_name: Some("  ".into()), ..ProfileRequest::default() })]
#[case(ProfileRequest { username: Some("x".into()), ..ProfileRequest::default() })]
#[case(ProfileRequest { avatar: Some(String::new()), ..ProfileRequest::default() })]
fn invalid_profile_fields_are_rejected(#[case] request: ProfileRequest) {
    let error = ProfileUpdate::try_from(request).expect_err("rejected");
    assert_eq!(error.code(), crate::domain::ErrorCode::InvalidRequest);
}

#[actix_web::test]
async fn removing_the_account_ends_the_session() {
    let services = memory_services();
    let ada = register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::delete()
        .uri("/api/user/remove")
        .cookie(cookie)
        .to_request();
    assert_eq!(
        actix_test::call_service(&app, request).await.status(),
        StatusCode::OK
    );

    let lookup = services.relationships.load(&ada.id).await;
    assert!(lookup.is_err());
}
