//! Tests for the friend and tracking handlers.

use actix_web::http::StatusCode;
use actix_web::test as actix_test;
use serde_json::{Value, json};

use super::*;
use crate::inbound::http::test_utils::{
    api_app, friends, login_cookie, memory_services, point, register,
};

#[actix_web::test]
async fn adding_a_friend_writes_both_sides() {
    let services = memory_services();
    let ada = register(&services, "ada").await;
    let bob = register(&services, "bob").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/friends/new")
        .cookie(cookie)
        .set_json(json!({"friend": "bob"}))
        .to_request();
    assert_eq!(
        actix_test::call_service(&app, request).await.status(),
        StatusCode::OK
    );

    let ada = services.relationships.load(&ada.id).await.expect("ada");
    let bob = services.relationships.load(&bob.id).await.expect("bob");
    assert!(ada.is_friend_of(&bob.id));
    assert!(bob.is_friend_of(&ada.id));
}

#[actix_web::test]
async fn adding_an_unknown_friend_is_a_bad_request() {
    let services = memory_services();
    register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/friends/new")
        .cookie(cookie)
        .set_json(json!({"friend": "nobody"}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = actix_test::read_body_json(response).await;
    assert_eq!(body["message"], INVALID_FRIEND);
}

#[actix_web::test]
async fn friend_list_reports_unread_messages() {
    let services = memory_services();
    let (ada, bob) = friends(&services, "ada", "bob").await;
    let conversation = services
        .conversations
        .find_or_create(&ada, &bob)
        .await
        .expect("conversation");
    services
        .conversations
        .append_message(
            &conversation.id,
            &bob.username,
            &ada.username,
            "hello",
            crate::domain::ContentType::Text,
        )
        .await
        .expect("message");
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::get()
        .uri("/api/user/friends")
        .cookie(cookie)
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(response).await;
    let entries = body.as_array().expect("array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["username"], "bob");
    assert_eq!(entries[0]["unread_messages"], true);
}

#[actix_web::test]
async fn removing_a_friend_returns_their_id() {
    let services = memory_services();
    let (ada, bob) = friends(&services, "ada", "bob").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::delete()
        .uri("/api/user/friends/remove")
        .cookie(cookie)
        .set_json(json!({"friend": "bob"}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: RemoveFriendResponse = actix_test::read_body_json(response).await;
    assert_eq!(body.friend_id, bob.id);
    let ada = services.relationships.load(&ada.id).await.expect("ada");
    assert!(!ada.is_friend_of(&bob.id));
}

#[actix_web::test]
async fn track_grants_show_up_on_both_lists() {
    let services = memory_services();
    let (ada, bob) = friends(&services, "ada", "bob").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let ada_cookie = login_cookie(&app, "ada").await;
    let bob_cookie = login_cookie(&app, "bob").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/friends/allow_track")
        .cookie(ada_cookie.clone())
        .set_json(json!({"friend": "bob"}))
        .to_request();
    assert_eq!(
        actix_test::call_service(&app, request).await.status(),
        StatusCode::OK
    );

    let request = actix_test::TestRequest::get()
        .uri("/api/user/friends/tracking_me")
        .cookie(ada_cookie)
        .to_request();
    let tracking: TrackingMeResponse =
        actix_test::read_body_json(actix_test::call_service(&app, request).await).await;
    assert!(tracking.friends.contains_key(&bob.id));

    let request = actix_test::TestRequest::get()
        .uri("/api/user/friends/allow_track")
        .cookie(bob_cookie)
        .to_request();
    let allowed: AllowedTracksResponse =
        actix_test::read_body_json(actix_test::call_service(&app, request).await).await;
    assert!(allowed.friends.contains_key(&ada.id));
}

#[actix_web::test]
async fn disallowing_without_a_grant_is_not_found() {
    let services = memory_services();
    friends(&services, "ada", "bob").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/friends/disallow_track")
        .cookie(cookie)
        .set_json(json!({"friend": "bob"}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn friend_location_requires_a_grant() {
    let services = memory_services();
    let (ada, bob) = friends(&services, "ada", "bob").await;
    services
        .relationships
        .update_location(&bob.id, point(48.85, 2.35))
        .await
        .expect("location");
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;
    let ask = || {
        actix_test::TestRequest::post()
            .uri("/api/user/friend/current_location")
            .cookie(cookie.clone())
            .set_json(json!({"friend": "bob"}))
            .to_request()
    };

    let denied = actix_test::call_service(&app, ask()).await;
    assert_eq!(denied.status(), StatusCode::BAD_REQUEST);

    services
        .relationships
        .allow_track(&bob.id, &ada.id)
        .await
        .expect("grant");
    let granted = actix_test::call_service(&app, ask()).await;
    assert_eq!(granted.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(granted).await;
    assert_eq!(body["location"]["coordinates"], json!([48.85, 2.35]));
}

#[actix_web::test]
async fn search_flags_existing_friends() {
    let services = memory_services();
    friends(&services, "ada", "bob").await;
    register(&services, "bobby").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/friends/search")
        .cookie(cookie)
        .set_json(json!({"query": "bob"}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let results: Vec<SearchResult> = actix_test::read_body_json(response).await;
    let flags: BTreeMap<String, bool> = results
        .into_iter()
        .map(|result| (result.username.as_str().to_owned(), result.is_friend))
        .collect();
    assert_eq!(flags.get("bob"), Some(&true));
    assert_eq!(flags.get("bobby"), Some(&false));
}

#[actix_web::test]
async fn blank_search_is_rejected() {
    let services = memory_services();
    register(&services, "ada").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/friends/search")
        .cookie(cookie)
        .set_json(json!({"query": "   "}))
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn reconcile_reports_no_repairs_for_consistent_records() {
    let services = memory_services();
    friends(&services, "ada", "bob").await;
    let app = actix_test::init_service(api_app(&services)).await;
    let cookie = login_cookie(&app, "ada").await;

    let request = actix_test::TestRequest::post()
        .uri("/api/user/friends/reconcile")
        .cookie(cookie)
        .to_request();
    let response = actix_test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let report: ReconcileReport = actix_test::read_body_json(response).await;
    assert_eq!(report, ReconcileReport::default());
}
