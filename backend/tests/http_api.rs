//! End-to-end coverage of the `/api/user` surface over in-memory stores.

#[path = "support/services.rs"]
mod services;

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::Key;
use actix_web::http::{StatusCode, header};
use actix_web::{App, test, web};
use beacon::Trace;
use beacon::domain::Error;
use beacon::inbound::http::{api_scope, json_config};
use serde_json::{Value, json};

macro_rules! init_app {
    ($services:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($services.http_state()))
                .app_data(json_config())
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
                        .cookie_name("session".to_owned())
                        .cookie_secure(false)
                        .build(),
                )
                .wrap(Trace)
                .service(api_scope()),
        )
        .await
    };
}

fn signup_body(name: &str) -> Value {
    json!({
        "full_name": format!("{name} tester"),
        "username": name,
        "email": format!("{name}@example.com"),
        "password": services::PASSWORD,
    })
}

#[actix_web::test]
async fn signup_login_and_befriend_with_a_bearer_token() {
    let services = services::memory_services();
    let app = init_app!(services);

    for name in ["ada", "bob"] {
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/user/signup")
                .set_json(signup_body(name))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED, "signup {name}");
    }

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/user/login")
            .set_json(json!({ "email": "ada@example.com", "password": services::PASSWORD }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.response().cookies().any(|cookie| cookie.name() == "session"));
    let login: Value = test::read_body_json(res).await;
    let token = login["token"].as_str().expect("token string").to_owned();
    assert_eq!(login["user"]["username"], "ada");
    let bearer = (header::AUTHORIZATION, format!("Bearer {token}"));

    let res = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/user/friends/new")
            .insert_header(bearer.clone())
            .set_json(json!({ "friend": "bob" }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/user/friends")
            .insert_header(bearer)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let friends: Value = test::read_body_json(res).await;
    let friends = friends.as_array().expect("friend list");
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0]["username"], "bob");
    assert_eq!(friends[0]["unread_messages"], false);
}

#[actix_web::test]
async fn rejects_wrong_passwords_with_a_single_message() {
    let services = services::memory_services();
    services::register(&services, "ada").await;
    let app = init_app!(services);

    let mut messages = Vec::new();
    for email in ["ada@example.com", "nobody@example.com"] {
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/user/login")
                .set_json(json!({ "email": email, "password": "wrong" }))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "login as {email}");
        let body: Error = test::read_body_json(res).await;
        messages.push(body.message().to_owned());
    }
    assert_eq!(messages[0], messages[1]);
}

#[actix_web::test]
async fn anonymous_requests_are_unauthorised_and_traced() {
    let services = services::memory_services();
    let app = init_app!(services);

    let res = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/user/user_info").to_request(),
    )
    .await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let header_trace = res
        .headers()
        .get("trace-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .expect("trace-id header");
    let body: Error = test::read_body_json(res).await;
    assert_eq!(body.trace_id(), Some(header_trace.as_str()));
}
