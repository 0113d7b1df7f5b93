//! Cookie session wrapper.
//!
//! The cookie carries only the user id. The session token used by bearer
//! clients lives on the user record and is rotated by the auth gate.

use actix_session::Session;
use actix_web::{FromRequest, HttpRequest, dev::Payload};
use futures_util::future::LocalBoxFuture;
use tracing::warn;

use crate::domain::{Error, UserId};

const USER_ID_KEY: &str = "user_id";

/// The caller's cookie session.
#[derive(Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    /// Remember `user_id` as the signed-in user.
    pub fn persist_user(&self, user_id: &UserId) -> Result<(), Error> {
        self.0
            .insert(USER_ID_KEY, user_id.to_string())
            .map_err(|error| Error::internal(format!("failed to persist session: {error}")))
    }

    /// The signed-in user id. A cookie holding something other than a user
    /// id counts as no session.
    pub fn user_id(&self) -> Result<Option<UserId>, Error> {
        let Some(raw) = self
            .0
            .get::<String>(USER_ID_KEY)
            .map_err(|error| Error::internal(format!("failed to read session: {error}")))?
        else {
            return Ok(None);
        };
        Ok(UserId::new(&raw)
            .inspect_err(|error| warn!(error = %error, "ignoring session with a bad user id"))
            .ok())
    }

    /// Expire the cookie.
    pub fn clear(&self) {
        self.0.purge();
    }
}

impl FromRequest for SessionContext {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let session = Session::from_request(req, payload);
        Box::pin(async move { session.await.map(Self::new) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::dev::ServiceResponse;
    use actix_web::{App, HttpResponse, test, web};

    use crate::inbound::http::test_utils::test_session_middleware;

    const FIXTURE_ID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

    async fn whoami(session: SessionContext) -> Result<HttpResponse, Error> {
        let body = session
            .user_id()?
            .map_or_else(|| "anonymous".to_owned(), |id| id.to_string());
        Ok(HttpResponse::Ok().body(body))
    }

    async fn sign_in(session: SessionContext) -> Result<HttpResponse, Error> {
        let id = UserId::new(FIXTURE_ID).map_err(|error| Error::internal(error.to_string()))?;
        session.persist_user(&id)?;
        Ok(HttpResponse::Ok().finish())
    }

    async fn sign_out(session: SessionContext) -> HttpResponse {
        session.clear();
        HttpResponse::Ok().finish()
    }

    async fn tamper(session: Session) -> HttpResponse {
        session
            .insert(USER_ID_KEY, "not-a-uuid")
            .expect("insert raw value");
        HttpResponse::Ok().finish()
    }

    fn session_cookie(res: &ServiceResponse) -> Cookie<'static> {
        res.response()
            .cookies()
            .find(|cookie| cookie.name() == "session")
            .expect("session cookie")
            .into_owned()
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .wrap(test_session_middleware())
                    .route("/whoami", web::get().to(whoami))
                    .route("/sign_in", web::get().to(sign_in))
                    .route("/sign_out", web::get().to(sign_out))
                    .route("/tamper", web::get().to(tamper)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn remembers_the_signed_in_user() {
        let app = app!();
        let signed_in =
            test::call_service(&app, test::TestRequest::get().uri("/sign_in").to_request()).await;
        let cookie = session_cookie(&signed_in);

        let req = test::TestRequest::get().uri("/whoami").cookie(cookie).to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, FIXTURE_ID);
    }

    #[actix_web::test]
    async fn no_cookie_means_anonymous() {
        let app = app!();
        let req = test::TestRequest::get().uri("/whoami").to_request();
        assert_eq!(test::call_and_read_body(&app, req).await, "anonymous");
    }

    #[actix_web::test]
    async fn clearing_expires_the_cookie() {
        let app = app!();
        let signed_in =
            test::call_service(&app, test::TestRequest::get().uri("/sign_in").to_request()).await;
        let req = test::TestRequest::get()
            .uri("/sign_out")
            .cookie(session_cookie(&signed_in))
            .to_request();
        let signed_out = test::call_service(&app, req).await;

        assert_eq!(session_cookie(&signed_out).value(), "");
    }

    #[actix_web::test]
    async fn a_tampered_user_id_reads_as_anonymous() {
        let app = app!();
        let tampered =
            test::call_service(&app, test::TestRequest::get().uri("/tamper").to_request()).await;
        let req = test::TestRequest::get()
            .uri("/whoami")
            .cookie(session_cookie(&tampered))
            .to_request();

        assert_eq!(test::call_and_read_body(&app, req).await, "anonymous");
    }
}
