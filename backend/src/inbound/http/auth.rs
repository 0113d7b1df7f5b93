//! Authenticated-user extractor.
//!
//! Handlers that take [`CurrentUser`] never run for anonymous requests: the
//! cookie session and an `Authorization: Bearer <token>` header are offered
//! to the auth gate as identity claims, and a miss answers `401` before the
//! handler body executes.

use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures_util::future::LocalBoxFuture;
use tracing::debug;

use crate::domain::{Error, IdentityClaim, User};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

const BEARER_PREFIX: &str = "Bearer ";

/// The user resolved for the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn into_inner(self) -> User {
        self.0
    }
}

impl std::ops::Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Parse the bearer token claim, if any. Malformed headers are ignored so
/// the cookie session can still authenticate the request.
pub(crate) fn bearer_claim(req: &HttpRequest) -> Option<IdentityClaim> {
    let header = req.headers().get(AUTHORIZATION)?;
    let Ok(value) = header.to_str() else {
        debug!("authorization header is not valid ASCII");
        return None;
    };
    let raw = value.strip_prefix(BEARER_PREFIX)?;
    IdentityClaim::token(raw.trim())
}

impl FromRequest for CurrentUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<HttpState>>().cloned();
        let bearer = bearer_claim(req);
        let session = SessionContext::from_request(req, payload);
        Box::pin(async move {
            let state = state.ok_or_else(|| Error::internal("HTTP state is not registered"))?;
            let session = session.await?;

            let mut claims = Vec::with_capacity(2);
            if let Some(id) = session.user_id()? {
                claims.push(IdentityClaim::Session(id));
            }
            claims.extend(bearer);

            let user = state.auth.resolve(&claims).await?;
            Ok(Self(user))
        })
    }
}
