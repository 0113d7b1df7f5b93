//! WebSocket inbound adapter for real-time events.
//!
//! Responsibilities:
//! - validate upgrade requests (origin allow-list, identity)
//! - register the connection with the event dispatcher
//! - pump frames between the socket and the dispatcher

use actix_session::SessionExt;
use actix_web::web::{self, Payload};
use actix_web::{
    HttpRequest, HttpResponse, get,
    http::header::{HeaderValue, ORIGIN},
};
use serde::Deserialize;
use tracing::{error, warn};
use url::Url;

use crate::domain::{Error, IdentityClaim, User};
use crate::inbound::http::auth::bearer_claim;
use crate::inbound::http::session::SessionContext;

pub mod origin;
mod session;
pub mod state;

pub use origin::{OriginPolicy, OriginRuleError};
pub use state::{Heartbeat, WsState};

#[derive(Debug, Default, Deserialize)]
struct ConnectQuery {
    token: Option<String>,
}

/// Handle WebSocket upgrade for the `/ws` endpoint.
///
/// The caller is identified by a `token` query parameter, the cookie
/// session, or a bearer header. Anonymous upgrades are refused with `401`.
#[get("/ws")]
pub async fn ws_entry(
    state: web::Data<WsState>,
    req: HttpRequest,
    stream: Payload,
) -> actix_web::Result<HttpResponse> {
    let mut origin_iter = req.headers().get_all(ORIGIN);
    let origin_header = origin_iter.next().ok_or_else(|| {
        error!("Missing Origin header on WebSocket upgrade");
        actix_web::error::ErrorForbidden("Origin not allowed")
    })?;
    if origin_iter.next().is_some() {
        error!("Multiple Origin headers on WebSocket upgrade");
        return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
    }
    validate_origin(&state.origins, origin_header)?;

    let user = authenticate(&state, &req).await?;

    let handle = state.dispatcher.connect(&user).await?;
    let (response, ws_session, messages) = match actix_ws::handle(&req, stream) {
        Ok(upgrade) => upgrade,
        Err(error) => {
            error!(error = %error, "WebSocket upgrade failed");
            state.dispatcher.disconnect(handle.id, &user.id).await;
            return Err(actix_web::error::ErrorInternalServerError(
                "WebSocket upgrade failed",
            ));
        }
    };
    actix_web::rt::spawn(session::handle_ws_session(
        state.dispatcher.clone(),
        user.id,
        handle,
        state.heartbeat,
        ws_session,
        messages,
    ));
    Ok(response)
}

async fn authenticate(state: &WsState, req: &HttpRequest) -> Result<User, Error> {
    let query = web::Query::<ConnectQuery>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .unwrap_or_default();

    let mut claims = Vec::with_capacity(3);
    claims.extend(query.token.as_deref().and_then(IdentityClaim::token));
    if let Some(id) = SessionContext::new(req.get_session()).user_id()? {
        claims.push(IdentityClaim::Session(id));
    }
    claims.extend(bearer_claim(req));
    state.auth.resolve(&claims).await
}

fn validate_origin(policy: &OriginPolicy, origin_header: &HeaderValue) -> actix_web::Result<()> {
    let origin_value = match origin_header.to_str() {
        Ok(value) => value,
        Err(error) => {
            error!(error = %error, "Failed to parse Origin header as string");
            return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
        }
    };

    let origin = Url::parse(origin_value).map_err(|error| {
        error!(error = %error, "Failed to parse Origin header as URL");
        actix_web::error::ErrorBadRequest("Invalid Origin header")
    })?;

    if policy.allows(&origin) {
        Ok(())
    } else {
        warn!(
            origin = origin_value,
            "Rejected WS upgrade due to disallowed Origin"
        );
        Err(actix_web::error::ErrorForbidden("Origin not allowed"))
    }
}
