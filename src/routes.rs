use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, http::StatusCode, http::header, web};
use log::{info, warn};
use serde_json::json;

use crate::error::ApiError;
use crate::exchange_rate::RatesView;
use crate::refresher::{Feed, Update};
use crate::store::{RateStore, TokenStore};
use crate::stream;
use crate::token::{self, Authorized, TokenQuery};

const GREETING: &str = "Hello from Currency API! This is only for my personal use.";

/// Everything handlers need, built once in `main`.
pub struct AppState {
    pub rates: Arc<dyn RateStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub feed: Feed,
    pub token_create_requires_token: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/currency", web::get().to(currency))
        .route("/token/create", web::get().to(create_token))
        .route("/token/list", web::get().to(list_tokens))
        .route("/ws", web::get().to(ws));
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").body(GREETING)
}

async fn currency(
    _auth: Authorized,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let snapshot = state.rates.current().await?.ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(RatesView::from(&snapshot)))
}

async fn create_token(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    if state.token_create_requires_token {
        let query = TokenQuery::from_request(&req);
        token::check(state.tokens.as_ref(), query.token.as_deref()).await?;
    }

    let issued = token::mint(state.tokens.as_ref()).await?;
    info!("issued new access token");
    Ok(HttpResponse::Ok().content_type("text/plain").body(issued.token))
}

async fn list_tokens(
    _auth: Authorized,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let tokens = state.tokens.list_tokens().await?;
    Ok(HttpResponse::Ok().json(tokens))
}

async fn ws(
    req: HttpRequest,
    body: web::Payload,
    _auth: Authorized,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    if !is_websocket_upgrade(&req) {
        return Ok(HttpResponse::build(StatusCode::UPGRADE_REQUIRED).finish());
    }

    // Subscribe before reading so no refresh slips between the two.
    let Some(updates) = state.feed.subscribe() else {
        warn!("stream requested but rate updates have stopped");
        return Ok(HttpResponse::ServiceUnavailable()
            .json(json!({ "error": "Rate updates unavailable" })));
    };

    let (response, session, incoming) = actix_ws::handle(&req, body)?;
    let initial = match state.rates.current().await {
        Ok(snapshot) => snapshot.map(|s| Update::Snapshot(RatesView::from(&s))),
        Err(err) => {
            warn!("could not load snapshot for new stream: {}", err);
            None
        }
    };

    actix_web::rt::spawn(stream::relay(session, incoming, updates, initial));
    Ok(response)
}

fn is_websocket_upgrade(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}
