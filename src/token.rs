use std::{future::Future, pin::Pin};

use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, AuthFault, StoreError};
use crate::routes::AppState;
use crate::store::TokenStore;

const TOKEN_BYTES: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AccessToken {
    #[serde(skip)]
    pub id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

impl TokenQuery {
    pub fn from_request(req: &HttpRequest) -> Self {
        web::Query::<TokenQuery>::from_query(req.query_string())
            .map(web::Query::into_inner)
            .unwrap_or_default()
    }
}

/// Hex-encoded random token value.
pub fn generate() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub async fn mint(store: &dyn TokenStore) -> Result<AccessToken, StoreError> {
    store.insert_token(&generate()).await
}

/// Stores `value` unless it is already known.
pub async fn ensure(store: &dyn TokenStore, value: &str) -> Result<bool, StoreError> {
    if store.token_exists(value).await? {
        return Ok(false);
    }
    store.insert_token(value).await?;
    Ok(true)
}

/// The gate: the presented token must exactly match a stored one.
pub async fn check(store: &dyn TokenStore, token: Option<&str>) -> Result<(), ApiError> {
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => return Err(AuthFault::Missing.into()),
    };

    if !store.token_exists(token).await? {
        return Err(AuthFault::Invalid.into());
    }

    Ok(())
}

/// Extractor proving the request passed the gate.
#[derive(Debug)]
pub struct Authorized;

impl FromRequest for Authorized {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = web::Data::<AppState>::extract(req);
        let query = TokenQuery::from_request(req);

        Box::pin(async move {
            let state = state.await?;
            check(state.tokens.as_ref(), query.token.as_deref()).await?;
            Ok(Authorized)
        })
    }
}
