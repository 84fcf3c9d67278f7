use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use log::info;

use config::Config;
use provider::FreeCurrencyApi;
use refresher::Refresher;
use routes::AppState;
use store::PgStore;

mod config;
mod error;
mod exchange_rate;
mod freshness;
mod inversion;
mod provider;
mod refresher;
mod routes;
mod store;
mod stream;
mod token;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("loading configuration")?;

    let store = Arc::new(
        PgStore::connect(&config.database)
            .await
            .context("connecting to postgres")?,
    );
    store.migrate().await.context("running migrations")?;

    if let Some(seed) = &config.seed_token {
        if token::ensure(store.as_ref(), seed).await? {
            info!("seed token stored");
        }
    }

    let provider = &config.provider;
    let source = Arc::new(
        FreeCurrencyApi::new(
            &provider.url,
            &provider.api_key,
            &provider.base_currency,
            provider.timeout,
        )
        .context("building provider client")?,
    );

    let refresher = Arc::new(Refresher::new(store.clone(), source, config.refresh));
    let feed = refresher.feed();
    let refresh_task = refresher.spawn();

    let state = web::Data::new(AppState {
        rates: store.clone(),
        tokens: store,
        feed,
        token_create_requires_token: config.token_create_requires_token,
    });

    info!("listening on {}", config.bind_addr);
    let served = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(routes::configure)
    })
    .bind(config.bind_addr.as_str())
    .with_context(|| format!("binding {}", config.bind_addr))?
    .run()
    .await;

    refresh_task.abort();
    info!("server stopped");

    served.context("http server failed")
}
