use actix_web::{middleware, web, App, HttpServer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::env;
use std::str::FromStr;
use tokio::sync::broadcast;

use reenove::state::{AppState, MailerConfig};
use reenove::{db, routes};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./data/reenove.db".to_string());
    db::ensure_sqlite_dir(&db_url)?;

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    db::run_migrations(&pool).await?;
    db::seed_defaults(&pool).await?;

    let (events, _) = broadcast::channel(32);
    let state = AppState {
        db: pool.clone(),
        events,
        mailer: MailerConfig::from_env(),
    };

    if !state.mailer.enabled() {
        log::warn!("MAILER_API_KEY not set. Transactional emails are disabled.");
    }

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080);

    let address = format!("0.0.0.0:{port}");
    log::info!("Starting Reenove on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(routes::public::configure)
            .configure(routes::wizard::configure)
            .configure(routes::admin::configure)
            .configure(routes::artisan::configure)
            .configure(routes::agent::configure)
            .configure(routes::events::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
