use actix_session::{config::PersistentSession, storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{time::Duration as CookieDuration, Key};
use actix_web::{web, App, HttpServer};

use quill::analytics::PageViewTracker;
use quill::auth::ensure_admin_user;
#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
use quill::repo::inmem::InMemRepo;
use quill::repo::Repo;
use quill::routes::{config, AppState};
use quill::security::SecurityHeaders;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

const SESSION_COOKIE: &str = "quill_session";
/// Visitor sessions (and admin logins) survive roughly a month.
const SESSION_TTL_DAYS: i64 = 31;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker, etc.)
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping quill server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .expect("Failed to create Pg pool");
        sqlx::migrate!().run(&pool).await.expect("Failed to run migrations");
        info!("Using Postgres repository backend");
        quill::repo::pg::PgRepo::new(pool)
    };

    ensure_admin_user(&repo).await?;

    let repo: Arc<dyn Repo> = Arc::new(repo);
    let secret = std::env::var("SECRET_KEY").expect("SECRET_KEY must be set");
    let session_key = Key::derive_from(secret.as_bytes());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(PageViewTracker)
            // Registered last so it wraps the tracker: the tracker needs the
            // session attached to the request before it runs.
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                    .cookie_name(SESSION_COOKIE.to_string())
                    .session_lifecycle(
                        PersistentSession::default()
                            .session_ttl(CookieDuration::days(SESSION_TTL_DAYS)),
                    )
                    .build(),
            )
            .configure(config)
            .app_data(web::Data::new(AppState { repo: repo.clone() }))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await?;
    Ok(())
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let mut missing = Vec::new();
    for var in ["SECRET_KEY"] {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {:?}", missing);
        std::process::exit(1);
    }

    // Key::derive_from needs at least 32 bytes of signing material.
    if let Ok(secret) = env::var("SECRET_KEY") {
        if secret.len() < 32 {
            eprintln!("SECRET_KEY must be at least 32 characters long");
            std::process::exit(1);
        }
    }

    #[cfg(feature = "postgres-store")]
    if env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL must be set when the postgres-store feature is enabled");
        std::process::exit(1);
    }
}
