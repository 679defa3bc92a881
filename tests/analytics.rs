#![cfg(feature = "inmem-store")]

use actix_session::{config::PersistentSession, storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{time::Duration as CookieDuration, Key};
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;

use quill::analytics::{PageViewTracker, USER_AGENT_MAX};
use quill::auth::ensure_admin_user;
use quill::repo::inmem::InMemRepo;
use quill::routes::{config, AppState};

const SESSION_COOKIE: &str = "quill_session";

// Returns the TempDir guard so the data dir outlives the test.
fn setup_env() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("QUILL_DATA_DIR", dir.path());
    dir
}

fn session_key() -> Key {
    Key::derive_from(&[7u8; 64])
}

macro_rules! build_app {
    ($repo:expr) => {
        test::init_service(
            App::new()
                .wrap(PageViewTracker)
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), session_key())
                        .cookie_name(SESSION_COOKIE.to_string())
                        .session_lifecycle(
                            PersistentSession::default().session_ttl(CookieDuration::days(31)),
                        )
                        .build(),
                )
                .app_data(web::Data::new(AppState { repo: Arc::new($repo.clone()) }))
                .configure(config),
        )
        .await
    };
}

#[actix_web::test]
#[serial]
async fn repeat_visits_share_one_visitor_token() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    let app = build_app!(repo);

    let req = test::TestRequest::get().uri("/blog/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == SESSION_COOKIE)
        .expect("visitor session cookie minted on first tracked request")
        .into_owned();

    let req = test::TestRequest::get().uri("/blog/").cookie(cookie).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let views = repo.page_views();
    assert_eq!(views.len(), 2);
    assert!(views.iter().all(|v| v.path == "/blog/"));
    let sessions: HashSet<_> = views.iter().map(|v| v.session_id.as_str()).collect();
    assert_eq!(sessions.len(), 1);
}

#[actix_web::test]
#[serial]
async fn separate_visitors_get_separate_tokens() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    let app = build_app!(repo);

    for _ in 0..2 {
        let req = test::TestRequest::get().uri("/").to_request();
        test::call_service(&app, req).await;
    }

    let views = repo.page_views();
    assert_eq!(views.len(), 2);
    let sessions: HashSet<_> = views.iter().map(|v| v.session_id.clone()).collect();
    assert_eq!(sessions.len(), 2);
}

#[actix_web::test]
#[serial]
async fn login_admin_and_static_requests_are_not_counted() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    ensure_admin_user(&repo).await.unwrap();
    let app = build_app!(repo);

    let req = test::TestRequest::get().uri("/login").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // anonymous admin request still goes through the tracker untracked
    let req = test::TestRequest::get().uri("/admin").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let req = test::TestRequest::get().uri("/static/style.css").to_request();
    test::call_service(&app, req).await;

    assert!(repo.page_views().is_empty());
}

#[actix_web::test]
#[serial]
async fn oversized_user_agent_is_truncated() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    let app = build_app!(repo);

    let huge_ua = "a".repeat(USER_AGENT_MAX + 100);
    let req = test::TestRequest::get()
        .uri("/")
        .insert_header((header::USER_AGENT, huge_ua))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let views = repo.page_views();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].user_agent.chars().count(), USER_AGENT_MAX);
}
