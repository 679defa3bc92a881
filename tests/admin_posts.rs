#![cfg(feature = "inmem-store")]

use actix_session::{config::PersistentSession, storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{time::Duration as CookieDuration, Key};
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use serial_test::serial;
use std::sync::Arc;

use quill::analytics::PageViewTracker;
use quill::auth::{ensure_admin_user, hash_password};
use quill::models::{NewComment, NewUser};
use quill::repo::inmem::InMemRepo;
use quill::repo::{CommentRepo, PostRepo, UserRepo};
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

macro_rules! login {
    ($app:expr, $user:expr, $pass:expr) => {{
        let req = test::TestRequest::post()
            .uri("/login")
            .set_form([("username", $user), ("password", $pass)])
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        resp.response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .expect("session cookie set on login")
            .into_owned()
    }};
}

#[actix_web::test]
#[serial]
async fn create_post_assigns_slug_and_disambiguates_duplicates() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    ensure_admin_user(&repo).await.unwrap();
    let app = build_app!(repo);
    let cookie = login!(app, "admin", "admin123");

    let req = test::TestRequest::post()
        .uri("/admin/post/new")
        .cookie(cookie.clone())
        .set_form([
            ("title", "Hello, World!"),
            ("content", "<p>first</p>"),
            ("category", "tech"),
            ("tags", "rust"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/admin");

    let post = repo.get_post_by_slug("hello-world").await.unwrap();
    assert_eq!(post.title, "Hello, World!");
    assert_eq!(post.category.as_deref(), Some("tech"));

    // a second post with the same title gets a timestamp suffix
    let req = test::TestRequest::post()
        .uri("/admin/post/new")
        .cookie(cookie.clone())
        .set_form([("title", "Hello, World!"), ("content", "<p>second</p>")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let posts = repo.list_posts().await.unwrap();
    assert_eq!(posts.len(), 2);
    let other = posts.iter().find(|p| p.slug != "hello-world").unwrap();
    assert!(other.slug.starts_with("hello-world-"));
    let suffix = &other.slug["hello-world-".len()..];
    assert_eq!(suffix.len(), 14);
    assert!(suffix.chars().all(|c| c.is_ascii_digit()));

    // blank category and tags are stored as absent
    assert!(other.category.is_none());
    assert!(other.tags.is_none());
}

#[actix_web::test]
#[serial]
async fn non_ascii_title_gets_a_transliterated_slug() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    ensure_admin_user(&repo).await.unwrap();
    let app = build_app!(repo);
    let cookie = login!(app, "admin", "admin123");

    let req = test::TestRequest::post()
        .uri("/admin/post/new")
        .cookie(cookie)
        .set_form([("title", "Caf\u{e9} \u{4f60}\u{597d}"), ("content", "<p>hi</p>")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let post = repo.get_post_by_slug("cafe-ni-hao").await.unwrap();
    assert_eq!(post.title, "Caf\u{e9} \u{4f60}\u{597d}");
}

#[actix_web::test]
#[serial]
async fn invalid_post_form_re_renders_without_saving() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    ensure_admin_user(&repo).await.unwrap();
    let long_title = "t".repeat(201);
    let app = build_app!(repo);
    let cookie = login!(app, "admin", "admin123");

    let cases = [("", "body"), ("Title", ""), (long_title.as_str(), "body")];
    for (title, content) in cases {
        let req = test::TestRequest::post()
            .uri("/admin/post/new")
            .cookie(cookie.clone())
            .set_form([("title", title), ("content", content)])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    assert!(repo.list_posts().await.unwrap().is_empty());
}

#[actix_web::test]
#[serial]
async fn edit_updates_fields_but_keeps_the_slug() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    ensure_admin_user(&repo).await.unwrap();
    let app = build_app!(repo);
    let cookie = login!(app, "admin", "admin123");

    let req = test::TestRequest::post()
        .uri("/admin/post/new")
        .cookie(cookie.clone())
        .set_form([("title", "Original Title"), ("content", "<p>v1</p>")])
        .to_request();
    test::call_service(&app, req).await;
    let post = repo.get_post_by_slug("original-title").await.unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/admin/post/{}/edit", post.id))
        .cookie(cookie.clone())
        .set_form([
            ("title", "A Completely New Title"),
            ("content", "<p>v2</p>"),
            ("category", "life"),
            ("tags", ""),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/admin");

    let edited = repo.get_post(post.id).await.unwrap();
    assert_eq!(edited.slug, "original-title");
    assert_eq!(edited.title, "A Completely New Title");
    assert_eq!(edited.category.as_deref(), Some("life"));
    assert!(edited.updated_at >= post.updated_at);
}

#[actix_web::test]
#[serial]
async fn only_the_creating_author_may_edit_or_delete() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    ensure_admin_user(&repo).await.unwrap();
    repo.create_user(NewUser {
        username: "second".into(),
        password_hash: hash_password("secondpass").unwrap(),
        is_admin: true,
    })
    .await
    .unwrap();
    let app = build_app!(repo);

    let owner = login!(app, "admin", "admin123");
    let req = test::TestRequest::post()
        .uri("/admin/post/new")
        .cookie(owner)
        .set_form([("title", "Owned"), ("content", "<p>mine</p>")])
        .to_request();
    test::call_service(&app, req).await;
    let post = repo.get_post_by_slug("owned").await.unwrap();

    let intruder = login!(app, "second", "secondpass");
    for uri in [
        format!("/admin/post/{}/edit", post.id),
        format!("/admin/post/{}/delete", post.id),
    ] {
        let req = test::TestRequest::post()
            .uri(&uri)
            .cookie(intruder.clone())
            .set_form([("title", "Hijacked"), ("content", "<p>nope</p>")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/admin");
    }

    let untouched = repo.get_post(post.id).await.unwrap();
    assert_eq!(untouched.title, "Owned");
}

#[actix_web::test]
#[serial]
async fn delete_removes_post_and_its_comments() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    ensure_admin_user(&repo).await.unwrap();
    let app = build_app!(repo);
    let cookie = login!(app, "admin", "admin123");

    let req = test::TestRequest::post()
        .uri("/admin/post/new")
        .cookie(cookie.clone())
        .set_form([("title", "Doomed"), ("content", "<p>bye</p>")])
        .to_request();
    test::call_service(&app, req).await;
    let post = repo.get_post_by_slug("doomed").await.unwrap();
    repo.create_comment(NewComment {
        post_id: post.id,
        author: "reader".into(),
        content: "so long".into(),
    })
    .await
    .unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/admin/post/{}/delete", post.id))
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/admin");

    assert!(repo.get_post(post.id).await.is_err());
    assert!(repo.list_comments(post.id).await.unwrap().is_empty());

    // deleted slug no longer resolves publicly
    let req = test::TestRequest::get().uri("/blog/post/doomed").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
