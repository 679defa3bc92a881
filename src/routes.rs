use std::sync::Arc;

use actix_session::Session;
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::{self, AdminUser, USER_ID_KEY};
use crate::error::PageError;
use crate::flash;
use crate::models::*;
use crate::repo::Repo;
use crate::slug::unique_slug;
use crate::templates::*;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/blog/").route(web::get().to(index)))
        .service(
            web::resource("/blog/post/{slug}")
                .route(web::get().to(post_detail))
                .route(web::post().to(add_comment)),
        )
        .service(web::resource("/blog/category/{category}").route(web::get().to(category_posts)))
        .service(
            web::resource("/login")
                .route(web::get().to(login_form))
                .route(web::post().to(login_submit)),
        )
        .service(web::resource("/admin/logout").route(web::get().to(logout)))
        .service(web::resource("/admin").route(web::get().to(dashboard)))
        .service(
            web::resource("/admin/post/new")
                .route(web::get().to(new_post_form))
                .route(web::post().to(new_post_submit)),
        )
        .service(
            web::resource("/admin/post/{id}/edit")
                .route(web::get().to(edit_post_form))
                .route(web::post().to(edit_post_submit)),
        )
        .service(web::resource("/admin/post/{id}/delete").route(web::post().to(delete_post)));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location.to_string()))
        .finish()
}

fn none_if_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

// ---------------- public feed -----------------------------------------------

pub async fn index(
    session: Session,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PageError> {
    let posts = data.repo.list_posts().await?;
    let categories = data.repo.list_categories().await?;
    render(&IndexTemplate {
        posts,
        categories: category_links(&categories),
        flashes: flash::take(&session),
    })
}

pub async fn category_posts(
    session: Session,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, PageError> {
    let category = path.into_inner();
    let posts = data.repo.list_posts_by_category(&category).await?;
    let categories = data.repo.list_categories().await?;
    render(&CategoryTemplate {
        category,
        posts,
        categories: category_links(&categories),
        flashes: flash::take(&session),
    })
}

/// Up to this many same-category suggestions on the post page.
const RELATED_POSTS_LIMIT: usize = 3;

async fn post_page(
    data: &AppState,
    session: &Session,
    post: Post,
    errors: Vec<String>,
    form: CommentFormValues,
) -> Result<HttpResponse, PageError> {
    let author = data.repo.get_user(post.author_id).await?;
    let comments = data.repo.list_comments(post.id).await?;
    let related = data.repo.related_posts(&post, RELATED_POSTS_LIMIT).await?;
    render(&PostDetailTemplate {
        post,
        author_name: author.username,
        comments,
        related,
        errors,
        form,
        flashes: flash::take(session),
    })
}

pub async fn post_detail(
    session: Session,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, PageError> {
    let post = data.repo.get_post_by_slug(&path.into_inner()).await?;
    post_page(&data, &session, post, Vec::new(), CommentFormValues::default()).await
}

// ---------------- comments --------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
}

fn validate_comment(form: &CommentForm) -> Vec<String> {
    let mut errors = Vec::new();
    if form.author.trim().is_empty() {
        errors.push("Your name is required".to_string());
    } else if form.author.chars().count() > 100 {
        errors.push("Name must be at most 100 characters".to_string());
    }
    if form.content.trim().is_empty() {
        errors.push("Comment is required".to_string());
    } else if form.content.chars().count() > 500 {
        errors.push("Comment must be at most 500 characters".to_string());
    }
    errors
}

pub async fn add_comment(
    session: Session,
    data: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse, PageError> {
    let slug = path.into_inner();
    let post = data.repo.get_post_by_slug(&slug).await?;
    let form = form.into_inner();

    let errors = validate_comment(&form);
    if !errors.is_empty() {
        let values = CommentFormValues { author: form.author, content: form.content };
        return post_page(&data, &session, post, errors, values).await;
    }

    data.repo
        .create_comment(NewComment {
            post_id: post.id,
            author: form.author.trim().to_string(),
            content: form.content.trim().to_string(),
        })
        .await?;
    flash::flash(&session, "success", "Comment added successfully!");
    Ok(see_other(&format!("/blog/post/{slug}")))
}

// ---------------- authentication --------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn validate_login(form: &LoginForm) -> Vec<String> {
    let mut errors = Vec::new();
    let name_len = form.username.chars().count();
    if !(4..=80).contains(&name_len) {
        errors.push("Username must be between 4 and 80 characters".to_string());
    }
    if form.password.chars().count() < 6 {
        errors.push("Password must be at least 6 characters".to_string());
    }
    errors
}

pub async fn login_form(session: Session) -> Result<HttpResponse, PageError> {
    if session.get::<Id>(USER_ID_KEY).unwrap_or(None).is_some() {
        return Ok(see_other("/admin"));
    }
    render(&LoginTemplate {
        errors: Vec::new(),
        username: String::new(),
        flashes: flash::take(&session),
    })
}

pub async fn login_submit(
    session: Session,
    data: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, PageError> {
    let form = form.into_inner();
    let errors = validate_login(&form);
    if !errors.is_empty() {
        return render(&LoginTemplate {
            errors,
            username: form.username,
            flashes: flash::take(&session),
        });
    }

    match auth::authenticate(data.repo.as_ref(), &form.username, &form.password).await? {
        Some(user) => {
            // Fresh session on privilege change.
            session.renew();
            session
                .insert(USER_ID_KEY, user.id)
                .map_err(|_| PageError::Internal)?;
            Ok(see_other("/admin"))
        }
        None => render(&LoginTemplate {
            errors: vec!["Invalid username or password".to_string()],
            username: form.username,
            flashes: flash::take(&session),
        }),
    }
}

pub async fn logout(session: Session) -> Result<HttpResponse, PageError> {
    session.purge();
    Ok(see_other("/login"))
}

// ---------------- admin -----------------------------------------------------

pub async fn dashboard(
    admin: AdminUser,
    session: Session,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PageError> {
    let stats = data.repo.dashboard_stats(Utc::now()).await?;
    let posts = data.repo.list_posts().await?;
    render(&DashboardTemplate {
        username: admin.0.username,
        stats,
        posts,
        flashes: flash::take(&session),
    })
}

#[derive(Debug, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: String,
}

impl PostForm {
    fn values(&self) -> PostFormValues {
        PostFormValues {
            title: self.title.clone(),
            content: self.content.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
        }
    }
}

fn validate_post(form: &PostForm) -> Vec<String> {
    let mut errors = Vec::new();
    if form.title.trim().is_empty() {
        errors.push("Title is required".to_string());
    } else if form.title.chars().count() > 200 {
        errors.push("Title must be at most 200 characters".to_string());
    }
    if form.content.trim().is_empty() {
        errors.push("Content is required".to_string());
    }
    if form.category.chars().count() > 100 {
        errors.push("Category must be at most 100 characters".to_string());
    }
    errors
}

pub async fn new_post_form(_admin: AdminUser, session: Session) -> Result<HttpResponse, PageError> {
    render(&EditPostTemplate {
        heading: "New Post".to_string(),
        action: "/admin/post/new".to_string(),
        form: PostFormValues::default(),
        errors: Vec::new(),
        flashes: flash::take(&session),
    })
}

pub async fn new_post_submit(
    admin: AdminUser,
    session: Session,
    data: web::Data<AppState>,
    form: web::Form<PostForm>,
) -> Result<HttpResponse, PageError> {
    let form = form.into_inner();
    let errors = validate_post(&form);
    if !errors.is_empty() {
        return render(&EditPostTemplate {
            heading: "New Post".to_string(),
            action: "/admin/post/new".to_string(),
            form: form.values(),
            errors,
            flashes: flash::take(&session),
        });
    }

    let slug = unique_slug(data.repo.as_ref(), &form.title, Utc::now()).await?;
    data.repo
        .create_post(NewPost {
            title: form.title.trim().to_string(),
            content: form.content,
            slug,
            category: none_if_empty(form.category),
            tags: none_if_empty(form.tags),
            author_id: admin.0.id,
        })
        .await?;
    flash::flash(&session, "success", "Post created successfully!");
    Ok(see_other("/admin"))
}

/// Only the creating author may touch a post, even among admins.
fn owns(admin: &AdminUser, post: &Post) -> bool {
    post.author_id == admin.0.id
}

pub async fn edit_post_form(
    admin: AdminUser,
    session: Session,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, PageError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    if !owns(&admin, &post) {
        flash::flash(&session, "danger", "You are not authorized to edit this post");
        return Ok(see_other("/admin"));
    }
    render(&EditPostTemplate {
        heading: "Edit Post".to_string(),
        action: format!("/admin/post/{}/edit", post.id),
        form: PostFormValues {
            title: post.title,
            content: post.content,
            category: post.category.unwrap_or_default(),
            tags: post.tags.unwrap_or_default(),
        },
        errors: Vec::new(),
        flashes: flash::take(&session),
    })
}

pub async fn edit_post_submit(
    admin: AdminUser,
    session: Session,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    form: web::Form<PostForm>,
) -> Result<HttpResponse, PageError> {
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    if !owns(&admin, &post) {
        flash::flash(&session, "danger", "You are not authorized to edit this post");
        return Ok(see_other("/admin"));
    }

    let form = form.into_inner();
    let errors = validate_post(&form);
    if !errors.is_empty() {
        return render(&EditPostTemplate {
            heading: "Edit Post".to_string(),
            action: format!("/admin/post/{id}/edit"),
            form: form.values(),
            errors,
            flashes: flash::take(&session),
        });
    }

    data.repo
        .update_post(
            id,
            UpdatePost {
                title: form.title.trim().to_string(),
                content: form.content,
                category: none_if_empty(form.category),
                tags: none_if_empty(form.tags),
            },
        )
        .await?;
    flash::flash(&session, "success", "Post updated successfully!");
    Ok(see_other("/admin"))
}

pub async fn delete_post(
    admin: AdminUser,
    session: Session,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, PageError> {
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    if !owns(&admin, &post) {
        flash::flash(&session, "danger", "You are not authorized to delete this post");
        return Ok(see_other("/admin"));
    }
    data.repo.delete_post(id).await?;
    flash::flash(&session, "success", "Post deleted successfully!");
    Ok(see_other("/admin"))
}
