use actix_web::HttpResponse;
use askama::Template;

use crate::error::PageError;
use crate::flash::Flash;
use crate::models::{Comment, DashboardStats, Post};

/// Category entry for feed navigation, with its percent-encoded URL.
pub struct CategoryLink {
    pub name: String,
    pub href: String,
}

pub fn category_links(categories: &[String]) -> Vec<CategoryLink> {
    categories
        .iter()
        .map(|c| CategoryLink {
            name: c.clone(),
            href: format!("/blog/category/{}", urlencoding::encode(c)),
        })
        .collect()
}

pub fn render<T: Template>(template: &T) -> Result<HttpResponse, PageError> {
    let body = template.render().map_err(|e| {
        log::error!("template render failed: {e}");
        PageError::Internal
    })?;
    Ok(HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body))
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub posts: Vec<Post>,
    pub categories: Vec<CategoryLink>,
    pub flashes: Vec<Flash>,
}

#[derive(Template)]
#[template(path = "category.html")]
pub struct CategoryTemplate {
    pub category: String,
    pub posts: Vec<Post>,
    pub categories: Vec<CategoryLink>,
    pub flashes: Vec<Flash>,
}

/// Submitted comment fields, echoed back when validation fails.
#[derive(Default)]
pub struct CommentFormValues {
    pub author: String,
    pub content: String,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub post: Post,
    pub author_name: String,
    pub comments: Vec<Comment>,
    pub related: Vec<Post>,
    pub errors: Vec<String>,
    pub form: CommentFormValues,
    pub flashes: Vec<Flash>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub errors: Vec<String>,
    pub username: String,
    pub flashes: Vec<Flash>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub username: String,
    pub stats: DashboardStats,
    pub posts: Vec<Post>,
    pub flashes: Vec<Flash>,
}

/// Shared by the new-post and edit-post forms.
#[derive(Default)]
pub struct PostFormValues {
    pub title: String,
    pub content: String,
    pub category: String,
    pub tags: String,
}

#[derive(Template)]
#[template(path = "edit_post.html")]
pub struct EditPostTemplate {
    pub heading: String,
    pub action: String,
    pub form: PostFormValues,
    pub errors: Vec<String>,
    pub flashes: Vec<Flash>,
}
