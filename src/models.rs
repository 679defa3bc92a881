use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct User {
    pub id: Id,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub author_id: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub slug: String,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub author_id: Id,
}

/// Fields an owner may change on an existing post. The slug is deliberately
/// absent: it is never recomputed after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePost {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: Id,
    pub author: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct PageView {
    pub id: Id,
    pub ip: String,
    pub user_agent: String,
    pub path: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPageView {
    pub ip: String,
    pub user_agent: String,
    pub path: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

impl NewPageView {
    pub fn new(ip: String, user_agent: String, path: String, session_id: String) -> Self {
        Self { ip, user_agent, path, session_id, created_at: Utc::now() }
    }
}

/// One calendar day of traffic: total tracked requests (pv) and distinct
/// visitor sessions (uv).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayStat {
    pub date: NaiveDate,
    pub pv: i64,
    pub uv: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_posts: i64,
    pub posts_this_month: i64,
    pub total_comments: i64,
    pub total_categories: i64,
    pub total_pv: i64,
    pub total_uv: i64,
    /// Trailing 7 calendar days, oldest first, today included, zero-filled.
    pub last_7_days: Vec<DayStat>,
}
