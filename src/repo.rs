use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<User>;
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    /// Idempotent: sets the admin flag on the named user if present.
    async fn grant_admin(&self, username: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn list_posts(&self) -> RepoResult<Vec<Post>>;
    async fn list_posts_by_category(&self, category: &str) -> RepoResult<Vec<Post>>;
    /// Distinct non-empty categories currently in use, sorted.
    async fn list_categories(&self) -> RepoResult<Vec<String>>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post>;
    async fn slug_exists(&self, slug: &str) -> RepoResult<bool>;
    /// Up to `limit` other posts in the same category, newest first. Empty
    /// when the post is uncategorized.
    async fn related_posts(&self, post: &Post, limit: usize) -> RepoResult<Vec<Post>>;
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    /// Removes the post and every comment attached to it, atomically.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
}

#[async_trait]
pub trait PageViewRepo: Send + Sync {
    async fn record_page_view(&self, new: NewPageView) -> RepoResult<PageView>;
    async fn dashboard_stats(&self, now: DateTime<Utc>) -> RepoResult<DashboardStats>;
}

pub trait Repo: UserRepo + PostRepo + CommentRepo + PageViewRepo {}

impl<T> Repo for T where T: UserRepo + PostRepo + CommentRepo + PageViewRepo {}

/// Half-open UTC window covering one calendar day.
pub(crate) fn day_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_hms_opt(0, 0, 0).unwrap().and_utc();
    (start, start + Duration::days(1))
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::{BTreeSet, HashMap, HashSet};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        page_views: HashMap<Id, PageView>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("QUILL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("QUILL_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        /// Raw page-view rows, for inspection in tests.
        pub fn page_views(&self) -> Vec<PageView> {
            self.state.read().unwrap().page_views.values().cloned().collect()
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    // Newest first, id as tie-breaker for same-instant inserts.
    fn sort_newest_first(posts: &mut [Post]) {
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users
                .values()
                .find(|u| u.username == username)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                username: new.username,
                password_hash: new.password_hash,
                is_admin: new.is_admin,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn grant_admin(&self, username: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s
                .users
                .values_mut()
                .find(|u| u.username == username)
                .ok_or(RepoError::NotFound)?;
            user.is_admin = true;
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.posts.values().cloned().collect();
            sort_newest_first(&mut v);
            Ok(v)
        }

        async fn list_posts_by_category(&self, category: &str) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .posts
                .values()
                .filter(|p| p.category.as_deref() == Some(category))
                .cloned()
                .collect();
            sort_newest_first(&mut v);
            Ok(v)
        }

        async fn list_categories(&self) -> RepoResult<Vec<String>> {
            let s = self.state.read().unwrap();
            let set: BTreeSet<String> = s
                .posts
                .values()
                .filter_map(|p| p.category.clone())
                .filter(|c| !c.is_empty())
                .collect();
            Ok(set.into_iter().collect())
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts
                .values()
                .find(|p| p.slug == slug)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn slug_exists(&self, slug: &str) -> RepoResult<bool> {
            let s = self.state.read().unwrap();
            Ok(s.posts.values().any(|p| p.slug == slug))
        }

        async fn related_posts(&self, post: &Post, limit: usize) -> RepoResult<Vec<Post>> {
            let Some(category) = post.category.as_deref() else {
                return Ok(Vec::new());
            };
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .posts
                .values()
                .filter(|p| p.id != post.id && p.category.as_deref() == Some(category))
                .cloned()
                .collect();
            sort_newest_first(&mut v);
            v.truncate(limit);
            Ok(v)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if s.posts.values().any(|p| p.slug == new.slug) {
                return Err(RepoError::Conflict);
            }
            if !s.users.contains_key(&new.author_id) {
                return Err(RepoError::NotFound);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let post = Post {
                id,
                title: new.title,
                content: new.content,
                slug: new.slug,
                category: new.category,
                tags: new.tags,
                author_id: new.author_id,
                created_at: now,
                updated_at: now,
            };
            s.posts.insert(id, post.clone());
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.title = upd.title;
            post.content = upd.content;
            post.category = upd.category;
            post.tags = upd.tags;
            post.updated_at = Utc::now();
            let updated = post.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            // Single write lock covers both removals, so the cascade is atomic.
            let mut s = self.state.write().unwrap();
            s.posts.remove(&id).ok_or(RepoError::NotFound)?;
            s.comments.retain(|_, c| c.post_id != id);
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(v)
        }

        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&new.post_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                post_id: new.post_id,
                author: new.author,
                content: new.content,
                created_at: Utc::now(),
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }
    }

    #[async_trait]
    impl PageViewRepo for InMemRepo {
        async fn record_page_view(&self, new: NewPageView) -> RepoResult<PageView> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let view = PageView {
                id,
                ip: new.ip,
                user_agent: new.user_agent,
                path: new.path,
                session_id: new.session_id,
                created_at: new.created_at,
            };
            s.page_views.insert(id, view.clone());
            drop(s);
            self.persist();
            Ok(view)
        }

        async fn dashboard_stats(&self, now: DateTime<Utc>) -> RepoResult<DashboardStats> {
            let s = self.state.read().unwrap();
            let today = now.date_naive();
            let month_start = today.with_day(1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();

            let categories: HashSet<&str> = s
                .posts
                .values()
                .filter_map(|p| p.category.as_deref())
                .filter(|c| !c.is_empty())
                .collect();
            let all_sessions: HashSet<&str> =
                s.page_views.values().map(|v| v.session_id.as_str()).collect();

            let mut last_7_days = Vec::with_capacity(7);
            for offset in (0..7).rev() {
                let day = today - Duration::days(offset);
                let (start, end) = day_window(day);
                let mut pv = 0i64;
                let mut sessions = HashSet::new();
                for view in s.page_views.values() {
                    if view.created_at >= start && view.created_at < end {
                        pv += 1;
                        sessions.insert(view.session_id.as_str());
                    }
                }
                last_7_days.push(DayStat { date: day, pv, uv: sessions.len() as i64 });
            }

            Ok(DashboardStats {
                total_posts: s.posts.len() as i64,
                posts_this_month: s.posts.values().filter(|p| p.created_at >= month_start).count()
                    as i64,
                total_comments: s.comments.len() as i64,
                total_categories: categories.len() as i64,
                total_pv: s.page_views.len() as i64,
                total_uv: all_sessions.len() as i64,
                last_7_days,
            })
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    fn map_fetch(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            other => internal(other),
        }
    }

    const POST_COLS: &str =
        "id, title, content, slug, category, tags, author_id, created_at, updated_at";

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, password_hash, is_admin, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_fetch)
        }

        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, password_hash, is_admin, created_at FROM users WHERE username = $1",
            )
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(map_fetch)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (username, password_hash, is_admin) VALUES ($1, $2, $3) \
                 RETURNING id, username, password_hash, is_admin, created_at",
            )
            .bind(&new.username)
            .bind(&new.password_hash)
            .bind(new.is_admin)
            .fetch_one(&self.pool)
            .await
            .map_err(|_| RepoError::Conflict)
        }

        async fn grant_admin(&self, username: &str) -> RepoResult<()> {
            let res = sqlx::query("UPDATE users SET is_admin = TRUE WHERE username = $1")
                .bind(username)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLS} FROM posts ORDER BY created_at DESC, id DESC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn list_posts_by_category(&self, category: &str) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLS} FROM posts WHERE category = $1 ORDER BY created_at DESC, id DESC"
            ))
            .bind(category)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn list_categories(&self) -> RepoResult<Vec<String>> {
            sqlx::query_scalar::<_, String>(
                "SELECT DISTINCT category FROM posts \
                 WHERE category IS NOT NULL AND category <> '' ORDER BY category",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_fetch)
        }

        async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLS} FROM posts WHERE slug = $1"))
                .bind(slug)
                .fetch_one(&self.pool)
                .await
                .map_err(map_fetch)
        }

        async fn slug_exists(&self, slug: &str) -> RepoResult<bool> {
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)
        }

        async fn related_posts(&self, post: &Post, limit: usize) -> RepoResult<Vec<Post>> {
            let Some(category) = post.category.as_deref() else {
                return Ok(Vec::new());
            };
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLS} FROM posts WHERE category = $1 AND id <> $2 \
                 ORDER BY created_at DESC, id DESC LIMIT $3"
            ))
            .bind(category)
            .bind(post.id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (title, content, slug, category, tags, author_id) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING {POST_COLS}"
            ))
            .bind(&new.title)
            .bind(&new.content)
            .bind(&new.slug)
            .bind(new.category.as_deref())
            .bind(new.tags.as_deref())
            .bind(new.author_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|_| RepoError::Conflict)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "UPDATE posts SET title = $2, content = $3, category = $4, tags = $5, \
                 updated_at = now() WHERE id = $1 RETURNING {POST_COLS}"
            ))
            .bind(id)
            .bind(&upd.title)
            .bind(&upd.content)
            .bind(upd.category.as_deref())
            .bind(upd.tags.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(map_fetch)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            sqlx::query("DELETE FROM comments WHERE post_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
            let res = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            tx.commit().await.map_err(internal)?;
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(
                "SELECT id, post_id, author, content, created_at FROM comments \
                 WHERE post_id = $1 ORDER BY created_at ASC, id ASC",
            )
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(
                "INSERT INTO comments (post_id, author, content) VALUES ($1, $2, $3) \
                 RETURNING id, post_id, author, content, created_at",
            )
            .bind(new.post_id)
            .bind(&new.author)
            .bind(&new.content)
            .fetch_one(&self.pool)
            .await
            .map_err(|_| RepoError::NotFound)
        }
    }

    #[derive(sqlx::FromRow)]
    struct DayRow {
        day: NaiveDate,
        pv: i64,
        uv: i64,
    }

    #[async_trait]
    impl PageViewRepo for PgRepo {
        async fn record_page_view(&self, new: NewPageView) -> RepoResult<PageView> {
            sqlx::query_as::<_, PageView>(
                "INSERT INTO page_views (ip, user_agent, path, session_id, created_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, ip, user_agent, path, session_id, created_at",
            )
            .bind(&new.ip)
            .bind(&new.user_agent)
            .bind(&new.path)
            .bind(&new.session_id)
            .bind(new.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn dashboard_stats(&self, now: DateTime<Utc>) -> RepoResult<DashboardStats> {
            let today = now.date_naive();
            let month_start =
                today.with_day(1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();

            let total_posts =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(internal)?;
            let posts_this_month =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE created_at >= $1")
                    .bind(month_start)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(internal)?;
            let total_comments =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(internal)?;
            let total_categories = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(DISTINCT category) FROM posts \
                 WHERE category IS NOT NULL AND category <> ''",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            let total_pv =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM page_views")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(internal)?;
            let total_uv =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT session_id) FROM page_views")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(internal)?;

            let (window_start, _) = day_window(today - Duration::days(6));
            let rows = sqlx::query_as::<_, DayRow>(
                "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, \
                        COUNT(*) AS pv, COUNT(DISTINCT session_id) AS uv \
                 FROM page_views WHERE created_at >= $1 GROUP BY 1",
            )
            .bind(window_start)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;

            let mut last_7_days = Vec::with_capacity(7);
            for offset in (0..7).rev() {
                let day = today - Duration::days(offset);
                let row = rows.iter().find(|r| r.day == day);
                last_7_days.push(DayStat {
                    date: day,
                    pv: row.map(|r| r.pv).unwrap_or(0),
                    uv: row.map(|r| r.uv).unwrap_or(0),
                });
            }

            Ok(DashboardStats {
                total_posts,
                posts_this_month,
                total_comments,
                total_categories,
                total_pv,
                total_uv,
                last_7_days,
            })
        }
    }
}
