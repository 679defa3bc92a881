//! Per-request page-view tracking.
//!
//! Every request outside the static, admin and login surfaces produces one
//! `PageView` row. Visitors are correlated through a random token held in the
//! cookie session, minted on their first tracked request; the session
//! middleware keeps that cookie alive for ~31 days.

use actix_session::SessionExt;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::{web, Error};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use uuid::Uuid;

use crate::error::PageError;
use crate::models::NewPageView;
use crate::routes::AppState;

/// Session key holding the anonymous visitor token.
pub const VISITOR_SESSION_KEY: &str = "sid";

/// User agents are stored truncated to this many characters.
pub const USER_AGENT_MAX: usize = 500;

const SKIP_PREFIXES: &[&str] = &["/static", "/admin"];
const LOGIN_PATH: &str = "/login";

pub fn is_tracked(path: &str) -> bool {
    if path == LOGIN_PATH {
        return false;
    }
    !SKIP_PREFIXES.iter().any(|p| path.starts_with(p))
}

#[derive(Clone, Default)]
pub struct PageViewTracker;

impl<S, B> Transform<S, ServiceRequest> for PageViewTracker
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = PageViewTrackerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(PageViewTrackerMiddleware { service: Rc::new(service) }))
    }
}

pub struct PageViewTrackerMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for PageViewTrackerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        Box::pin(async move {
            if is_tracked(req.path()) {
                // Must run under the session middleware so a freshly minted
                // token makes it into the response cookie.
                let session = req.get_session();
                let session_id = match session.get::<String>(VISITOR_SESSION_KEY) {
                    Ok(Some(sid)) => sid,
                    _ => {
                        let sid = Uuid::new_v4().to_string();
                        if let Err(e) = session.insert(VISITOR_SESSION_KEY, &sid) {
                            log::warn!("failed to store visitor session id: {e}");
                        }
                        sid
                    }
                };

                let ip = req
                    .connection_info()
                    .realip_remote_addr()
                    .unwrap_or("unknown")
                    .to_string();
                let user_agent: String = req
                    .headers()
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .chars()
                    .take(USER_AGENT_MAX)
                    .collect();
                let path = req.path().to_string();

                if let Some(state) = req.app_data::<web::Data<AppState>>().cloned() {
                    let view = NewPageView::new(ip, user_agent, path, session_id);
                    if let Err(e) = state.repo.record_page_view(view).await {
                        log::error!("failed to record page view: {e}");
                        return Err(PageError::from(e).into());
                    }
                }
            }
            svc.call(req).await
        })
    }
}
