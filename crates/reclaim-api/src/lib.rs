pub mod matching;
pub mod notifications;
pub mod posts;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use reclaim_db::Database;
use reclaim_gateway::dispatcher::Dispatcher;
use reclaim_match::matcher::Matcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub matcher: Arc<Matcher>,
}

/// The HTTP surface minus the websocket upgrade (which the server wires
/// directly to the gateway).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/posts", post(posts::create_post))
        .route("/posts", get(posts::list_posts))
        .route("/posts/{post_id}", get(posts::get_post))
        .route("/users/{user_id}/notifications", get(notifications::unread))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/matching/run", post(matching::run))
        .with_state(state)
}
