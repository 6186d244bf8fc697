use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::post::{get_posts_for_feed, FeedPost};
use crate::story::{get_active_stories, StoryRailEntry};
use actix_web::{error, get, Error, Responder};
use askama_actix::{Template, TemplateToResponse};

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub client: ClientCtx,
    pub stories: Vec<StoryRailEntry>,
    pub posts: Vec<FeedPost>,
}

/// Home: the active story rail above the reverse-chronological feed.
#[get("/")]
pub async fn view_index(client: ClientCtx) -> Result<impl Responder, Error> {
    let db = get_db_pool();

    let stories = get_active_stories(db)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let posts = get_posts_for_feed(db, None, false, client.get_id())
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(IndexTemplate {
        client,
        stories,
        posts,
    }
    .to_response())
}
