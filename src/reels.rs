use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::post::{get_posts_for_feed, FeedPost};
use actix_web::{error, get, Error, Responder};
use askama_actix::{Template, TemplateToResponse};

#[derive(Template)]
#[template(path = "reels.html")]
pub struct ReelsTemplate {
    pub client: ClientCtx,
    pub posts: Vec<FeedPost>,
}

/// Vertical feed of video posts, newest first.
#[get("/reels")]
pub async fn view_reels(client: ClientCtx) -> Result<impl Responder, Error> {
    let posts = get_posts_for_feed(get_db_pool(), None, true, client.get_id())
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(ReelsTemplate { client, posts }.to_response())
}
