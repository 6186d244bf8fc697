use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::{posts, users};
use crate::post::PostForTemplate;
use actix_web::{error, get, Error, Responder};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::{entity::*, query::*};

#[derive(Template)]
#[template(path = "explore.html")]
pub struct ExploreTemplate {
    pub client: ClientCtx,
    pub posts: Vec<PostForTemplate>,
}

/// Grid of every post that carries media, newest first.
#[get("/explore")]
pub async fn view_explore(client: ClientCtx) -> Result<impl Responder, Error> {
    let posts: Vec<PostForTemplate> = posts::Entity::find()
        .left_join(users::Entity)
        .column_as(users::Column::Name, "author_name")
        .column_as(users::Column::Email, "author_email")
        .column_as(users::Column::Image, "author_image")
        .filter(posts::Column::MediaUrl.is_not_null())
        .order_by_desc(posts::Column::CreatedAt)
        .into_model::<PostForTemplate>()
        .all(get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(ExploreTemplate { client, posts }.to_response())
}
