use crate::comment::{get_comments_for_posts, CommentForTemplate};
use crate::db::get_db_pool;
use crate::filesystem;
use crate::middleware::ClientCtx;
use crate::orm::{comment_likes, comments, post_likes, posts, users};
use actix_multipart::Multipart;
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use askama_actix::{Template, TemplateToResponse};
use chrono::prelude::Utc;
use futures::TryStreamExt;
use sea_orm::{
    entity::*, query::*, sea_query::Expr, DatabaseConnection, DbErr, FromQueryResult,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// A fully joined struct representing the post model and its author.
#[derive(Debug, Clone, FromQueryResult)]
pub struct PostForTemplate {
    pub id: i32,
    pub author_id: i32,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
    // join users
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_image: Option<String>,
}

impl PostForTemplate {
    pub fn author_display_name(&self) -> String {
        crate::user::display_name(
            self.author_name.as_deref(),
            self.author_email.as_deref().unwrap_or_default(),
        )
    }

    pub fn author_handle(&self) -> String {
        crate::user::handle_from_email(self.author_email.as_deref().unwrap_or_default())
    }

    pub fn author_avatar(&self) -> String {
        crate::user::avatar_or_default(
            self.author_image.as_deref(),
            self.author_email.as_deref().unwrap_or_default(),
        )
    }

    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn has_media(&self) -> bool {
        self.media_url.is_some()
    }

    pub fn media_url_or_empty(&self) -> &str {
        self.media_url.as_deref().unwrap_or_default()
    }

    pub fn is_video(&self) -> bool {
        self.media_type.as_deref() == Some("video")
    }

    pub fn timestamp(&self) -> String {
        crate::frontend::relative_time(self.created_at, Utc::now().naive_utc())
    }
}

/// One feed entry: the post row plus everything the card renders.
#[derive(Clone)]
pub struct FeedPost {
    pub post: PostForTemplate,
    pub like_count: i64,
    pub comment_count: i64,
    pub liked_by_client: bool,
    pub editable: bool,
    pub comments: Vec<CommentForTemplate>,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub client: ClientCtx,
    pub post: FeedPost,
}

#[derive(Template)]
#[template(path = "post_update.html")]
pub struct PostUpdateTemplate<'a> {
    pub client: ClientCtx,
    pub post: &'a PostForTemplate,
}

#[derive(Template)]
#[template(path = "post_delete.html")]
pub struct PostDeleteTemplate<'a> {
    pub client: ClientCtx,
    pub post: &'a PostForTemplate,
}

#[derive(Deserialize)]
pub struct EditPostFormData {
    pub content: String,
}

#[derive(FromQueryResult)]
struct CountByPost {
    post_id: i32,
    count: i64,
}

/// Returns the result of a query selecting for a post by id with adjoined
/// author data.
pub async fn get_post_for_template(
    db: &DatabaseConnection,
    id: i32,
) -> Result<Option<PostForTemplate>, DbErr> {
    posts::Entity::find_by_id(id)
        .left_join(users::Entity)
        .column_as(users::Column::Name, "author_name")
        .column_as(users::Column::Email, "author_email")
        .column_as(users::Column::Image, "author_image")
        .into_model::<PostForTemplate>()
        .one(db)
        .await
}

async fn count_grouped_by_post<E, C>(
    db: &DatabaseConnection,
    post_ids: &[i32],
    post_col: C,
    id_col: C,
) -> Result<HashMap<i32, i64>, DbErr>
where
    E: EntityTrait<Column = C>,
    C: ColumnTrait,
{
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = E::find()
        .select_only()
        .column_as(post_col, "post_id")
        .column_as(Expr::col(id_col).count(), "count")
        .filter(post_col.is_in(post_ids.to_owned()))
        .group_by(post_col)
        .into_model::<CountByPost>()
        .all(db)
        .await?;

    Ok(rows.into_iter().map(|r| (r.post_id, r.count)).collect())
}

/// Assembles feed entries: posts joined with authors, like/comment counts,
/// the client's own likes, and the comment tree per post.
pub async fn get_posts_for_feed(
    db: &DatabaseConnection,
    author_id: Option<i32>,
    only_video: bool,
    client_id: Option<i32>,
) -> Result<Vec<FeedPost>, DbErr> {
    let mut select = posts::Entity::find()
        .left_join(users::Entity)
        .column_as(users::Column::Name, "author_name")
        .column_as(users::Column::Email, "author_email")
        .column_as(users::Column::Image, "author_image")
        .order_by_desc(posts::Column::CreatedAt);
    if let Some(author_id) = author_id {
        select = select.filter(posts::Column::AuthorId.eq(author_id));
    }
    if only_video {
        select = select.filter(posts::Column::MediaType.eq(posts::MediaType::Video));
    }

    let rows: Vec<PostForTemplate> = select.into_model::<PostForTemplate>().all(db).await?;
    let ids: Vec<i32> = rows.iter().map(|p| p.id).collect();

    let like_counts = count_grouped_by_post::<post_likes::Entity, _>(
        db,
        &ids,
        post_likes::Column::PostId,
        post_likes::Column::Id,
    )
    .await?;
    let comment_counts = count_grouped_by_post::<comments::Entity, _>(
        db,
        &ids,
        comments::Column::PostId,
        comments::Column::Id,
    )
    .await?;

    let client_likes: HashSet<i32> = match client_id {
        Some(client_id) if !ids.is_empty() => post_likes::Entity::find()
            .filter(post_likes::Column::AuthorId.eq(client_id))
            .filter(post_likes::Column::PostId.is_in(ids.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|like| like.post_id)
            .collect(),
        _ => HashSet::new(),
    };

    let mut comments = get_comments_for_posts(db, &ids, client_id).await?;

    Ok(rows
        .into_iter()
        .map(|post| {
            let comments = comments.remove(&post.id).unwrap_or_default();
            FeedPost {
                like_count: like_counts.get(&post.id).copied().unwrap_or(0),
                comment_count: comment_counts.get(&post.id).copied().unwrap_or(0),
                liked_by_client: client_likes.contains(&post.id),
                editable: client_id == Some(post.author_id),
                comments,
                post,
            }
        })
        .collect())
}

/// Builds one feed entry for the permalink page.
pub async fn get_feed_post(
    db: &DatabaseConnection,
    id: i32,
    client_id: Option<i32>,
) -> Result<Option<FeedPost>, DbErr> {
    let post = match get_post_for_template(db, id).await? {
        Some(post) => post,
        None => return Ok(None),
    };

    let like_count = post_likes::Entity::find()
        .filter(post_likes::Column::PostId.eq(id))
        .all(db)
        .await?
        .len() as i64;
    let liked_by_client = match client_id {
        Some(client_id) => post_likes::Entity::find()
            .filter(post_likes::Column::PostId.eq(id))
            .filter(post_likes::Column::AuthorId.eq(client_id))
            .one(db)
            .await?
            .is_some(),
        None => false,
    };
    let mut comments = get_comments_for_posts(db, &[id], client_id).await?;
    let comments = comments.remove(&id).unwrap_or_default();

    Ok(Some(FeedPost {
        like_count,
        comment_count: comments.iter().map(|c| 1 + c.replies.len() as i64).sum(),
        liked_by_client,
        editable: client_id == Some(post.author_id),
        comments,
        post,
    }))
}

pub fn validate_post_input(
    content: &str,
    has_media: bool,
) -> Result<String, Error> {
    let content = content.trim().to_owned();
    if content.is_empty() && !has_media {
        return Err(error::ErrorUnprocessableEntity(
            "A post needs text or media.",
        ));
    }
    Ok(content)
}

async fn read_text_field(field: &mut actix_multipart::Field) -> Result<String, Error> {
    use futures::StreamExt;

    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = field.next().await {
        let bytes = chunk.map_err(|e| {
            log::error!("read_text_field: multipart read error: {}", e);
            error::ErrorInternalServerError("error reading form data")
        })?;
        buf.extend(bytes);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[post("/posts")]
pub async fn create_post(client: ClientCtx, mut multipart: Multipart) -> Result<impl Responder, Error> {
    let author_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;

    let mut content = String::new();
    let mut media: Option<filesystem::UploadPayload> = None;
    while let Ok(Some(mut field)) = multipart.try_next().await {
        let field_name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_owned();
        match field_name.as_str() {
            "content" => content = read_text_field(&mut field).await?,
            "file" => media = filesystem::read_upload_field(&mut field).await?,
            _ => {
                return Err(error::ErrorBadRequest(format!(
                    "Unknown field '{}'",
                    field_name
                )))
            }
        }
    }

    let content = validate_post_input(&content, media.is_some())?;
    let now = Utc::now().naive_utc();

    let (media_url, media_type) = match media {
        Some(payload) => {
            let media_type = filesystem::media_type_for_mime(&payload.mime);
            let stored = filesystem::relay_to_storage(payload).await?;
            (Some(stored.url), Some(media_type))
        }
        None => (None, None),
    };

    posts::Entity::insert(posts::ActiveModel {
        author_id: Set(author_id),
        content: Set(Some(content).filter(|c| !c.is_empty())),
        media_url: Set(media_url),
        media_type: Set(media_type),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    })
    .exec(get_db_pool())
    .await
    .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", "/"))
        .finish())
}

#[get("/posts/{post_id}")]
pub async fn view_post(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    let post = get_feed_post(get_db_pool(), path.into_inner(), client.get_id())
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Post not found."))?;

    Ok(PostTemplate { client, post }.to_response())
}

#[get("/posts/{post_id}/edit")]
pub async fn edit_post(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    let post = get_post_for_template(get_db_pool(), path.into_inner())
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Post not found."))?;

    if !client.can_update_post(&post) {
        return Err(error::ErrorForbidden(
            "You do not have permission to update this post.",
        ));
    }

    Ok(PostUpdateTemplate {
        client,
        post: &post,
    }
    .to_response())
}

#[post("/posts/{post_id}/edit")]
pub async fn update_post(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Form<EditPostFormData>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let post = get_post_for_template(db, path.into_inner())
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Post not found."))?;

    if !client.can_update_post(&post) {
        return Err(error::ErrorForbidden(
            "You do not have permission to update this post.",
        ));
    }

    let content = validate_post_input(&form.content, post.has_media())?;

    posts::Entity::update_many()
        .col_expr(
            posts::Column::Content,
            Expr::value(Some(content).filter(|c| !c.is_empty())),
        )
        .col_expr(
            posts::Column::UpdatedAt,
            Expr::value(Utc::now().naive_utc()),
        )
        .filter(posts::Column::Id.eq(post.id))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/posts/{}", post.id)))
        .finish())
}

#[get("/posts/{post_id}/delete")]
pub async fn delete_post(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    let post = get_post_for_template(get_db_pool(), path.into_inner())
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Post not found."))?;

    if !client.can_delete_post(&post) {
        return Err(error::ErrorForbidden(
            "You do not have permission to delete this post.",
        ));
    }

    Ok(PostDeleteTemplate {
        client,
        post: &post,
    }
    .to_response())
}

#[post("/posts/{post_id}/delete")]
pub async fn destroy_post(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let post = get_post_for_template(db, path.into_inner())
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Post not found."))?;

    if !client.can_delete_post(&post) {
        return Err(error::ErrorForbidden(
            "You do not have permission to delete this post.",
        ));
    }

    // The cascade is explicit: reactions, comments and likes go with the post.
    let txn = db.begin().await.map_err(error::ErrorInternalServerError)?;

    let comment_ids: Vec<i32> = comments::Entity::find()
        .filter(comments::Column::PostId.eq(post.id))
        .all(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?
        .into_iter()
        .map(|c| c.id)
        .collect();

    if !comment_ids.is_empty() {
        comment_likes::Entity::delete_many()
            .filter(comment_likes::Column::CommentId.is_in(comment_ids))
            .exec(&txn)
            .await
            .map_err(error::ErrorInternalServerError)?;
    }
    comments::Entity::delete_many()
        .filter(comments::Column::PostId.eq(post.id))
        .exec(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?;
    post_likes::Entity::delete_many()
        .filter(post_likes::Column::PostId.eq(post.id))
        .exec(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?;
    posts::Entity::delete_many()
        .filter(posts::Column::Id.eq(post.id))
        .exec(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?;

    txn.commit().await.map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", "/"))
        .finish())
}

/// Toggle: a second like from the same user removes the first. The unique
/// (post_id, author_id) constraint backstops concurrent inserts.
#[post("/posts/{post_id}/like")]
pub async fn like_post(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    let author_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let db = get_db_pool();
    let post_id = path.into_inner();

    posts::Entity::find_by_id(post_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Post not found."))?;

    let existing = post_likes::Entity::find()
        .filter(post_likes::Column::PostId.eq(post_id))
        .filter(post_likes::Column::AuthorId.eq(author_id))
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    match existing {
        Some(like) => {
            post_likes::Entity::delete_many()
                .filter(post_likes::Column::Id.eq(like.id))
                .exec(db)
                .await
                .map_err(error::ErrorInternalServerError)?;
        }
        None => {
            post_likes::Entity::insert(post_likes::ActiveModel {
                post_id: Set(post_id),
                author_id: Set(author_id),
                created_at: Set(Utc::now().naive_utc()),
                ..Default::default()
            })
            .exec(db)
            .await
            .map_err(error::ErrorInternalServerError)?;
        }
    }

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/posts/{}", post_id)))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_and_media_only_posts_validate() {
        assert_eq!(validate_post_input(" hello ", false).unwrap(), "hello");
        assert_eq!(validate_post_input("", true).unwrap(), "");
        assert!(validate_post_input("  ", false).is_err());
    }

    fn post_with(media_type: Option<&str>) -> PostForTemplate {
        let now = Utc::now().naive_utc();
        PostForTemplate {
            id: 1,
            author_id: 2,
            content: None,
            media_url: media_type.map(|_| "https://cdn.test/x".to_owned()),
            media_type: media_type.map(str::to_owned),
            created_at: now,
            updated_at: now,
            author_name: None,
            author_email: Some("alice@example.com".to_owned()),
            author_image: None,
        }
    }

    #[test]
    fn author_fields_derive_from_email() {
        let post = post_with(None);
        assert_eq!(post.author_display_name(), "alice");
        assert_eq!(post.author_handle(), "alice");
        assert!(post.author_avatar().contains("dicebear"));
    }

    #[test]
    fn only_video_media_counts_as_video() {
        assert!(post_with(Some("video")).is_video());
        assert!(!post_with(Some("image")).is_video());
        assert!(!post_with(None).is_video());
    }
}
