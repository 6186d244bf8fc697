use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::{comment_likes, comments, posts, users};
use actix_web::{error, post, web, Error, HttpResponse, Responder};
use chrono::prelude::Utc;
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection, DbErr, FromQueryResult};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, FromQueryResult)]
struct CommentRow {
    id: i32,
    post_id: i32,
    author_id: i32,
    reply_to_id: Option<i32>,
    content: String,
    created_at: chrono::NaiveDateTime,
    // join users
    author_name: Option<String>,
    author_email: Option<String>,
    author_image: Option<String>,
}

/// A comment shaped for display: author chip, reaction tallies, and one
/// level of replies.
#[derive(Clone)]
pub struct CommentForTemplate {
    pub id: i32,
    pub post_id: i32,
    pub author_id: i32,
    pub reply_to_id: Option<i32>,
    pub content: String,
    pub created_at: chrono::NaiveDateTime,
    pub author_name: String,
    pub author_handle: String,
    pub author_avatar: String,
    pub like_count: i64,
    pub dislike_count: i64,
    /// The client's own reaction, if any: Some(true) like, Some(false) dislike.
    pub client_reaction: Option<bool>,
    pub editable: bool,
    pub replies: Vec<CommentForTemplate>,
}

impl CommentForTemplate {
    fn from_row(row: CommentRow, client_id: Option<i32>) -> Self {
        let email = row.author_email.as_deref().unwrap_or_default();
        Self {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            reply_to_id: row.reply_to_id,
            author_name: crate::user::display_name(row.author_name.as_deref(), email),
            author_handle: crate::user::handle_from_email(email),
            author_avatar: crate::user::avatar_or_default(row.author_image.as_deref(), email),
            content: row.content,
            created_at: row.created_at,
            like_count: 0,
            dislike_count: 0,
            client_reaction: None,
            editable: client_id == Some(row.author_id),
            replies: Vec::new(),
        }
    }

    pub fn timestamp(&self) -> String {
        crate::frontend::relative_time(self.created_at, Utc::now().naive_utc())
    }

    pub fn liked_by_client(&self) -> bool {
        self.client_reaction == Some(true)
    }

    pub fn disliked_by_client(&self) -> bool {
        self.client_reaction == Some(false)
    }

    fn reply_root(&self) -> Option<i32> {
        self.reply_to_id
    }
}

/// Returns each post's comments as a tree: top-level comments in posting
/// order, replies nested one level beneath their parent.
pub async fn get_comments_for_posts(
    db: &DatabaseConnection,
    post_ids: &[i32],
    client_id: Option<i32>,
) -> Result<HashMap<i32, Vec<CommentForTemplate>>, DbErr> {
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<CommentRow> = comments::Entity::find()
        .left_join(users::Entity)
        .column_as(users::Column::Name, "author_name")
        .column_as(users::Column::Email, "author_email")
        .column_as(users::Column::Image, "author_image")
        .filter(comments::Column::PostId.is_in(post_ids.to_owned()))
        .order_by_asc(comments::Column::CreatedAt)
        .into_model::<CommentRow>()
        .all(db)
        .await?;

    let comment_ids: Vec<i32> = rows.iter().map(|c| c.id).collect();
    let reactions = if comment_ids.is_empty() {
        Vec::new()
    } else {
        comment_likes::Entity::find()
            .filter(comment_likes::Column::CommentId.is_in(comment_ids))
            .all(db)
            .await?
    };

    let mut comments: Vec<CommentForTemplate> = rows
        .into_iter()
        .map(|row| CommentForTemplate::from_row(row, client_id))
        .collect();

    for reaction in reactions {
        if let Some(comment) = comments.iter_mut().find(|c| c.id == reaction.comment_id) {
            if reaction.is_like {
                comment.like_count += 1;
            } else {
                comment.dislike_count += 1;
            }
            if Some(reaction.user_id) == client_id {
                comment.client_reaction = Some(reaction.is_like);
            }
        }
    }

    // Nest replies beneath their parents, then group the roots by post.
    let (roots, replies): (Vec<_>, Vec<_>) = comments
        .into_iter()
        .partition(|c| c.reply_root().is_none());
    let mut by_id: HashMap<i32, Vec<CommentForTemplate>> = HashMap::new();
    for reply in replies {
        by_id.entry(reply.reply_root().unwrap()).or_default().push(reply);
    }

    let mut grouped: HashMap<i32, Vec<CommentForTemplate>> = HashMap::new();
    for mut root in roots {
        root.replies = by_id.remove(&root.id).unwrap_or_default();
        grouped.entry(root.post_id).or_default().push(root);
    }

    // Replies to comments that no longer exist surface as top-level.
    for (_, orphans) in by_id {
        for orphan in orphans {
            grouped.entry(orphan.post_id).or_default().push(orphan);
        }
    }

    Ok(grouped)
}

/// What a reaction request should do, given the client's existing row.
#[derive(Debug, PartialEq)]
pub enum ReactionAction {
    Insert,
    Remove,
    Update,
}

/// No row: insert. Same side again: remove (un-react). Opposite side:
/// update the row in place.
pub fn reaction_action(existing: Option<bool>, requested: bool) -> ReactionAction {
    match existing {
        None => ReactionAction::Insert,
        Some(current) if current == requested => ReactionAction::Remove,
        Some(_) => ReactionAction::Update,
    }
}

#[derive(Deserialize)]
pub struct NewCommentFormData {
    pub content: String,
    pub reply_to: Option<i32>,
}

#[derive(Deserialize)]
pub struct EditCommentFormData {
    pub content: String,
}

#[derive(Deserialize)]
pub struct ReactionFormData {
    pub is_like: bool,
}

fn validate_comment_content(content: &str) -> Result<String, Error> {
    let content = content.trim();
    if content.is_empty() {
        return Err(error::ErrorUnprocessableEntity("Comment cannot be empty."));
    }
    Ok(content.to_owned())
}

#[post("/posts/{post_id}/comments")]
pub async fn create_comment(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Form<NewCommentFormData>,
) -> Result<impl Responder, Error> {
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

    // A reply must point at a comment under the same post.
    if let Some(reply_to) = form.reply_to {
        let parent = comments::Entity::find_by_id(reply_to)
            .one(db)
            .await
            .map_err(error::ErrorInternalServerError)?
            .ok_or_else(|| error::ErrorNotFound("Comment not found."))?;
        if parent.post_id != post_id {
            return Err(error::ErrorUnprocessableEntity(
                "Reply does not belong to this post.",
            ));
        }
    }

    let content = validate_comment_content(&form.content)?;
    let now = Utc::now().naive_utc();

    comments::Entity::insert(comments::ActiveModel {
        post_id: Set(post_id),
        author_id: Set(author_id),
        reply_to_id: Set(form.reply_to),
        content: Set(content),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    })
    .exec(db)
    .await
    .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/posts/{}", post_id)))
        .finish())
}

#[post("/comments/{comment_id}/edit")]
pub async fn update_comment(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Form<EditCommentFormData>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let comment = comments::Entity::find_by_id(path.into_inner())
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Comment not found."))?;

    if !client.can_update_comment(&comment) {
        return Err(error::ErrorForbidden(
            "You do not have permission to update this comment.",
        ));
    }

    let content = validate_comment_content(&form.content)?;

    comments::Entity::update_many()
        .col_expr(comments::Column::Content, Expr::value(content))
        .col_expr(
            comments::Column::UpdatedAt,
            Expr::value(Utc::now().naive_utc()),
        )
        .filter(comments::Column::Id.eq(comment.id))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/posts/{}", comment.post_id)))
        .finish())
}

#[post("/comments/{comment_id}/delete")]
pub async fn destroy_comment(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let comment = comments::Entity::find_by_id(path.into_inner())
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Comment not found."))?;

    if !client.can_delete_comment(&comment) {
        return Err(error::ErrorForbidden(
            "You do not have permission to delete this comment.",
        ));
    }

    // Direct replies and all reactions go with the comment.
    let txn = db.begin().await.map_err(error::ErrorInternalServerError)?;

    let reply_ids: Vec<i32> = comments::Entity::find()
        .filter(comments::Column::ReplyToId.eq(comment.id))
        .all(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?
        .into_iter()
        .map(|c| c.id)
        .collect();

    let mut doomed = reply_ids;
    doomed.push(comment.id);

    comment_likes::Entity::delete_many()
        .filter(comment_likes::Column::CommentId.is_in(doomed.clone()))
        .exec(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?;
    comments::Entity::delete_many()
        .filter(comments::Column::Id.is_in(doomed))
        .exec(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?;

    txn.commit().await.map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/posts/{}", comment.post_id)))
        .finish())
}

#[post("/comments/{comment_id}/react")]
pub async fn react_to_comment(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Form<ReactionFormData>,
) -> Result<impl Responder, Error> {
    let user_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let db = get_db_pool();

    let comment = comments::Entity::find_by_id(path.into_inner())
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Comment not found."))?;

    let existing = comment_likes::Entity::find()
        .filter(comment_likes::Column::CommentId.eq(comment.id))
        .filter(comment_likes::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    match reaction_action(existing.as_ref().map(|r| r.is_like), form.is_like) {
        ReactionAction::Insert => {
            comment_likes::Entity::insert(comment_likes::ActiveModel {
                comment_id: Set(comment.id),
                user_id: Set(user_id),
                is_like: Set(form.is_like),
                created_at: Set(Utc::now().naive_utc()),
                ..Default::default()
            })
            .exec(db)
            .await
            .map_err(error::ErrorInternalServerError)?;
        }
        ReactionAction::Remove => {
            comment_likes::Entity::delete_many()
                .filter(comment_likes::Column::Id.eq(existing.unwrap().id))
                .exec(db)
                .await
                .map_err(error::ErrorInternalServerError)?;
        }
        ReactionAction::Update => {
            comment_likes::Entity::update_many()
                .col_expr(comment_likes::Column::IsLike, Expr::value(form.is_like))
                .filter(comment_likes::Column::Id.eq(existing.unwrap().id))
                .exec(db)
                .await
                .map_err(error::ErrorInternalServerError)?;
        }
    }

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/posts/{}", comment.post_id)))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_transitions_cover_the_table() {
        assert_eq!(reaction_action(None, true), ReactionAction::Insert);
        assert_eq!(reaction_action(None, false), ReactionAction::Insert);
        assert_eq!(reaction_action(Some(true), true), ReactionAction::Remove);
        assert_eq!(reaction_action(Some(false), false), ReactionAction::Remove);
        assert_eq!(reaction_action(Some(true), false), ReactionAction::Update);
        assert_eq!(reaction_action(Some(false), true), ReactionAction::Update);
    }

    #[test]
    fn comment_content_is_trimmed_and_required() {
        assert_eq!(validate_comment_content(" hi ").unwrap(), "hi");
        assert!(validate_comment_content("   ").is_err());
    }
}
