use crate::db::get_db_pool;
use crate::filesystem;
use crate::middleware::ClientCtx;
use crate::orm::{stories, story_views, users};
use actix_multipart::Multipart;
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use askama_actix::{Template, TemplateToResponse};
use chrono::{Duration, NaiveDateTime, Utc};
use futures::TryStreamExt;
use sea_orm::{
    entity::*, query::*, sea_query::Expr, DatabaseConnection, DbErr, FromQueryResult, Select,
};
use std::collections::HashMap;

/// Stories leave the rail exactly this long after creation.
pub const STORY_TTL_HOURS: i64 = 24;

pub fn story_expiry(created_at: NaiveDateTime) -> NaiveDateTime {
    created_at + Duration::hours(STORY_TTL_HOURS)
}

/// Readers lose an expired story; the author keeps it (the delete flow
/// still needs to reach it).
pub fn story_visible_to(
    expires_at: NaiveDateTime,
    author_id: i32,
    viewer_id: Option<i32>,
    now: NaiveDateTime,
) -> bool {
    expires_at > now || viewer_id == Some(author_id)
}

/// A story row joined with its author.
#[derive(Debug, FromQueryResult)]
pub struct StoryForTemplate {
    pub id: i32,
    pub author_id: i32,
    pub media_url: String,
    pub created_at: chrono::NaiveDateTime,
    pub expires_at: chrono::NaiveDateTime,
    // join users
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_image: Option<String>,
}

impl StoryForTemplate {
    pub fn author_display_name(&self) -> String {
        crate::user::display_name(
            self.author_name.as_deref(),
            self.author_email.as_deref().unwrap_or_default(),
        )
    }

    pub fn author_avatar(&self) -> String {
        crate::user::avatar_or_default(
            self.author_image.as_deref(),
            self.author_email.as_deref().unwrap_or_default(),
        )
    }

    pub fn timestamp(&self) -> String {
        crate::frontend::relative_time(self.created_at, Utc::now().naive_utc())
    }
}

/// Rail entry: the story plus its view tally.
pub struct StoryRailEntry {
    pub story: StoryForTemplate,
    pub view_count: i64,
}

/// A viewer of one story, newest first.
#[derive(Debug, FromQueryResult)]
pub struct ViewerForTemplate {
    pub user_id: i32,
    pub viewed_at: chrono::NaiveDateTime,
    pub viewer_name: Option<String>,
    pub viewer_email: Option<String>,
    pub viewer_image: Option<String>,
}

impl ViewerForTemplate {
    pub fn display_name(&self) -> String {
        crate::user::display_name(
            self.viewer_name.as_deref(),
            self.viewer_email.as_deref().unwrap_or_default(),
        )
    }

    pub fn avatar(&self) -> String {
        crate::user::avatar_or_default(
            self.viewer_image.as_deref(),
            self.viewer_email.as_deref().unwrap_or_default(),
        )
    }

    pub fn timestamp(&self) -> String {
        crate::frontend::relative_time(self.viewed_at, Utc::now().naive_utc())
    }
}

#[derive(Template)]
#[template(path = "story.html")]
pub struct StoryTemplate {
    pub client: ClientCtx,
    pub story: StoryForTemplate,
    pub view_count: i64,
    pub is_owner: bool,
}

#[derive(Template)]
#[template(path = "story_viewers.html")]
pub struct StoryViewersTemplate {
    pub client: ClientCtx,
    pub story: StoryForTemplate,
    pub viewers: Vec<ViewerForTemplate>,
}

fn select_with_author() -> Select<stories::Entity> {
    stories::Entity::find()
        .left_join(users::Entity)
        .column_as(users::Column::Name, "author_name")
        .column_as(users::Column::Email, "author_email")
        .column_as(users::Column::Image, "author_image")
}

async fn view_counts(
    db: &DatabaseConnection,
    story_ids: Vec<i32>,
) -> Result<HashMap<i32, i64>, DbErr> {
    #[derive(FromQueryResult)]
    struct CountRow {
        story_id: i32,
        count: i64,
    }

    if story_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = story_views::Entity::find()
        .select_only()
        .column(story_views::Column::StoryId)
        .column_as(Expr::col(story_views::Column::Id).count(), "count")
        .filter(story_views::Column::StoryId.is_in(story_ids))
        .group_by(story_views::Column::StoryId)
        .into_model::<CountRow>()
        .all(db)
        .await?;

    Ok(rows.into_iter().map(|r| (r.story_id, r.count)).collect())
}

/// Every unexpired story, newest first, for the home rail.
pub async fn get_active_stories(db: &DatabaseConnection) -> Result<Vec<StoryRailEntry>, DbErr> {
    let stories: Vec<StoryForTemplate> = select_with_author()
        .filter(stories::Column::ExpiresAt.gt(Utc::now().naive_utc()))
        .order_by_desc(stories::Column::CreatedAt)
        .into_model::<StoryForTemplate>()
        .all(db)
        .await?;

    let counts = view_counts(db, stories.iter().map(|s| s.id).collect()).await?;

    Ok(stories
        .into_iter()
        .map(|story| StoryRailEntry {
            view_count: counts.get(&story.id).copied().unwrap_or(0),
            story,
        })
        .collect())
}

/// One member's unexpired stories, for their profile header.
pub async fn get_active_stories_for_user(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Vec<StoryRailEntry>, DbErr> {
    let stories: Vec<StoryForTemplate> = select_with_author()
        .filter(stories::Column::AuthorId.eq(user_id))
        .filter(stories::Column::ExpiresAt.gt(Utc::now().naive_utc()))
        .order_by_desc(stories::Column::CreatedAt)
        .into_model::<StoryForTemplate>()
        .all(db)
        .await?;

    let counts = view_counts(db, stories.iter().map(|s| s.id).collect()).await?;

    Ok(stories
        .into_iter()
        .map(|story| StoryRailEntry {
            view_count: counts.get(&story.id).copied().unwrap_or(0),
            story,
        })
        .collect())
}

#[post("/stories")]
pub async fn create_story(
    client: ClientCtx,
    mut multipart: Multipart,
) -> Result<impl Responder, Error> {
    let author_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;

    let mut media: Option<filesystem::UploadPayload> = None;
    while let Ok(Some(mut field)) = multipart.try_next().await {
        let field_name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_owned();
        match field_name.as_str() {
            "file" => media = filesystem::read_upload_field(&mut field).await?,
            _ => {
                return Err(error::ErrorBadRequest(format!(
                    "Unknown field '{}'",
                    field_name
                )))
            }
        }
    }

    let payload = media
        .ok_or_else(|| error::ErrorUnprocessableEntity("A story needs a media file."))?;
    let stored = filesystem::relay_to_storage(payload).await?;
    let now = Utc::now().naive_utc();

    stories::Entity::insert(stories::ActiveModel {
        author_id: Set(author_id),
        media_url: Set(stored.url),
        created_at: Set(now),
        expires_at: Set(story_expiry(now)),
        ..Default::default()
    })
    .exec(get_db_pool())
    .await
    .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", "/"))
        .finish())
}

#[get("/stories/{story_id}")]
pub async fn view_story(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let story: StoryForTemplate = select_with_author()
        .filter(stories::Column::Id.eq(path.into_inner()))
        .into_model::<StoryForTemplate>()
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Story not found."))?;

    let now = Utc::now().naive_utc();
    if !story_visible_to(story.expires_at, story.author_id, client.get_id(), now) {
        return Err(error::ErrorNotFound("Story not found."));
    }

    let is_owner = client.get_id() == Some(story.author_id);
    let view_count = view_counts(db, vec![story.id])
        .await
        .map_err(error::ErrorInternalServerError)?
        .get(&story.id)
        .copied()
        .unwrap_or(0);

    Ok(StoryTemplate {
        client,
        story,
        view_count,
        is_owner,
    }
    .to_response())
}

/// Records that the client saw the story. Owners viewing their own story
/// and repeat views record nothing.
#[post("/stories/{story_id}/view")]
pub async fn track_story_view(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let db = get_db_pool();
    let story_id = path.into_inner();

    let story = stories::Entity::find_by_id(story_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Story not found."))?;

    if story.author_id != user_id {
        let existing = story_views::Entity::find()
            .filter(story_views::Column::StoryId.eq(story_id))
            .filter(story_views::Column::UserId.eq(user_id))
            .one(db)
            .await
            .map_err(error::ErrorInternalServerError)?;

        if existing.is_none() {
            story_views::Entity::insert(story_views::ActiveModel {
                story_id: Set(story_id),
                user_id: Set(user_id),
                created_at: Set(Utc::now().naive_utc()),
                ..Default::default()
            })
            .exec(db)
            .await
            .map_err(error::ErrorInternalServerError)?;
        }
    }

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/stories/{}", story_id)))
        .finish())
}

#[get("/stories/{story_id}/viewers")]
pub async fn view_story_viewers(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let story: StoryForTemplate = select_with_author()
        .filter(stories::Column::Id.eq(path.into_inner()))
        .into_model::<StoryForTemplate>()
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Story not found."))?;

    if client.get_id() != Some(story.author_id) {
        return Err(error::ErrorForbidden(
            "Only the author may see who viewed a story.",
        ));
    }

    let viewers: Vec<ViewerForTemplate> = story_views::Entity::find()
        .left_join(users::Entity)
        .column_as(story_views::Column::CreatedAt, "viewed_at")
        .column_as(users::Column::Name, "viewer_name")
        .column_as(users::Column::Email, "viewer_email")
        .column_as(users::Column::Image, "viewer_image")
        .filter(story_views::Column::StoryId.eq(story.id))
        .order_by_desc(story_views::Column::CreatedAt)
        .into_model::<ViewerForTemplate>()
        .all(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(StoryViewersTemplate {
        client,
        story,
        viewers,
    }
    .to_response())
}

#[post("/stories/{story_id}/delete")]
pub async fn destroy_story(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let story = stories::Entity::find_by_id(path.into_inner())
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Story not found."))?;

    if !client.can_delete_story(&story) {
        return Err(error::ErrorForbidden(
            "You do not have permission to delete this story.",
        ));
    }

    let txn = db.begin().await.map_err(error::ErrorInternalServerError)?;
    story_views::Entity::delete_many()
        .filter(story_views::Column::StoryId.eq(story.id))
        .exec(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?;
    stories::Entity::delete_many()
        .filter(stories::Column::Id.eq(story.id))
        .exec(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?;
    txn.commit().await.map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", "/"))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd(2024, 6, 1).and_hms(12, 0, 0)
    }

    #[test]
    fn stories_expire_one_day_out() {
        let created = noon();
        assert_eq!(story_expiry(created), created + Duration::hours(24));
    }

    #[test]
    fn expired_stories_hide_from_readers_but_not_the_author() {
        let now = noon();
        let expired = now - Duration::minutes(1);
        let live = now + Duration::minutes(1);

        assert!(story_visible_to(live, 1, Some(2), now));
        assert!(story_visible_to(live, 1, None, now));
        assert!(!story_visible_to(expired, 1, Some(2), now));
        assert!(!story_visible_to(expired, 1, None, now));
        assert!(story_visible_to(expired, 1, Some(1), now));
    }
}
