use crate::db::get_db_pool;
use crate::filesystem;
use crate::follow::{count_followers, count_following, is_following};
use crate::middleware::ClientCtx;
use crate::orm::users;
use crate::post::{get_posts_for_feed, FeedPost};
use crate::story::{get_active_stories_for_user, StoryRailEntry};
use crate::user::UserProfile;
use actix_multipart::Multipart;
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use askama_actix::{Template, TemplateToResponse};
use chrono::NaiveDate;
use futures::TryStreamExt;
use sea_orm::{entity::*, query::*, sea_query::Expr};
use serde::Deserialize;

/// The profile header: every displayable field of one user.
pub struct ProfileForTemplate {
    pub id: i32,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub pronouns: Option<String>,
    pub dob: Option<NaiveDate>,
    pub show_joined_date: bool,
    pub created_at: chrono::NaiveDateTime,
}

impl From<users::Model> for ProfileForTemplate {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
            bio: user.bio,
            location: user.location,
            website: user.website,
            pronouns: user.pronouns,
            dob: user.dob,
            show_joined_date: user.show_joined_date,
            created_at: user.created_at,
        }
    }
}

impl ProfileForTemplate {
    pub fn display_name(&self) -> String {
        crate::user::display_name(self.name.as_deref(), &self.email)
    }

    pub fn handle(&self) -> String {
        crate::user::handle_from_email(&self.email)
    }

    pub fn avatar(&self) -> String {
        crate::user::avatar_or_default(self.image.as_deref(), &self.email)
    }

    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn bio_or_empty(&self) -> &str {
        self.bio.as_deref().unwrap_or_default()
    }

    pub fn location_or_empty(&self) -> &str {
        self.location.as_deref().unwrap_or_default()
    }

    pub fn website_or_empty(&self) -> &str {
        self.website.as_deref().unwrap_or_default()
    }

    pub fn pronouns_or_empty(&self) -> &str {
        self.pronouns.as_deref().unwrap_or_default()
    }

    pub fn dob_or_empty(&self) -> String {
        self.dob
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }

    pub fn joined_date(&self) -> String {
        self.created_at.format("Joined %B %Y").to_string()
    }
}

/// Profile tab selection, from the `?tab=` query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProfileTab {
    Posts,
    Media,
    Videos,
}

impl ProfileTab {
    pub fn from_query(tab: Option<&str>) -> Self {
        match tab {
            Some("media") => Self::Media,
            Some("videos") => Self::Videos,
            _ => Self::Posts,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Media => "media",
            Self::Videos => "videos",
        }
    }
}

/// Search strings below two characters are ignored rather than rejected.
pub fn normalized_query(q: Option<&str>) -> Option<String> {
    let q = q?.trim();
    if q.len() < 2 {
        return None;
    }
    Some(q.to_owned())
}

#[derive(Template)]
#[template(path = "members.html")]
pub struct MembersTemplate {
    pub client: ClientCtx,
    pub members: Vec<UserProfile>,
    pub query: String,
}

#[derive(Template)]
#[template(path = "member.html")]
pub struct MemberTemplate {
    pub client: ClientCtx,
    pub profile: ProfileForTemplate,
    pub posts: Vec<FeedPost>,
    pub stories: Vec<StoryRailEntry>,
    pub follower_count: i64,
    pub following_count: i64,
    pub client_follows: bool,
    pub is_own_profile: bool,
    pub tab: ProfileTab,
}

#[derive(Template)]
#[template(path = "account.html")]
pub struct AccountTemplate {
    pub client: ClientCtx,
    pub profile: ProfileForTemplate,
}

#[derive(Deserialize)]
pub struct MemberSearchQuery {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct ProfileQuery {
    pub tab: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateProfileFormData {
    pub name: String,
    pub bio: String,
    pub location: String,
    pub website: String,
    pub pronouns: String,
    pub dob: String,
    pub show_joined_date: Option<String>,
}

fn none_if_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

fn parse_dob(dob: &str) -> Result<Option<NaiveDate>, Error> {
    let dob = dob.trim();
    if dob.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(dob, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| error::ErrorUnprocessableEntity("Date of birth must be YYYY-MM-DD."))
}

/// Member directory. With `?q=`, a search capped at ten rows that never
/// returns the caller.
#[get("/members")]
pub async fn view_members(
    client: ClientCtx,
    query: web::Query<MemberSearchQuery>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();

    let members = match normalized_query(query.q.as_deref()) {
        Some(q) => {
            let mut select = users::Entity::find().filter(
                Condition::any()
                    .add(users::Column::Name.contains(&q))
                    .add(users::Column::Email.contains(&q)),
            );
            if let Some(client_id) = client.get_id() {
                select = select.filter(users::Column::Id.ne(client_id));
            }
            select
                .limit(10)
                .into_model::<UserProfile>()
                .all(db)
                .await
                .map_err(error::ErrorInternalServerError)?
        }
        None => users::Entity::find()
            .order_by_asc(users::Column::Id)
            .into_model::<UserProfile>()
            .all(db)
            .await
            .map_err(error::ErrorInternalServerError)?,
    };

    Ok(MembersTemplate {
        client,
        members,
        query: query.q.to_owned().unwrap_or_default(),
    }
    .to_response())
}

#[get("/members/{user_id}")]
pub async fn view_member(
    client: ClientCtx,
    path: web::Path<i32>,
    query: web::Query<ProfileQuery>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let user = users::Entity::find_by_id(path.into_inner())
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Member not found."))?;

    let tab = ProfileTab::from_query(query.tab.as_deref());
    let mut posts = get_posts_for_feed(db, Some(user.id), tab == ProfileTab::Videos, client.get_id())
        .await
        .map_err(error::ErrorInternalServerError)?;
    if tab == ProfileTab::Media {
        posts.retain(|p| p.post.has_media());
    }

    let follower_count = count_followers(db, user.id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let following_count = count_following(db, user.id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let client_follows = match client.get_id() {
        Some(client_id) => is_following(db, client_id, user.id)
            .await
            .map_err(error::ErrorInternalServerError)?,
        None => false,
    };
    let stories = get_active_stories_for_user(db, user.id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    let is_own_profile = client.get_id() == Some(user.id);

    Ok(MemberTemplate {
        client,
        profile: user.into(),
        posts,
        stories,
        follower_count,
        following_count,
        client_follows,
        is_own_profile,
        tab,
    }
    .to_response())
}

#[get("/account")]
pub async fn view_account(client: ClientCtx) -> Result<impl Responder, Error> {
    let user_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;

    let user = users::Entity::find_by_id(user_id)
        .one(get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorInternalServerError("Could not load profile."))?;

    Ok(AccountTemplate {
        client,
        profile: user.into(),
    }
    .to_response())
}

#[post("/account")]
pub async fn update_account(
    client: ClientCtx,
    form: web::Form<UpdateProfileFormData>,
) -> Result<impl Responder, Error> {
    let user_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let dob = parse_dob(&form.dob)?;

    users::Entity::update_many()
        .col_expr(users::Column::Name, Expr::value(none_if_empty(&form.name)))
        .col_expr(users::Column::Bio, Expr::value(none_if_empty(&form.bio)))
        .col_expr(
            users::Column::Location,
            Expr::value(none_if_empty(&form.location)),
        )
        .col_expr(
            users::Column::Website,
            Expr::value(none_if_empty(&form.website)),
        )
        .col_expr(
            users::Column::Pronouns,
            Expr::value(none_if_empty(&form.pronouns)),
        )
        .col_expr(users::Column::Dob, Expr::value(dob))
        .col_expr(
            users::Column::ShowJoinedDate,
            Expr::value(form.show_joined_date.is_some()),
        )
        .filter(users::Column::Id.eq(user_id))
        .exec(get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", "/account"))
        .finish())
}

/// Avatar upload: relay the file to the media host and keep its URL.
#[post("/account/avatar")]
pub async fn update_avatar(
    client: ClientCtx,
    mut multipart: Multipart,
) -> Result<impl Responder, Error> {
    let user_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;

    let mut payload: Option<filesystem::UploadPayload> = None;
    while let Ok(Some(mut field)) = multipart.try_next().await {
        let field_name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_owned();
        match field_name.as_str() {
            "avatar" => payload = filesystem::read_upload_field(&mut field).await?,
            _ => {
                return Err(error::ErrorBadRequest(format!(
                    "Unknown field '{}'",
                    field_name
                )))
            }
        }
    }

    let payload =
        payload.ok_or_else(|| error::ErrorUnprocessableEntity("Upload is empty or improper."))?;
    let stored = filesystem::relay_to_storage(payload).await?;

    users::Entity::update_many()
        .col_expr(users::Column::Image, Expr::value(Some(stored.url)))
        .filter(users::Column::Id.eq(user_id))
        .exec(get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", "/account"))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_queries_are_ignored() {
        assert_eq!(normalized_query(None), None);
        assert_eq!(normalized_query(Some(" a ")), None);
        assert_eq!(normalized_query(Some("ab")), Some("ab".to_owned()));
    }

    #[test]
    fn tabs_parse_with_a_posts_default() {
        assert_eq!(ProfileTab::from_query(None), ProfileTab::Posts);
        assert_eq!(ProfileTab::from_query(Some("media")), ProfileTab::Media);
        assert_eq!(ProfileTab::from_query(Some("videos")), ProfileTab::Videos);
        assert_eq!(ProfileTab::from_query(Some("bogus")), ProfileTab::Posts);
    }

    #[test]
    fn dob_parses_or_rejects() {
        assert_eq!(parse_dob("").unwrap(), None);
        assert_eq!(
            parse_dob("1990-04-01").unwrap(),
            Some(NaiveDate::from_ymd(1990, 4, 1))
        );
        assert!(parse_dob("April 1st").is_err());
    }

    #[test]
    fn empty_profile_fields_store_null() {
        assert_eq!(none_if_empty("  "), None);
        assert_eq!(none_if_empty(" x "), Some("x".to_owned()));
    }
}
