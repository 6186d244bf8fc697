use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::{follows, users};
use crate::user::UserProfile;
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use askama_actix::{Template, TemplateToResponse};
use chrono::Utc;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr, JoinType};

#[derive(Template)]
#[template(path = "follow_list.html")]
pub struct FollowListTemplate {
    pub client: ClientCtx,
    pub subject: UserProfile,
    pub title: &'static str,
    pub members: Vec<UserProfile>,
}

/// Users who follow `user_id`.
pub async fn get_followers(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Vec<UserProfile>, DbErr> {
    users::Entity::find()
        .join_rev(JoinType::InnerJoin, follows::Relation::Follower.def())
        .filter(follows::Column::FollowingId.eq(user_id))
        .order_by_desc(follows::Column::CreatedAt)
        .into_model::<UserProfile>()
        .all(db)
        .await
}

/// Users whom `user_id` follows.
pub async fn get_following(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Vec<UserProfile>, DbErr> {
    users::Entity::find()
        .join_rev(JoinType::InnerJoin, follows::Relation::Following.def())
        .filter(follows::Column::FollowerId.eq(user_id))
        .order_by_desc(follows::Column::CreatedAt)
        .into_model::<UserProfile>()
        .all(db)
        .await
}

pub async fn count_followers(db: &DatabaseConnection, user_id: i32) -> Result<i64, DbErr> {
    Ok(follows::Entity::find()
        .filter(follows::Column::FollowingId.eq(user_id))
        .all(db)
        .await?
        .len() as i64)
}

pub async fn count_following(db: &DatabaseConnection, user_id: i32) -> Result<i64, DbErr> {
    Ok(follows::Entity::find()
        .filter(follows::Column::FollowerId.eq(user_id))
        .all(db)
        .await?
        .len() as i64)
}

pub async fn is_following(
    db: &DatabaseConnection,
    follower_id: i32,
    following_id: i32,
) -> Result<bool, DbErr> {
    Ok(follows::Entity::find()
        .filter(follows::Column::FollowerId.eq(follower_id))
        .filter(follows::Column::FollowingId.eq(following_id))
        .one(db)
        .await?
        .is_some())
}

#[post("/members/{user_id}/follow")]
pub async fn create_follow(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let follower_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let following_id = path.into_inner();
    let db = get_db_pool();

    if follower_id == following_id {
        return Err(error::ErrorUnprocessableEntity(
            "You cannot follow yourself.",
        ));
    }

    users::Entity::find_by_id(following_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Member not found."))?;

    // Following twice is a no-op; the unique pair constraint backstops races.
    if !is_following(db, follower_id, following_id)
        .await
        .map_err(error::ErrorInternalServerError)?
    {
        follows::Entity::insert(follows::ActiveModel {
            follower_id: Set(follower_id),
            following_id: Set(following_id),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        })
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;
    }

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/members/{}", following_id)))
        .finish())
}

/// Unfollowing someone you do not follow is a no-op.
#[post("/members/{user_id}/unfollow")]
pub async fn destroy_follow(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let follower_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let following_id = path.into_inner();

    follows::Entity::delete_many()
        .filter(follows::Column::FollowerId.eq(follower_id))
        .filter(follows::Column::FollowingId.eq(following_id))
        .exec(get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/members/{}", following_id)))
        .finish())
}

#[get("/members/{user_id}/followers")]
pub async fn view_followers(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let subject = users::Entity::find_by_id(path.into_inner())
        .into_model::<UserProfile>()
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Member not found."))?;

    let members = get_followers(db, subject.id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(FollowListTemplate {
        client,
        subject,
        title: "Followers",
        members,
    }
    .to_response())
}

#[get("/members/{user_id}/following")]
pub async fn view_following(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let subject = users::Entity::find_by_id(path.into_inner())
        .into_model::<UserProfile>()
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Member not found."))?;

    let members = get_following(db, subject.id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(FollowListTemplate {
        client,
        subject,
        title: "Following",
        members,
    }
    .to_response())
}
