use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::users;
use crate::session::new_session;
use actix_session::Session;
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use askama_actix::{Template, TemplateToResponse};
use chrono::Utc;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr, InsertResult};
use serde::Deserialize;

#[derive(Template)]
#[template(path = "create_user.html")]
pub struct CreateUserTemplate {
    pub client: ClientCtx,
}

#[derive(Deserialize)]
pub struct FormData {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub struct Registration {
    pub name: Option<String>,
    pub email: String,
}

/// Email and password are required; the display name is not.
pub fn validate_registration(name: &str, email: &str, password: &str) -> Result<Registration, Error> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(error::ErrorUnprocessableEntity(
            "Email and password are required.",
        ));
    }

    let name = name.trim();
    Ok(Registration {
        name: if name.is_empty() {
            None
        } else {
            Some(name.to_owned())
        },
        email: email.to_owned(),
    })
}

async fn insert_new_user(
    db: &DatabaseConnection,
    registration: &Registration,
    password_hash: &str,
) -> Result<InsertResult<users::ActiveModel>, DbErr> {
    users::Entity::insert(users::ActiveModel {
        name: Set(registration.name.to_owned()),
        email: Set(registration.email.to_owned()),
        password: Set(Some(password_hash.to_owned())),
        show_joined_date: Set(true),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    })
    .exec(db)
    .await
}

#[get("/register")]
pub async fn create_user_get(client: ClientCtx) -> impl Responder {
    CreateUserTemplate { client }.to_response()
}

#[post("/register")]
pub async fn create_user_post(
    cookies: Session,
    form: web::Form<FormData>,
) -> Result<HttpResponse, Error> {
    let db = get_db_pool();
    let registration = validate_registration(&form.name, &form.email, &form.password)?;

    let existing = users::Entity::find()
        .filter(users::Column::Email.eq(registration.email.to_owned()))
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?;
    if existing.is_some() {
        return Err(error::ErrorUnprocessableEntity(
            "An account with that email already exists.",
        ));
    }

    let password_hash = Argon2::default()
        .hash_password(
            form.password.as_bytes(),
            &SaltString::generate(&mut OsRng),
        )
        .map_err(|e| {
            log::error!("create_user_post: hash_password: {}", e);
            error::ErrorInternalServerError("Failed to create account.")
        })?
        .to_string();

    let result = insert_new_user(db, &registration, &password_hash)
        .await
        .map_err(|e| {
            log::error!("create_user_post: {}", e);
            error::ErrorInternalServerError("Failed to create account.")
        })?;

    // Auto-login after registration.
    let token = new_session(db, result.last_insert_id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    cookies
        .insert("token", token.to_string())
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", "/account"))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_and_password_are_required() {
        assert!(validate_registration("", "", "hunter2").is_err());
        assert!(validate_registration("", "a@b.c", "").is_err());
        assert!(validate_registration("", " a@b.c ", "hunter2").is_ok());
    }

    #[test]
    fn display_name_is_optional_and_trimmed() {
        let r = validate_registration("  ", "a@b.c", "pw").unwrap();
        assert_eq!(r.name, None);
        let r = validate_registration(" Alice ", "a@b.c", "pw").unwrap();
        assert_eq!(r.name, Some("Alice".to_owned()));
        assert_eq!(r.email, "a@b.c");
    }
}
