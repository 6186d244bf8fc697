use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::users;
use crate::session::new_session;
use actix_session::Session;
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::{entity::*, query::*};
use serde::Deserialize;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub client: ClientCtx,
}

#[derive(Deserialize)]
pub struct FormData {
    pub email: String,
    pub password: String,
}

/// Verifies a password against a stored PHC string.
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("verify_password: malformed stored hash: {}", e);
            false
        }
    }
}

#[get("/login")]
pub async fn view_login(client: ClientCtx) -> impl Responder {
    LoginTemplate { client }.to_response()
}

#[post("/login")]
pub async fn post_login(
    cookies: Session,
    form: web::Form<FormData>,
) -> Result<HttpResponse, Error> {
    let db = get_db_pool();

    let user = users::Entity::find()
        .filter(users::Column::Email.eq(form.email.trim().to_owned()))
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorUnauthorized("Invalid credentials."))?;

    // Provider-created accounts have no password and cannot use this form.
    let stored_hash = user
        .password
        .as_deref()
        .ok_or_else(|| error::ErrorUnauthorized("Invalid credentials."))?;
    if !verify_password(stored_hash, &form.password) {
        return Err(error::ErrorUnauthorized("Invalid credentials."));
    }

    let token = new_session(db, user.id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    cookies
        .insert("token", token.to_string())
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", "/"))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::{
        password_hash::{rand_core::OsRng, SaltString},
        PasswordHasher,
    };

    #[test]
    fn round_trip_verifies_and_rejects() {
        let hash = Argon2::default()
            .hash_password(b"hunter2", &SaltString::generate(&mut OsRng))
            .unwrap()
            .to_string();

        assert!(verify_password(&hash, "hunter2"));
        assert!(!verify_password(&hash, "hunter3"));
        assert!(!verify_password("not a phc string", "hunter2"));
    }
}
