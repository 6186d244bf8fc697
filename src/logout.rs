use crate::db::get_db_pool;
use crate::session::drop_session;
use actix_session::Session;
use actix_web::{get, HttpResponse, Responder};
use uuid::Uuid;

/// Ends the session on both sides: the row/cache entry and the cookie.
#[get("/logout")]
pub async fn view_logout(cookies: Session) -> impl Responder {
    if let Ok(Some(token)) = cookies.get::<String>("token") {
        if let Ok(uuid) = Uuid::parse_str(&token) {
            if let Err(e) = drop_session(get_db_pool(), &uuid).await {
                log::error!("view_logout: drop_session: {}", e);
            }
        }
    }
    cookies.purge();

    HttpResponse::Found()
        .append_header(("Location", "/"))
        .finish()
}
