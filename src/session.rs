use crate::global::get_session_time;
use crate::orm::{sessions, users};
use crate::user::ClientUser;
use actix_web::{error, get, Error, HttpResponse, Responder};
use chrono::{NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-process copy of one sessions row.
#[derive(Clone, Copy, Debug)]
pub struct Session {
    pub user_id: i32,
    pub expires_at: NaiveDateTime,
}

impl Session {
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at <= now
    }
}

pub type SessionMap = RwLock<HashMap<Uuid, Session>>;

static SESSION_CACHE: OnceCell<SessionMap> = OnceCell::new();

pub fn init() {
    SESSION_CACHE
        .set(RwLock::new(HashMap::new()))
        .expect("failed to set SESSION_CACHE");
}

#[inline(always)]
pub fn get_sess() -> &'static SessionMap {
    unsafe { SESSION_CACHE.get_unchecked() }
}

/// Replaces the cache with the sessions table. Called once after the pool
/// opens; everything afterwards is kept in sync by the mutators below.
pub async fn reload_session_cache(ses_map: &SessionMap) -> Result<(), DbErr> {
    let results = sessions::Entity::find().all(crate::get_db_pool()).await?;
    let mut map = ses_map.write().unwrap();

    map.clear();
    for row in results {
        if let Ok(uuid) = Uuid::parse_str(&row.id) {
            map.insert(
                uuid,
                Session {
                    user_id: row.user_id,
                    expires_at: row.expires_at,
                },
            );
        }
    }

    Ok(())
}

/// Issues a session for the user: a row for durability, a cache entry for
/// request-time lookups. Returns the token that goes into the cookie.
pub async fn new_session(db: &DatabaseConnection, user_id: i32) -> Result<Uuid, DbErr> {
    let uuid = Uuid::new_v4();
    let expires_at = Utc::now().naive_utc() + *get_session_time();

    sessions::Entity::insert(sessions::ActiveModel {
        id: Set(uuid.to_string()),
        user_id: Set(user_id),
        expires_at: Set(expires_at),
    })
    .exec(db)
    .await?;

    get_sess().write().unwrap().insert(
        uuid,
        Session {
            user_id,
            expires_at,
        },
    );

    Ok(uuid)
}

pub async fn drop_session(db: &DatabaseConnection, uuid: &Uuid) -> Result<(), DbErr> {
    sessions::Entity::delete_many()
        .filter(sessions::Column::Id.eq(uuid.to_string()))
        .exec(db)
        .await?;
    get_sess().write().unwrap().remove(uuid);
    Ok(())
}

/// Cache lookup. Expired entries authenticate nobody even before the prune
/// task removes them.
pub fn get_session_from_cache(uuid: &Uuid) -> Option<Session> {
    let now = Utc::now().naive_utc();
    get_sess()
        .read()
        .unwrap()
        .get(uuid)
        .filter(|session| !session.is_expired_at(now))
        .copied()
}

/// Resolves the cookie token into a user, or None for guests, bad tokens,
/// expired sessions, and sessions naming a user that no longer exists.
pub async fn authenticate_client_by_session(cookies: &actix_session::Session) -> Option<ClientUser> {
    let uuid = cookies
        .get::<String>("token")
        .ok()
        .flatten()
        .and_then(|token| Uuid::parse_str(&token).ok())?;
    let session = get_session_from_cache(&uuid)?;

    match users::Entity::find_by_id(session.user_id)
        .one(crate::get_db_pool())
        .await
    {
        Ok(Some(user)) => Some(ClientUser::from_model(&user)),
        Ok(None) => None,
        Err(e) => {
            log::error!("authenticate_client_by_session: {}", e);
            None
        }
    }
}

/// Removes expired entries from the map and returns how many went away.
pub fn prune_expired(map: &mut HashMap<Uuid, Session>, now: NaiveDateTime) -> usize {
    let before = map.len();
    map.retain(|_, session| !session.is_expired_at(now));
    before - map.len()
}

/// Operational task endpoint: prune expired sessions from cache and table.
#[get("/task/expire-sessions")]
pub async fn view_task_expire_sessions() -> Result<impl Responder, Error> {
    let now = Utc::now().naive_utc();

    let pruned = prune_expired(&mut get_sess().write().unwrap(), now);
    sessions::Entity::delete_many()
        .filter(sessions::Column::ExpiresAt.lte(now))
        .exec(crate::get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().body(format!("Expired {} session(s).", pruned)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_expiring_in(minutes: i64, now: NaiveDateTime) -> Session {
        Session {
            user_id: 1,
            expires_at: now + Duration::minutes(minutes),
        }
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now().naive_utc();
        assert!(session_expiring_in(0, now).is_expired_at(now));
        assert!(session_expiring_in(-5, now).is_expired_at(now));
        assert!(!session_expiring_in(5, now).is_expired_at(now));
    }

    #[test]
    fn prune_removes_only_expired_entries() {
        let now = Utc::now().naive_utc();
        let mut map = HashMap::new();
        map.insert(Uuid::new_v4(), session_expiring_in(-1, now));
        map.insert(Uuid::new_v4(), session_expiring_in(-60, now));
        let live = Uuid::new_v4();
        map.insert(live, session_expiring_in(60, now));

        assert_eq!(prune_expired(&mut map, now), 2);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&live));
    }
}
