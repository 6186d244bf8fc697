use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::{conversation_participants, conversations, messages, users};
use crate::user::UserProfile;
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use askama_actix::{Template, TemplateToResponse};
use chrono::{NaiveDateTime, Utc};
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection, DbErr, FromQueryResult};
use serde::Deserialize;
use std::collections::HashMap;

/// Inbox row: the conversation, whoever is on the other side, the latest
/// message, and how many of theirs the client has not read.
pub struct ConversationForTemplate {
    pub id: i32,
    pub updated_at: NaiveDateTime,
    pub other: Option<UserProfile>,
    pub preview: Option<String>,
    pub unread_count: i64,
}

impl ConversationForTemplate {
    pub fn other_display_name(&self) -> String {
        match &self.other {
            Some(other) => other.display_name(),
            None => "User".to_owned(),
        }
    }

    pub fn other_avatar(&self) -> String {
        match &self.other {
            Some(other) => other.avatar(),
            None => crate::user::avatar_or_default(None, ""),
        }
    }

    pub fn preview_or_empty(&self) -> &str {
        self.preview.as_deref().unwrap_or_default()
    }

    pub fn timestamp(&self) -> String {
        crate::frontend::relative_time(self.updated_at, Utc::now().naive_utc())
    }
}

#[derive(Debug, FromQueryResult)]
struct MessageRow {
    id: i32,
    sender_id: i32,
    content: String,
    created_at: NaiveDateTime,
    sender_name: Option<String>,
    sender_email: Option<String>,
    sender_image: Option<String>,
}

/// One bubble in the thread.
pub struct MessageForTemplate {
    pub id: i32,
    pub sender_id: i32,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub sender_display_name: String,
    pub sender_avatar: String,
    pub own: bool,
}

impl MessageForTemplate {
    fn from_row(row: MessageRow, client_id: i32) -> Self {
        let email = row.sender_email.as_deref().unwrap_or_default();
        Self {
            id: row.id,
            sender_id: row.sender_id,
            sender_display_name: crate::user::display_name(row.sender_name.as_deref(), email),
            sender_avatar: crate::user::avatar_or_default(row.sender_image.as_deref(), email),
            own: row.sender_id == client_id,
            content: row.content,
            created_at: row.created_at,
        }
    }

    pub fn timestamp(&self) -> String {
        crate::frontend::relative_time(self.created_at, Utc::now().naive_utc())
    }
}

/// A message counts as unread when the other side sent it after the
/// client's last visit to the thread.
pub fn is_unread(
    sender_id: i32,
    created_at: NaiveDateTime,
    client_id: i32,
    last_read_at: Option<NaiveDateTime>,
) -> bool {
    if sender_id == client_id {
        return false;
    }
    match last_read_at {
        Some(last_read_at) => created_at > last_read_at,
        None => true,
    }
}

#[derive(Template)]
#[template(path = "messages.html")]
pub struct ConversationListTemplate {
    pub client: ClientCtx,
    pub conversations: Vec<ConversationForTemplate>,
}

#[derive(Template)]
#[template(path = "message_thread.html")]
pub struct MessageThreadTemplate {
    pub client: ClientCtx,
    pub conversation_id: i32,
    pub other: Option<UserProfile>,
    pub messages: Vec<MessageForTemplate>,
}

impl MessageThreadTemplate {
    pub fn other_display_name(&self) -> String {
        match &self.other {
            Some(other) => other.display_name(),
            None => "User".to_owned(),
        }
    }
}

#[derive(Deserialize)]
pub struct NewConversationFormData {
    pub member_id: i32,
}

#[derive(Deserialize)]
pub struct NewMessageFormData {
    pub content: String,
}

async fn participant_for(
    db: &DatabaseConnection,
    conversation_id: i32,
    user_id: i32,
) -> Result<Option<conversation_participants::Model>, DbErr> {
    conversation_participants::Entity::find()
        .filter(conversation_participants::Column::ConversationId.eq(conversation_id))
        .filter(conversation_participants::Column::UserId.eq(user_id))
        .one(db)
        .await
}

#[derive(Debug, FromQueryResult)]
struct OtherParticipantRow {
    conversation_id: i32,
    id: Option<i32>,
    name: Option<String>,
    email: Option<String>,
    image: Option<String>,
}

/// The other member of each 1:1 conversation, keyed by conversation.
async fn get_other_participants(
    db: &DatabaseConnection,
    conversation_ids: &[i32],
    client_id: i32,
) -> Result<HashMap<i32, UserProfile>, DbErr> {
    if conversation_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<OtherParticipantRow> = conversation_participants::Entity::find()
        .select_only()
        .column(conversation_participants::Column::ConversationId)
        .left_join(users::Entity)
        .column_as(users::Column::Id, "id")
        .column_as(users::Column::Name, "name")
        .column_as(users::Column::Email, "email")
        .column_as(users::Column::Image, "image")
        .filter(conversation_participants::Column::ConversationId.is_in(conversation_ids.to_owned()))
        .filter(conversation_participants::Column::UserId.ne(client_id))
        .into_model::<OtherParticipantRow>()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id?;
            Some((
                row.conversation_id,
                UserProfile {
                    id,
                    name: row.name,
                    email: row.email.unwrap_or_default(),
                    image: row.image,
                },
            ))
        })
        .collect())
}

#[get("/messages")]
pub async fn view_conversations(client: ClientCtx) -> Result<impl Responder, Error> {
    let client_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let db = get_db_pool();

    let my_rows = conversation_participants::Entity::find()
        .filter(conversation_participants::Column::UserId.eq(client_id))
        .all(db)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let last_read: HashMap<i32, Option<NaiveDateTime>> = my_rows
        .iter()
        .map(|p| (p.conversation_id, p.last_read_at))
        .collect();
    let conversation_ids: Vec<i32> = my_rows.iter().map(|p| p.conversation_id).collect();

    let conversation_rows = if conversation_ids.is_empty() {
        Vec::new()
    } else {
        conversations::Entity::find()
            .filter(conversations::Column::Id.is_in(conversation_ids.clone()))
            .order_by_desc(conversations::Column::UpdatedAt)
            .all(db)
            .await
            .map_err(error::ErrorInternalServerError)?
    };

    let mut others = get_other_participants(db, &conversation_ids, client_id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    // Latest message and unread tallies in one newest-first pass.
    let message_rows = if conversation_ids.is_empty() {
        Vec::new()
    } else {
        messages::Entity::find()
            .filter(messages::Column::ConversationId.is_in(conversation_ids))
            .order_by_desc(messages::Column::CreatedAt)
            .all(db)
            .await
            .map_err(error::ErrorInternalServerError)?
    };
    let mut previews: HashMap<i32, String> = HashMap::new();
    let mut unread: HashMap<i32, i64> = HashMap::new();
    for row in message_rows {
        previews
            .entry(row.conversation_id)
            .or_insert_with(|| row.content.clone());
        let last_read_at = last_read.get(&row.conversation_id).copied().flatten();
        if is_unread(row.sender_id, row.created_at, client_id, last_read_at) {
            *unread.entry(row.conversation_id).or_insert(0) += 1;
        }
    }

    let conversations = conversation_rows
        .into_iter()
        .map(|conv| ConversationForTemplate {
            id: conv.id,
            updated_at: conv.updated_at,
            other: others.remove(&conv.id),
            preview: previews.remove(&conv.id),
            unread_count: unread.get(&conv.id).copied().unwrap_or(0),
        })
        .collect();

    Ok(ConversationListTemplate {
        client,
        conversations,
    }
    .to_response())
}

/// Get-or-create the 1:1 conversation with another member, then land in it.
#[post("/messages")]
pub async fn create_conversation(
    client: ClientCtx,
    form: web::Form<NewConversationFormData>,
) -> Result<impl Responder, Error> {
    let client_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let db = get_db_pool();

    if client_id == form.member_id {
        return Err(error::ErrorUnprocessableEntity(
            "You cannot message yourself.",
        ));
    }

    users::Entity::find_by_id(form.member_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Member not found."))?;

    let mine: Vec<i32> = conversation_participants::Entity::find()
        .filter(conversation_participants::Column::UserId.eq(client_id))
        .all(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .into_iter()
        .map(|p| p.conversation_id)
        .collect();

    let existing = if mine.is_empty() {
        None
    } else {
        conversation_participants::Entity::find()
            .filter(conversation_participants::Column::UserId.eq(form.member_id))
            .filter(conversation_participants::Column::ConversationId.is_in(mine))
            .one(db)
            .await
            .map_err(error::ErrorInternalServerError)?
    };

    let conversation_id = match existing {
        Some(participant) => participant.conversation_id,
        None => {
            let now = Utc::now().naive_utc();
            let txn = db.begin().await.map_err(error::ErrorInternalServerError)?;

            let conversation = conversations::Entity::insert(conversations::ActiveModel {
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            })
            .exec(&txn)
            .await
            .map_err(error::ErrorInternalServerError)?;

            for user_id in [client_id, form.member_id] {
                conversation_participants::Entity::insert(
                    conversation_participants::ActiveModel {
                        conversation_id: Set(conversation.last_insert_id),
                        user_id: Set(user_id),
                        last_read_at: Set(None),
                        created_at: Set(now),
                        ..Default::default()
                    },
                )
                .exec(&txn)
                .await
                .map_err(error::ErrorInternalServerError)?;
            }

            txn.commit().await.map_err(error::ErrorInternalServerError)?;
            conversation.last_insert_id
        }
    };

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/messages/{}", conversation_id)))
        .finish())
}

#[get("/messages/{conversation_id}")]
pub async fn view_conversation(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let client_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let db = get_db_pool();
    let conversation_id = path.into_inner();

    let participant = participant_for(db, conversation_id, client_id)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| {
            error::ErrorForbidden("You are not a participant in this conversation.")
        })?;

    let rows: Vec<MessageRow> = messages::Entity::find()
        .left_join(users::Entity)
        .column_as(users::Column::Name, "sender_name")
        .column_as(users::Column::Email, "sender_email")
        .column_as(users::Column::Image, "sender_image")
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .order_by_asc(messages::Column::CreatedAt)
        .into_model::<MessageRow>()
        .all(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    // Opening the thread marks it read.
    conversation_participants::Entity::update_many()
        .col_expr(
            conversation_participants::Column::LastReadAt,
            Expr::value(Some(Utc::now().naive_utc())),
        )
        .filter(conversation_participants::Column::Id.eq(participant.id))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    let mut others = get_other_participants(db, &[conversation_id], client_id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(MessageThreadTemplate {
        client,
        conversation_id,
        other: others.remove(&conversation_id),
        messages: rows
            .into_iter()
            .map(|row| MessageForTemplate::from_row(row, client_id))
            .collect(),
    }
    .to_response())
}

#[post("/messages/{conversation_id}")]
pub async fn create_message(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Form<NewMessageFormData>,
) -> Result<impl Responder, Error> {
    let client_id = client
        .get_id()
        .ok_or_else(|| error::ErrorUnauthorized("You must be logged in to do that."))?;
    let db = get_db_pool();
    let conversation_id = path.into_inner();

    participant_for(db, conversation_id, client_id)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| {
            error::ErrorForbidden("You are not a participant in this conversation.")
        })?;

    let content = form.content.trim().to_owned();
    if content.is_empty() {
        return Err(error::ErrorUnprocessableEntity("Message cannot be empty."));
    }

    let now = Utc::now().naive_utc();
    messages::Entity::insert(messages::ActiveModel {
        conversation_id: Set(conversation_id),
        sender_id: Set(client_id),
        content: Set(content),
        created_at: Set(now),
        ..Default::default()
    })
    .exec(db)
    .await
    .map_err(error::ErrorInternalServerError)?;

    conversations::Entity::update_many()
        .col_expr(conversations::Column::UpdatedAt, Expr::value(now))
        .filter(conversations::Column::Id.eq(conversation_id))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Found()
        .append_header(("Location", format!("/messages/{}", conversation_id)))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd(2024, 6, 1).and_hms(12, 0, 0)
    }

    #[test]
    fn own_messages_are_never_unread() {
        let now = noon();
        assert!(!is_unread(7, now, 7, None));
    }

    #[test]
    fn unread_follows_last_read_at() {
        let now = noon();
        assert!(is_unread(2, now, 7, None));
        assert!(is_unread(2, now, 7, Some(now - Duration::minutes(5))));
        assert!(!is_unread(2, now - Duration::minutes(10), 7, Some(now)));
    }
}
