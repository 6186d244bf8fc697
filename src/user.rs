use crate::orm::users;
use sea_orm::FromQueryResult;

/// A mini struct for holding only what information we need about a client.
#[derive(Clone, Debug, FromQueryResult)]
pub struct ClientUser {
    pub id: i32,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

impl ClientUser {
    pub fn from_model(user: &users::Model) -> Self {
        Self {
            id: user.id,
            name: user.name.to_owned(),
            email: user.email.to_owned(),
            image: user.image.to_owned(),
        }
    }

    pub fn display_name(&self) -> String {
        display_name(self.name.as_deref(), &self.email)
    }

    pub fn avatar(&self) -> String {
        avatar_or_default(self.image.as_deref(), &self.email)
    }

    pub fn handle(&self) -> String {
        handle_from_email(&self.email)
    }
}

/// Directory/list chip: just enough of a user to render a row.
#[derive(Clone, Debug, FromQueryResult)]
pub struct UserProfile {
    pub id: i32,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        display_name(self.name.as_deref(), &self.email)
    }

    pub fn handle(&self) -> String {
        handle_from_email(&self.email)
    }

    pub fn avatar(&self) -> String {
        avatar_or_default(self.image.as_deref(), &self.email)
    }
}

/// The handle is the local part of the email address.
pub fn handle_from_email(email: &str) -> String {
    let handle = email.split('@').next().unwrap_or_default();
    if handle.is_empty() {
        "user".to_owned()
    } else {
        handle.to_owned()
    }
}

/// Display name falls back to the handle, then to a generic noun.
pub fn display_name(name: Option<&str>, email: &str) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name.to_owned(),
        _ => handle_from_email(email),
    }
}

/// Accounts without an uploaded avatar get a deterministic placeholder from
/// the external avatar service, seeded by the email so it is stable.
pub fn avatar_or_default(image: Option<&str>, email: &str) -> String {
    match image {
        Some(url) if !url.is_empty() => url.to_owned(),
        _ => format!("https://api.dicebear.com/7.x/avataaars/svg?seed={}", email),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_the_email_local_part() {
        assert_eq!(handle_from_email("alice@example.com"), "alice");
        assert_eq!(handle_from_email("bob"), "bob");
        assert_eq!(handle_from_email(""), "user");
        assert_eq!(handle_from_email("@example.com"), "user");
    }

    #[test]
    fn display_name_falls_back_to_handle() {
        assert_eq!(display_name(Some("Alice"), "alice@example.com"), "Alice");
        assert_eq!(display_name(Some("  "), "alice@example.com"), "alice");
        assert_eq!(display_name(None, "alice@example.com"), "alice");
    }

    #[test]
    fn avatar_falls_back_to_placeholder_service() {
        assert_eq!(
            avatar_or_default(Some("https://cdn.test/a.png"), "a@b.c"),
            "https://cdn.test/a.png"
        );
        let fallback = avatar_or_default(None, "a@b.c");
        assert!(fallback.contains("dicebear"));
        assert!(fallback.ends_with("seed=a@b.c"));
        assert_eq!(avatar_or_default(Some(""), "a@b.c"), fallback);
    }
}
