pub mod comment_likes;
pub mod comments;
pub mod conversation_participants;
pub mod conversations;
pub mod follows;
pub mod messages;
pub mod post_likes;
pub mod posts;
pub mod sessions;
pub mod stories;
pub mod story_views;
pub mod users;
