pub mod error;

/// Configures the web app
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(crate::index::view_index)
        .service(crate::create_user::create_user_get)
        .service(crate::create_user::create_user_post)
        .service(crate::login::view_login)
        .service(crate::login::post_login)
        .service(crate::logout::view_logout)
        .service(crate::member::view_account)
        .service(crate::member::update_account)
        .service(crate::member::update_avatar)
        .service(crate::member::view_members)
        .service(crate::member::view_member)
        .service(crate::follow::create_follow)
        .service(crate::follow::destroy_follow)
        .service(crate::follow::view_followers)
        .service(crate::follow::view_following)
        .service(crate::post::create_post)
        .service(crate::post::view_post)
        .service(crate::post::edit_post)
        .service(crate::post::update_post)
        .service(crate::post::delete_post)
        .service(crate::post::destroy_post)
        .service(crate::post::like_post)
        .service(crate::comment::create_comment)
        .service(crate::comment::update_comment)
        .service(crate::comment::destroy_comment)
        .service(crate::comment::react_to_comment)
        .service(crate::story::create_story)
        .service(crate::story::view_story)
        .service(crate::story::track_story_view)
        .service(crate::story::view_story_viewers)
        .service(crate::story::destroy_story)
        .service(crate::message::view_conversations)
        .service(crate::message::create_conversation)
        .service(crate::message::view_conversation)
        .service(crate::message::create_message)
        .service(crate::explore::view_explore)
        .service(crate::reels::view_reels)
        .service(crate::live::view_live)
        .service(crate::notifications::view_notifications)
        .service(crate::session::view_task_expire_sessions);
}
