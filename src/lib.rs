pub mod comment;
pub mod create_user;
pub mod db;
pub mod explore;
pub mod filesystem;
pub mod follow;
pub mod frontend;
pub mod global;
pub mod index;
pub mod live;
pub mod login;
pub mod logout;
pub mod member;
pub mod message;
pub mod middleware;
pub mod notifications;
pub mod orm;
pub mod post;
pub mod reels;
pub mod s3;
pub mod session;
pub mod story;
pub mod url;
pub mod user;
pub mod web;

pub use db::{get_db_pool, init_db};
