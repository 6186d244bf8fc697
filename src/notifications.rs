use crate::middleware::ClientCtx;
use actix_web::{get, Responder};
use askama_actix::{Template, TemplateToResponse};

/// Sample notification rows. There is no notifications table; this page
/// renders fixed display data, matching the rest of the placeholder chrome.
pub struct SampleNotification {
    pub kind: &'static str,
    pub sender: &'static str,
    pub detail: &'static str,
    pub timestamp: &'static str,
}

const THIS_MONTH: &[SampleNotification] = &[SampleNotification {
    kind: "like",
    sender: "karelys.c24",
    detail: "and 859 others liked your post.",
    timestamp: "06 Jan",
}];

const EARLIER: &[SampleNotification] = &[SampleNotification {
    kind: "follow",
    sender: "praney_meraki",
    detail: "started following you.",
    timestamp: "13 Dec",
}];

#[derive(Template)]
#[template(path = "notifications.html")]
pub struct NotificationsTemplate {
    pub client: ClientCtx,
    pub this_month: &'static [SampleNotification],
    pub earlier: &'static [SampleNotification],
}

#[get("/notifications")]
pub async fn view_notifications(client: ClientCtx) -> impl Responder {
    NotificationsTemplate {
        client,
        this_month: THIS_MONTH,
        earlier: EARLIER,
    }
    .to_response()
}
