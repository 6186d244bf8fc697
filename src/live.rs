use crate::middleware::ClientCtx;
use actix_web::{get, Responder};
use askama_actix::{Template, TemplateToResponse};

/// A sample stream card. The live page is a placeholder with no transport
/// behind it; these entries are hard-coded display data, not rows.
pub struct SampleStream {
    pub title: &'static str,
    pub streamer: &'static str,
    pub viewers: u32,
    pub is_live: bool,
    pub description: &'static str,
}

const SAMPLE_STREAMS: &[SampleStream] = &[
    SampleStream {
        title: "Late Night Chill Beats & Coding",
        streamer: "AlexCodes",
        viewers: 1240,
        is_live: true,
        description: "Relaxing beats to code to. Feel free to ask any dev questions!",
    },
    SampleStream {
        title: "Extreme Mountain Biking",
        streamer: "MountainMike",
        viewers: 3500,
        is_live: true,
        description: "Downhill madness in the Alps. Don't blink!",
    },
    SampleStream {
        title: "Morning Yoga and Meditation",
        streamer: "ZenMaster",
        viewers: 850,
        is_live: true,
        description: "Start your day with peace and mindfulness.",
    },
    SampleStream {
        title: "Indie Game Development Log #42",
        streamer: "PixelPioneer",
        viewers: 0,
        is_live: false,
        description: "Recording of my latest workshop on procedural generation.",
    },
];

#[derive(Template)]
#[template(path = "live.html")]
pub struct LiveTemplate {
    pub client: ClientCtx,
    pub streams: &'static [SampleStream],
}

#[get("/live")]
pub async fn view_live(client: ClientCtx) -> impl Responder {
    LiveTemplate {
        client,
        streams: SAMPLE_STREAMS,
    }
    .to_response()
}
