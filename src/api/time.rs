//! Server clock, as a JSON document or a WebSocket stream.

use axum::{
    extract::{ws::rejection::WebSocketUpgradeRejection, State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Datelike, Local, SecondsFormat, TimeZone, Timelike};
use serde::Serialize;

use crate::server::AppState;

use super::stream::{push_every, wants_upgrade};

const FORMATTED: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize)]
pub struct TimeUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: String,
    pub formatted: String,
    pub unix: i64,
}

#[derive(Debug, Serialize)]
pub struct TimeComponents {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

#[derive(Debug, Serialize)]
pub struct CurrentTime {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: String,
    pub formatted: String,
    pub unix: i64,
    pub timezone: String,
    pub day: String,
    pub date: String,
    pub time: String,
    pub components: TimeComponents,
}

impl TimeUpdate {
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            kind: "timeUpdate",
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            formatted: now.format(FORMATTED).to_string(),
            unix: now.timestamp(),
        }
    }
}

impl CurrentTime {
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            kind: "currentTime",
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            formatted: now.format(FORMATTED).to_string(),
            unix: now.timestamp(),
            timezone: now.offset().to_string(),
            day: now.format("%A").to_string(),
            date: now.format("%B %-d, %Y").to_string(),
            time: now.format("%-I:%M:%S %p").to_string(),
            components: TimeComponents {
                year: now.year(),
                month: now.month(),
                day: now.day(),
                hour: now.hour(),
                minute: now.minute(),
                second: now.second(),
            },
        }
    }
}

/// GET /api/time
pub async fn time(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(ws) => {
            let period = state.settings.hub.status_interval();
            ws.on_upgrade(move |socket| {
                push_every(socket, period, || async { TimeUpdate::at(&Local::now()) })
            })
        }
        Err(rejection) if wants_upgrade(&headers) => rejection.into_response(),
        Err(_) => Json(CurrentTime::at(&Local::now())).into_response(),
    }
}
