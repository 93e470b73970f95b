use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::header,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
};
use serde_json::json;
use tokio_stream::StreamExt;

use crate::api::AppState;
use crate::errors::LanternError;
use crate::live::LogEvent;
use crate::models::LogLine;

/// Server-sent events: the full log so far, then live lines, then `end`.
pub async fn stream_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, LanternError> {
    let mut events = state.engine.stream_job(&id).await?;
    let engine = state.engine.clone();

    let stream = async_stream::stream! {
        while let Some(event) = events.next().await {
            match event {
                LogEvent::Line(line) => yield Ok(line_event(&line)),
                LogEvent::Lagged { backlog } => {
                    yield Ok(Event::default().event("lagged").data(json!({"backlog": backlog}).to_string()));
                    return;
                }
                LogEvent::End => {
                    let final_state = engine.job(&id).await.ok().map(|record| record.state);
                    yield Ok(Event::default().event("end").data(json!({"state": final_state}).to_string()));
                    return;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(default_keep_alive()))
}

pub async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LanternError> {
    let lines = state.engine.job_log(&id).await?;
    let body: String = lines.iter().map(|line| line.render() + "\n").collect();
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

fn line_event(line: &LogLine) -> Event {
    let data = json!({
        "seq": line.seq,
        "ts": line.ts.to_rfc3339(),
        "tool": line.tool,
        "stream": line.stream.as_str(),
        "text": line.text,
    });
    Event::default().event("line").id(line.seq.to_string()).data(data.to_string())
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
