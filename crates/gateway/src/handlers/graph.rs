//! Live graph handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{debug, warn};
use validator::Validate;

use crate::state::AppState;
use citegraph_common::{
    errors::{AppError, Result},
    Depth, GraphData,
};

/// Request to change the traversal depth of the live graph
#[derive(Debug, Deserialize, Validate)]
pub struct SetDepthRequest {
    #[validate(range(min = 1))]
    pub depth: Depth,
}

#[derive(Debug, Serialize)]
pub struct DepthChangeAccepted {
    pub paper_id: String,
    pub from: Depth,
    pub to: Depth,
}

#[derive(Serialize)]
pub struct GraphResponse {
    pub paper_id: Option<String>,
    /// Depth last requested
    pub depth: Option<Depth>,
    /// Depth shown in full, null while a change is revealing
    pub shown_depth: Option<Depth>,
    pub graph: GraphData,
    pub last_error: Option<String>,
}

/// Start a depth change.
///
/// The change runs in the background; its progress shows up on the live
/// graph. A newer request supersedes one still revealing, and changes take
/// effect in the order they were accepted.
pub async fn set_depth(
    State(state): State<AppState>,
    Json(request): Json<SetDepthRequest>,
) -> Result<(StatusCode, Json<DepthChangeAccepted>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("depth".to_string()),
    })?;

    let max_depth = state.builder.max_depth();
    if request.depth > max_depth {
        return Err(AppError::Validation {
            message: format!("depth must be at most {}", max_depth),
            field: Some("depth".to_string()),
        });
    }

    let to = request.depth;
    let (paper_id, from, ticket, token) = {
        let mut session = state.session.write().await;
        let session = session.as_mut().ok_or(AppError::NoActiveDocument)?;
        let from = session.depth;
        if from == to {
            return Ok((
                StatusCode::ACCEPTED,
                Json(DepthChangeAccepted {
                    paper_id: session.paper.paper_id.clone(),
                    from,
                    to,
                }),
            ));
        }
        session.depth = to;
        session.changes += 1;
        session.last_error = None;
        // Taken under the session lock so tokens follow request order
        let token = state.live.begin();
        (session.paper.paper_id.clone(), from, session.changes, token)
    };

    let accepted = DepthChangeAccepted {
        paper_id: paper_id.clone(),
        from,
        to,
    };

    tokio::spawn(async move {
        match state
            .builder
            .change_depth_with(&state.live, token, &paper_id, to)
            .await
        {
            Ok(change) => debug!(?change, "Depth change finished"),
            Err(e) => {
                warn!(paper_id = %paper_id, from, to, error = %e, "Depth change failed");
                let mut session = state.session.write().await;
                // A newer request owns the session depth
                if let Some(session) = session
                    .as_mut()
                    .filter(|s| s.paper.paper_id == paper_id && s.changes == ticket)
                {
                    session.depth = from;
                    session.last_error = Some(e.to_string());
                }
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// The graph currently shown
pub async fn get_graph(State(state): State<AppState>) -> Json<GraphResponse> {
    let session = state.session.read().await;
    Json(GraphResponse {
        paper_id: session.as_ref().map(|s| s.paper.paper_id.clone()),
        depth: session.as_ref().map(|s| s.depth),
        shown_depth: state.live.depth(),
        graph: state.live.snapshot(),
        last_error: session.as_ref().and_then(|s| s.last_error.clone()),
    })
}

/// Server-sent events carrying every snapshot published to the display,
/// starting with the current one
pub async fn graph_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.sink.subscribe();
    let stream = futures::stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let snapshot = rx.borrow_and_update().clone();
        let event = Event::default()
            .event("graph")
            .json_data(&snapshot)
            .unwrap_or_else(|_| Event::default().event("error"));
        Some((Ok(event), (rx, false)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
