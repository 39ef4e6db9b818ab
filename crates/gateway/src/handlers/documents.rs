//! Document handlers
//!
//! Opening a document resolves its paper, resets the live graph to the
//! depth-1 graph and starts a new session. Opening a document that has no
//! graph leaves the current session untouched.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use validator::Validate;

use crate::state::{AppState, Session};
use citegraph_common::{
    errors::{AppError, Result},
    Depth, GraphData, PaperRecord, ROOT_DEPTH,
};
use citegraph_graph::{Document, DocumentMetadata, PdfDocument};

/// Request to open a document, by PDF path or by declared title
#[derive(Debug, Deserialize, Validate)]
pub struct OpenDocumentRequest {
    #[validate(length(min = 1, max = 4096))]
    pub path: Option<String>,

    #[validate(length(min = 1, max = 1000))]
    pub title: Option<String>,
}

#[derive(Serialize)]
pub struct OpenDocumentResponse {
    pub paper: PaperRecord,
    pub depth: Depth,
    /// Served from the depth cache
    pub cached: bool,
    pub graph: GraphData,
}

/// Open a document and show its depth-1 graph
pub async fn open_document(
    State(state): State<AppState>,
    Json(request): Json<OpenDocumentRequest>,
) -> Result<Json<OpenDocumentResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let document: Box<dyn Document> = match (request.path, request.title) {
        (Some(path), _) => Box::new(load_pdf(PathBuf::from(path)).await?),
        (None, Some(title)) => Box::new(DocumentMetadata::titled(title)),
        (None, None) => {
            return Err(AppError::Validation {
                message: "either path or title is required".to_string(),
                field: None,
            })
        }
    };

    let root = state.builder.resolve_root_graph(document.as_ref()).await?;

    {
        let mut session = state.session.write().await;
        let token = state.live.begin();
        state.live.reset(root.graph.clone(), &token);
        state.live.settle(Some(ROOT_DEPTH), &token);
        *session = Some(Session::new(root.paper.clone()));
    }

    info!(
        paper_id = %root.paper.paper_id,
        cached = root.cached,
        nodes = root.graph.node_count(),
        "Document opened"
    );

    Ok(Json(OpenDocumentResponse {
        paper: root.paper,
        depth: ROOT_DEPTH,
        cached: root.cached,
        graph: root.graph,
    }))
}

async fn load_pdf(path: PathBuf) -> Result<PdfDocument> {
    tokio::task::spawn_blocking(move || PdfDocument::open(&path))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("PDF loader task failed: {}", e),
        })?
}
