//! Blog and portfolio endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::content::{self, BlogPost, ContentError, ContentSource, PortfolioProject, PostFilter};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const RELATED_LIMIT: usize = 3;

#[derive(Debug, Default, Deserialize)]
pub struct PortfolioQuery {
    #[serde(default)]
    pub featured: Option<bool>,
}

fn source(state: &AppState) -> ApiResult<&Arc<dyn ContentSource>> {
    state
        .content
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Content is not available".to_string()))
}

fn upstream(err: ContentError) -> ApiError {
    tracing::error!(error = %err, "Content source request failed");
    ApiError::Upstream("Content is temporarily unavailable".to_string())
}

/// GET /api/blog?category=&tag=&q=
pub async fn list_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
) -> ApiResult<Json<Vec<BlogPost>>> {
    let posts = source(&state)?.list_posts().await.map_err(upstream)?;
    Ok(Json(content::filter_posts(posts, &filter)))
}

/// GET /api/blog/:slug
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<BlogPost>> {
    source(&state)?
        .get_post(&slug)
        .await
        .map_err(upstream)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Post not found: {}", slug)))
}

/// GET /api/blog/:slug/related
pub async fn related_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Vec<BlogPost>>> {
    let posts = source(&state)?.list_posts().await.map_err(upstream)?;
    if !posts.iter().any(|p| p.slug == slug) {
        return Err(ApiError::NotFound(format!("Post not found: {}", slug)));
    }
    Ok(Json(content::related_posts(&posts, &slug, RELATED_LIMIT)))
}

/// GET /api/portfolio?featured=
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<PortfolioQuery>,
) -> ApiResult<Json<Vec<PortfolioProject>>> {
    let projects = source(&state)?.list_projects().await.map_err(upstream)?;
    Ok(Json(content::filter_projects(
        projects,
        query.featured.unwrap_or(false),
    )))
}

/// GET /api/portfolio/:slug
pub async fn get_project(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<PortfolioProject>> {
    source(&state)?
        .get_project(&slug)
        .await
        .map_err(upstream)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Project not found: {}", slug)))
}
