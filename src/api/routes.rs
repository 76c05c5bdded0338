// src/api/routes.rs

//! Route handlers.

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::api::error_response::RouteError;
use crate::error::AppError;
use crate::models::{Manga, MangaId, SourceKind};
use crate::services::{Resolution, ResolveOptions};
use crate::utils::cache::{CacheConfig, build_policy};

type RouteResult = std::result::Result<Response, RouteError>;

#[derive(Debug, Default, Deserialize)]
pub struct DetailQuery {
    /// Keep only the first N images
    pub thumbnail: Option<usize>,
    /// Keep only the configured preview length
    #[serde(default)]
    pub preview: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchQuery {
    /// Comma-separated ids
    #[serde(default)]
    pub ids: String,
    /// Fill unresolved ids with the error placeholder
    #[serde(default)]
    pub fallback: bool,
    #[serde(default)]
    pub thumbnail: Option<usize>,
    #[serde(default)]
    pub preview: bool,
}

/// Body of the batch route, in request order.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub items: Vec<Manga>,
    pub missing: Vec<MangaId>,
}

impl AppState {
    fn options(
        &self,
        thumbnail: Option<usize>,
        preview: bool,
    ) -> crate::error::Result<ResolveOptions> {
        match (thumbnail, preview) {
            (Some(0), _) => Err(AppError::validation("thumbnail must be at least 1")),
            (Some(limit), _) => Ok(ResolveOptions::thumbnail(limit)),
            (None, true) => Ok(ResolveOptions::thumbnail(
                self.config.aggregator.thumbnail_length,
            )),
            (None, false) => Ok(ResolveOptions::full()),
        }
    }

    fn route_error(&self, error: AppError, request: impl Into<String>) -> RouteError {
        RouteError {
            unavailable_as_not_found: self.config.server.unavailable_as_not_found,
            not_found_cache: Some(build_policy(&self.config.cache.not_found)),
            ..RouteError::new(error, request)
        }
    }
}

fn cached<T: Serialize>(status: StatusCode, cache: &CacheConfig, body: T) -> Response {
    (status, [(header::CACHE_CONTROL, build_policy(cache))], Json(body)).into_response()
}

/// Parse `1,2,3` into ids, rejecting anything non-numeric.
///
/// Repeated ids are kept for response ordering but count once against `max_batch`.
pub fn parse_ids(raw: &str, max_batch: usize) -> crate::error::Result<Vec<MangaId>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<MangaId>()
                .map_err(|_| AppError::validation(format!("Invalid id '{part}'")))
        })
        .collect::<crate::error::Result<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(AppError::validation("No ids given"));
    }
    let distinct = ids.iter().collect::<HashSet<_>>().len();
    if distinct > max_batch {
        return Err(AppError::validation(format!(
            "At most {max_batch} ids per request, got {distinct}"
        )));
    }
    Ok(ids)
}

/// GET /manga/:id
pub async fn get_manga(
    State(state): State<AppState>,
    Path(id): Path<MangaId>,
    Query(query): Query<DetailQuery>,
) -> RouteResult {
    let request = format!("GET /manga/{id}");
    let options = state
        .options(query.thumbnail, query.preview)
        .map_err(|e| state.route_error(e, request.as_str()))?;

    match state.aggregator.resolve(id, options).await {
        Resolution::Found(manga) => Ok(cached(StatusCode::OK, &state.config.cache.detail, manga)),
        miss => {
            let failures = miss.failures().to_vec();
            let error = miss.into_result(id).err().unwrap_or(AppError::NotFound { id });
            Err(state.route_error(error, request).with_failures(failures))
        }
    }
}

/// GET /manga?ids=1,2,3
pub async fn get_manga_batch(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> RouteResult {
    let request = format!("GET /manga?ids={}", query.ids);
    let ids = parse_ids(&query.ids, state.config.aggregator.max_batch)
        .map_err(|e| state.route_error(e, request.as_str()))?;
    let options = state
        .options(query.thumbnail, query.preview)
        .map_err(|e| state.route_error(e, request.as_str()))?;

    let mut resolved = state.aggregator.resolve_many_detailed(&ids, options).await;

    let mut body = BatchResponse {
        items: Vec::with_capacity(ids.len()),
        missing: Vec::new(),
    };
    for id in ids {
        let Some(resolution) = resolved.remove(&id) else {
            // Duplicate id, already emitted
            continue;
        };
        match resolution {
            Resolution::Found(manga) => body.items.push(manga),
            miss => {
                for failure in miss.failures() {
                    log::warn!("{}: id {} failed on {}", request, id, failure);
                }
                body.missing.push(id);
                if query.fallback {
                    body.items.push(Manga::error_placeholder(id));
                }
            }
        }
    }

    let cache = if body.missing.is_empty() {
        &state.config.cache.detail
    } else {
        &state.config.cache.listing
    };
    Ok(cached(StatusCode::OK, cache, body))
}

/// GET /sources/:source/pages/:page
pub async fn get_source_page(
    State(state): State<AppState>,
    Path((source, page)): Path<(String, u32)>,
) -> RouteResult {
    let request = format!("GET /sources/{source}/pages/{page}");
    let kind: SourceKind = source
        .parse()
        .map_err(|e| state.route_error(e, request.as_str()))?;

    let items = state
        .aggregator
        .fetch_page(kind, page)
        .await
        .map_err(|e| state.route_error(e, request.as_str()))?;
    Ok(cached(StatusCode::OK, &state.config.cache.listing, items))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Response {
    let report = state.health.run().await;
    let status = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    cached(status, &state.config.cache.health, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("1, 2,3,", 10).unwrap(), vec![1, 2, 3]);
        assert!(parse_ids("", 10).is_err());
        assert!(parse_ids("1,abc", 10).is_err());
        assert!(parse_ids("1,2,3", 2).is_err());
    }

    #[test]
    fn test_parse_ids_counts_distinct_ids() {
        assert_eq!(parse_ids("1,1,1", 2).unwrap(), vec![1, 1, 1]);
        assert_eq!(parse_ids("4,5,4", 2).unwrap(), vec![4, 5, 4]);
        assert!(parse_ids("4,5,6,4", 2).is_err());
    }
}
