//! The table of credential-injected routes.
//!
//! Every row here is forwarded with the backend credential attached and has
//! its failures rewritten to `{"error": ...}`. Rows marked `prefixed` are
//! served by the backend under the upstream prefix. Any other path under the
//! public prefix falls through to [`super::proxy::pass_through`], which
//! injects nothing.

use axum::{
    Json,
    body::Body,
    extract::{
        Path, RawQuery, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, Method},
    routing::{MethodFilter, MethodRouter, on},
};
use serde_json::Value;

use super::{SharedState, handlers};
use crate::data_models::{ChatParams, SearchParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Delete,
}

impl Verb {
    pub fn method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Delete => Method::DELETE,
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
            Verb::Delete => MethodFilter::DELETE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    ListDocuments,
    CreateDocument,
    GetDocument,
    DeleteDocument,
    ReindexDocument,
    Search,
    Chat,
}

#[derive(Debug)]
pub struct RouteRule {
    pub verb: Verb,
    /// Inbound path, relative to the public prefix.
    pub path: &'static str,
    /// Backend path; `{id}` is replaced with the path parameter.
    pub upstream: &'static str,
    /// Whether the backend serves this path under the upstream prefix.
    pub prefixed: bool,
    pub forwards_query: bool,
    pub endpoint: Endpoint,
}

impl RouteRule {
    /// Backend path segments, unencoded. `{id}` becomes a single segment.
    pub fn upstream_segments(&self, upstream_prefix: &str, id: Option<&str>) -> Vec<String> {
        let prefix = if self.prefixed { upstream_prefix } else { "" };
        prefix
            .split('/')
            .chain(self.upstream.split('/'))
            .filter(|segment| !segment.is_empty())
            .map(|segment| match (segment, id) {
                ("{id}", Some(id)) => id.to_string(),
                _ => segment.to_string(),
            })
            .collect()
    }
}

/// Ids that would be resolved as dot segments instead of sent as a name.
pub fn is_dot_segment(id: &str) -> bool {
    id == "." || id == ".."
}

pub static ROUTES: &[RouteRule] = &[
    RouteRule {
        verb: Verb::Get,
        path: "/health",
        upstream: "/health",
        prefixed: false,
        forwards_query: false,
        endpoint: Endpoint::Health,
    },
    RouteRule {
        verb: Verb::Get,
        path: "/knowledge/documents",
        upstream: "/knowledge/documents",
        prefixed: false,
        forwards_query: true,
        endpoint: Endpoint::ListDocuments,
    },
    RouteRule {
        verb: Verb::Post,
        path: "/knowledge/documents",
        upstream: "/knowledge/documents",
        prefixed: false,
        forwards_query: false,
        endpoint: Endpoint::CreateDocument,
    },
    RouteRule {
        verb: Verb::Get,
        path: "/knowledge/documents/:id",
        upstream: "/knowledge/documents/{id}",
        prefixed: true,
        forwards_query: false,
        endpoint: Endpoint::GetDocument,
    },
    RouteRule {
        verb: Verb::Delete,
        path: "/knowledge/documents/:id",
        upstream: "/knowledge/documents/{id}",
        prefixed: true,
        forwards_query: false,
        endpoint: Endpoint::DeleteDocument,
    },
    RouteRule {
        verb: Verb::Post,
        path: "/knowledge/reindex/:id",
        upstream: "/knowledge/reindex/{id}",
        prefixed: true,
        forwards_query: false,
        endpoint: Endpoint::ReindexDocument,
    },
    RouteRule {
        verb: Verb::Post,
        path: "/knowledge/search",
        upstream: "/knowledge/search",
        prefixed: false,
        forwards_query: false,
        endpoint: Endpoint::Search,
    },
    RouteRule {
        verb: Verb::Post,
        path: "/chat",
        upstream: "/chat",
        prefixed: true,
        forwards_query: false,
        endpoint: Endpoint::Chat,
    },
];

/// Groups the table by path so each path gets one method router with a
/// single `405` fallback.
pub fn method_routers() -> Vec<(&'static str, MethodRouter<SharedState>)> {
    let mut grouped: Vec<(&'static str, MethodRouter<SharedState>)> = Vec::new();
    for rule in ROUTES {
        let method_router = method_router(rule);
        match grouped.iter().position(|(path, _)| *path == rule.path) {
            Some(idx) => {
                let (path, existing) = grouped.swap_remove(idx);
                grouped.push((path, existing.merge(method_router)));
            }
            None => grouped.push((rule.path, method_router)),
        }
    }
    grouped
        .into_iter()
        .map(|(path, router)| (path, router.fallback(handlers::method_not_allowed)))
        .collect()
}

fn method_router(rule: &'static RouteRule) -> MethodRouter<SharedState> {
    let filter = rule.verb.filter();
    match rule.endpoint {
        Endpoint::Health | Endpoint::ListDocuments => on(
            filter,
            move |state: State<SharedState>, headers: HeaderMap, query: RawQuery| {
                handlers::forward_read(rule, state, headers, query)
            },
        ),
        Endpoint::GetDocument | Endpoint::DeleteDocument | Endpoint::ReindexDocument => on(
            filter,
            move |state: State<SharedState>,
                  headers: HeaderMap,
                  id: Result<Path<String>, PathRejection>| {
                handlers::forward_by_id(rule, state, headers, id)
            },
        ),
        Endpoint::CreateDocument => on(
            filter,
            move |state: State<SharedState>, headers: HeaderMap, body: Body| {
                handlers::forward_upload(rule, state, headers, body)
            },
        ),
        Endpoint::Search => on(
            filter,
            move |state: State<SharedState>,
                  headers: HeaderMap,
                  payload: Result<Json<Value>, JsonRejection>| {
                handlers::forward_json(rule, SearchParams::check_body, state, headers, payload)
            },
        ),
        Endpoint::Chat => on(
            filter,
            move |state: State<SharedState>,
                  headers: HeaderMap,
                  payload: Result<Json<Value>, JsonRejection>| {
                handlers::forward_json(rule, ChatParams::check_body, state, headers, payload)
            },
        ),
    }
}
