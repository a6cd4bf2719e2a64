//! outbox と個別の時報を公開する HTTP ルート。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chime_core::{TimeStore, chime_message_at};
use serde::Deserialize;
use tracing::{error, info};
use warp::http::{StatusCode, Uri, header};
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

use crate::config::{Config, TowerConfig};
use crate::outbox::{self, TowerLinks};
use crate::telemetry::{self, ChimeMetrics};

const TOWER_NOT_FOUND: &str = "Clock tower not found";

struct Tower {
    config: TowerConfig,
    links: TowerLinks,
}

/// ルートハンドラ間で共有する状態。
#[derive(Clone)]
pub struct AppState {
    store: TimeStore,
    metrics: ChimeMetrics,
    towers: Arc<HashMap<String, Tower>>,
    profile_list_url: Option<String>,
}

impl AppState {
    pub fn new(config: &Config, store: TimeStore, metrics: ChimeMetrics) -> Self {
        let towers = config
            .towers
            .iter()
            .map(|tower| {
                let links = TowerLinks::new(&config.server.public_url, &tower.id);
                let entry = Tower {
                    config: tower.clone(),
                    links,
                };
                (tower.id.clone(), entry)
            })
            .collect();

        Self {
            store,
            metrics,
            towers: Arc::new(towers),
            profile_list_url: config.server.profile_list_url.clone(),
        }
    }
}

/// クエリの数値は文字列のまま受け取り、解釈できなければ指定なしとして扱う。
#[derive(Debug, Deserialize)]
struct OutboxQuery {
    index: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostQuery {
    id: Option<String>,
}

fn lenient_i64(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let outbox = warp::get()
        .and(warp::path!("profile" / String / "outbox.json"))
        .and(warp::query::<OutboxQuery>())
        .and(with_state(state.clone()))
        .then(handle_outbox);

    let post = warp::get()
        .and(warp::path!("profile" / String / "post"))
        .and(warp::query::<PostQuery>())
        .and(with_state(state.clone()))
        .then(handle_post);

    let profile = warp::get()
        .and(warp::path!("profile" / String))
        .and(with_state(state.clone()))
        .then(handle_profile);

    let profile_list = warp::get()
        .and(warp::path!("profile"))
        .and(with_state(state.clone()))
        .then(handle_profile_list);

    let metrics = warp::get()
        .and(warp::path!("metrics"))
        .and(with_state(state))
        .then(handle_metrics);

    outbox
        .or(post)
        .or(profile)
        .or(profile_list)
        .or(metrics)
        .with(warp::trace::request())
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// HTTP サーバーをバインドし、実行用の Future を返す。
pub fn bind(addr: SocketAddr, state: AppState) -> Result<impl Future<Output = ()> + Send> {
    let (addr, server) = warp::serve(routes(state))
        .try_bind_ephemeral(addr)
        .context("Failed to bind HTTP server")?;

    info!(%addr, "HTTP server listening");
    Ok(server)
}

async fn handle_outbox(tower_id: String, query: OutboxQuery, state: AppState) -> Response {
    let Some(tower) = state.towers.get(&tower_id) else {
        return text(StatusCode::NOT_FOUND, TOWER_NOT_FOUND);
    };

    let result = match state
        .store
        .query(
            tower.config.partition_key(),
            lenient_i64(query.index.as_deref()),
        )
        .await
    {
        Ok(result) => result,
        Err(e) => {
            error!(tower = %tower_id, error = %e, "Failed to query outbox");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let document = outbox::outbox_document(&tower.links, &result);
    warp::reply::with_header(
        warp::reply::json(&document),
        header::CONTENT_TYPE,
        outbox::CONTENT_TYPE,
    )
    .into_response()
}

async fn handle_post(tower_id: String, query: PostQuery, state: AppState) -> Response {
    let Some(tower) = state.towers.get(&tower_id) else {
        return text(StatusCode::NOT_FOUND, TOWER_NOT_FOUND);
    };
    let Some(id) = lenient_i64(query.id.as_deref()) else {
        return text(StatusCode::BAD_REQUEST, "ID must be specified");
    };

    match state
        .store
        .fetch_by_id(tower.config.partition_key(), id)
        .await
    {
        Ok(Some(record)) => {
            let message = chime_message_at(
                record.timestamp_utc,
                tower.config.time_zone,
                &tower.config.location,
            );
            text(StatusCode::OK, message)
        }
        Ok(None) => text(
            StatusCode::NOT_FOUND,
            "Can not find post of that time zone and id",
        ),
        Err(e) => {
            error!(tower = %tower_id, id, error = %e, "Failed to fetch post");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

async fn handle_profile(tower_id: String, state: AppState) -> Response {
    let Some(tower) = state.towers.get(&tower_id) else {
        return text(StatusCode::NOT_FOUND, TOWER_NOT_FOUND);
    };

    match tower
        .config
        .profile_url
        .as_deref()
        .and_then(|url| url.parse::<Uri>().ok())
    {
        Some(uri) => warp::redirect::permanent(uri).into_response(),
        None => text(StatusCode::NOT_FOUND, "Profile not configured"),
    }
}

async fn handle_profile_list(state: AppState) -> Response {
    match state
        .profile_list_url
        .as_deref()
        .and_then(|url| url.parse::<Uri>().ok())
    {
        Some(uri) => warp::redirect::permanent(uri).into_response(),
        None => text(StatusCode::NOT_FOUND, "Profile list not configured"),
    }
}

async fn handle_metrics(state: AppState) -> Response {
    warp::reply::with_header(
        state.metrics.render(),
        header::CONTENT_TYPE,
        telemetry::CONTENT_TYPE,
    )
    .into_response()
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    warp::reply::with_status(body.into(), status).into_response()
}
