use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{Method, StatusCode, Uri},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, on, post},
    Extension, Json, Router,
};
use futures::{future, Stream, StreamExt as _};
use model::{
    coordinate::Coordinate,
    delivery::{Delivery, DeliveryStatus},
    realtime::ConnectionState,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::WatchStream;
use tracking::{
    geolocation::{GeolocationError, Position},
    tracker::{TrackingSnapshot, ViewerRole},
    TrackingError,
};
use utility::id::Id;

use crate::{
    common::{
        route_not_found, schema, HateoasResult, RouteErrorResponse, RouteResult,
        VecResponse, METHOD_FILTER_ALL,
    },
    hateoas,
    middleware::base_url::{base_url_middleware, BaseUrl},
    sessions::{OpenSession, Sessions},
    WebState,
};

macro_rules! resource {
    ($($arg:tt)*) => {
        crate::api::v1::resource!("/deliveries{}", format_args!($($arg)*))
    };
}

pub(crate) fn routes(state: WebState) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/schema", get(schema::<TrackingSnapshot>))
        .route("/:id", get(get_snapshot))
        .route("/:id/session", post(open_session).delete(close_session))
        .route("/:id/stream", get(stream_snapshots))
        .route("/:id/location", post(report_location))
        .route("/:id/geolocation/retry", post(retry_geolocation))
        .layer(axum::middleware::from_fn(base_url_middleware))
        .with_state(state)
        .fallback_service(on(METHOD_FILTER_ALL, route_not_found))
}

#[derive(Debug, Default, Deserialize)]
struct RoleQuery {
    #[serde(default)]
    role: ViewerRole,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SessionSummary {
    delivery_id: Id<Delivery>,
    role: ViewerRole,
    status: DeliveryStatus,
    connection: ConnectionState,
    finished: bool,
}

/// A fix or a failure reported by the deliverer's device.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct DeviceReport {
    #[serde(alias = "latitude")]
    lat: Option<f64>,
    #[serde(alias = "lon", alias = "longitude")]
    lng: Option<f64>,
    /// Meters.
    accuracy: Option<f64>,
    error: Option<GeolocationError>,
}

async fn find(
    sessions: &Sessions,
    delivery_id: Id<Delivery>,
    role: ViewerRole,
    method: Method,
    uri: &Uri,
) -> RouteResult<Arc<OpenSession>> {
    sessions.get(delivery_id, role).await.ok_or_else(|| {
        RouteErrorResponse::new(StatusCode::NOT_FOUND)
            .at(&method, uri)
            .with_message(format!(
                "No tracking session is open for delivery {}.",
                delivery_id
            ))
    })
}

async fn list_sessions(
    State(WebState { sessions, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> Json<VecResponse<hateoas::Response<SessionSummary>>> {
    let data = sessions
        .all()
        .await
        .into_iter()
        .map(|open| {
            let snapshot = open.session.current();
            let summary = SessionSummary {
                delivery_id: snapshot.delivery.id,
                role: open.role,
                status: snapshot.delivery.status,
                connection: snapshot.connection,
                finished: snapshot.finished,
            };
            hateoas::Response::builder(summary, base_url.clone())
                .link(
                    "snapshot",
                    resource!("/{}?role={}", snapshot.delivery.id, role(open.role)),
                )
                .build()
        })
        .collect::<Vec<_>>();
    VecResponse::new(data).json()
}

async fn open_session(
    OriginalUri(original_uri): OriginalUri,
    Path(id): Path<u64>,
    Query(RoleQuery { role }): Query<RoleQuery>,
    State(WebState { sessions, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> RouteResult<(StatusCode, Json<hateoas::Response<TrackingSnapshot>>)> {
    let (open, created) = sessions.open(Id::new(id), role).await.map_err(|why| {
        log::warn!("could not open tracking session for delivery {}: {}", id, why);
        RouteErrorResponse::from(why).at(&Method::POST, &original_uri)
    })?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        snapshot_hateoas(open.session.current(), base_url).json(),
    ))
}

async fn close_session(
    Path(id): Path<u64>,
    Query(RoleQuery { role }): Query<RoleQuery>,
    State(WebState { sessions, .. }): State<WebState>,
) -> StatusCode {
    if sessions.close(Id::new(id), role).await {
        log::info!("closed tracking session for delivery {}", id);
    }
    StatusCode::NO_CONTENT
}

async fn get_snapshot(
    OriginalUri(original_uri): OriginalUri,
    Path(id): Path<u64>,
    Query(RoleQuery { role }): Query<RoleQuery>,
    State(WebState { sessions, .. }): State<WebState>,
    Extension(base_url): Extension<Arc<BaseUrl>>,
) -> HateoasResult<TrackingSnapshot> {
    let open = find(&sessions, Id::new(id), role, Method::GET, &original_uri).await?;
    Ok(snapshot_hateoas(open.session.current(), base_url).json())
}

/// Sends every new snapshot as a `snapshot` event. Ends after the snapshot
/// that marks the delivery finished.
async fn stream_snapshots(
    OriginalUri(original_uri): OriginalUri,
    Path(id): Path<u64>,
    Query(RoleQuery { role }): Query<RoleQuery>,
    State(WebState { sessions, .. }): State<WebState>,
) -> RouteResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let open = find(&sessions, Id::new(id), role, Method::GET, &original_uri).await?;
    let stream = WatchStream::new(open.session.subscribe())
        .scan(false, |finished, snapshot| {
            if *finished {
                return future::ready(None);
            }
            *finished = snapshot.finished;
            future::ready(Some(snapshot))
        })
        .map(|snapshot| Event::default().event("snapshot").json_data(snapshot));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn report_location(
    OriginalUri(original_uri): OriginalUri,
    Path(id): Path<u64>,
    State(WebState { sessions, .. }): State<WebState>,
    Json(report): Json<DeviceReport>,
) -> RouteResult<StatusCode> {
    let open = find(
        &sessions,
        Id::new(id),
        ViewerRole::Deliverer,
        Method::POST,
        &original_uri,
    )
    .await?;
    let failed = |why: RouteErrorResponse| why.at(&Method::POST, &original_uri);

    if open.session.is_stopped() {
        return Err(failed(TrackingError::Closed.into()));
    }
    let Some(device) = &open.device else {
        return Err(failed(TrackingError::NoPositionProvider.into()));
    };

    match report {
        DeviceReport {
            error: Some(error), ..
        } => device.push_error(error),
        DeviceReport {
            lat: Some(lat),
            lng: Some(lng),
            accuracy,
            ..
        } => {
            let coordinate =
                Coordinate::new(lat, lng).map_err(|why| failed(why.into()))?;
            device.push(Position {
                accuracy_m: accuracy,
                ..Position::new(coordinate)
            });
        }
        _ => {
            return Err(failed(
                RouteErrorResponse::new(StatusCode::BAD_REQUEST)
                    .with_message("Either `lat` and `lng` or `error` are required."),
            ))
        }
    }
    Ok(StatusCode::ACCEPTED)
}

async fn retry_geolocation(
    OriginalUri(original_uri): OriginalUri,
    Path(id): Path<u64>,
    State(WebState { sessions, .. }): State<WebState>,
) -> RouteResult<StatusCode> {
    let open = find(
        &sessions,
        Id::new(id),
        ViewerRole::Deliverer,
        Method::POST,
        &original_uri,
    )
    .await?;
    open.session
        .retry_geolocation()
        .await
        .map_err(|why| RouteErrorResponse::from(why).at(&Method::POST, &original_uri))?;
    Ok(StatusCode::ACCEPTED)
}

fn role(role: ViewerRole) -> &'static str {
    match role {
        ViewerRole::Deliverer => "deliverer",
        ViewerRole::Customer => "customer",
    }
}

fn snapshot_hateoas(
    snapshot: TrackingSnapshot,
    base_url: Arc<BaseUrl>,
) -> hateoas::Response<TrackingSnapshot> {
    let id = snapshot.delivery.id;
    let viewer = role(snapshot.role);
    let deliverer = snapshot.role == ViewerRole::Deliverer;
    let open = !snapshot.finished;
    hateoas::Response::builder(snapshot, base_url)
        .link("self", resource!("/{}?role={}", id, viewer))
        .link("stream", resource!("/{}/stream?role={}", id, viewer))
        .link("session", resource!("/{}/session?role={}", id, viewer))
        .link_if(deliverer && open, "location", resource!("/{}/location", id))
        .link_if(
            deliverer && open,
            "retryGeolocation",
            resource!("/{}/geolocation/retry", id),
        )
        .build()
}
