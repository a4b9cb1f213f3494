use axum::{
    extract::{OriginalUri, Query, Request},
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    routing::MethodFilter,
    Json,
};
use backend::BackendError;
use model::{coordinate::CoordinateError, ExampleData};
use schemars::{schema_for, schema_for_value, JsonSchema};
use serde::{Deserialize, Serialize};
use tracking::TrackingError;

use crate::hateoas;

pub type RouteResult<O> = Result<O, RouteErrorResponse>;
pub type HateoasResult<O> = RouteResult<Json<hateoas::Response<O>>>;

/// A `MethodFilter` that matches all http methods.
pub(crate) const METHOD_FILTER_ALL: MethodFilter = MethodFilter::GET
    .or(MethodFilter::POST)
    .or(MethodFilter::PATCH)
    .or(MethodFilter::PUT)
    .or(MethodFilter::DELETE);

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VecResponse<T> {
    pub data: Vec<T>,
}

impl<T> VecResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }

    pub fn json(self) -> Json<Self> {
        Json(self)
    }
}

// - Services returning commonly used responses -

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SchemaParams {
    #[serde(default = "Default::default")]
    example_data: bool,
}

pub(crate) async fn schema<T: ExampleData + JsonSchema + Serialize>(
    Query(params): Query<SchemaParams>,
) -> impl IntoResponse {
    if params.example_data {
        Json(schema_for_value!(T::example_data()))
    } else {
        Json(schema_for!(T))
    }
}

pub(crate) async fn route_not_found(
    OriginalUri(original_uri): OriginalUri,
    req: Request,
) -> impl IntoResponse {
    RouteErrorResponse::not_found(req.method(), original_uri.path())
}

// - Commonly used responses -

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteErrorResponse {
    #[serde(skip)]
    pub status_code: StatusCode,
    pub http_method: Option<String>,
    pub requested_uri: Option<String>,
    pub message: Option<String>,
    pub detailed_information: Option<String>,
}

impl RouteErrorResponse {
    pub fn new(status_code: StatusCode) -> Self {
        Self {
            status_code,
            http_method: None,
            requested_uri: None,
            message: None,
            detailed_information: None,
        }
    }

    pub fn not_found(method: &Method, uri: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND)
            .with_method(method)
            .with_uri(uri)
            .with_default_message()
    }

    pub fn with_method(mut self, method: &Method) -> Self {
        self.http_method = Some(method.to_string());
        self
    }

    /// Method and path of the request that failed.
    pub fn at(self, method: &Method, uri: &Uri) -> Self {
        self.with_method(method).with_uri(uri.path())
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.requested_uri = Some(uri.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_default_message(self) -> Self {
        let message = self
            .status_code
            .canonical_reason()
            .unwrap_or("Something went wrong.");
        self.with_message(message)
    }

    pub fn with_detailed_information(mut self, message: impl Into<String>) -> Self {
        self.detailed_information = Some(message.into());
        self
    }
}

impl From<BackendError> for RouteErrorResponse {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::NotFound(_) => Self::new(StatusCode::NOT_FOUND)
                .with_message("The requested delivery does not exist."),
            other => Self::new(StatusCode::BAD_GATEWAY)
                .with_message("The delivery could not be fetched from the backend.")
                .with_detailed_information(other.to_string()),
        }
    }
}

impl From<TrackingError> for RouteErrorResponse {
    fn from(value: TrackingError) -> Self {
        match value {
            TrackingError::Closed => Self::new(StatusCode::GONE)
                .with_message("The tracking session is closed."),
            TrackingError::NoPositionProvider => Self::new(StatusCode::CONFLICT)
                .with_message("This tracking session does not locate its device."),
            TrackingError::Channel(why) => Self::new(StatusCode::SERVICE_UNAVAILABLE)
                .with_message("The real-time channel is unavailable.")
                .with_detailed_information(why.to_string()),
            TrackingError::Tracker(why) => Self::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_default_message()
                .with_detailed_information(why.to_string()),
        }
    }
}

impl From<CoordinateError> for RouteErrorResponse {
    fn from(value: CoordinateError) -> Self {
        Self::new(StatusCode::BAD_REQUEST)
            .with_message("The reported location is invalid.")
            .with_detailed_information(value.to_string())
    }
}

impl IntoResponse for RouteErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status_code, Json(self)).into_response()
    }
}
