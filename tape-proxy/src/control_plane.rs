use std::{fmt, path::Path, sync::Arc};

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, Response, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, de::Error as _};
use tape_abi::{OK_BODY, ROUTE_SEQUENCE_RESET, ROUTE_TAPES_SET, match_route};
use tracing::{debug, error};

use crate::{
    collaborator::{BoxFuture, CollaboratorError, SequenceController, TapeStore},
    config::ConfigHandle,
    logging::category_control,
};

/// An inbound control-plane request. `url` is the full path and query,
/// including the mount prefix.
#[derive(Clone, Debug)]
pub struct ControlPlaneRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ControlPlaneRequest {
    pub fn new(method: Method, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ControlPlaneResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ControlPlaneResponse {
    fn ok(body: Bytes) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl IntoResponse for ControlPlaneResponse {
    fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Per-request dispatch state handed to built-in and extension handlers.
///
/// Only the router builds one, and only for requests that passed
/// [`ControlPlaneRouter::is_control_plane_request`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchContext {
    clean_url: String,
}

impl DispatchContext {
    /// The request URL with the mount prefix removed.
    pub fn clean_url(&self) -> &str {
        &self.clean_url
    }
}

/// Payload of `POST /tapes/set`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TapesSetCommand {
    #[serde(default)]
    pub path: Option<String>,
}

impl TapesSetCommand {
    /// Parses a command body. Only a JSON object is accepted; arrays and
    /// scalars are rejected instead of being read positionally.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(serde_json::Error::custom(
                "tapes_set command must be a JSON object",
            ));
        }
        serde_json::from_value(value)
    }

    /// The requested path, treating an empty string like a missing field.
    pub fn target_path(&self) -> Option<&str> {
        self.path.as_deref().filter(|path| !path.is_empty())
    }
}

/// Caller-supplied handler consulted when no built-in route matches.
/// Returning `None` means "not handled".
pub trait ControlPlaneExtension: Send + Sync {
    fn handle<'a>(
        &'a self,
        request: &'a ControlPlaneRequest,
        context: &'a DispatchContext,
    ) -> BoxFuture<'a, Option<Bytes>>;
}

#[derive(Debug)]
pub enum ControlPlaneError {
    MalformedCommand {
        route: &'static str,
        source: serde_json::Error,
    },
    BodyTooLarge {
        limit: usize,
    },
    UnreadableBody(axum::Error),
    Collaborator(CollaboratorError),
    InvariantViolation {
        url: String,
    },
}

impl ControlPlaneError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControlPlaneError::MalformedCommand { .. } | ControlPlaneError::UnreadableBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ControlPlaneError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ControlPlaneError::Collaborator(_) | ControlPlaneError::InvariantViolation { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ControlPlaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlPlaneError::MalformedCommand { route, source } => {
                write!(f, "malformed {route} command: {source}")
            }
            ControlPlaneError::BodyTooLarge { limit } => {
                write!(f, "control-plane request body exceeds {limit} bytes")
            }
            ControlPlaneError::UnreadableBody(err) => {
                write!(f, "failed reading control-plane request body: {err}")
            }
            ControlPlaneError::Collaborator(err) => write!(f, "{err}"),
            ControlPlaneError::InvariantViolation { url } => write!(
                f,
                "cleaning control-plane url for non control-plane request url={url}"
            ),
        }
    }
}

impl std::error::Error for ControlPlaneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlPlaneError::MalformedCommand { source, .. } => Some(source),
            ControlPlaneError::UnreadableBody(err) => Some(err),
            ControlPlaneError::Collaborator(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CollaboratorError> for ControlPlaneError {
    fn from(err: CollaboratorError) -> Self {
        ControlPlaneError::Collaborator(err)
    }
}

impl IntoResponse for ControlPlaneError {
    fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.to_string()));
        *response.status_mut() = self.status_code();
        response
    }
}

/// Dispatches control-plane requests to the built-in commands and, failing
/// those, to an optional extension handler.
pub struct ControlPlaneRouter {
    config: ConfigHandle,
    sequence: Arc<dyn SequenceController>,
    tape_store: Arc<dyn TapeStore>,
    extension: Option<Arc<dyn ControlPlaneExtension>>,
}

impl ControlPlaneRouter {
    pub fn new(
        sequence: Arc<dyn SequenceController>,
        tape_store: Arc<dyn TapeStore>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            config,
            sequence,
            tape_store,
            extension: None,
        }
    }

    pub fn with_extension(mut self, extension: Arc<dyn ControlPlaneExtension>) -> Self {
        self.extension = Some(extension);
        self
    }

    pub fn is_control_plane_request(&self, request: &ControlPlaneRequest) -> bool {
        self.is_control_plane_url(&request.url)
    }

    pub fn is_control_plane_url(&self, url: &str) -> bool {
        self.config.with_control_plane(|control_plane| {
            control_plane.enabled && url.starts_with(control_plane.path.as_str())
        })
    }

    pub fn clean_url(&self, request: &ControlPlaneRequest) -> Result<String, ControlPlaneError> {
        self.config.with_control_plane(|control_plane| {
            if !control_plane.enabled || !request.url.starts_with(control_plane.path.as_str()) {
                return Err(ControlPlaneError::InvariantViolation {
                    url: request.url.clone(),
                });
            }
            Ok(request.url[control_plane.path.len()..].to_string())
        })
    }

    /// Handles a request already gated by [`Self::is_control_plane_request`].
    pub async fn handle_request(
        &self,
        request: &ControlPlaneRequest,
    ) -> Result<ControlPlaneResponse, ControlPlaneError> {
        debug!(
            "{} handling request url={} method={}",
            category_control(),
            request.url,
            request.method
        );

        let context = match self.clean_url(request) {
            Ok(clean_url) => DispatchContext { clean_url },
            Err(err) => {
                error!("{} {err}", category_control());
                return Err(err);
            }
        };

        let body = match self.dispatch_builtin(request, &context).await? {
            Some(body) => Some(body),
            None => match &self.extension {
                Some(extension) => extension.handle(request, &context).await,
                None => None,
            },
        };

        match body {
            Some(body) => Ok(ControlPlaneResponse::ok(body)),
            None => {
                error!(
                    "{} unknown request url={} method={}",
                    category_control(),
                    request.url,
                    request.method
                );
                Ok(ControlPlaneResponse::not_found())
            }
        }
    }

    async fn dispatch_builtin(
        &self,
        request: &ControlPlaneRequest,
        context: &DispatchContext,
    ) -> Result<Option<Bytes>, ControlPlaneError> {
        let Some(route) = match_route(request.method.as_str(), context.clean_url()) else {
            return Ok(None);
        };

        match route.index {
            ROUTE_SEQUENCE_RESET => {
                self.sequence.reset().await?;
            }
            ROUTE_TAPES_SET => {
                let command = TapesSetCommand::from_body(&request.body).map_err(|source| {
                    ControlPlaneError::MalformedCommand {
                        route: route.name,
                        source,
                    }
                })?;
                if let Some(path) = command.target_path() {
                    self.config
                        .apply_tape_path(Path::new(path), self.tape_store.as_ref())
                        .await?;
                }
            }
            _ => return Ok(None),
        }

        Ok(Some(Bytes::from_static(OK_BODY.as_bytes())))
    }
}
