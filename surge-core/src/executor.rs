use std::future::Future;

use surge_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind};

/// A network-level failure: no response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: HttpTransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: HttpTransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<surge_http::Error> for TransportError {
    fn from(err: surge_http::Error) -> Self {
        Self {
            kind: err.transport_error_kind(),
            message: err.to_string(),
        }
    }
}

/// Issues one HTTP request. Latency is measured by the caller around `execute`.
pub trait RequestExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        req: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl RequestExecutor for HttpClient {
    fn execute(
        &self,
        req: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        async move { self.request(req).await.map_err(TransportError::from) }
    }
}
