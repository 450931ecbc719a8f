use std::future::Future;

use bytes::Bytes;
use flood_http::drain::DrainBodyFuture;
use flood_http::empty_body;
use http::header::USER_AGENT;
use http::{HeaderValue, Request, StatusCode, Uri};
use http_body_util::Full;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::RequestError;

const AGENT: &str = concat!("flood/", env!("CARGO_PKG_VERSION"));

/// Issues one request and reports the response status.
///
/// Dropping the returned future must abort the underlying operation, workers rely on
/// that to enforce the per-request timeout.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, uri: Uri) -> impl Future<Output = Result<StatusCode, RequestError>> + Send;
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpClient {
    #[must_use]
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }

    pub async fn send_recv(&self, request: Request<Full<Bytes>>) -> Result<StatusCode, RequestError> {
        let resp = self
            .client
            .request(request)
            .await
            .map_err(RequestError::from_source)?;
        let status = resp.status();
        // The connection only returns to the pool once the body has been read.
        DrainBodyFuture::new(resp.into_body())
            .await
            .map_err(RequestError::from_source)?;
        Ok(status)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpClient {
    async fn get(&self, uri: Uri) -> Result<StatusCode, RequestError> {
        let mut request = Request::new(empty_body());
        *request.uri_mut() = uri;
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(AGENT));
        self.send_recv(request).await
    }
}
