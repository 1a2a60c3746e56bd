//! Reqwest-based implementation of the `ServiceTransport` trait.

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use reqwest::{Client, Method, header::HeaderMap, header::HeaderValue};

use super::{ServiceRequest, ServiceResponse, ServiceTransport, TransportError};

/// Reqwest-backed transport used against the real bypass service.
#[derive(Debug, Clone)]
pub struct ReqwestServiceTransport {
    client: Client,
}

impl ReqwestServiceTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|err| TransportError::Other(err.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client, e.g. one configured with a proxy or
    /// custom TLS roots by the host application.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceTransport for ReqwestServiceTransport {
    async fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|err| TransportError::Other(err.to_string()))?;
        let mut headers = convert_headers(&request.headers)?;
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let mut builder = self
            .client
            .request(method, request.url.as_str())
            .headers(headers)
            .timeout(request.timeout);

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        log::debug!("-> {} {}", request.method, request.url);
        let response = builder
            .send()
            .await
            .map_err(|err| classify(err, &request))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| classify(err, &request))?;
        log::debug!("<- {} {} -> {}", request.method, request.url, status);

        Ok(ServiceResponse { status, body })
    }
}

fn classify(err: reqwest::Error, request: &ServiceRequest) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(request.timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

fn convert_headers(headers: &http::HeaderMap) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers.iter() {
        if name == CONTENT_TYPE {
            continue;
        }
        let name = reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|err| TransportError::Other(err.to_string()))?;
        let value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|err| TransportError::Other(err.to_string()))?;
        map.append(name, value);
    }
    Ok(map)
}
