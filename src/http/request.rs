use std::collections::BTreeMap;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Request};
use url::Url;

use crate::domain::{RequestBody, RequestSpec, Task};
use crate::error::DispatchError;

/// A request spec with its effective headers and body resolved up front, so
/// a worker only clones and sends.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl PreparedRequest {
    /// # Errors
    ///
    /// Returns the reqwest error if the request cannot be assembled.
    pub fn build(&self, client: &Client) -> Result<Request, reqwest::Error> {
        let builder = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        match &self.body {
            Some(body) => builder.body(body.clone()).build(),
            None => builder.build(),
        }
    }
}

/// Prepare every request of a task.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidHeader`] for a header that is not valid
/// on the wire.
pub fn prepare_requests(task: &Task) -> Result<Vec<PreparedRequest>, DispatchError> {
    task.requests
        .iter()
        .map(|request| prepare_request(&task.name, &task.prefabs.default_headers, request))
        .collect()
}

pub(crate) fn prepare_request(
    task: &str,
    default_headers: &BTreeMap<String, String>,
    request: &RequestSpec,
) -> Result<PreparedRequest, DispatchError> {
    let mut headers = effective_headers(task, default_headers, &request.headers)?;
    let body = request
        .body
        .as_ref()
        .filter(|_| request.method.allows_body())
        .map(|body| {
            if matches!(body, RequestBody::Json(_)) && !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            body.as_str().to_owned()
        });

    Ok(PreparedRequest {
        method: request.method.to_reqwest(),
        url: request.url.clone(),
        headers,
        body,
    })
}

/// Defaults first, then request headers on top. Names compare
/// case-insensitively, so a request header replaces a default of any case.
pub(crate) fn effective_headers(
    task: &str,
    defaults: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> Result<HeaderMap, DispatchError> {
    let mut headers = HeaderMap::new();
    for (name, value) in defaults.iter().chain(overrides) {
        let invalid = || DispatchError::InvalidHeader {
            task: task.to_owned(),
            name: name.clone(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_err| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_err| invalid())?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}
