use futures_util::StreamExt;
use reqwest::Client;
use tracing::debug;

use crate::metrics::OutcomeClass;

use super::request::PreparedRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOutcome {
    pub class: OutcomeClass,
    pub response_bytes: u64,
}

/// Send one request and read the body to the end. Never fails: every error
/// becomes an outcome class.
pub async fn execute_request(client: &Client, request: &PreparedRequest) -> RequestOutcome {
    let built = match request.build(client) {
        Ok(built) => built,
        Err(err) => {
            debug!("Failed to build request for {}: {}", request.url, err);
            return failure(&err);
        }
    };

    match client.execute(built).await {
        Ok(response) => {
            let class = OutcomeClass::from_status(response.status().as_u16());
            match drain_response_body(response).await {
                Ok(response_bytes) => RequestOutcome {
                    class,
                    response_bytes,
                },
                Err(err) => {
                    debug!("Failed to read response body from {}: {}", request.url, err);
                    failure(&err)
                }
            }
        }
        Err(err) => {
            debug!("Request to {} failed: {}", request.url, err);
            failure(&err)
        }
    }
}

pub(crate) fn classify_error(err: &reqwest::Error) -> OutcomeClass {
    match (err.is_timeout(), err.is_connect()) {
        (true, true) => OutcomeClass::ConnectTimeout,
        (true, false) => OutcomeClass::Timeout,
        (false, _) => OutcomeClass::Transport,
    }
}

fn failure(err: &reqwest::Error) -> RequestOutcome {
    RequestOutcome {
        class: classify_error(err),
        response_bytes: 0,
    }
}

async fn drain_response_body(response: reqwest::Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        total_bytes = total_bytes.saturating_add(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
    }
    Ok(total_bytes)
}
