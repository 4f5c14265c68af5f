use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::error::PipelineError;

pub const MAX_RETRIES: usize = 3;
const BASE_DELAY_MS: u64 = 200;

pub fn build_client(timeout: Duration, follow_redirects: bool) -> Result<Client, PipelineError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("humandbs-pipeline/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?,
    );
    let redirect = if follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .redirect(redirect)
        .build()
        .map_err(|err| PipelineError::Filesystem(err.to_string()))
}

/// Sends the request built by `make_req`, retrying server-side failures and
/// connection problems. Client errors (4xx) are returned to the caller
/// untouched so that absence is never retried as if it were transient.
pub fn send_with_retries<F, E>(mut make_req: F, on_error: E) -> Result<Response, PipelineError>
where
    F: FnMut() -> RequestBuilder,
    E: Fn(String) -> PipelineError,
{
    let mut attempt = 0usize;
    loop {
        let response = make_req().send();
        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if attempt < MAX_RETRIES && is_retryable_status(status) {
                    debug!(status, attempt, "retrying after server error");
                    backoff(attempt);
                    attempt += 1;
                    continue;
                }
                return Ok(resp);
            }
            Err(err) => {
                if attempt < MAX_RETRIES && is_retryable_error(&err) {
                    debug!(error = %err, attempt, "retrying after network error");
                    backoff(attempt);
                    attempt += 1;
                    continue;
                }
                return Err(on_error(err.to_string()));
            }
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    (500..600).contains(&status)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn backoff(attempt: usize) {
    let delay = BASE_DELAY_MS * (attempt as u64 + 1);
    thread::sleep(Duration::from_millis(delay));
}
