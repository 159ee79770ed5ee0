//! HTTP plumbing shared by all providers

use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::{FetchError, SourceFailure};

/// Builds the HTTP client shared by the providers
pub fn build_client(user_agent: &str) -> Client {
    Client::builder()
        .user_agent(user_agent)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build configured HTTP client, using defaults");
            Client::new()
        })
}

/// Sends a request and decodes a JSON body
///
/// Non-2xx responses are errors. The status error only carries the URL path,
/// so API keys in query strings never reach the logs.
pub async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, FetchError> {
    let response = request.send().await.map_err(FetchError::Transport)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status,
            path: response.url().path().to_string(),
        });
    }

    let text = response.text().await.map_err(FetchError::Transport)?;
    Ok(serde_json::from_str(&text)?)
}

/// One independent source call
pub struct Source<'a, R> {
    pub name: &'static str,
    pub call: BoxFuture<'a, Result<R, FetchError>>,
}

impl<'a, R> Source<'a, R> {
    pub fn new(name: &'static str, call: BoxFuture<'a, Result<R, FetchError>>) -> Self {
        Self { name, call }
    }
}

/// Outcome of an all-settled join
#[derive(Debug)]
pub struct Settled<R> {
    /// Successful results in source order
    pub successes: Vec<(&'static str, R)>,
    /// Failed sources in source order
    pub failures: Vec<SourceFailure>,
}

impl<R> Settled<R> {
    pub fn all_failed(&self) -> bool {
        self.successes.is_empty()
    }
}

/// Runs every source concurrently and waits for all of them
///
/// A failing or slow source never cancels the others. Each call is bounded by
/// `timeout`; one that exceeds it is reported as [`FetchError::Timeout`].
pub async fn all_settled<R>(sources: Vec<Source<'_, R>>, timeout: Duration) -> Settled<R> {
    let calls = sources.into_iter().map(|source| async move {
        let result = match tokio::time::timeout(timeout, source.call).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };
        (source.name, result)
    });

    let mut settled = Settled {
        successes: Vec::new(),
        failures: Vec::new(),
    };

    for (name, result) in join_all(calls).await {
        match result {
            Ok(value) => {
                debug!(source = name, "source succeeded");
                settled.successes.push((name, value));
            }
            Err(error) => {
                warn!(source = name, kind = error.kind(), error = %error, "source failed");
                settled.failures.push(SourceFailure {
                    source: name,
                    error,
                });
            }
        }
    }

    settled
}
