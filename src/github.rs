use anyhow::{Context, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const API_ROOT: &str = "https://api.github.com";
const USER_AGENT: &str = "github-stats-badges";

/// Outcome of a REST call that GitHub may answer before the data is ready.
#[derive(Debug)]
pub enum RestResponse {
    Ready(Value),
    /// 202: statistics are still being computed server-side.
    Pending,
    /// 403/404: the token cannot see this resource.
    Unavailable(StatusCode),
}

/// Attempts at a GraphQL request before a 429 or 5xx is final.
const MAX_RETRIES: usize = 4;

#[derive(Debug)]
enum Step {
    Done(Value),
    Retry(Duration),
}

/// Decide what one GraphQL response means for the request loop.
///
/// Status is checked before the body: 5xx pages from GitHub's edge are HTML
/// or empty, so the body is only parsed as JSON once the status is known.
fn graphql_step(
    status: StatusCode,
    attempt: usize,
    retry_after: Option<u64>,
    body: &str,
) -> Result<Step> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        if attempt >= MAX_RETRIES {
            return Err(anyhow::anyhow!(
                "GitHub API returned 429 (rate-limited) and retries exhausted"
            ));
        }
        return Ok(Step::Retry(Duration::from_secs(retry_after.unwrap_or(2))));
    }

    if status.is_server_error() {
        if attempt >= MAX_RETRIES {
            return Err(anyhow::anyhow!(
                "GitHub API returned HTTP {} and retries exhausted",
                status.as_u16()
            ));
        }
        let backoff = Duration::from_millis(250u64.saturating_mul(1 << (attempt - 1)));
        return Ok(Step::Retry(backoff));
    }

    if !status.is_success() {
        return Err(anyhow::anyhow!(
            "GitHub API returned HTTP {}: {body}",
            status.as_u16()
        ));
    }

    let json: Value = serde_json::from_str(body).context("Failed to parse JSON from GitHub")?;
    if let Some(errors) = json.get("errors") {
        // Partial results (e.g. SAML-protected org repos) still carry usable data
        if json.get("data").is_some_and(|d| !d.is_null()) {
            tracing::warn!("GraphQL returned partial errors: {errors}");
        } else {
            return Err(anyhow::anyhow!("GraphQL reported errors: {errors:#}"));
        }
    }
    Ok(Step::Done(json))
}

#[derive(Clone)]
pub struct GithubClient {
    token: Arc<String>,
    http: Client,
}

impl GithubClient {
    /// Create a client over a shared HTTP session.
    pub fn new(token: impl Into<String>, http: Client) -> Self {
        Self {
            token: Arc::new(token.into()),
            http,
        }
    }

    /// GraphQL request with basic retry/backoff and `errors` checking.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let mut attempt = 0usize;

        loop {
            attempt += 1;

            let resp = self
                .http
                .post(format!("{API_ROOT}/graphql"))
                .bearer_auth(&*self.token)
                .header("User-Agent", USER_AGENT)
                .json(&serde_json::json!({ "query": query, "variables": variables }))
                .send()
                .await
                .context("Network error sending GraphQL request")?;

            let status = resp.status();
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let body = resp
                .text()
                .await
                .context("Failed to read GraphQL response body")?;

            match graphql_step(status, attempt, retry_after, &body)? {
                Step::Done(json) => return Ok(json),
                Step::Retry(wait) => {
                    tracing::warn!(
                        status = status.as_u16(),
                        attempt,
                        ?wait,
                        "retrying GitHub GraphQL request"
                    );
                    sleep(wait).await;
                }
            }
        }
    }

    /// GET a REST endpoint such as `/repos/{owner}/{repo}/traffic/views`.
    pub async fn rest(&self, path: &str) -> Result<RestResponse> {
        let resp = self
            .http
            .get(format!("{API_ROOT}{path}"))
            .bearer_auth(&*self.token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("Network error requesting {path}"))?;

        let status = resp.status();
        match status {
            StatusCode::ACCEPTED => Ok(RestResponse::Pending),
            // Empty repositories answer contributor stats with no body
            StatusCode::NO_CONTENT => Ok(RestResponse::Ready(Value::Null)),
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Ok(RestResponse::Unavailable(status))
            }
            s if s.is_success() => {
                let json = resp
                    .json()
                    .await
                    .with_context(|| format!("Failed to parse JSON from {path}"))?;
                Ok(RestResponse::Ready(json))
            }
            s => Err(anyhow::anyhow!(
                "GitHub API returned HTTP {} for {path}",
                s.as_u16()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_gateway_error_is_retried_with_backoff() {
        let body = "<html><body>502 Bad Gateway</body></html>";
        match graphql_step(StatusCode::BAD_GATEWAY, 1, None, body).unwrap() {
            Step::Retry(wait) => assert_eq!(wait, Duration::from_millis(250)),
            other => panic!("expected retry, got {other:?}"),
        }
        match graphql_step(StatusCode::SERVICE_UNAVAILABLE, 3, None, "").unwrap() {
            Step::Retry(wait) => assert_eq!(wait, Duration::from_millis(1000)),
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn server_errors_give_up_after_max_attempts() {
        let err = graphql_step(StatusCode::BAD_GATEWAY, MAX_RETRIES, None, "").unwrap_err();
        assert!(err.to_string().contains("retries exhausted"));
    }

    #[test]
    fn rate_limit_honours_retry_after() {
        match graphql_step(StatusCode::TOO_MANY_REQUESTS, 1, Some(7), "").unwrap() {
            Step::Retry(wait) => assert_eq!(wait, Duration::from_secs(7)),
            other => panic!("expected retry, got {other:?}"),
        }
        assert!(graphql_step(StatusCode::TOO_MANY_REQUESTS, MAX_RETRIES, None, "").is_err());
    }

    #[test]
    fn client_errors_fail_immediately() {
        let body = r#"{"message":"Bad credentials"}"#;
        let err = graphql_step(StatusCode::UNAUTHORIZED, 1, None, body).unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn partial_errors_keep_data() {
        let body = r#"{"data":{"user":{"login":"me"}},"errors":[{"message":"SAML enforcement"}]}"#;
        match graphql_step(StatusCode::OK, 1, None, body).unwrap() {
            Step::Done(json) => assert_eq!(json["data"]["user"]["login"], "me"),
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn errors_without_data_fail() {
        let body = r#"{"data":null,"errors":[{"message":"Could not resolve to a User"}]}"#;
        let err = graphql_step(StatusCode::OK, 1, None, body).unwrap_err();
        assert!(err.to_string().contains("Could not resolve"));

        let err = graphql_step(StatusCode::OK, 1, None, r#"{"errors":[]}"#).unwrap_err();
        assert!(err.to_string().contains("GraphQL reported errors"));
    }

    #[test]
    fn unparseable_success_body_is_an_error() {
        assert!(graphql_step(StatusCode::OK, 1, None, "not json").is_err());
    }
}
