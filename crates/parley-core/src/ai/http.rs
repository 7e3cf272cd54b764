//! Request plumbing shared by the HTTP backends
//!
//! Routing, bounded waits, status mapping and retries live here so every
//! backend fails the same typed way.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model_router::{ModelRouter, TaskType};

use super::types::ChatOptions;

/// Backoff before retry N is N times this
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Model, bounded wait and retry budget resolved for one call
#[derive(Debug, Clone)]
pub(crate) struct CallPlan {
    pub model: String,
    pub timeout: Duration,
    pub retries: u32,
    pub task: TaskType,
}

impl CallPlan {
    pub fn resolve(
        router: &Arc<RwLock<ModelRouter>>,
        options: &ChatOptions,
        caller_default: &str,
    ) -> Self {
        match router.read() {
            Ok(router) => Self {
                model: router.select_model(options.task, caller_default),
                timeout: options
                    .timeout
                    .unwrap_or_else(|| router.timeout_for_task(options.task)),
                retries: router.retries_for_task(options.task),
                task: options.task,
            },
            Err(_) => Self {
                model: caller_default.to_string(),
                timeout: options.timeout.unwrap_or(Duration::from_secs(30)),
                retries: 0,
                task: options.task,
            },
        }
    }
}

/// Send a request and decode the JSON body, mapping every failure to a typed error
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    timeout: Duration,
) -> Result<T> {
    let secs = timeout.as_secs();
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::from_transport(e, secs))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::from_status(status, &body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::from_transport(e, secs))?;
    if body.trim().is_empty() {
        return Err(Error::MalformedResponse("empty response body".into()));
    }

    serde_json::from_str(&body)
        .map_err(|e| Error::MalformedResponse(format!("unexpected response shape: {}", e)))
}

/// Reject blank completions
pub(crate) fn non_empty(content: String) -> Result<String> {
    if content.trim().is_empty() {
        Err(Error::MalformedResponse("empty completion".into()))
    } else {
        Ok(content)
    }
}

fn is_retryable(err: &Error) -> bool {
    matches!(
        err,
        Error::Timeout(_) | Error::Unavailable(_) | Error::RateLimited(_)
    )
}

/// Run one routed call with retries, recording the outcome in the router
pub(crate) async fn run_call<F, Fut>(
    router: &Arc<RwLock<ModelRouter>>,
    plan: &CallPlan,
    mut attempt: F,
) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut tries = 0;
    let result = loop {
        match attempt().await {
            Ok(content) => break Ok(content),
            Err(e) if tries < plan.retries && is_retryable(&e) => {
                tries += 1;
                debug!(model = %plan.model, task = plan.task.as_str(), tries, error = %e, "Retrying LLM call");
                tokio::time::sleep(RETRY_BACKOFF * tries).await;
            }
            Err(e) => break Err(e),
        }
    };

    if let Ok(mut router) = router.write() {
        match &result {
            Ok(_) => router.record_success(&plan.model),
            Err(e) if e.is_upstream() || matches!(e, Error::MalformedResponse(_)) => {
                if router.record_failure(&plan.model) {
                    warn!(model = %plan.model, "Model marked unhealthy");
                }
            }
            Err(_) => {}
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_router::RouterConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn router(retries: u32, threshold: u32) -> Arc<RwLock<ModelRouter>> {
        Arc::new(RwLock::new(ModelRouter::with_config(RouterConfig {
            default_retries: retries,
            failure_threshold: threshold,
            ..RouterConfig::default()
        })))
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let router = router(2, 5);
        let plan = CallPlan::resolve(&router, &ChatOptions::default(), "llama3.2");
        let calls = &AtomicU32::new(0);

        let result = run_call(&router, &plan, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Unavailable("down".into()))
            } else {
                Ok("ok".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let router = router(3, 5);
        let plan = CallPlan::resolve(&router, &ChatOptions::default(), "llama3.2");
        let calls = &AtomicU32::new(0);

        let result = run_call(&router, &plan, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(Error::Auth("bad key".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_mark_model_unhealthy() {
        let router = router(0, 1);
        let plan = CallPlan::resolve(&router, &ChatOptions::default(), "llama3.2");
        let _ = run_call(&router, &plan, || async {
            Err::<String, _>(Error::MalformedResponse("junk".into()))
        })
        .await;
        assert!(!router.read().unwrap().is_healthy("llama3.2"));
    }

    #[test]
    fn test_explicit_timeout_wins() {
        let router = router(0, 3);
        let options = ChatOptions::default().with_timeout(Duration::from_secs(2));
        let plan = CallPlan::resolve(&router, &options, "llama3.2");
        assert_eq!(plan.timeout, Duration::from_secs(2));
        assert_eq!(plan.model, "llama3.2");
    }

    #[test]
    fn test_non_empty() {
        assert!(non_empty("  ".into()).is_err());
        assert_eq!(non_empty("hi".into()).unwrap(), "hi");
    }
}
