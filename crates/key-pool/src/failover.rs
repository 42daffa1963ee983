//! Send a chat request, rotating to the next key when one is rejected
//!
//! The pool itself never retries. This loop is the client-side policy: each
//! attempt takes a fresh key from the pool, and a key the upstream rejects
//! (invalid, revoked, or out of daily quota) is quarantined before the next
//! attempt. Transient failures move on to the next key without quarantine.

use chat::{ChatClient, ChatError, ChatRequest, ErrorClassification};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pool::CredentialPool;
use crate::quota::classify_status;

/// Send `request` through `client`, trying up to `max_attempts` keys.
///
/// Returns `Error::NoActiveCredentials` without any network call when the pool
/// has no active key. A response that arrived but could not be parsed is
/// returned immediately since another key would not change it.
pub async fn send_with_failover(
    pool: &CredentialPool,
    client: &dyn ChatClient,
    request: &ChatRequest,
    max_attempts: usize,
) -> Result<String> {
    let mut last_error: Option<ChatError> = None;

    for attempt in 0..max_attempts.max(1) {
        let Some(secret) = pool.next_credential().await? else {
            return Err(match last_error {
                Some(e) => Error::Upstream(e),
                None => Error::NoActiveCredentials,
            });
        };
        let key = secret.expose();

        if attempt > 0 {
            debug!(attempt, key = %secret.hint(), "retrying with next key");
        }

        match client.send(request, key).await {
            Ok(text) => {
                info!(
                    client = client.id(),
                    model = %request.model,
                    attempt,
                    "chat request succeeded"
                );
                return Ok(text);
            }
            Err(ChatError::Status { status, body }) => {
                let classification = classify_status(status, &body);
                match classification {
                    ErrorClassification::Permanent | ErrorClassification::QuotaExceeded => {
                        warn!(
                            status,
                            key = %secret.hint(),
                            ?classification,
                            "key rejected by upstream, quarantining"
                        );
                        pool.mark_failed(key).await?;
                    }
                    ErrorClassification::Transient => {
                        warn!(status, attempt, "transient upstream error");
                    }
                }
                last_error = Some(ChatError::Status { status, body });
            }
            Err(ChatError::Transport(msg)) => {
                warn!(error = %msg, attempt, "upstream unreachable");
                last_error = Some(ChatError::Transport(msg));
            }
            Err(e @ ChatError::InvalidResponse(_)) => return Err(Error::Upstream(e)),
        }
    }

    Err(match last_error {
        Some(e) => Error::Upstream(e),
        None => Error::NoActiveCredentials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    /// Replays scripted results and records which key each call used.
    struct ScriptedClient {
        replies: Mutex<VecDeque<chat::Result<String>>>,
        keys_seen: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<chat::Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                keys_seen: Mutex::new(Vec::new()),
            }
        }

        fn keys_seen(&self) -> Vec<String> {
            self.keys_seen.lock().unwrap().clone()
        }
    }

    impl ChatClient for ScriptedClient {
        fn id(&self) -> &str {
            "scripted"
        }

        fn send<'a>(
            &'a self,
            _request: &'a ChatRequest,
            api_key: &'a str,
        ) -> Pin<Box<dyn Future<Output = chat::Result<String>> + Send + 'a>> {
            self.keys_seen.lock().unwrap().push(api_key.to_string());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Transport("script exhausted".into())));
            Box::pin(async move { reply })
        }
    }

    fn status(code: u16, body: &str) -> chat::Result<String> {
        Err(ChatError::Status {
            status: code,
            body: body.to_string(),
        })
    }

    async fn pool_with(keys: &[&str]) -> CredentialPool {
        let pool = CredentialPool::load(Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        for key in keys {
            pool.add(*key, *key).await.unwrap();
        }
        pool
    }

    fn request() -> ChatRequest {
        ChatRequest::new("gemma2-9b-it", "2+2?")
    }

    #[tokio::test]
    async fn first_success_returns_text() {
        let pool = pool_with(&["k-a", "k-b"]).await;
        let client = ScriptedClient::new(vec![Ok("a = 4".into())]);

        let text = send_with_failover(&pool, &client, &request(), 3).await.unwrap();
        assert_eq!(text, "a = 4");
        assert_eq!(client.keys_seen(), vec!["k-a"]);
    }

    #[tokio::test]
    async fn unauthorized_key_is_quarantined_and_next_key_used() {
        let pool = pool_with(&["k-a", "k-b"]).await;
        let client = ScriptedClient::new(vec![status(401, "Invalid API Key"), Ok("ok".into())]);

        let text = send_with_failover(&pool, &client, &request(), 3).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(client.keys_seen(), vec!["k-a", "k-b"]);

        let active: Vec<String> = pool
            .list_active()
            .await
            .iter()
            .map(|c| c.secret.expose().clone())
            .collect();
        assert_eq!(active, vec!["k-b"]);
    }

    #[tokio::test]
    async fn daily_quota_quarantines_but_rate_limit_does_not() {
        let pool = pool_with(&["k-a", "k-b", "k-c"]).await;
        let client = ScriptedClient::new(vec![
            status(429, "Rate limit reached on tokens per minute (TPM)"),
            status(429, "Rate limit reached on tokens per day (TPD)"),
            Ok("done".into()),
        ]);

        let text = send_with_failover(&pool, &client, &request(), 3).await.unwrap();
        assert_eq!(text, "done");

        let all = pool.list_all().await;
        assert!(all[0].active, "per-minute limit must not quarantine");
        assert!(!all[1].active, "daily quota must quarantine");
        assert!(all[2].active);
    }

    #[tokio::test]
    async fn empty_pool_fails_without_network_call() {
        let pool = pool_with(&[]).await;
        let client = ScriptedClient::new(vec![Ok("never".into())]);

        let err = send_with_failover(&pool, &client, &request(), 3).await.unwrap_err();
        assert!(matches!(err, Error::NoActiveCredentials));
        assert!(client.keys_seen().is_empty());
    }

    #[tokio::test]
    async fn all_keys_rejected_returns_last_upstream_error() {
        let pool = pool_with(&["k-a", "k-b"]).await;
        let client = ScriptedClient::new(vec![status(401, "bad a"), status(403, "bad b")]);

        let err = send_with_failover(&pool, &client, &request(), 5).await.unwrap_err();
        match err {
            Error::Upstream(ChatError::Status { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "bad b");
            }
            other => panic!("expected upstream status, got {other:?}"),
        }
        assert!(pool.list_active().await.is_empty());
        assert_eq!(client.keys_seen().len(), 2);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let pool = pool_with(&["k-a"]).await;
        let client = ScriptedClient::new(vec![
            status(503, "unavailable"),
            status(503, "unavailable"),
            status(503, "unavailable"),
        ]);

        let err = send_with_failover(&pool, &client, &request(), 2).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(ChatError::Status { status: 503, .. })));
        assert_eq!(client.keys_seen(), vec!["k-a", "k-a"]);
        assert_eq!(pool.list_all().await[0].usage_count, 2);
    }

    #[tokio::test]
    async fn transport_error_rotates_without_quarantine() {
        let pool = pool_with(&["k-a", "k-b"]).await;
        let client = ScriptedClient::new(vec![
            Err(ChatError::Transport("connection reset".into())),
            Ok("fine".into()),
        ]);

        assert_eq!(
            send_with_failover(&pool, &client, &request(), 3).await.unwrap(),
            "fine"
        );
        assert_eq!(pool.list_active().await.len(), 2);
    }

    #[tokio::test]
    async fn invalid_response_is_returned_immediately() {
        let pool = pool_with(&["k-a", "k-b"]).await;
        let client = ScriptedClient::new(vec![
            Err(ChatError::InvalidResponse("no choices".into())),
            Ok("unused".into()),
        ]);

        let err = send_with_failover(&pool, &client, &request(), 3).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(ChatError::InvalidResponse(_))));
        assert_eq!(client.keys_seen().len(), 1);
    }
}
