//! Bounded dispatch of provider calls
//!
//! Every provider call runs as its own task on the runtime, admitted through
//! a shared semaphore. A call that cannot get a slot within the queue timeout
//! fails with [`LlmError::Overloaded`]; a call that outlives its deadline is
//! aborted and fails with [`LlmError::UpstreamTimeout`]. Dropping the caller
//! aborts the task, so a disconnected client releases its slot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, stream};
use prism_config::LlmConfig;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::LlmError;
use crate::provider::FragmentStream;

/// Fragments buffered between a streaming task and its consumer
const STREAM_BUFFER: usize = 16;

/// Shared pool of provider call slots
#[derive(Debug, Clone)]
pub struct CallPool {
    permits: Arc<Semaphore>,
    queue_timeout: Duration,
    call_timeout: Duration,
    idle_timeout: Duration,
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl CallPool {
    pub fn new(max_concurrent: usize, queue_timeout: Duration, call_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            queue_timeout,
            call_timeout,
            idle_timeout,
        }
    }

    /// Build from the `[llm]` section
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` if a duration is malformed
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let parse = |result: anyhow::Result<Duration>| result.map_err(|e| LlmError::Configuration(e.to_string()));

        Ok(Self::new(
            config.max_concurrent_calls,
            parse(config.queue_timeout())?,
            parse(config.call_timeout())?,
            parse(config.stream_idle_timeout())?,
        ))
    }

    /// Wait for a free slot
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Overloaded` if no slot frees up within the queue timeout
    pub async fn acquire(&self, provider: &'static str) -> Result<OwnedSemaphorePermit, LlmError> {
        match timeout(self.queue_timeout, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(LlmError::Internal(anyhow::anyhow!("call pool closed"))),
            Err(_) => {
                tracing::warn!(
                    provider,
                    timeout_ms = self.queue_timeout.as_millis(),
                    "no free call slot"
                );
                Err(LlmError::Overloaded { provider })
            }
        }
    }

    /// Run one provider call under the call deadline
    ///
    /// # Errors
    ///
    /// Returns the call's own error, `LlmError::Overloaded` when no slot is
    /// free, or `LlmError::UpstreamTimeout` when the deadline passes
    pub async fn run<F, T>(&self, provider: &'static str, call: F) -> Result<T, LlmError>
    where
        F: Future<Output = Result<T, LlmError>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire(provider).await?;

        let mut task = AbortOnDrop(tokio::spawn(async move {
            let _permit = permit;
            call.await
        }));

        match timeout(self.call_timeout, &mut task.0).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(LlmError::Internal(anyhow::anyhow!("provider task failed: {e}"))),
            Err(_) => {
                tracing::warn!(provider, timeout_ms = self.call_timeout.as_millis(), "provider call timed out");
                Err(LlmError::UpstreamTimeout {
                    provider,
                    after: self.call_timeout,
                })
            }
        }
    }

    /// Open a native provider stream inside the pool
    ///
    /// Opening the stream is bounded by the call deadline. Afterwards the
    /// slot stays taken until the stream ends or the returned stream is
    /// dropped, and each fragment must arrive within the idle timeout. An
    /// idle stream yields one [`LlmError::Streaming`] and ends.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Overloaded`, `LlmError::UpstreamTimeout` or the
    /// provider's error if the stream cannot be opened
    pub async fn open_stream<F>(&self, provider: &'static str, open: F) -> Result<FragmentStream, LlmError>
    where
        F: Future<Output = Result<FragmentStream, LlmError>> + Send + 'static,
    {
        let permit = self.acquire(provider).await?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let call_timeout = self.call_timeout;
        let idle_timeout = self.idle_timeout;

        let task = AbortOnDrop(tokio::spawn(async move {
            let _permit = permit;

            let mut fragments = match timeout(call_timeout, open).await {
                Ok(Ok(fragments)) => {
                    if ready_tx.send(Ok(())).is_err() {
                        return;
                    }
                    fragments
                }
                Ok(Err(e)) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
                Err(_) => {
                    tracing::warn!(provider, timeout_ms = call_timeout.as_millis(), "stream open timed out");
                    let _ = ready_tx.send(Err(LlmError::UpstreamTimeout {
                        provider,
                        after: call_timeout,
                    }));
                    return;
                }
            };

            loop {
                match timeout(idle_timeout, fragments.next()).await {
                    Ok(Some(item)) => {
                        let failed = item.is_err();
                        if tx.send(item).await.is_err() || failed {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(_) => {
                        tracing::warn!(provider, timeout_ms = idle_timeout.as_millis(), "provider stream went idle");
                        let _ = tx
                            .send(Err(LlmError::Streaming(format!(
                                "no data from {provider} for {idle_timeout:?}"
                            ))))
                            .await;
                        return;
                    }
                }
            }
        }));

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(LlmError::Internal(anyhow::anyhow!("stream task ended before opening"))),
        }

        let fragments = stream::unfold((rx, task), |(mut rx, task)| async move {
            rx.recv().await.map(|item| (item, (rx, task)))
        });

        Ok(Box::pin(fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max: usize) -> CallPool {
        CallPool::new(max, Duration::from_secs(1), Duration::from_secs(5), Duration::from_secs(2))
    }

    fn fragments(items: &[&str]) -> FragmentStream {
        let items: Vec<Result<String, LlmError>> = items.iter().map(|s| Ok((*s).to_owned())).collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn run_returns_call_result() {
        let result = pool(2).run("gemini", async { Ok(42) }).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn run_passes_call_errors_through() {
        let err = pool(2)
            .run::<_, ()>("gemini", async { Err(LlmError::Upstream("boom".to_owned())) })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Upstream(msg) if msg == "boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_and_frees_its_slot() {
        let pool = pool(1);

        let err = pool
            .run("anthropic", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::UpstreamTimeout {
                provider: "anthropic",
                ..
            }
        ));

        let result = pool.run("anthropic", async { Ok("next") }).await.unwrap();
        assert_eq!(result, "next");
    }

    #[tokio::test(start_paused = true)]
    async fn full_pool_reports_overload() {
        let pool = pool(1);
        let _held = pool.acquire("gemini").await.unwrap();

        let err = pool.run("gemini", async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, LlmError::Overloaded { provider: "gemini" }));
    }

    #[tokio::test]
    async fn stream_forwards_fragments_in_order() {
        let stream = pool(1)
            .open_stream("passthrough", async { Ok(fragments(&["a", "b", "c"])) })
            .await
            .unwrap();

        let items: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(items, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stream_open_error_is_returned() {
        let err = pool(1)
            .open_stream("passthrough", async { Err(LlmError::Upstream("refused".to_owned())) })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::Upstream(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_ends_with_error() {
        let stream = pool(1)
            .open_stream("gemini", async {
                let stalled: FragmentStream = Box::pin(fragments(&["first"]).chain(stream::pending()));
                Ok(stalled)
            })
            .await
            .unwrap();

        let items: Vec<Result<String, LlmError>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "first");
        assert!(matches!(&items[1], Err(LlmError::Streaming(msg)) if msg.contains("no data from gemini")));
    }

    #[tokio::test(start_paused = true)]
    async fn open_stream_holds_slot_until_dropped() {
        let pool = pool(1);

        let stream = pool
            .open_stream("gemini", async {
                let endless: FragmentStream = Box::pin(stream::pending());
                Ok(endless)
            })
            .await
            .unwrap();

        assert!(matches!(
            pool.run("gemini", async { Ok(()) }).await,
            Err(LlmError::Overloaded { .. })
        ));

        drop(stream);
        pool.run("gemini", async { Ok(()) }).await.unwrap();
    }
}
