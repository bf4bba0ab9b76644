//! Periodic endpoint refresh.

use super::{Discovery, EndpointHandle};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Spawns the background task that keeps `handle` current.
///
/// The first lookup happens immediately, then once every `period`. A failed
/// lookup is logged and the previous endpoint stays published. The task ends
/// promptly once `token` is cancelled, including while a lookup is in flight,
/// and owns `handle` until then.
pub fn spawn_refresher<D: Discovery>(
    discovery: Arc<D>,
    handle: EndpointHandle,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(refresh_loop(discovery, handle, period.max(MIN_PERIOD), token))
}

async fn refresh_loop<D: Discovery>(
    discovery: Arc<D>,
    handle: EndpointHandle,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = discovery.resolve() => outcome,
        };

        match outcome {
            Ok(address) => {
                let previous = handle.current();
                if handle.publish(&address) {
                    match previous {
                        Some(previous) => {
                            tracing::info!("Endpoint changed from {previous} to {address}")
                        }
                        None => tracing::info!("Endpoint resolved to {address}"),
                    }
                }
            }
            Err(err) => match handle.current() {
                Some(stale) => tracing::warn!("Endpoint refresh failed, keeping {stale}: {err}"),
                None => tracing::warn!("Endpoint refresh failed: {err}"),
            },
        }
    }

    tracing::debug!("Endpoint refresher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolutionError;
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    /// Replays a fixed script of lookups, then repeats the last one.
    struct Scripted {
        script: Mutex<VecDeque<Result<String, ResolutionError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(script: Vec<Result<String, ResolutionError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Discovery for Scripted {
        async fn resolve(&self) -> Result<String, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            match script.len() {
                0 => Err(ResolutionError::Status(500)),
                1 => match script.front() {
                    Some(Ok(address)) => Ok(address.clone()),
                    _ => Err(ResolutionError::Status(500)),
                },
                _ => script.pop_front().unwrap_or(Err(ResolutionError::Status(500))),
            }
        }
    }

    /// Never answers.
    struct Hanging;

    impl Discovery for Hanging {
        async fn resolve(&self) -> Result<String, ResolutionError> {
            std::future::pending().await
        }
    }

    fn not_found() -> Result<String, ResolutionError> {
        Err(ResolutionError::NotFound {
            service: "nginx".into(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_the_previous_endpoint() {
        let discovery = Scripted::new(vec![
            Ok("10.0.0.1:80".into()),
            not_found(),
            Ok("10.0.0.2:80".into()),
        ]);
        let handle = EndpointHandle::new();
        let mut reader = handle.reader();
        let token = CancellationToken::new();
        let task = spawn_refresher(
            discovery.clone(),
            handle,
            Duration::from_secs(5),
            token.clone(),
        );

        let first = reader.wait_ready(Duration::from_secs(1)).await;
        assert_eq!(first.as_deref(), Some("10.0.0.1:80"));

        time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(discovery.calls(), 2);
        assert_eq!(reader.current().as_deref(), Some("10.0.0.1:80"));

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(discovery.calls(), 3);
        assert_eq!(reader.current().as_deref(), Some("10.0.0.2:80"));

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_first_lookups_leave_the_endpoint_unresolved() {
        let discovery = Scripted::new(vec![]);
        let handle = EndpointHandle::new();
        let reader = handle.reader();
        let token = CancellationToken::new();
        let task = spawn_refresher(
            discovery.clone(),
            handle,
            Duration::from_secs(1),
            token.clone(),
        );

        time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(discovery.calls(), 3);
        assert_eq!(reader.current(), None);

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_an_in_flight_lookup() {
        let token = CancellationToken::new();
        let task = spawn_refresher(
            Arc::new(Hanging),
            EndpointHandle::new(),
            Duration::from_secs(5),
            token.clone(),
        );

        time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        time::timeout(Duration::from_secs(1), task)
            .await
            .expect("refresher did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_does_no_lookups() {
        let discovery = Scripted::new(vec![Ok("10.0.0.1:80".into())]);
        let token = CancellationToken::new();
        token.cancel();

        spawn_refresher(
            discovery.clone(),
            EndpointHandle::new(),
            Duration::from_secs(1),
            token,
        )
        .await
        .unwrap();
        assert_eq!(discovery.calls(), 0);
    }
}
