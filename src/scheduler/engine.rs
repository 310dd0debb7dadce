use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::round::{run_round, RoundOutcome};
use crate::config::Config;
use crate::overlay::Overlay;
use crate::report;

/// Run `round` once immediately and then on every `interval` tick until
/// `cancel` fires. Returns the number of rounds started.
///
/// Rounds never overlap: a round that outlasts the interval delays the next
/// one. Cancellation is checked between rounds only, so an in-flight round
/// always runs to completion.
pub async fn run_scheduler_loop<F, Fut>(
    interval: Duration,
    cancel: &CancellationToken,
    mut round: F,
) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(?interval, "Scheduler engine started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    round().await;
    let mut rounds = 1;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        round().await;
        rounds += 1;
    }

    info!(rounds, "Scheduler engine stopped");
    rounds
}

/// Client mode: verify the overlay node, then probe peers every interval.
pub async fn run_client(
    overlay: &dyn Overlay,
    config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    info!("Connecting to local Tailscale daemon...");
    let status = overlay
        .status()
        .await
        .context("failed to connect to local Tailscale daemon; make sure Tailscale is running")?;
    status.ensure_running()?;

    info!(node = %status.self_name(), "Connected to Tailscale");
    info!(interval = ?config.client.interval, "Testing every interval");
    info!(duration = ?config.client.duration, "Test duration per peer");

    run_scheduler_loop(config.client.interval, &cancel, move || async move {
        if let RoundOutcome::Completed(results) = run_round(overlay, config).await {
            print!("{}", report::render(&results, Local::now()));
        }
    })
    .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_round_runs_immediately_then_per_tick() {
        tokio::time::pause();
        let count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let c = count.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler_loop(Duration::from_secs(10), &token, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Rounds at t=0, 10, 20.
        tokio::time::sleep(Duration::from_secs(24)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        cancel.cancel();
        let rounds = handle.await.unwrap();
        assert_eq!(rounds, 3);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_starts_no_new_round() {
        tokio::time::pause();
        let count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let c = count.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler_loop(Duration::from_secs(30), &token, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        let rounds = handle.await.unwrap();
        assert_eq!(rounds, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_round_lets_it_finish() {
        tokio::time::pause();
        let finished = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let f = finished.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler_loop(Duration::from_secs(10), &token, || {
                let f = f.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    f.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let rounds = handle.await.unwrap();
        assert_eq!(rounds, 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overrunning_rounds_never_overlap() {
        tokio::time::pause();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let (a, m) = (active.clone(), max_active.clone());
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            run_scheduler_loop(Duration::from_secs(10), &token, || {
                let (a, m) = (a.clone(), m.clone());
                async move {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    m.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(15)).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(100)).await;
        cancel.cancel();
        let rounds = handle.await.unwrap();

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(rounds >= 2 && rounds <= 7, "rounds = {}", rounds);
    }
}
