use crate::chain::ChainClient;
use crate::db::DatabaseAdapter;
use crate::state::watcher::PaymentWatcher;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

/// Handle to a running poll loop.
pub struct WatcherHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl WatcherHandle {
    pub(crate) fn new(cancel: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { cancel, handle }
    }

    /// Requests a stop. The in-flight cycle ends at its next cancellation check.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Payment watcher task ended abnormally");
        }
    }
}

pub(crate) fn spawn_poll_loop<D, C>(watcher: Arc<PaymentWatcher<D, C>>, cancel: CancellationToken) -> JoinHandle<()>
where
    D: DatabaseAdapter + 'static,
    C: ChainClient + 'static,
{
    let interval = watcher.config.poll_interval;
    let span = tracing::info_span!(parent: None, "payment_watcher");

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval_timer.tick() => {
                    // runs to completion; cancellation is observed inside the cycle
                    watcher.run_cycle_with_budget().await;
                }
            }
        }

        info!("Payment watcher stopped");
    }.instrument(span))
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::matcher::tests::{invoice, transfer, MINT, RECEIVER};
    use crate::model::InvoiceStatus;
    use crate::state::watcher::tests::{config, watcher, RecordingDb, ScriptedChain};
    use crate::db::DatabaseAdapter;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_loop_polls_until_shutdown() {
        let db = Arc::new(RecordingDb::default());
        let chain = Arc::new(ScriptedChain::default());

        db.add_invoice(&invoice("a", "100", RECEIVER)).await.unwrap();
        chain.add(RECEIVER, "sig-a", false, Some(transfer(MINT, RECEIVER, "0", "100000000")));

        let w = watcher(db.clone(), chain.clone(), config());
        let handle = w.start().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(db.find_pending_calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(db.get_invoice("a").await.unwrap().unwrap().status, InvoiceStatus::Paid);

        handle.shutdown().await;

        let calls_after_shutdown = db.find_pending_calls.load(Ordering::SeqCst);
        let chain_calls = chain.calls();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(db.find_pending_calls.load(Ordering::SeqCst), calls_after_shutdown);
        assert_eq!(chain.calls(), chain_calls);
        assert!(w.is_stopped());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let w = watcher(Arc::new(RecordingDb::default()), Arc::new(ScriptedChain::default()), config());

        let handle = w.start().unwrap();
        assert!(matches!(w.start(), Err(Error::AlreadyStarted)));

        handle.shutdown().await;
        assert!(matches!(w.start(), Err(Error::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let w = watcher(Arc::new(RecordingDb::default()), Arc::new(ScriptedChain::default()), config());
        let handle = w.start().unwrap();

        handle.stop();
        handle.stop();
        w.stop();
        assert!(handle.is_stopped());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_cycle_write_its_match() {
        let db = Arc::new(RecordingDb::default());
        let chain = Arc::new(ScriptedChain { tx_delay: Some(Duration::from_millis(200)), ..Default::default() });

        db.add_invoice(&invoice("a", "100", RECEIVER)).await.unwrap();
        chain.add(RECEIVER, "sig-a1", false, Some(transfer(MINT, RECEIVER, "0", "100000000")));
        chain.add(RECEIVER, "sig-a2", false, Some(transfer(MINT, RECEIVER, "0", "100000000")));

        let w = watcher(db.clone(), chain.clone(), config());
        let handle = w.start().unwrap();

        // stop while the transaction fetch is still running
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(chain.transaction_calls.load(Ordering::SeqCst), 1);

        let started = std::time::Instant::now();
        handle.shutdown().await;

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(chain.transaction_calls.load(Ordering::SeqCst), 1);
        assert_eq!(db.updates(), vec![("a".to_owned(), InvoiceStatus::Paid)]);
        assert_eq!(db.get_invoice("a").await.unwrap().unwrap().status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_shutdown_starts_no_new_calls() {
        let db = Arc::new(RecordingDb::default());
        let chain = Arc::new(ScriptedChain { delay: Some(Duration::from_millis(150)), ..Default::default() });

        db.add_invoice(&invoice("a", "100", RECEIVER)).await.unwrap();
        chain.add(RECEIVER, "sig-a", false, Some(transfer(MINT, RECEIVER, "0", "100000000")));

        let w = watcher(db.clone(), chain.clone(), config());
        let handle = w.start().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert_eq!(chain.signature_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.transaction_calls.load(Ordering::SeqCst), 0);
        assert!(db.updates().is_empty());
    }

    #[tokio::test]
    async fn test_storage_outage_does_not_kill_loop() {
        let db = Arc::new(RecordingDb::default());
        db.fail_find_pending.store(true, Ordering::SeqCst);

        let w = watcher(db.clone(), Arc::new(ScriptedChain::default()), config());
        let handle = w.start().unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(db.find_pending_calls.load(Ordering::SeqCst) >= 2);
        assert!(!handle.is_finished());

        handle.shutdown().await;
    }
}
