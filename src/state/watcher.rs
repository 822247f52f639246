use crate::chain::{validate_address, ChainClient};
use crate::config::WatcherConfig;
use crate::db::DatabaseAdapter;
use crate::error::{Error, Result};
use crate::matcher::TransferMatcher;
use crate::model::{Invoice, InvoiceStatus};
use crate::state::lifecycle::{self, WatcherHandle};
use futures_util::{stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// Polls the chain for transfers into the receiver address of every pending invoice
/// and flips matching invoices to PAID.
pub struct PaymentWatcher<D, C> {
    pub(crate) db: Arc<D>,
    pub(crate) chain: Arc<C>,
    pub(crate) config: WatcherConfig,
    matcher: TransferMatcher,
    cancel: CancellationToken,
    started: AtomicBool,
}

#[derive(Debug)]
pub(crate) enum CheckOutcome {
    Paid { signature: String },
    Unpaid,
    Failed(Error),
    Cancelled,
    OverBudget,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub pending: usize,
    pub checked: usize,
    pub paid: usize,
    pub failed: usize,
    pub cancelled: bool,
    /// The time budget ran out before every invoice was scanned.
    pub over_budget: bool,
}

impl<D, C> PaymentWatcher<D, C>
where
    D: DatabaseAdapter + 'static,
    C: ChainClient + 'static,
{
    pub fn new(db: Arc<D>, chain: Arc<C>, config: WatcherConfig) -> Self {
        let matcher = TransferMatcher::from_config(&config);

        Self {
            db,
            chain,
            config,
            matcher,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Spawns the poll loop. A watcher runs at most once; a second call fails with
    /// [`Error::AlreadyStarted`], even after it was stopped.
    #[instrument(skip(self), fields(interval = ?self.config.poll_interval))]
    pub fn start(self: &Arc<Self>) -> Result<WatcherHandle> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        info!(mint = %self.config.token.mint, "Starting payment watcher");

        let handle = lifecycle::spawn_poll_loop(Arc::clone(self), self.cancel.clone());

        Ok(WatcherHandle::new(self.cancel.clone(), handle))
    }

    /// Signals the loop to stop. Safe to call any number of times.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping payment watcher");
        }
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// One cycle bounded by the configured time budget. Never fails; everything is
    /// logged here and the loop carries on with the next tick.
    ///
    /// The budget is a deadline checked at the same points as cancellation, so an
    /// over-budget cycle stops scanning but keeps the payments it already wrote.
    pub async fn run_cycle_with_budget(self: &Arc<Self>) -> Option<CycleReport> {
        let span = tracing::info_span!("poll_cycle");
        let deadline = Instant::now() + self.config.cycle_timeout;

        match self.run_cycle_until(Some(deadline)).instrument(span).await {
            Ok(report) => {
                if report.over_budget {
                    warn!(
                        budget = ?self.config.cycle_timeout,
                        checked = report.checked,
                        paid = report.paid,
                        "Poll cycle exceeded its time budget"
                    );
                } else if report.pending > 0 {
                    info!(
                        pending = report.pending,
                        checked = report.checked,
                        paid = report.paid,
                        failed = report.failed,
                        cancelled = report.cancelled,
                        "Poll cycle finished"
                    );
                }
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Poll cycle aborted");
                None
            }
        }
    }

    /// Unbounded cycle. Only a failing `find_pending` fails it; per-invoice errors
    /// are counted in the report.
    pub async fn run_cycle(self: &Arc<Self>) -> Result<CycleReport> {
        self.run_cycle_until(None).await
    }

    async fn run_cycle_until(self: &Arc<Self>, deadline: Option<Instant>) -> Result<CycleReport> {
        if self.cancel.is_cancelled() {
            return Ok(CycleReport { cancelled: true, ..Default::default() });
        }

        let pending = self.db.find_pending().await?;

        let mut report = CycleReport { pending: pending.len(), ..Default::default() };

        if pending.is_empty() {
            trace!("No pending invoices");
            return Ok(report);
        }

        debug!(count = pending.len(), "Checking pending invoices");

        let outcomes: Vec<CheckOutcome> = stream::iter(pending)
            .map(|invoice| {
                let watcher = Arc::clone(self);
                async move {
                    let span = tracing::info_span!("check_invoice",
                        id = %invoice.id, number = %invoice.invoice_number);
                    watcher.settle_invoice(invoice, deadline).instrument(span).await
                }
            })
            .buffer_unordered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                CheckOutcome::Paid { .. } => {
                    report.checked += 1;
                    report.paid += 1;
                }
                CheckOutcome::Unpaid => report.checked += 1,
                CheckOutcome::Failed(_) => report.failed += 1,
                CheckOutcome::Cancelled => report.cancelled = true,
                CheckOutcome::OverBudget => report.over_budget = true,
            }
        }

        Ok(report)
    }

    /// Checks one invoice and writes PAID right away on a match. The write is not
    /// subject to cancellation or the cycle deadline.
    async fn settle_invoice(&self, invoice: Invoice, deadline: Option<Instant>) -> CheckOutcome {
        match self.check_invoice(&invoice, deadline).await {
            CheckOutcome::Paid { signature } => {
                info!(
                    invoice = %invoice.invoice_number,
                    signature = %signature,
                    amount = %invoice.amount,
                    "Payment detected"
                );

                match self.db.update_status(&invoice.id, InvoiceStatus::Paid).await {
                    Ok(()) => {
                        info!(invoice = %invoice.invoice_number, "Invoice marked as PAID");
                        CheckOutcome::Paid { signature }
                    }
                    Err(e) => {
                        error!(invoice = %invoice.invoice_number, error = %e, "Failed to mark invoice as PAID");
                        CheckOutcome::Failed(e)
                    }
                }
            }
            CheckOutcome::Failed(e) => {
                warn!(invoice = %invoice.invoice_number, error = %e, "Failed to check invoice for payment");
                CheckOutcome::Failed(e)
            }
            other => other,
        }
    }

    /// Cancellation wins over the deadline.
    fn interrupted(&self, deadline: Option<Instant>) -> Option<CheckOutcome> {
        if self.cancel.is_cancelled() {
            return Some(CheckOutcome::Cancelled);
        }

        match deadline {
            Some(d) if Instant::now() >= d => Some(CheckOutcome::OverBudget),
            _ => None,
        }
    }

    pub(crate) async fn check_invoice(&self, invoice: &Invoice, deadline: Option<Instant>) -> CheckOutcome {
        if let Some(outcome) = self.interrupted(deadline) {
            return outcome;
        }

        let receiver = invoice.receiver_address.as_str();
        if let Err(e) = validate_address(receiver) {
            return CheckOutcome::Failed(e);
        }

        let signatures = match self.chain
            .get_signatures_for_address(receiver, self.config.signature_limit)
            .await
        {
            Ok(s) => s,
            Err(e) => return CheckOutcome::Failed(e),
        };

        trace!(count = signatures.len(), "Fetched recent signatures");

        for info in signatures.iter().take(self.config.signature_limit) {
            if let Some(outcome) = self.interrupted(deadline) {
                return outcome;
            }

            if info.is_failed() {
                trace!(signature = %info.signature, "Skipping failed transaction");
                continue;
            }

            let tx = match self.chain.get_transaction(&info.signature).await {
                Ok(tx) => tx,
                Err(e) => return CheckOutcome::Failed(e),
            };

            if tx.is_none() {
                debug!(signature = %info.signature, "Transaction not found on node");
            }

            if self.matcher.matches(tx.as_ref(), invoice, receiver) {
                return CheckOutcome::Paid { signature: info.signature.clone() };
            }
        }

        CheckOutcome::Unpaid
    }
}
