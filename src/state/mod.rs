pub mod lifecycle;
pub mod watcher;

use crate::chain::{validate_address, ChainClient};
use crate::config::WatcherConfig;
use crate::db::DatabaseAdapter;
use crate::error::{Error, Result};
use crate::model::{Invoice, InvoiceStatus, NewInvoice};
use std::sync::Arc;
use tracing::{info, instrument};

pub use lifecycle::WatcherHandle;
pub use watcher::{CycleReport, PaymentWatcher};

pub struct AppState<D, C> {
    pub db: Arc<D>,
    pub chain: Arc<C>,
    pub config: WatcherConfig,
    pub watcher: Arc<PaymentWatcher<D, C>>,
}

impl<D, C> AppState<D, C>
where
    D: DatabaseAdapter + 'static,
    C: ChainClient + 'static,
{
    pub fn new(db: D, chain: C, config: WatcherConfig) -> Self {
        let db = Arc::new(db);
        let chain = Arc::new(chain);
        let watcher = Arc::new(PaymentWatcher::new(db.clone(), chain.clone(), config.clone()));

        Self { db, chain, config, watcher }
    }

    /// Builds the state and starts the payment watcher.
    pub fn init(db: D, chain: C, config: WatcherConfig) -> anyhow::Result<(Arc<Self>, WatcherHandle)> {
        config.validate()?;

        let state = Arc::new(Self::new(db, chain, config));
        let handle = state.watcher.start()?;

        Ok((state, handle))
    }

    #[instrument(skip(self, req), fields(number = %req.invoice_number))]
    pub async fn create_invoice(&self, req: NewInvoice) -> Result<Invoice> {
        let invoice = Invoice::from_request(req);
        invoice.validate()?;
        invoice.validate_precision(self.config.token.decimals)?;

        validate_address(&invoice.receiver_address)
            .map_err(|e| Error::Validation(e.to_string()))?;

        if self.db.get_invoice_by_number(&invoice.invoice_number).await?.is_some() {
            return Err(Error::Validation(format!(
                "invoice number {} is already taken", invoice.invoice_number)));
        }

        self.db.add_invoice(&invoice).await?;

        info!(id = %invoice.id, amount = %invoice.amount, "Invoice created");

        Ok(invoice)
    }

    /// Manual status change, e.g. cancelling. Only PENDING invoices can move.
    pub async fn update_invoice_status(&self, id: &str, status: InvoiceStatus) -> Result<Invoice> {
        let Some(mut invoice) = self.db.get_invoice(id).await? else {
            return Err(Error::Storage(format!("invoice {} not found", id)));
        };

        if invoice.status == status {
            return Ok(invoice);
        }

        if !invoice.is_pending() {
            return Err(Error::Validation(format!(
                "invoice {} is {} and can no longer change", id, invoice.status)));
        }

        self.db.update_status(id, status).await?;
        invoice.status = status;

        info!(id, %status, "Invoice status updated");

        Ok(invoice)
    }
}
