use crate::error::Result;
use crate::model::{Invoice, InvoiceStatus};
use std::future::Future;

pub mod postgres;
pub mod mock;

pub use mock::MockDatabase;
pub use postgres::Postgres;

pub trait DatabaseAdapter: Send + Sync {
    fn get_invoices(&self, page: u32, limit: u32) -> impl Future<Output = Result<Vec<Invoice>>> + Send;
    fn get_invoice(&self, id: &str) -> impl Future<Output = Result<Option<Invoice>>> + Send;
    fn get_invoice_by_link_token(&self, link_token: &str)
        -> impl Future<Output = Result<Option<Invoice>>> + Send;
    fn get_invoice_by_number(&self, invoice_number: &str)
        -> impl Future<Output = Result<Option<Invoice>>> + Send;
    fn add_invoice(&self, invoice: &Invoice) -> impl Future<Output = Result<()>> + Send;
    fn remove_invoice(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    // watcher side
    fn find_pending(&self) -> impl Future<Output = Result<Vec<Invoice>>> + Send;
    /// Single-row status write in its own transaction. Fails if the invoice does not exist.
    fn update_status(&self, id: &str, status: InvoiceStatus) -> impl Future<Output = Result<()>> + Send;
}

/// 1-based page to row offset.
pub(crate) fn page_offset(page: u32, limit: u32) -> u64 {
    page.saturating_sub(1) as u64 * limit as u64
}
