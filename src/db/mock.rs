use crate::db::{page_offset, DatabaseAdapter};
use crate::error::{Error, Result};
use crate::model::{Invoice, InvoiceStatus};
use chrono::Utc;
use dashmap::DashMap;

/// In-memory invoice store. Used as the test double for the watcher and anything
/// else that needs a repository without postgres.
#[derive(Default)]
pub struct MockDatabase {
    invoices: DashMap<String, Invoice>, // key = id
}

impl MockDatabase {
    pub fn new() -> Self {
        Self {
            invoices: DashMap::new(),
        }
    }

    fn find_by<F: Fn(&Invoice) -> bool>(&self, pred: F) -> Option<Invoice> {
        self.invoices.iter()
            .find(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
    }
}

impl DatabaseAdapter for MockDatabase {
    async fn get_invoices(&self, page: u32, limit: u32) -> Result<Vec<Invoice>> {
        let mut all: Vec<Invoice> = self.invoices.iter()
            .map(|x| x.value().clone())
            .collect();

        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(all.into_iter()
            .skip(page_offset(page, limit) as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get_invoice(&self, id: &str) -> Result<Option<Invoice>> {
        Ok(self.invoices.get(id).map(|x| x.value().clone()))
    }

    async fn get_invoice_by_link_token(&self, link_token: &str) -> Result<Option<Invoice>> {
        Ok(self.find_by(|i| i.link_token == link_token))
    }

    async fn get_invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>> {
        Ok(self.find_by(|i| i.invoice_number == invoice_number))
    }

    async fn add_invoice(&self, invoice: &Invoice) -> Result<()> {
        if self.invoices.contains_key(&invoice.id) {
            return Err(Error::Storage(format!("invoice {} already exists", invoice.id)));
        }

        if self.find_by(|i| i.invoice_number == invoice.invoice_number).is_some() {
            return Err(Error::Storage(format!(
                "invoice number {} already exists", invoice.invoice_number)));
        }

        if self.find_by(|i| i.link_token == invoice.link_token).is_some() {
            return Err(Error::Storage("link token already in use".to_owned()));
        }

        self.invoices.insert(invoice.id.clone(), invoice.clone());

        Ok(())
    }

    async fn remove_invoice(&self, id: &str) -> Result<()> {
        self.invoices.remove(id);
        Ok(())
    }

    async fn find_pending(&self) -> Result<Vec<Invoice>> {
        Ok(self.invoices.iter()
            .filter(|x| x.value().status == InvoiceStatus::Pending)
            .map(|x| x.value().clone())
            .collect())
    }

    async fn update_status(&self, id: &str, status: InvoiceStatus) -> Result<()> {
        match self.invoices.get_mut(id) {
            Some(mut invoice) => {
                invoice.status = status;
                invoice.updated_at = Utc::now();
            }
            None => return Err(Error::Storage(format!("invoice {} not found", id))),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::{invoice, RECEIVER};
    use chrono::Duration;

    #[tokio::test]
    async fn test_add_and_lookup() {
        let db = MockDatabase::new();
        let inv = invoice("1", "10", RECEIVER);
        db.add_invoice(&inv).await.unwrap();

        assert_eq!(db.get_invoice("1").await.unwrap(), Some(inv.clone()));
        assert_eq!(db.get_invoice_by_link_token(&inv.link_token).await.unwrap(), Some(inv.clone()));
        assert_eq!(db.get_invoice_by_number("INV-1").await.unwrap(), Some(inv));
        assert_eq!(db.get_invoice("2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_invoice_number_rejected() {
        let db = MockDatabase::new();
        db.add_invoice(&invoice("1", "10", RECEIVER)).await.unwrap();

        let mut dup = invoice("2", "10", RECEIVER);
        dup.invoice_number = "INV-1".into();

        assert!(matches!(db.add_invoice(&dup).await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_find_pending_and_update_status() {
        let db = MockDatabase::new();
        db.add_invoice(&invoice("1", "10", RECEIVER)).await.unwrap();
        db.add_invoice(&invoice("2", "20", RECEIVER)).await.unwrap();

        db.update_status("1", InvoiceStatus::Paid).await.unwrap();

        let pending = db.find_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "2");
        assert_eq!(db.get_invoice("1").await.unwrap().unwrap().status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_update_missing_invoice_fails() {
        let db = MockDatabase::new();
        assert!(matches!(db.update_status("nope", InvoiceStatus::Paid).await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_pagination_is_newest_first() {
        let db = MockDatabase::new();
        let base = Utc::now();

        for i in 0..5 {
            let mut inv = invoice(&i.to_string(), "1", RECEIVER);
            inv.created_at = base + Duration::seconds(i);
            db.add_invoice(&inv).await.unwrap();
        }

        let first = db.get_invoices(1, 2).await.unwrap();
        let third = db.get_invoices(3, 2).await.unwrap();

        assert_eq!(first.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), vec!["4", "3"]);
        assert_eq!(third.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), vec!["0"]);
    }
}
