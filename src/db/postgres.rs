use crate::db::{page_offset, DatabaseAdapter};
use crate::error::{Error, Result};
use crate::model::{Invoice, InvoiceStatus, Person};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use tracing::info;

const INVOICE_COLUMNS: &str = r#"id, invoice_number, amount, currency, description, due_date, status,
    receiver_address, link_token, sender_details, recipient_details, created_at, updated_at"#;

pub struct Postgres {
    pool: PgPool,
}

impl Postgres {
    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations/postgres")
            .run(&pool)
            .await?;

        info!(max_connections, "Connected to postgres");

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn map_row_to_invoice(row: PgRow) -> Result<Invoice> {
        let status_str: String = row.try_get("status")?;
        let status = InvoiceStatus::from_str(&status_str)
            .map_err(|_| Error::Storage(format!("unknown invoice status in db: {}", status_str)))?;

        let sender: Json<Person> = row.try_get("sender_details")?;
        let recipient: Json<Person> = row.try_get("recipient_details")?;

        Ok(Invoice {
            id: row.try_get::<uuid::Uuid, _>("id")?.to_string(),
            invoice_number: row.try_get("invoice_number")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            description: row.try_get("description")?,
            due_date: row.try_get("due_date")?,
            status,
            receiver_address: row.try_get("receiver_address")?,
            link_token: row.try_get("link_token")?,
            sender_details: sender.0,
            recipient_details: recipient.0,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<Invoice>> {
        let row = sqlx::query(&format!("SELECT {} FROM invoices WHERE {} = $1", INVOICE_COLUMNS, column))
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::map_row_to_invoice).transpose()
    }
}

fn parse_id(id: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(id)
        .map_err(|e| Error::Storage(format!("invalid invoice id '{}': {}", id, e)))
}

impl DatabaseAdapter for Postgres {
    async fn get_invoices(&self, page: u32, limit: u32) -> Result<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM invoices ORDER BY created_at DESC LIMIT $1 OFFSET $2", INVOICE_COLUMNS))
            .bind(limit as i64)
            .bind(page_offset(page, limit) as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::map_row_to_invoice).collect()
    }

    async fn get_invoice(&self, id: &str) -> Result<Option<Invoice>> {
        let row = sqlx::query(&format!("SELECT {} FROM invoices WHERE id = $1", INVOICE_COLUMNS))
            .bind(parse_id(id)?)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::map_row_to_invoice).transpose()
    }

    async fn get_invoice_by_link_token(&self, link_token: &str) -> Result<Option<Invoice>> {
        self.fetch_one_by("link_token", link_token).await
    }

    async fn get_invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>> {
        self.fetch_one_by("invoice_number", invoice_number).await
    }

    async fn add_invoice(&self, invoice: &Invoice) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO invoices
                   (id, invoice_number, amount, currency, description, due_date, status,
                    receiver_address, link_token, sender_details, recipient_details,
                    created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#
        )
            .bind(parse_id(&invoice.id)?)
            .bind(&invoice.invoice_number)
            .bind(&invoice.amount)
            .bind(&invoice.currency)
            .bind(&invoice.description)
            .bind(invoice.due_date)
            .bind(invoice.status.to_string())
            .bind(&invoice.receiver_address)
            .bind(&invoice.link_token)
            .bind(Json(&invoice.sender_details))
            .bind(Json(&invoice.recipient_details))
            .bind(invoice.created_at)
            .bind(invoice.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn remove_invoice(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(parse_id(id)?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_pending(&self) -> Result<Vec<Invoice>> {
        let rows = sqlx::query(&format!("SELECT {} FROM invoices WHERE status = $1", INVOICE_COLUMNS))
            .bind(InvoiceStatus::Pending.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::map_row_to_invoice).collect()
    }

    async fn update_status(&self, id: &str, status: InvoiceStatus) -> Result<()> {
        let id_parsed = parse_id(id)?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE invoices SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.to_string())
            .bind(id_parsed)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::Storage(format!("invoice {} not found", id)));
        }

        tx.commit().await?;

        Ok(())
    }
}
