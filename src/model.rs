use crate::amount;
use crate::error::{Error, Result};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

pub const DEFAULT_CURRENCY: &str = "USDC";

/// Fractional digits the `invoices.amount` column keeps.
pub const AMOUNT_SCALE: u8 = 6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema,
    Display, EnumString, AsRefStr)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Canceled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Person {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    #[schema(value_type = String, example = "100.00")]
    pub amount: BigDecimal,
    pub currency: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub status: InvoiceStatus,
    pub receiver_address: String,
    pub link_token: String,
    pub sender_details: Person,
    pub recipient_details: Person,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a caller supplies to open a new invoice.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub invoice_number: String,
    #[schema(value_type = String, example = "100.00")]
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub receiver_address: String,
    pub sender_details: Person,
    pub recipient_details: Person,
}

impl Invoice {
    /// Builds a PENDING invoice with a fresh id and link token.
    pub fn from_request(req: NewInvoice) -> Self {
        let now = Utc::now();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_number: req.invoice_number,
            amount: req.amount,
            currency: req.currency
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned()),
            description: req.description,
            due_date: req.due_date,
            status: InvoiceStatus::Pending,
            receiver_address: req.receiver_address,
            link_token: uuid::Uuid::new_v4().to_string(),
            sender_details: req.sender_details,
            recipient_details: req.recipient_details,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.invoice_number.trim().is_empty() {
            return Err(Error::Validation("invoice number is required".into()));
        }

        if self.amount <= BigDecimal::zero() {
            return Err(Error::Validation("amount must be greater than zero".into()));
        }

        self.validate_precision(AMOUNT_SCALE)?;

        if self.receiver_address.trim().is_empty() {
            return Err(Error::Validation("receiver address is required".into()));
        }

        if self.sender_details.name.is_empty() || self.sender_details.email.is_empty() {
            return Err(Error::Validation("sender name and email are required".into()));
        }

        if self.recipient_details.name.is_empty() || self.recipient_details.email.is_empty() {
            return Err(Error::Validation("recipient name and email are required".into()));
        }

        Ok(())
    }

    /// Rejects amounts with more fractional digits than `decimals`.
    pub fn validate_precision(&self, decimals: u8) -> Result<()> {
        amount::to_raw_units(&self.amount, decimals)
            .map(|_| ())
            .map_err(|e| Error::Validation(e.to_string()))
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvoiceStatus::Pending
    }
}

// chain side. field names follow the solana json-rpc responses

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

impl SignatureInfo {
    pub fn is_failed(&self) -> bool {
        self.err.as_ref().is_some_and(|e| !e.is_null())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    pub post_token_balances: Vec<TokenBalance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account_index: u32,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    /// Raw integer amount, as a string.
    pub amount: String,
    pub decimals: u8,
    #[serde(default)]
    pub ui_amount_string: Option<String>,
}
