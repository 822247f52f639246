use crate::amount;
use crate::config::{TokenConfig, WatcherConfig};
use crate::model::{Invoice, TokenBalance, Transaction};
use bigdecimal::BigDecimal;
use tracing::{debug, trace, warn};

/// Decides whether a transaction pays an invoice.
///
/// Only balance entries of the configured mint owned by the receiver count. The
/// received amount is `post - pre` of the same token account and has to land within
/// `tolerance` of the invoice amount. The first qualifying entry wins, partial
/// transfers are never summed up.
#[derive(Debug, Clone)]
pub struct TransferMatcher {
    token: TokenConfig,
    tolerance: BigDecimal,
}

impl TransferMatcher {
    pub fn new(token: TokenConfig, tolerance: BigDecimal) -> Self {
        Self { token, tolerance }
    }

    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(config.token.clone(), config.tolerance.clone())
    }

    pub fn matches(&self, tx: Option<&Transaction>, invoice: &Invoice, receiver: &str) -> bool {
        let Some(meta) = tx.and_then(|t| t.meta.as_ref()) else {
            trace!(invoice = %invoice.id, "Transaction or its meta is missing");
            return false;
        };

        for post in &meta.post_token_balances {
            if post.mint != self.token.mint {
                continue;
            }

            if post.owner.as_deref() != Some(receiver) {
                continue;
            }

            let Some(pre) = meta.pre_token_balances.iter()
                .find(|b| b.account_index == post.account_index)
            else {
                trace!(account_index = post.account_index, "No pre balance for token account");
                continue;
            };

            let Some(delta) = self.delta(pre, post) else {
                continue;
            };

            if (&delta - &invoice.amount).abs() <= self.tolerance {
                debug!(
                    invoice = %invoice.id,
                    received = %delta,
                    expected = %invoice.amount,
                    "Transfer matches invoice"
                );
                return true;
            }

            trace!(received = %delta, expected = %invoice.amount, "Transfer amount out of tolerance");
        }

        false
    }

    fn delta(&self, pre: &TokenBalance, post: &TokenBalance) -> Option<BigDecimal> {
        let parsed = amount::convert(&post.ui_token_amount.amount, self.token.decimals)
            .and_then(|post_amount| {
                amount::convert(&pre.ui_token_amount.amount, self.token.decimals)
                    .map(|pre_amount| post_amount - pre_amount)
            });

        match parsed {
            Ok(delta) => Some(delta),
            Err(e) => {
                warn!(error = %e, account_index = post.account_index, "Skipping unparsable token balance");
                None
            }
        }
    }
}
