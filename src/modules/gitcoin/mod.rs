//! Gitcoin grants CSV import
//!
//! Turns the grant rows of a Gitcoin contributions export into donation
//! ledger actions, skipping rows already imported (matched by transaction id).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::core::MessagesAggregator;
use crate::domain::{
    Asset, AssetResolver, LedgerAction, LedgerActionFilter, LedgerActionType, Location,
};
use crate::store::LedgerStore;

/// Notes attached to every imported action; also the dedup scope
pub const GITCOIN_NOTES: &str = "gitcoin";

const GENERIC_ROW_ERROR: &str = "Unexpected data encountered during deserialization of a gitcoin \
    CSV entry. Check logs for details and open a bug report.";

/// Historical USD prices
#[async_trait::async_trait]
pub trait PriceHistorian: Send + Sync {
    /// USD price of `asset` at `timestamp`, zero when unknown
    async fn query_usd_price(&self, asset: &Asset, timestamp: i64) -> Decimal;
}

/// Price source that never knows a price
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPriceHistorian;

#[async_trait::async_trait]
impl PriceHistorian for NoPriceHistorian {
    async fn query_usd_price(&self, _asset: &Asset, _timestamp: i64) -> Decimal {
        Decimal::ZERO
    }
}

/// Counts from one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Grant rows turned into ledger actions
    pub parsed: usize,
    /// Grant rows that could not be used
    pub skipped: usize,
    /// Parsed actions already present in the ledger
    pub duplicates: usize,
    pub inserted: usize,
}

/// Why a single row was rejected
#[derive(Debug, Error)]
enum ImportError {
    #[error("unknown asset {0}")]
    UnknownAsset(String),

    #[error("{0}")]
    Deserialization(String),

    #[error("Missing key entry for {0}.")]
    MissingField(&'static str),
}

type Row = HashMap<String, String>;

fn field<'a>(row: &'a Row, name: &'static str) -> Result<&'a str, ImportError> {
    row.get(name)
        .map(|value| value.as_str())
        .ok_or(ImportError::MissingField(name))
}

fn deserialize_amount(text: &str) -> Result<Decimal, ImportError> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|e| ImportError::Deserialization(format!("invalid amount '{}': {}", text, e)))
}

/// Parse an ISO-8601 date; dates without an offset are UTC
fn iso8601_to_timestamp(text: &str) -> Result<i64, ImportError> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Ok(date.timestamp());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(date.and_utc().timestamp());
        }
    }
    Err(ImportError::Deserialization(format!(
        "invalid ISO8601 date '{}'",
        text
    )))
}

/// Gitcoin CSV importer writing into a ledger store
pub struct GitcoinDataImporter<S: LedgerStore> {
    store: S,
    assets: Arc<dyn AssetResolver>,
    prices: Arc<dyn PriceHistorian>,
    messages: Arc<dyn MessagesAggregator>,
}

impl<S: LedgerStore> GitcoinDataImporter<S> {
    pub fn new(
        store: S,
        assets: Arc<dyn AssetResolver>,
        prices: Arc<dyn PriceHistorian>,
        messages: Arc<dyn MessagesAggregator>,
    ) -> Self {
        Self {
            store,
            assets,
            prices,
            messages,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Import a CSV export from disk
    pub async fn import_gitcoin_csv(&self, path: &Path) -> Result<ImportSummary> {
        let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
        self.import_from_reader(file)
            .await
            .with_context(|| format!("import {}", path.display()))
    }

    /// Import CSV data from any reader (UTF-8, optional BOM)
    pub async fn import_from_reader<R: Read>(&self, mut reader: R) -> Result<ImportSummary> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .context("CSV is not valid UTF-8")?;
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b',')
            .quote(b'"')
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut summary = ImportSummary::default();
        let mut actions = Vec::new();

        for record in csv_reader.deserialize::<Row>() {
            let row = match record {
                Ok(row) => row,
                Err(err) => {
                    self.report_row_error(None, &ImportError::Deserialization(err.to_string()));
                    summary.skipped += 1;
                    continue;
                }
            };

            match self.consume_grant_entry(&row).await {
                Ok(Some(action)) => actions.push(action),
                Ok(None) if row.get("Type").map(String::as_str) != Some("grant") => {}
                Ok(None) => summary.skipped += 1,
                Err(ImportError::UnknownAsset(symbol)) => {
                    self.messages.add_warning(format!(
                        "During gitcoin grant CSV processing found asset {} that cant be \
                         matched to a single known asset. Skipping entry.",
                        symbol
                    ));
                    summary.skipped += 1;
                }
                Err(err) => {
                    self.report_row_error(Some(&row), &err);
                    summary.skipped += 1;
                }
            }
        }
        summary.parsed = actions.len();

        let existing = self.store.get_ledger_actions(&LedgerActionFilter {
            location: Some(Location::Blockchain),
            notes: Some(GITCOIN_NOTES.to_string()),
            ..Default::default()
        })?;
        let known_links: HashSet<String> = existing.into_iter().filter_map(|a| a.link).collect();

        let fresh: Vec<LedgerAction> = actions
            .into_iter()
            .filter(|action| {
                action
                    .link
                    .as_ref()
                    .map_or(true, |link| !known_links.contains(link))
            })
            .collect();
        summary.duplicates = summary.parsed - fresh.len();
        summary.inserted = self.store.add_ledger_actions(&fresh)?;

        info!(
            parsed = summary.parsed,
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            inserted = summary.inserted,
            "Gitcoin CSV import finished"
        );
        Ok(summary)
    }

    fn report_row_error(&self, row: Option<&Row>, err: &ImportError) {
        self.messages.add_error(GENERIC_ROW_ERROR.to_string());
        error!(
            row = ?row,
            error = %err,
            "Unexpected data encountered during deserialization of a gitcoin CSV entry"
        );
    }

    /// One CSV row to a ledger action; `None` for rows that are not grants or carry no value
    async fn consume_grant_entry(&self, row: &Row) -> Result<Option<LedgerAction>, ImportError> {
        if field(row, "Type")? != "grant" {
            return Ok(None);
        }

        let date = field(row, "date")?;
        let timestamp = iso8601_to_timestamp(date)?;
        let usd_value = deserialize_amount(field(row, "Value In USD")?)?;
        let tx_id = field(row, "txid")?;
        let symbol = field(row, "token_name")?;
        let asset = self
            .assets
            .asset_by_symbol(symbol)
            .ok_or_else(|| ImportError::UnknownAsset(symbol.to_string()))?;
        let amount = deserialize_amount(field(row, "token_value")?)?;

        let rate = if amount.is_zero() {
            let price = self.prices.query_usd_price(&asset, timestamp).await;
            if price.is_zero() {
                self.messages.add_warning(format!(
                    "Could not process gitcoin grant entry at {} for {} due to amount being \
                     zero and inability to find price. Skipping.",
                    date, asset.symbol
                ));
                return Ok(None);
            }
            price
        } else {
            usd_value.checked_div(amount).ok_or_else(|| {
                ImportError::Deserialization(format!(
                    "rate {} / {} out of range",
                    usd_value, amount
                ))
            })?
        };

        debug!(tx_id, asset = %asset.identifier, %amount, %rate, "Gitcoin grant entry");
        Ok(Some(LedgerAction {
            identifier: 0,
            timestamp,
            action_type: LedgerActionType::DonationReceived,
            location: Location::Blockchain,
            amount,
            asset,
            rate: Some(rate),
            rate_asset: Some(Asset::usd()),
            link: Some(tx_id.to_string()),
            notes: Some(GITCOIN_NOTES.to_string()),
        }))
    }
}
