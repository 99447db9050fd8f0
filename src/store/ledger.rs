//! Persistent ledger actions

use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, params_from_iter, types::Value, Connection};
use rust_decimal::Decimal;

use crate::domain::{Asset, LedgerAction, LedgerActionFilter};

/// Storage for ledger actions
pub trait LedgerStore {
    /// Stored actions matching `filter`, oldest first
    fn get_ledger_actions(&self, filter: &LedgerActionFilter) -> Result<Vec<LedgerAction>>;

    /// Persist `actions`, returning how many were written
    fn add_ledger_actions(&self, actions: &[LedgerAction]) -> Result<usize>;
}

impl<T: LedgerStore + ?Sized> LedgerStore for &T {
    fn get_ledger_actions(&self, filter: &LedgerActionFilter) -> Result<Vec<LedgerAction>> {
        (**self).get_ledger_actions(filter)
    }

    fn add_ledger_actions(&self, actions: &[LedgerAction]) -> Result<usize> {
        (**self).add_ledger_actions(actions)
    }
}

/// SQLite-backed ledger
#[derive(Debug)]
pub struct SqliteLedgerStore {
    conn: Connection,
}

impl SqliteLedgerStore {
    /// Open or create the ledger database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let conn = Connection::open(path).with_context(|| format!("open db {}", path.display()))?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// In-memory ledger, gone when dropped
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory().context("open in-memory db")?,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ledger_actions (
                identifier        INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp         INTEGER NOT NULL,
                type              TEXT NOT NULL,
                location          TEXT NOT NULL,
                amount            TEXT NOT NULL,
                asset             TEXT NOT NULL,
                asset_symbol      TEXT NOT NULL,
                rate              TEXT,
                rate_asset        TEXT,
                rate_asset_symbol TEXT,
                link              TEXT,
                notes             TEXT
            );
            CREATE INDEX IF NOT EXISTS ledger_actions_location_notes
                ON ledger_actions(location, notes);",
        )?;
        Ok(())
    }
}

/// One row as stored; decimals and enums still in text form
struct StoredAction {
    identifier: i64,
    timestamp: i64,
    action_type: String,
    location: String,
    amount: String,
    asset: String,
    asset_symbol: String,
    rate: Option<String>,
    rate_asset: Option<String>,
    rate_asset_symbol: Option<String>,
    link: Option<String>,
    notes: Option<String>,
}

impl StoredAction {
    fn into_action(self) -> Result<LedgerAction> {
        let rate_asset = match (self.rate_asset, self.rate_asset_symbol) {
            (Some(identifier), Some(symbol)) => Some(Asset::new(identifier, symbol)),
            (Some(identifier), None) => Some(Asset::new(identifier.clone(), identifier)),
            _ => None,
        };
        Ok(LedgerAction {
            identifier: self.identifier,
            timestamp: self.timestamp,
            action_type: self.action_type.parse().map_err(|e: String| anyhow!(e))?,
            location: self.location.parse().map_err(|e: String| anyhow!(e))?,
            amount: parse_decimal(&self.amount)?,
            asset: Asset::new(self.asset, self.asset_symbol),
            rate: self.rate.as_deref().map(parse_decimal).transpose()?,
            rate_asset,
            link: self.link,
            notes: self.notes,
        })
    }
}

fn parse_decimal(text: &str) -> Result<Decimal> {
    Decimal::from_str(text).with_context(|| format!("stored amount '{}'", text))
}

impl LedgerStore for SqliteLedgerStore {
    fn get_ledger_actions(&self, filter: &LedgerActionFilter) -> Result<Vec<LedgerAction>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(from_ts) = filter.from_ts {
            clauses.push("timestamp >= ?");
            values.push(Value::Integer(from_ts));
        }
        if let Some(to_ts) = filter.to_ts {
            clauses.push("timestamp <= ?");
            values.push(Value::Integer(to_ts));
        }
        if let Some(location) = filter.location {
            clauses.push("location = ?");
            values.push(Value::Text(location.as_str().to_string()));
        }
        if let Some(notes) = &filter.notes {
            clauses.push("notes = ?");
            values.push(Value::Text(notes.clone()));
        }

        let mut sql = String::from(
            "SELECT identifier, timestamp, type, location, amount, asset, asset_symbol,
                    rate, rate_asset, rate_asset_symbol, link, notes
             FROM ledger_actions",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp, identifier");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let stored = StoredAction {
                identifier: row.get(0)?,
                timestamp: row.get(1)?,
                action_type: row.get(2)?,
                location: row.get(3)?,
                amount: row.get(4)?,
                asset: row.get(5)?,
                asset_symbol: row.get(6)?,
                rate: row.get(7)?,
                rate_asset: row.get(8)?,
                rate_asset_symbol: row.get(9)?,
                link: row.get(10)?,
                notes: row.get(11)?,
            };
            out.push(stored.into_action()?);
        }
        Ok(out)
    }

    fn add_ledger_actions(&self, actions: &[LedgerAction]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO ledger_actions(
                    timestamp, type, location, amount, asset, asset_symbol,
                    rate, rate_asset, rate_asset_symbol, link, notes
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for action in actions {
                stmt.execute(params![
                    action.timestamp,
                    action.action_type.as_str(),
                    action.location.as_str(),
                    action.amount.to_string(),
                    action.asset.identifier,
                    action.asset.symbol,
                    action.rate.map(|rate| rate.to_string()),
                    action.rate_asset.as_ref().map(|a| a.identifier.as_str()),
                    action.rate_asset.as_ref().map(|a| a.symbol.as_str()),
                    action.link,
                    action.notes,
                ])?;
            }
        }
        tx.commit()?;
        Ok(actions.len())
    }
}
