//! Configuration store client
//!
//! Reads the `socks5_*` rows of the application's `config` table. A missing
//! table is an expected state on a fresh deployment and is reported as
//! [`StoreRead::SchemaAbsent`], distinct from a connection failure.

use std::collections::HashMap;
use std::future::Future;

use log::{debug, warn};
use sqlx::{Connection, PgConnection};

use super::target::ConnectionTarget;

/// Name of the key/value relation owned by the application
pub const CONFIG_TABLE: &str = "config";

/// Key prefix of proxy settings
pub const KEY_PREFIX: &str = "socks5_";

// Resolved through search_path, like the unqualified name in PROXY_ROWS_SQL
const TABLE_EXISTS_SQL: &str = "SELECT to_regclass($1::text) IS NOT NULL";

// `_` is a LIKE wildcard, so the prefix match is done with left()
const PROXY_ROWS_SQL: &str =
    "SELECT key, value FROM config WHERE left(key, length($1)) = $1";

/// Raw outcome of reading the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRead {
    /// The table exists; `key -> value` for every proxy row with a non-NULL value
    Rows(HashMap<String, String>),
    /// The `config` table does not exist yet
    SchemaAbsent,
    /// The store could not be reached or queried
    ConnectionError(String),
}

/// Source of raw proxy settings
pub trait SettingsSource {
    /// Read every `socks5_*` row from the store
    fn read_rows(&self, target: &ConnectionTarget) -> impl Future<Output = StoreRead>;
}

/// Reads proxy rows from PostgreSQL over a single short-lived connection
#[derive(Debug, Default, Clone, Copy)]
pub struct PgSettingsSource;

impl SettingsSource for PgSettingsSource {
    async fn read_rows(&self, target: &ConnectionTarget) -> StoreRead {
        let mut conn = match PgConnection::connect_with(&target.connect_options()).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Failed to connect to configuration store at {}: {}", target.address(), e);
                return StoreRead::ConnectionError(e.to_string());
            }
        };

        let outcome = query_rows(&mut conn).await;

        // The connection is closed before returning, whatever the outcome
        if let Err(e) = conn.close().await {
            debug!("Error closing store connection: {}", e);
        }

        match outcome {
            Ok(read) => read,
            Err(e) => {
                warn!("Failed to read proxy settings: {}", e);
                StoreRead::ConnectionError(e.to_string())
            }
        }
    }
}

async fn query_rows(conn: &mut PgConnection) -> Result<StoreRead, sqlx::Error> {
    let exists: bool = sqlx::query_scalar(TABLE_EXISTS_SQL)
        .bind(CONFIG_TABLE)
        .fetch_one(&mut *conn)
        .await?;

    if !exists {
        return Ok(StoreRead::SchemaAbsent);
    }

    let rows: Vec<(String, Option<String>)> = sqlx::query_as(PROXY_ROWS_SQL)
        .bind(KEY_PREFIX)
        .fetch_all(&mut *conn)
        .await?;

    debug!("Read {} proxy rows from the store", rows.len());
    Ok(StoreRead::Rows(fold_rows(rows)))
}

/// Fold rows into a mapping; NULL values count as missing keys
pub fn fold_rows<I>(rows: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, Option<String>)>,
{
    rows.into_iter()
        .filter(|(key, _)| key.starts_with(KEY_PREFIX))
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
}
