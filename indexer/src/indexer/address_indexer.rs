//! Lazy address registration

use std::collections::BTreeSet;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::error::Result;

/// Rows per multi-value insert, well under SQLite's bind limit.
pub(crate) const INSERT_CHUNK: usize = 500;

pub struct AddressIndexer;

/// The address a row may reference; empty strings never become addresses.
pub(crate) fn stored_address(address: &Option<String>) -> Option<&str> {
    address.as_deref().filter(|a| !a.is_empty())
}

impl AddressIndexer {
    /// Create every address in `addresses` that is not stored yet.
    ///
    /// Runs on the caller's connection so it joins the caller's transaction.
    /// Returns the number of newly created addresses.
    pub async fn ensure<'s, I>(conn: &mut SqliteConnection, addresses: I) -> Result<u64>
    where
        I: IntoIterator<Item = &'s str>,
    {
        let unique: BTreeSet<&str> = addresses.into_iter().filter(|a| !a.is_empty()).collect();
        let unique: Vec<&str> = unique.into_iter().collect();

        let mut created = 0;
        for chunk in unique.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO addresses (address) ");
            builder.push_values(chunk, |mut row, address| {
                row.push_bind(address.to_string());
            });
            created += builder.build().execute(&mut *conn).await?.rows_affected();
        }
        Ok(created)
    }
}
