//! Device-local secure key-value items.
//!
//! Only ever used on the vault database, which is opened owner-only and never
//! synced anywhere.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Store `value` under `key`, replacing any previous value.
    pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO secure_items (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Store several items in one transaction: all of them land or none do.
    pub fn set_items(&mut self, items: &[(&str, &str)]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        for (key, value) in items {
            tx.execute(
                "INSERT OR REPLACE INTO secure_items (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Read the value under `key`; `None` if it was never set.
    pub fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM secure_items WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Delete `key`.  Returns `true` if it existed.
    pub fn remove_item(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM secure_items WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Delete several items in one transaction.  Returns how many existed.
    pub fn remove_items(&mut self, keys: &[&str]) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        let mut removed = 0;
        for key in keys {
            removed += tx.execute("DELETE FROM secure_items WHERE key = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Delete every item.  Returns the number removed.
    pub fn clear_items(&self) -> Result<usize> {
        let affected = self.conn().execute("DELETE FROM secure_items", [])?;
        Ok(affected)
    }
}
