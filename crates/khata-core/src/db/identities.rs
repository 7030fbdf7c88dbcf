//! User/api-key resolution

use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::Result;
use crate::models::Identity;

impl Database {
    /// Resolve an opaque api key to a user identity
    ///
    /// Pure lookup, no mutation. Returns None for unknown keys.
    pub fn get_identity(&self, api_key: &str) -> Result<Option<Identity>> {
        let conn = self.conn()?;

        let identity = conn
            .query_row(
                "SELECT id, email FROM users WHERE api_key = ?",
                params![api_key],
                |row| {
                    Ok(Identity {
                        id: row.get(0)?,
                        email: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(identity)
    }

    /// Create a user with the given api key
    pub fn create_user(&self, api_key: &str, email: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (api_key, email) VALUES (?, ?)",
            params![api_key, email],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_identity() {
        let db = Database::in_memory().unwrap();
        let id = db.create_user("key-123", Some("a@example.com")).unwrap();

        let identity = db.get_identity("key-123").unwrap().unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));

        assert!(db.get_identity("nope").unwrap().is_none());
    }

    #[test]
    fn test_api_key_unique() {
        let db = Database::in_memory().unwrap();
        db.create_user("key-123", None).unwrap();
        assert!(db.create_user("key-123", None).is_err());
    }
}
