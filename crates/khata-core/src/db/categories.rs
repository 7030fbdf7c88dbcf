//! Category vocabulary operations

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::Category;

/// Default system vocabulary seeded by `khata init`
///
/// (slug, display name) pairs. Slugs are what the oracle is asked to
/// choose from and what the Axio category derivation targets.
const SYSTEM_CATEGORIES: &[(&str, &str)] = &[
    ("food-dining", "Food & Dining"),
    ("groceries", "Groceries"),
    ("transport", "Transport"),
    ("fuel", "Fuel"),
    ("shopping", "Shopping"),
    ("entertainment", "Entertainment"),
    ("bills-utilities", "Bills & Utilities"),
    ("health-medical", "Health & Medical"),
    ("travel", "Travel"),
    ("education", "Education"),
    ("personal-care", "Personal Care"),
    ("rent", "Rent"),
    ("emi", "EMI"),
    ("investments", "Investments"),
    ("transfers", "Transfers"),
    ("salary", "Salary"),
    ("refunds", "Refunds"),
    ("other", "Other"),
];

impl Database {
    /// Load the category vocabulary visible to a user
    ///
    /// System categories (user_id NULL) plus that user's custom rows.
    /// Fetched once per batch and held immutable for the batch's duration.
    pub fn categories_for_user(&self, user_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, slug, name
            FROM categories
            WHERE user_id IS NULL OR user_id = ?
            ORDER BY id
            "#,
        )?;

        let categories = stmt
            .query_map(params![user_id], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    slug: row.get(2)?,
                    name: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    /// Create a category; `user_id` None makes it system-wide
    pub fn create_category(
        &self,
        user_id: Option<i64>,
        slug: &str,
        name: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (user_id, slug, name) VALUES (?, ?, ?)",
            params![user_id, slug, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Seed the default system vocabulary (idempotent)
    pub fn seed_system_categories(&self) -> Result<()> {
        let conn = self.conn()?;
        for (slug, name) in SYSTEM_CATEGORIES {
            conn.execute(
                "INSERT OR IGNORE INTO categories (user_id, slug, name) VALUES (NULL, ?, ?)",
                params![slug, name],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_scoping() {
        let db = Database::in_memory().unwrap();
        let alice = db.create_user("alice-key", None).unwrap();
        let bob = db.create_user("bob-key", None).unwrap();

        db.create_category(None, "groceries", "Groceries").unwrap();
        db.create_category(Some(alice), "hobby", "Hobby").unwrap();
        db.create_category(Some(bob), "pets", "Pets").unwrap();

        let vocab = db.categories_for_user(alice).unwrap();
        let slugs: Vec<&str> = vocab.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["groceries", "hobby"]);
    }

    #[test]
    fn test_seed_system_categories_idempotent() {
        let db = Database::in_memory().unwrap();
        db.seed_system_categories().unwrap();
        db.seed_system_categories().unwrap();

        let user = db.create_user("k", None).unwrap();
        let vocab = db.categories_for_user(user).unwrap();
        assert_eq!(vocab.len(), super::SYSTEM_CATEGORIES.len());
    }

    #[test]
    fn test_slug_unique_case_insensitive_within_scope() {
        let db = Database::in_memory().unwrap();
        db.create_category(None, "groceries", "Groceries").unwrap();
        assert!(db.create_category(None, "GROCERIES", "Shouting").is_err());

        // Same slug in a user scope is a different key
        let user = db.create_user("k", None).unwrap();
        db.create_category(Some(user), "groceries", "Mine").unwrap();
    }
}
