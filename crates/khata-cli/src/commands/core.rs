//! Init, user and status commands

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::info;

use super::open_db;

/// Initialize the database and seed the system category vocabulary
pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    db.seed_system_categories()?;
    info!("Database initialized at {}", db.path());
    println!("Initialized {}", db.path());
    Ok(())
}

/// Create a user and print their api key
pub fn cmd_user_add(
    db_path: &Path,
    email: Option<&str>,
    key: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let api_key = match key {
        Some(k) => k.to_string(),
        None => mint_api_key(email),
    };

    let user_id = db.create_user(&api_key, email)?;
    println!("Created user {} with api key:", user_id);
    println!("{}", api_key);
    Ok(())
}

/// Mint an opaque api key
///
/// Hash of process-unique entropy; the key itself carries no meaning,
/// it is only a lookup handle.
pub fn mint_api_key(email: Option<&str>) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_be_bytes());
    hasher.update(std::process::id().to_be_bytes());
    hasher.update(COUNTER.fetch_add(1, Ordering::SeqCst).to_be_bytes());
    if let Some(email) = email {
        hasher.update(email.as_bytes());
    }
    format!("khata_{}", &hex::encode(hasher.finalize())[..40])
}

/// Create a category, system-wide or scoped to one user
pub fn cmd_category_add(
    db_path: &Path,
    slug: &str,
    name: &str,
    api_key: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let user_id = match api_key {
        Some(key) => Some(
            db.get_identity(key)?
                .ok_or_else(|| anyhow::anyhow!("Unknown api key"))?
                .id,
        ),
        None => None,
    };

    let id = db.create_category(user_id, slug, name)?;
    match user_id {
        Some(uid) => println!("Created category {} ({}) for user {}", id, slug, uid),
        None => println!("Created system category {} ({})", id, slug),
    }
    Ok(())
}

/// Show database statistics
pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let conn = db.conn()?;

    let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let transactions: i64 =
        conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    let runs: i64 = conn.query_row("SELECT COUNT(*) FROM ingestion_runs", [], |row| row.get(0))?;
    let categories: i64 =
        conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;

    println!("Database: {}", db.path());
    println!("  Users:         {}", users);
    println!("  Categories:    {}", categories);
    println!("  Transactions:  {}", transactions);
    println!("  Ingestion runs: {}", runs);
    Ok(())
}
