//! Command implementations

mod core;
mod import;
mod serve;

pub use core::*;
pub use import::*;
pub use serve::*;

use std::path::Path;

use anyhow::Result;
use khata_core::db::Database;

/// Open the database, honoring the encryption flag
pub fn open_db(path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = path.to_string_lossy();
    let db = if no_encrypt {
        Database::new_unencrypted(&path_str)?
    } else {
        Database::new(&path_str)?
    };
    Ok(db)
}
