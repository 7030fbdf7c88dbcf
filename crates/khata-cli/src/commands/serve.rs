//! Serve command

use std::path::Path;

use anyhow::Result;

use super::open_db;

/// Start the web server
pub async fn cmd_serve(db_path: &Path, host: &str, port: u16, no_encrypt: bool) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    khata_server::serve(db, host, port).await
}
