//! `powergate user` — Manage user accounts in the ledger database.

use powergate_ledger::SqliteStore;
use std::path::PathBuf;

pub async fn add(
    config_path: Option<PathBuf>,
    username: &str,
    balance: Option<i64>,
    admin: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = SqliteStore::new(&config.database.path).await?;

    let balance = balance.unwrap_or(config.signup_bonus);
    let user = store.create_user(username, admin, balance).await?;

    println!(
        "Created user '{}' (id {}) with balance {}{}",
        user.username,
        user.id,
        user.power_balance,
        if user.is_admin { ", admin" } else { "" }
    );

    Ok(())
}
