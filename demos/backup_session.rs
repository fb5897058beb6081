//! Backup session example
//!
//! Runs two sessions against the same state file. The first mutation of
//! each session leaves the state from before that session in
//! `state.json.backup`.
//!
//! ```text
//! RUST_LOG=state_backup=debug cargo run --example backup_session -- /tmp/demo
//! ```

use anyhow::Context;
use serde_json::json;
use state_backup::{StateConfig, StateSnapshot, StateStore};
use tracing_subscriber::EnvFilter;

async fn run_session(config: &StateConfig, generation: u64) -> anyhow::Result<()> {
    let store = config.open();

    if let Some(locker) = store.as_locker() {
        locker.lock("backup_session example").await?;
    }

    store.refresh_state().await?;
    let mut state = store.current_state().unwrap_or_default();
    state.set("generation", json!(generation));

    store.write_state(&state).await?;
    store.persist_state().await?;

    if let Some(locker) = store.as_locker() {
        locker.unlock().await?;
    }

    println!("session {} wrote generation {}", generation, generation);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dir = std::env::args().nth(1).unwrap_or_else(|| "demo-state".to_string());
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir))?;

    let config = StateConfig::new(format!("{}/state.json", dir));

    for generation in 1..=3 {
        run_session(&config, generation).await?;
    }

    if let Some(path) = config.backup_path() {
        let backup = state_backup::LocalStore::new(&path);
        backup.refresh_state().await?;
        let previous = backup.current_state().unwrap_or_else(StateSnapshot::new);
        println!(
            "backup {} holds generation {}",
            path.display(),
            previous.get("generation").cloned().unwrap_or(json!(null))
        );
    }

    Ok(())
}
