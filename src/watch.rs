//! Filesystem watcher.
//!
//! Bridges notify's callback thread into the async runtime over a bounded
//! channel, then debounces per path before acting: a path must stay quiet for
//! the configured window before it is ingested or purged. Editors and
//! downloaders touch a file many times in quick succession; the debounce
//! collapses that burst into one action against the final state.
//!
//! Two trees are watched with different intents:
//! - incoming: create/write/rename-in events schedule an ingest.
//! - sorted: remove/rename-out events schedule a purge. Creates under sorted
//!   are ignored, since ingestion itself writes there.
//!
//! Before acting, the filesystem is consulted again: an ingest fires only if
//! the path still exists, a purge only if it is still gone. A rename that
//! crossed the debounce window therefore resolves to the correct final
//! action instead of replaying stale events.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::ingest::Coordinator;
use crate::models::IngestOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Action {
    Ingest,
    Purge,
}

pub async fn run(config: &Config, coordinator: &Coordinator<'_>) -> Result<()> {
    let incoming = config.paths.incoming.clone();
    let sorted = config.paths.sorted.clone();
    std::fs::create_dir_all(&incoming)
        .with_context(|| format!("creating {}", incoming.display()))?;
    std::fs::create_dir_all(&sorted)
        .with_context(|| format!("creating {}", sorted.display()))?;

    // Files that arrived while nothing was watching.
    let startup = coordinator.process_pending().await?;
    if startup.ingested + startup.duplicates + startup.failed > 0 {
        info!(
            ingested = startup.ingested,
            duplicates = startup.duplicates,
            failed = startup.failed,
            "startup scan complete"
        );
    }

    let (tx, mut rx) = mpsc::channel::<(Action, PathBuf)>(config.watcher.queue_depth);

    let event_tx = tx.clone();
    let incoming_root = incoming.clone();
    let sorted_root = sorted.clone();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "watch error");
                return;
            }
        };
        for (action, path) in classify_event(&event, &incoming_root, &sorted_root) {
            // Backpressure over loss: notify's thread blocks if the
            // pipeline is behind.
            if event_tx.blocking_send((action, path)).is_err() {
                return;
            }
        }
    })?;
    watcher.watch(&incoming, RecursiveMode::Recursive)?;
    watcher.watch(&sorted, RecursiveMode::Recursive)?;
    info!(
        incoming = %incoming.display(),
        sorted = %sorted.display(),
        "watching"
    );

    let debounce = Duration::from_millis(config.watcher.debounce_ms);
    let mut pending: HashMap<PathBuf, (Action, Instant)> = HashMap::new();
    let mut tick = tokio::time::interval(debounce.max(Duration::from_millis(50)) / 2);

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some((action, path)) = received else { break };
                debug!(path = %path.display(), ?action, "event queued");
                pending.insert(path, (action, Instant::now() + debounce));
            }
            _ = tick.tick() => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, (_, deadline))| *deadline <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    if let Some((action, _)) = pending.remove(&path) {
                        fire(coordinator, action, &path).await;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down watcher");
                break;
            }
        }
    }

    Ok(())
}

async fn fire(coordinator: &Coordinator<'_>, action: Action, path: &Path) {
    match action {
        Action::Ingest => {
            // The burst may end with the file gone again.
            if !path.is_file() {
                return;
            }
            match coordinator.process_one(path).await {
                Ok(IngestOutcome::Ingested {
                    category,
                    stored_path,
                    chunks,
                    ..
                }) => {
                    info!(
                        category = category.as_str(),
                        stored = %stored_path.display(),
                        chunks,
                        "ingested from watch event"
                    );
                }
                Ok(IngestOutcome::Duplicate { existing_id }) => {
                    info!(existing = existing_id.as_str(), "duplicate dropped");
                }
                Ok(IngestOutcome::Skipped { reason }) => {
                    debug!(reason = reason.as_str(), "skipped");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "ingest failed"),
            }
        }
        Action::Purge => {
            // Only purge if the file is still gone; a rename back within the
            // debounce window cancels the removal.
            if path.exists() {
                return;
            }
            match coordinator.purge_path(path).await {
                Ok(true) => info!(path = %path.display(), "purged removed file"),
                Ok(false) => debug!(path = %path.display(), "removal of unknown path"),
                Err(e) => warn!(path = %path.display(), error = %e, "purge failed"),
            }
        }
    }
}

/// Map one raw notify event to debounce-queue actions.
fn classify_event(event: &Event, incoming: &Path, sorted: &Path) -> Vec<(Action, PathBuf)> {
    let mut actions = Vec::new();
    for path in &event.paths {
        if path.starts_with(incoming) {
            match event.kind {
                EventKind::Create(_) | EventKind::Modify(_) => {
                    actions.push((Action::Ingest, path.clone()));
                }
                _ => {}
            }
        } else if path.starts_with(sorted) {
            match event.kind {
                // Rename-out of the sorted tree arrives as a modify-name
                // event on the old path; the existence re-check at fire time
                // distinguishes it from an in-place rename.
                EventKind::Remove(_) | EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
                    actions.push((Action::Purge, path.clone()));
                }
                _ => {}
            }
        }
    }
    actions
}
