//! Filesystem watcher that reloads the model when its artifact changes.

use crate::integrity;
use crate::locator::{resolve_local, ArtifactSettings, VERSIONED_ARTIFACT_NAME};
use crate::registry::ServingState;
use crate::service::ModelService;
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Directory to watch for a given active state. A bare `MODEL_DIR` setup is
/// watched recursively so new `v<timestamp>` directories are seen.
pub fn watch_root(settings: &ArtifactSettings, active: &Path) -> (PathBuf, RecursiveMode) {
    match (&settings.model_path, &settings.model_dir, &settings.remote_uri) {
        (None, Some(dir), None) => (dir.clone(), RecursiveMode::Recursive),
        _ => {
            let parent = active.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            (parent.to_path_buf(), RecursiveMode::NonRecursive)
        }
    }
}

fn is_relevant(event: &Event, active: &Path) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) { return false; }
    event.paths.iter().any(|p| {
        let name = p.file_name();
        name.is_some() && (name == active.file_name() || name == Some(OsStr::new(VERSIONED_ARTIFACT_NAME)))
    })
}

/// True when the locator would now pick a different file, or the active
/// file's bytes no longer match what was loaded. Remote sources only get
/// the digest check.
pub fn reload_needed(settings: &ArtifactSettings, state: &ServingState) -> bool {
    if settings.remote_uri.is_none() {
        if let Ok(target) = resolve_local(settings) {
            if target != state.path { return true; }
        }
    }
    integrity::hash_of(&state.path) != state.metadata.sha256
}

/// Starts watching the active artifact. The returned task owns the watcher.
pub fn spawn_artifact_watcher(service: Arc<ModelService>, debounce: Duration) -> Result<JoinHandle<()>> {
    let state = service.current()?;
    let settings = service.locator().settings();
    let (root, mode) = watch_root(&settings, &state.path);

    let (tx, rx) = mpsc::channel(64);
    let mut watcher = RecommendedWatcher::new(move |res| { let _ = tx.blocking_send(res); }, notify::Config::default())?;
    watcher.watch(&root, mode)?;
    info!(root = %root.display(), recursive = matches!(mode, RecursiveMode::Recursive), "artifact watcher started");

    Ok(tokio::spawn(async move {
        watch_loop(watcher, rx, service, debounce).await;
        warn!("artifact watcher stopped");
    }))
}

async fn watch_loop(
    _watcher: RecommendedWatcher,
    mut rx: mpsc::Receiver<notify::Result<Event>>,
    service: Arc<ModelService>,
    debounce: Duration,
) {
    while let Some(first) = rx.recv().await {
        let Ok(active) = service.current() else { continue };
        match &first {
            Ok(ev) if is_relevant(ev, &active.path) => {}
            Ok(_) => continue,
            Err(e) => { warn!(error = %e, "watch error"); continue; }
        }

        // let a burst of writes settle, then fold everything queued meanwhile
        tokio::time::sleep(debounce).await;
        while rx.try_recv().is_ok() {}

        let settings = service.locator().settings();
        let check = Arc::clone(&active);
        let needed = tokio::task::spawn_blocking(move || reload_needed(&settings, &check)).await.unwrap_or(true);
        if !needed {
            debug!(path = %active.path.display(), "artifact unchanged; skipping reload");
            continue;
        }
        info!(path = %active.path.display(), "artifact change detected");
        // failures are logged and counted by the facade
        let _ = service.reload().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::ArtifactLocator;
    use notify::event::{CreateKind, ModifyKind};

    const V1: &str = r#"{"type":"v1","global_top_products":[1]}"#;

    fn fixed(path: &Path) -> ArtifactSettings { ArtifactSettings { model_path: Some(path.to_path_buf()), ..Default::default() } }

    #[test]
    fn relevance_by_artifact_name() {
        let active = Path::new("/srv/models/model.json");
        let ev = |kind, p: &str| Event::new(kind).add_path(PathBuf::from(p));
        assert!(is_relevant(&ev(EventKind::Modify(ModifyKind::Any), "/srv/models/model.json"), active));
        assert!(is_relevant(&ev(EventKind::Create(CreateKind::File), "/srv/models/v2/model.pkl"), active));
        assert!(!is_relevant(&ev(EventKind::Modify(ModifyKind::Any), "/srv/models/notes.txt"), active));
        assert!(!is_relevant(&ev(EventKind::Access(notify::event::AccessKind::Any), "/srv/models/model.json"), active));
    }

    #[test]
    fn versioned_dir_is_watched_recursively() {
        let settings = ArtifactSettings { model_dir: Some("/srv/models".into()), ..Default::default() };
        let (root, mode) = watch_root(&settings, Path::new("/srv/models/v1/model.pkl"));
        assert_eq!(root, PathBuf::from("/srv/models"));
        assert_eq!(mode, RecursiveMode::Recursive);

        let (root, mode) = watch_root(&fixed(Path::new("model.pkl")), Path::new("model.pkl"));
        assert_eq!(root, PathBuf::from("."));
        assert_eq!(mode, RecursiveMode::NonRecursive);
    }

    #[tokio::test]
    async fn reload_needed_tracks_bytes_and_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("model.json");
        std::fs::write(&p, V1).unwrap();
        let svc = ModelService::new(ArtifactLocator::fixed(fixed(&p)));
        let state = svc.initialize().await.unwrap();

        assert!(!reload_needed(&fixed(&p), &state));
        std::fs::write(&p, V1).unwrap();
        assert!(!reload_needed(&fixed(&p), &state), "rewrite with identical bytes is not a change");
        std::fs::write(&p, r#"{"type":"v2"}"#).unwrap();
        assert!(reload_needed(&fixed(&p), &state));
        std::fs::write(&p, V1).unwrap();
        assert!(reload_needed(&fixed(&dir.path().join("other.json")), &state));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn modified_artifact_is_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("model.json");
        std::fs::write(&p, V1).unwrap();
        let svc = ModelService::start(ArtifactLocator::fixed(fixed(&p))).await.unwrap();
        let handle = spawn_artifact_watcher(Arc::clone(&svc), Duration::from_millis(50)).unwrap();

        std::fs::write(&p, r#"{"type":"v2","global_top_products":[2]}"#).unwrap();
        let mut reloaded = false;
        for _ in 0..100 {
            if svc.registry().generation() >= 2 { reloaded = true; break; }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        handle.abort();
        assert!(reloaded, "watcher did not pick up the change");
        assert_eq!(svc.current().unwrap().model.model_type, "v2");
    }
}
