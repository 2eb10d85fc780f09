use actix_web::HttpResponse;
use dashmap::DashMap;
use notify::{event::{EventKind, ModifyKind}, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use std::{
    fs,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Page name to file contents.
pub type TemplateCache = Arc<DashMap<String, String>>;

pub const TEMPLATE_DIR: &str = "templates";
pub const TEMPLATE_FILES: &[&str] = &[
    "admin.html",
    "login.html",
    "style.css",
];

/// Reads every admin page from `dir`. Any unreadable page fails startup.
pub fn load_templates(dir: &Path) -> io::Result<TemplateCache> {
    let cache: TemplateCache = Arc::new(DashMap::new());
    for filename in TEMPLATE_FILES {
        let path = dir.join(filename);
        let content = fs::read_to_string(&path).map_err(|e| {
            tracing::error!("Failed to load template {}: {}", path.display(), e);
            io::Error::new(e.kind(), format!("Failed to load essential template: {}", path.display()))
        })?;
        cache.insert(filename.to_string(), content);
        tracing::info!("Loaded template: {}", path.display());
    }
    Ok(cache)
}

fn reload(cache: &TemplateCache, dir: &Path, path: &Path) {
    if !path.starts_with(dir) || !path.is_file() {
        return;
    }
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    if !TEMPLATE_FILES.contains(&filename) {
        return;
    }
    match fs::read_to_string(path) {
        Ok(content) => {
            cache.insert(filename.to_string(), content);
            tracing::info!("Reloaded template: {}", path.display());
        }
        Err(e) => tracing::error!("Failed to reload template {}: {}", path.display(), e),
    }
}

/// Watches `dir` and refreshes cached pages when they change. Runs until the
/// task is dropped.
pub async fn watch_templates(cache: TemplateCache, dir: PathBuf) -> notify::Result<()> {
    let template_path = if dir.is_absolute() {
        dir
    } else {
        std::env::current_dir()?.join(dir)
    };
    let watched = template_path.clone();

    let event_handler = move |res: DebounceEventResult| match res {
        Ok(events) => {
            for event in events {
                if matches!(event.kind, EventKind::Modify(ModifyKind::Data(_)) | EventKind::Create(_)) {
                    for path in &event.paths {
                        reload(&cache, &watched, path);
                    }
                }
            }
        }
        Err(errors) => {
            for error in errors {
                tracing::error!("File watching error: {:?}", error);
            }
        }
    };

    let mut debouncer = new_debouncer(Duration::from_secs(1), None, event_handler)?;
    debouncer
        .watcher()
        .watch(&template_path, RecursiveMode::Recursive)?;
    debouncer
        .cache()
        .add_root(&template_path, RecursiveMode::Recursive);

    tracing::info!("Template watcher started for directory: {}", template_path.display());

    // The debouncer stops when dropped
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
}

/// Helper to get content from cache, returning 404 if not found
pub fn get_template_content(
    cache: &TemplateCache,
    filename: &str,
) -> Result<String, HttpResponse> {
    match cache.get(filename) {
        Some(content) => Ok(content.value().clone()),
        None => {
            tracing::error!("Template not found in cache: {}", filename);
            Err(HttpResponse::NotFound().body(format!("Template {} not found", filename)))
        }
    }
}
