use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::{fs, task::JoinHandle};
use tracing::{debug, info, warn};

use super::Downloads;

/// Removes regular files in `dir` older than `max_age`.
///
/// Files for which `keep` returns true are left alone. Returns how many
/// files were removed.
pub async fn sweep_stale_files<F>(dir: &Path, max_age: Duration, keep: F) -> std::io::Result<usize>
where
    F: Fn(&Path) -> bool,
{
    let mut entries = fs::read_dir(dir).await?;
    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("🧹 No se pudo leer {}: {}", path.display(), e);
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();

        if age < max_age || keep(&path) {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("🧹 Archivo viejo eliminado {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("🧹 Error al eliminar {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

/// Periodically sweeps the download directory.
///
/// Files still recorded in `downloads` belong to a queued entry and are kept.
pub fn spawn_cleanup_routine(
    dir: PathBuf,
    interval: Duration,
    max_age: Duration,
    downloads: Arc<Downloads>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // el primer tick se completa de inmediato
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match sweep_stale_files(&dir, max_age, |path| downloads.contains(path)).await {
                Ok(0) => {}
                Ok(n) => info!("🧹 Limpieza: {} archivos viejos eliminados de {}", n, dir.display()),
                Err(e) => warn!("🧹 La limpieza no pudo leer {}: {}", dir.display(), e),
            }
        }
    })
}
