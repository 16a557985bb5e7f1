use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::config::Config;

/// Stored publication files: `{id}.pdf` and a first-page `{id}_thumb.png`
/// rendered by an external `pdftoppm`-style binary.
pub struct FileStore {
    root: PathBuf,
    thumbnail_bin: String,
    render_timeout: Duration,
}

impl FileStore {
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.upload_dir.clone(),
            thumbnail_bin: config.thumbnail_bin.clone(),
            render_timeout: Duration::from_secs(config.compile_timeout_secs),
        }
    }

    pub fn pdf_path(&self, publication_id: &str) -> PathBuf {
        self.root.join(format!("{}.pdf", publication_id))
    }

    pub fn thumbnail_path(&self, publication_id: &str) -> PathBuf {
        self.root.join(format!("{}_thumb.png", publication_id))
    }

    pub fn save_pdf(&self, publication_id: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.pdf_path(publication_id);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Best-effort first-page thumbnail. The renderer runs with a bounded
    /// timeout; any failure is logged and the publication proceeds without a
    /// thumbnail.
    pub async fn generate_thumbnail(&self, publication_id: &str) -> PathBuf {
        let pdf = self.pdf_path(publication_id);
        let thumb = self.thumbnail_path(publication_id);
        // pdftoppm appends .png to the -singlefile prefix.
        let prefix = self.root.join(format!("{}_thumb", publication_id));

        let run = Command::new(&self.thumbnail_bin)
            .arg("-png")
            .arg("-singlefile")
            .args(["-f", "1", "-l", "1"])
            .args(["-scale-to-x", "400", "-scale-to-y", "-1"])
            .arg(&pdf)
            .arg(&prefix)
            .kill_on_drop(true)
            .output();

        match timeout(self.render_timeout, run).await {
            Ok(Ok(output)) if output.status.success() => {}
            Ok(Ok(output)) => {
                log::warn!(
                    "thumbnail render failed for {}: {}",
                    publication_id,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Ok(Err(e)) => {
                log::warn!("could not run {}: {}", self.thumbnail_bin, e);
            }
            Err(_) => {
                log::warn!("thumbnail render timed out for {}", publication_id);
            }
        }

        thumb
    }

    /// Best-effort removal of a publication's stored files. Failures are
    /// logged, never fatal: the database row goes away regardless.
    pub fn delete_publication_files(&self, publication_id: &str) {
        for path in [self.pdf_path(publication_id), self.thumbnail_path(publication_id)] {
            remove_if_present(&path);
        }
    }
}

fn remove_if_present(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("failed to remove {}: {}", path.display(), e);
        }
    }
}
