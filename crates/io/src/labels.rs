use std::fs;
use std::path::{Path, PathBuf};

use parcelflow_recon::{order_file_stem, LabelSink};

/// Label PDFs go to `<labels_dir>/<order_id>.pdf`; payloads the carrier sent
/// that were not usable go to `<rejected_dir>/<order_id>_invalid_label.txt`.
#[derive(Debug, Clone)]
pub struct LabelDirectory {
    labels_dir: PathBuf,
    rejected_dir: PathBuf,
}

impl LabelDirectory {
    pub fn new(labels_dir: impl Into<PathBuf>, rejected_dir: impl Into<PathBuf>) -> Self {
        Self { labels_dir: labels_dir.into(), rejected_dir: rejected_dir.into() }
    }

    pub fn label_path(&self, order_id: &str) -> PathBuf {
        self.labels_dir.join(format!("{}.pdf", order_file_stem(order_id)))
    }

    pub fn rejected_path(&self, order_id: &str) -> PathBuf {
        self.rejected_dir.join(format!("{}_invalid_label.txt", order_file_stem(order_id)))
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, bytes)
}

impl LabelSink for LabelDirectory {
    fn save_label(&mut self, order_id: &str, pdf: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.label_path(order_id);
        write_file(&path, pdf)?;
        tracing::info!(order_id, path = %path.display(), "saved label");
        Ok(path)
    }

    fn save_rejected(&mut self, order_id: &str, payload: &str) -> std::io::Result<PathBuf> {
        let path = self.rejected_path(order_id);
        write_file(&path, payload.as_bytes())?;
        Ok(path)
    }
}
