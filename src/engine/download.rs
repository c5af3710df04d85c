//! Téléchargements: valeur transmise au gestionnaire de transferts externe.
//!
//! Le cœur ne transfère rien lui-même : il construit un [`Download`], le
//! garde éventuellement dans un [`PendingDownload`] le temps d'une demande
//! de permission, puis le remet à une [`DownloadQueue`].

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::DownloadError;
use crate::urlutil;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub url: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub content_disposition: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub content_length: u64,
}

impl Download {
    /// Valide le schéma : seuls http et https sont téléchargeables.
    pub fn new(
        url: impl Into<String>,
        user_agent: Option<String>,
        content_disposition: Option<String>,
        mime_type: Option<String>,
        content_length: u64,
    ) -> Result<Self, DownloadError> {
        let url = url.into();
        if !urlutil::is_http_or_https(&url) {
            return Err(DownloadError::UnsupportedScheme(url));
        }
        Ok(Self {
            url,
            user_agent,
            content_disposition,
            mime_type,
            content_length,
        })
    }

    /// Nom de fichier proposé : `filename=` de l'en-tête, sinon le dernier
    /// segment du chemin, sinon `download`.
    pub fn file_name(&self) -> String {
        if let Some(name) = self
            .content_disposition
            .as_deref()
            .and_then(disposition_file_name)
        {
            return name;
        }
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_owned))
            })
            .filter(|segment| !segment.is_empty())
            .unwrap_or_else(|| "download".to_string())
    }
}

fn disposition_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty() && !name.contains(['/', '\\']))
}

/// Collaborateur externe qui exécute les transferts.
pub trait DownloadQueue: Send + Sync {
    fn enqueue(&self, download: Download) -> Result<(), DownloadError>;
}

#[derive(Serialize, Deserialize)]
struct PendingFile {
    download: Download,
}

/// Emplacement unique pour un téléchargement en attente de permission.
#[derive(Debug, Default)]
pub struct PendingDownload {
    slot: Mutex<Option<Download>>,
}

impl PendingDownload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Met un téléchargement de côté, remplaçant l'éventuel précédent.
    pub fn park(&self, download: Download) {
        if let Some(previous) = self.lock().replace(download) {
            info!(url = %previous.url, "Pending download replaced");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    pub fn take(&self) -> Option<Download> {
        self.lock().take()
    }

    /// Résout la demande de permission : transmet au gestionnaire si
    /// accordée, oublie sinon. Renvoie `Ok(false)` si rien n'attendait.
    pub fn resolve(&self, granted: bool, queue: &dyn DownloadQueue) -> Result<bool, DownloadError> {
        let Some(download) = self.take() else {
            return Ok(false);
        };
        if !granted {
            info!(url = %download.url, "Download permission denied, discarded");
            return Ok(true);
        }
        queue.enqueue(download)?;
        Ok(true)
    }

    /// Sérialise l'emplacement (pour survivre à une recréation de l'UI).
    pub fn to_toml(&self) -> Result<Option<String>, DownloadError> {
        let Some(download) = self.lock().clone() else {
            return Ok(None);
        };
        toml::to_string(&PendingFile { download })
            .map(Some)
            .map_err(|e| DownloadError::InvalidState(e.to_string()))
    }

    pub fn restore_toml(&self, content: &str) -> Result<(), DownloadError> {
        let file: PendingFile = toml::from_str(content).map_err(|e| {
            warn!(error = %e, "Cannot restore pending download");
            DownloadError::InvalidState(e.to_string())
        })?;
        // Re-validate: the serialized form may have been tampered with.
        let download = file.download;
        if !urlutil::is_http_or_https(&download.url) {
            return Err(DownloadError::UnsupportedScheme(download.url));
        }
        self.park(download);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Download>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingQueue {
        enqueued: Mutex<Vec<Download>>,
    }

    impl DownloadQueue for RecordingQueue {
        fn enqueue(&self, download: Download) -> Result<(), DownloadError> {
            self.enqueued.lock().unwrap().push(download);
            Ok(())
        }
    }

    fn download(url: &str) -> Download {
        Download::new(url, None, None, Some("application/pdf".into()), 1024).unwrap()
    }

    #[test]
    fn test_only_http_downloads() {
        assert!(Download::new("https://example.com/a.pdf", None, None, None, 0).is_ok());
        assert_eq!(
            Download::new("ftp://example.com/a.pdf", None, None, None, 0).unwrap_err(),
            DownloadError::UnsupportedScheme("ftp://example.com/a.pdf".into())
        );
        assert!(Download::new("blob:https://example.com/1", None, None, None, 0).is_err());
    }

    #[test]
    fn test_file_name_guess() {
        let mut d = download("https://example.com/files/report.pdf?x=1");
        assert_eq!(d.file_name(), "report.pdf");
        d.content_disposition = Some(r#"attachment; filename="annual.pdf""#.into());
        assert_eq!(d.file_name(), "annual.pdf");
        d.content_disposition = Some("attachment; filename=../../etc/passwd".into());
        assert_eq!(d.file_name(), "report.pdf");
        assert_eq!(download("https://example.com/").file_name(), "download");
    }

    #[test]
    fn test_pending_round_trip_then_enqueue() {
        let pending = PendingDownload::new();
        assert_eq!(pending.to_toml().unwrap(), None);

        pending.park(download("https://example.com/a.pdf"));
        let saved = pending.to_toml().unwrap().unwrap();

        let restored = PendingDownload::new();
        restored.restore_toml(&saved).unwrap();
        assert!(restored.is_pending());

        let queue = Arc::new(RecordingQueue::default());
        assert!(restored.resolve(true, queue.as_ref()).unwrap());
        assert!(!restored.is_pending());
        assert_eq!(queue.enqueued.lock().unwrap()[0].url, "https://example.com/a.pdf");
    }

    #[test]
    fn test_denied_download_is_discarded() {
        let pending = PendingDownload::new();
        pending.park(download("https://example.com/a.pdf"));
        let queue = RecordingQueue::default();
        assert!(pending.resolve(false, &queue).unwrap());
        assert!(queue.enqueued.lock().unwrap().is_empty());
        assert!(!pending.resolve(true, &queue).unwrap());
    }

    #[test]
    fn test_restore_rejects_bad_state() {
        let pending = PendingDownload::new();
        assert!(matches!(
            pending.restore_toml("not toml at all ["),
            Err(DownloadError::InvalidState(_))
        ));
        let forged = "[download]\nurl = \"file:///etc/passwd\"\n";
        assert!(matches!(
            pending.restore_toml(forged),
            Err(DownloadError::UnsupportedScheme(_))
        ));
        assert!(!pending.is_pending());
    }
}
