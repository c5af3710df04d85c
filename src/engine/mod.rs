//! Abstraction moteur: contrat commun aux backends de rendu.
//!
//! ## Architecture
//!
//! ```text
//! renderer (threads internes) ──événements──▶ EventQueue ──pump_events()──▶ NavigationClient
//!        │                                                                       │
//!        └─ requêtes ─▶ interception / drapeaux ─▶ TrackerClassifier        EngineCallback (UI)
//! ```
//!
//! Deux backends implémentent [`EngineView`] :
//! - [`system::SystemEngineView`] : moteur fourni par la plateforme, la
//!   protection se fait en interceptant chaque requête ;
//! - [`standalone::StandaloneEngineView`] : moteur embarqué, la protection
//!   est déclarée à l'avance par catégories.
//!
//! Les consommateurs ne dépendent que du trait ; [`provider::EngineProvider`]
//! choisit le backend selon la configuration.

pub mod download;
pub mod navigation;
pub mod provider;
pub mod queue;
pub mod standalone;
pub mod system;

#[cfg(test)]
pub(crate) mod fakes;

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::config::{EngineConfig, GeneralConfig};
use crate::error::EngineError;
use crate::observable::Subscription;
use crate::preferences::RendererSettings;
use crate::session::{InstanceState, SavedEngineState, Session};
use crate::tracking::{TrackerClassifier, TrackingSettings};

pub use download::Download;
pub use navigation::{ExternalUrlDispatcher, NavigationClient, PageLoadState};

/// Capacités exigées de tout backend de rendu.
///
/// Les événements du moteur ne sont délivrés au callback que pendant
/// [`pump_events`](Self::pump_events), sur le contexte qui possède la vue.
pub trait EngineView: Send {
    fn load_url(&mut self, url: &str);
    fn reload(&mut self);
    fn stop_loading(&mut self);
    fn go_back(&mut self);
    fn go_forward(&mut self);
    fn can_go_back(&self) -> bool;
    fn can_go_forward(&self) -> bool;

    /// Active ou coupe complètement la protection contre le pistage.
    fn set_blocking_enabled(&mut self, enabled: bool);
    fn is_blocking_enabled(&self) -> bool;

    /// Capture l'historique dans la session et renvoie la clé de
    /// restauration.
    fn save_state(&mut self, session: &Session) -> InstanceState;

    /// Restaure l'historique sauvegardé dans `session`. Refusé (renvoie
    /// `false`) si `state` n'a pas été émis pour cette session.
    fn restore_state(&mut self, session: &Session, state: &InstanceState) -> bool;

    fn url(&self) -> Option<String>;
    fn title(&self) -> Option<String>;

    /// Efface cookies, cache, formulaires, stockage et authentifications.
    /// Best effort : les échecs sont journalisés.
    fn cleanup(&mut self);

    /// Libère le moteur. La vue est inutilisable ensuite.
    fn destroy(&mut self);

    fn set_callback(&mut self, callback: Option<Box<dyn EngineCallback>>);

    /// Traite les événements moteur en attente, dans l'ordre. Renvoie le
    /// nombre d'événements traités.
    fn pump_events(&mut self) -> usize;

    /// Installe l'unique écouteur d'état de chargement, remplaçant le
    /// précédent.
    fn set_load_state_listener(&mut self, listener: Box<dyn Fn(PageLoadState) + Send>) -> Subscription;

    /// Retire l'écouteur s'il est encore celui désigné par `handle`.
    fn remove_load_state_listener(&mut self, handle: Subscription) -> bool;

    fn load_state(&self) -> PageLoadState;
}

/// Récepteur des événements moteur (côté UI). Toutes les méthodes sont
/// optionnelles.
#[allow(unused_variables)]
pub trait EngineCallback: Send {
    fn on_page_started(&self, url: &str) {}
    fn on_page_finished(&self, is_secure: bool) {}
    fn on_security_changed(&self, is_secure: bool, host: Option<&str>, organization: Option<&str>) {}
    fn on_progress(&self, progress: u8) {}
    fn on_url_changed(&self, url: &str, is_navigation: bool) {}
    fn on_title_changed(&self, title: &str) {}
    fn on_long_press(&self, hit_target: HitTarget) {}
    fn on_download_start(&self, download: Download) {}
    fn on_enter_fullscreen(&self, exit: FullscreenExit) {}
    fn on_exit_fullscreen(&self) {}
    fn count_blocked_tracker(&self) {}
    fn reset_blocked_trackers(&self) {}
    fn on_blocking_state_changed(&self, enabled: bool) {}
}

/// Dépendances partagées par toutes les vues d'un même fournisseur.
#[derive(Clone)]
pub struct ViewContext {
    pub classifier: Arc<TrackerClassifier>,
    pub tracking: Arc<TrackingSettings>,
    pub general: GeneralConfig,
    pub engine: EngineConfig,
    pub dispatcher: Option<Arc<dyn ExternalUrlDispatcher>>,
}

impl ViewContext {
    pub fn renderer_settings(&self, blocking_enabled: bool) -> RendererSettings {
        RendererSettings::build(&self.engine, &self.tracking, blocking_enabled)
    }
}

impl fmt::Debug for ViewContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewContext")
            .field("engine", &self.engine)
            .field("dispatcher", &self.dispatcher.is_some())
            .finish_non_exhaustive()
    }
}

/// Élément sous un appui long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitTarget {
    link_url: Option<String>,
    image_url: Option<String>,
}

impl HitTarget {
    /// Chaque drapeau levé doit être accompagné de son URL.
    pub fn new(
        is_link: bool,
        link_url: Option<String>,
        is_image: bool,
        image_url: Option<String>,
    ) -> Result<Self, EngineError> {
        let link_url = if is_link {
            Some(link_url.filter(|u| !u.is_empty()).ok_or(EngineError::InvalidHitTarget { kind: "link" })?)
        } else {
            None
        };
        let image_url = if is_image {
            Some(image_url.filter(|u| !u.is_empty()).ok_or(EngineError::InvalidHitTarget { kind: "image" })?)
        } else {
            None
        };
        Ok(Self { link_url, image_url })
    }

    pub fn is_link(&self) -> bool {
        self.link_url.is_some()
    }

    pub fn is_image(&self) -> bool {
        self.image_url.is_some()
    }

    pub fn link_url(&self) -> Option<&str> {
        self.link_url.as_deref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }
}

/// Poignée remise à l'UI à l'entrée en plein écran ; l'appeler demande au
/// moteur d'en sortir.
pub struct FullscreenExit(Box<dyn FnOnce() + Send>);

impl FullscreenExit {
    pub fn new(exit: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(exit))
    }

    pub fn exit(self) {
        (self.0)()
    }
}

impl fmt::Debug for FullscreenExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FullscreenExit")
    }
}

/// Données de session effacées par `cleanup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    FormData,
    History,
    Cache,
    Cookies,
    WebStorage,
    AuthCache,
}

impl StorageKind {
    pub const ALL: [StorageKind; 6] = [
        Self::FormData,
        Self::History,
        Self::Cache,
        Self::Cookies,
        Self::WebStorage,
        Self::AuthCache,
    ];
}

/// Efface chaque type de données ; un échec n'interrompt pas les suivants.
pub(crate) fn wipe_storage(mut clear: impl FnMut(StorageKind) -> Result<(), EngineError>) {
    for kind in StorageKind::ALL {
        if let Err(e) = clear(kind) {
            warn!(kind = ?kind, error = %e, "Cleanup failed, continuing");
        }
    }
}

/// Clé de restauration émise pour `session`, après avoir rangé
/// l'historique dans la session.
pub(crate) fn store_state(session: &Session, history: Vec<u8>, last_url: Option<String>) -> InstanceState {
    let last_url = last_url.unwrap_or_else(|| session.url().get());
    session.save_engine_state(SavedEngineState {
        history,
        last_url: last_url.clone(),
    });
    InstanceState {
        state_uuid: session.uuid(),
        current_url: last_url,
    }
}

/// État sauvegardé applicable, ou `None` si la clé ne correspond pas à la
/// session ou si rien n'a été sauvegardé.
pub(crate) fn saved_state_for(session: &Session, state: &InstanceState) -> Option<SavedEngineState> {
    if state.state_uuid != session.uuid() {
        warn!(
            expected = %session.uuid(),
            got = %state.state_uuid,
            "Restore rejected, state belongs to another session"
        );
        return None;
    }
    session.saved_engine_state()
}
