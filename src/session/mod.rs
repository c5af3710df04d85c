//! Session de navigation: état observable d'un contexte de navigation.
//!
//! Une [`Session`] porte son identité (UUID, origine, configuration d'onglet
//! personnalisé, termes de recherche) qui ne change jamais après création,
//! et un état mutable (URL, titre, sécurité, chargement, compteur de
//! traqueurs) mis à jour par le moteur qui lui est lié et observé par l'UI.

pub mod intent;
pub mod manager;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observable::Observable;

pub use intent::{Extra, IntentAction, LaunchIntent};
pub use manager::{SessionManager, SessionSnapshot};

/// Comment la session a été ouverte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    UserEntered,
    ViewIntent,
    CustomTab,
    Share,
    Menu,
    /// View intent fired by a home-screen shortcut.
    HomeScreen,
}

/// Style d'onglet personnalisé fourni par l'application appelante.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomTabConfig {
    /// ARGB.
    pub toolbar_color: Option<u32>,
    pub show_share_menu_item: bool,
    /// The caller supplied its own close button icon.
    pub has_close_button_icon: bool,
    pub disable_url_bar_hiding: bool,
    pub menu_items: Vec<CustomTabMenuItem>,
    pub action_button: Option<CustomTabActionButton>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTabMenuItem {
    pub name: String,
    /// Where the host routes the click back to the calling app.
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTabActionButton {
    pub description: String,
    pub target: String,
}

/// État moteur sauvegardé dans la session (jamais sur disque).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedEngineState {
    /// Opaque navigation history produced by the renderer.
    pub history: Vec<u8>,
    /// Last URL known when the state was captured.
    pub last_url: String,
}

/// Bundle remis à l'hôte lors d'une sauvegarde, et présenté à la
/// restauration. Il ne contient que la clé : l'historique reste dans la
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    pub state_uuid: Uuid,
    pub current_url: String,
}

/// One browsing context.
pub struct Session {
    uuid: Uuid,
    source: Source,
    custom_tab_config: Option<CustomTabConfig>,
    search_terms: Option<String>,
    blocking_enabled: AtomicBool,
    url: Observable<String>,
    title: Observable<String>,
    secure: Observable<bool>,
    loading: Observable<bool>,
    progress: Observable<u8>,
    blocked_trackers: Observable<u32>,
    saved_state: Mutex<Option<SavedEngineState>>,
}

impl Session {
    pub fn new(source: Source, url: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            source,
            custom_tab_config: None,
            search_terms: None,
            blocking_enabled: AtomicBool::new(true),
            url: Observable::new(url.into()),
            title: Observable::default(),
            secure: Observable::new(false),
            loading: Observable::new(false),
            progress: Observable::new(0),
            blocked_trackers: Observable::new(0),
            saved_state: Mutex::new(None),
        }
    }

    pub fn with_custom_tab(mut self, config: CustomTabConfig) -> Self {
        self.custom_tab_config = Some(config);
        self
    }

    pub fn with_search_terms(mut self, terms: impl Into<String>) -> Self {
        self.search_terms = Some(terms.into());
        self
    }

    pub fn with_blocking_enabled(self, enabled: bool) -> Self {
        self.blocking_enabled.store(enabled, Ordering::Release);
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn is_custom_tab(&self) -> bool {
        self.custom_tab_config.is_some()
    }

    pub fn custom_tab_config(&self) -> Option<&CustomTabConfig> {
        self.custom_tab_config.as_ref()
    }

    pub fn is_search(&self) -> bool {
        self.search_terms.is_some()
    }

    pub fn search_terms(&self) -> Option<&str> {
        self.search_terms.as_deref()
    }

    /// Per-session tracking protection toggle.
    pub fn is_blocking_enabled(&self) -> bool {
        self.blocking_enabled.load(Ordering::Acquire)
    }

    pub fn set_blocking_enabled(&self, enabled: bool) {
        self.blocking_enabled.store(enabled, Ordering::Release);
    }

    pub fn url(&self) -> &Observable<String> {
        &self.url
    }

    pub fn title(&self) -> &Observable<String> {
        &self.title
    }

    pub fn secure(&self) -> &Observable<bool> {
        &self.secure
    }

    pub fn loading(&self) -> &Observable<bool> {
        &self.loading
    }

    pub fn progress(&self) -> &Observable<u8> {
        &self.progress
    }

    pub fn blocked_trackers(&self) -> &Observable<u32> {
        &self.blocked_trackers
    }

    pub fn has_saved_engine_state(&self) -> bool {
        self.lock_saved().is_some()
    }

    /// Dernier état moteur sauvegardé.
    pub fn saved_engine_state(&self) -> Option<SavedEngineState> {
        self.lock_saved().clone()
    }

    pub fn save_engine_state(&self, state: SavedEngineState) {
        *self.lock_saved() = Some(state);
    }

    /// Oublie l'état moteur (effacement de session).
    pub fn clear_engine_state(&self) {
        *self.lock_saved() = None;
    }

    fn lock_saved(&self) -> MutexGuard<'_, Option<SavedEngineState>> {
        self.saved_state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("uuid", &self.uuid)
            .field("source", &self.source)
            .field("url", &self.url.get())
            .field("custom_tab", &self.is_custom_tab())
            .field("search", &self.is_search())
            .finish_non_exhaustive()
    }
}
