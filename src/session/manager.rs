//! Registre des sessions et routage des intents de lancement.
//!
//! Un seul [`SessionManager`] est construit par la racine de composition de
//! l'application et partagé par `Arc`. Toute mutation se fait sous un
//! verrou unique ; les observateurs reçoivent un [`SessionSnapshot`] complet
//! construit sous ce verrou, jamais une séquence à moitié modifiée.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};
use uuid::Uuid;

use super::intent::{EXTRA_BLOCKING_ENABLED, IntentAction, LaunchIntent};
use super::{CustomTabConfig, InstanceState, Session, Source};
use crate::config::SearchConfig;
use crate::error::{IntentError, SessionError};
use crate::observable::Subscription;
use crate::urlutil;

type SessionsObserver = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;

/// Vue cohérente du registre à un instant donné.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub sessions: Vec<Arc<Session>>,
    pub current: Option<Uuid>,
    /// Increases with every mutation. Lets observers drop an older snapshot
    /// delivered after a newer one.
    pub revision: u64,
}

impl SessionSnapshot {
    pub fn current_session(&self) -> Option<&Arc<Session>> {
        let current = self.current?;
        self.sessions.iter().find(|s| s.uuid() == current)
    }
}

#[derive(Default)]
struct Registry {
    sessions: Vec<Arc<Session>>,
    current: Option<Uuid>,
    revision: u64,
    observers: Vec<(Subscription, SessionsObserver)>,
}

impl Registry {
    fn position(&self, uuid: Uuid) -> Option<usize> {
        self.sessions.iter().position(|s| s.uuid() == uuid)
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            sessions: self.sessions.clone(),
            current: self.current,
            revision: self.revision,
        }
    }
}

/// Registre des sessions ouvertes.
pub struct SessionManager {
    registry: Mutex<Registry>,
    search: SearchConfig,
}

impl SessionManager {
    pub fn new(search: SearchConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            search,
        }
    }

    // ── Routage des intents ──────────────────────────────────────────────

    /// Route l'intent qui a lancé l'application.
    ///
    /// Ignoré si l'état est en cours de restauration (`saved_state`), si
    /// l'intent est relancé depuis l'historique, ou si une vue n'a pas
    /// d'URL. Les erreurs de routage sont journalisées et renvoyées ; elles
    /// ne sont jamais fatales.
    pub fn handle_intent(
        &self,
        intent: &LaunchIntent,
        saved_state: Option<&InstanceState>,
    ) -> Result<Arc<Session>, IntentError> {
        let result = if intent.from_history {
            Err(IntentError::LaunchedFromHistory)
        } else if saved_state.is_some() {
            Err(IntentError::RestoringState)
        } else {
            self.route(intent)
        };
        log_routing(&result);
        result
    }

    /// Route un intent reçu alors que l'application tourne déjà.
    pub fn handle_new_intent(&self, intent: &LaunchIntent) -> Result<Arc<Session>, IntentError> {
        let result = self.route(intent);
        log_routing(&result);
        result
    }

    fn route(&self, intent: &LaunchIntent) -> Result<Arc<Session>, IntentError> {
        match &intent.action {
            IntentAction::View => self.route_view(intent),
            IntentAction::Send => self.route_share(intent),
            IntentAction::Other(action) => Err(IntentError::UnsupportedAction(action.clone())),
        }
    }

    fn route_view(&self, intent: &LaunchIntent) -> Result<Arc<Session>, IntentError> {
        let url = intent
            .data
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(IntentError::MissingUrl)?;

        if intent.is_custom_tab() {
            return Ok(self.create_custom_tab_session(url, intent.custom_tab_config()));
        }
        if intent.is_home_screen_launch() {
            let blocking = intent.bool_extra(EXTRA_BLOCKING_ENABLED).unwrap_or(true);
            return Ok(self.add(Session::new(Source::HomeScreen, url).with_blocking_enabled(blocking)));
        }
        Ok(self.create_session(Source::ViewIntent, url))
    }

    fn route_share(&self, intent: &LaunchIntent) -> Result<Arc<Session>, IntentError> {
        let text = intent
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or(IntentError::MissingText)?;

        if urlutil::is_url(text) {
            Ok(self.create_session(Source::Share, text))
        } else {
            let url = urlutil::search_url(&self.search.query_template, text);
            Ok(self.create_search_session(Source::Share, url, text))
        }
    }

    // ── Création ─────────────────────────────────────────────────────────

    /// Ajoute une session et la rend courante.
    pub fn create_session(&self, source: Source, url: impl Into<String>) -> Arc<Session> {
        self.add(Session::new(source, url))
    }

    pub fn create_search_session(
        &self,
        source: Source,
        url: impl Into<String>,
        search_terms: impl Into<String>,
    ) -> Arc<Session> {
        self.add(Session::new(source, url).with_search_terms(search_terms))
    }

    pub fn create_custom_tab_session(&self, url: impl Into<String>, config: CustomTabConfig) -> Arc<Session> {
        self.add(Session::new(Source::CustomTab, url).with_custom_tab(config))
    }

    fn add(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        info!(uuid = %session.uuid(), source = ?session.source(), "Session created");
        self.mutate(|registry| {
            registry.sessions.push(Arc::clone(&session));
            registry.current = Some(session.uuid());
        });
        session
    }

    // ── Requêtes ─────────────────────────────────────────────────────────

    pub fn has_session(&self) -> bool {
        !self.lock().sessions.is_empty()
    }

    pub fn number_of_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Session courante. Erreur s'il n'y en a aucune : vérifier
    /// [`has_session`](Self::has_session) d'abord.
    pub fn current_session(&self) -> Result<Arc<Session>, SessionError> {
        let registry = self.lock();
        let current = registry.current.ok_or(SessionError::NoCurrentSession)?;
        registry
            .sessions
            .iter()
            .find(|s| s.uuid() == current)
            .cloned()
            .ok_or(SessionError::NoCurrentSession)
    }

    pub fn session_by_uuid(&self, uuid: Uuid) -> Result<Arc<Session>, SessionError> {
        let registry = self.lock();
        registry
            .position(uuid)
            .map(|i| Arc::clone(&registry.sessions[i]))
            .ok_or(SessionError::UnknownSession(uuid))
    }

    pub fn has_session_with_uuid(&self, uuid: Uuid) -> bool {
        self.lock().position(uuid).is_some()
    }

    pub fn is_current_session(&self, session: &Session) -> bool {
        self.lock().current == Some(session.uuid())
    }

    pub fn position_of_current_session(&self) -> Option<usize> {
        let registry = self.lock();
        registry.position(registry.current?)
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.lock().sessions.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Promeut explicitement une session au rang de session courante.
    pub fn select_session(&self, uuid: Uuid) -> Result<(), SessionError> {
        let mut found = false;
        self.mutate(|registry| {
            if registry.position(uuid).is_some() {
                registry.current = Some(uuid);
                found = true;
            }
        });
        if found { Ok(()) } else { Err(SessionError::UnknownSession(uuid)) }
    }

    // ── Suppression ──────────────────────────────────────────────────────

    /// Retire la session courante, si elle existe.
    pub fn remove_current_session(&self) -> Option<Arc<Session>> {
        let current = self.lock().current?;
        self.remove_session_by_uuid(current)
    }

    /// Retire une session. Un UUID inconnu ne change rien.
    pub fn remove_session_by_uuid(&self, uuid: Uuid) -> Option<Arc<Session>> {
        let mut removed = None;
        self.mutate(|registry| {
            let Some(position) = registry.position(uuid) else {
                return;
            };
            removed = Some(registry.sessions.remove(position));
            if registry.current == Some(uuid) {
                registry.current = if registry.sessions.is_empty() {
                    None
                } else {
                    let next = position.min(registry.sessions.len() - 1);
                    Some(registry.sessions[next].uuid())
                };
            }
        });
        if let Some(session) = &removed {
            info!(uuid = %session.uuid(), "Session removed");
        }
        removed
    }

    /// Retire toutes les sessions (« tout effacer »).
    pub fn remove_all_sessions(&self) -> Vec<Arc<Session>> {
        let mut removed = Vec::new();
        self.mutate(|registry| {
            removed = std::mem::take(&mut registry.sessions);
            registry.current = None;
        });
        info!(count = removed.len(), "All sessions removed");
        removed
    }

    // ── Observation ──────────────────────────────────────────────────────

    pub fn subscribe(&self, observer: impl Fn(&SessionSnapshot) + Send + Sync + 'static) -> Subscription {
        let handle = Subscription::next();
        self.lock().observers.push((handle, Arc::new(observer)));
        handle
    }

    pub fn unsubscribe(&self, handle: Subscription) -> bool {
        let mut registry = self.lock();
        let before = registry.observers.len();
        registry.observers.retain(|(id, _)| *id != handle);
        registry.observers.len() != before
    }

    /// Applique une mutation puis notifie les observateurs hors verrou.
    fn mutate(&self, f: impl FnOnce(&mut Registry)) {
        let (snapshot, observers) = {
            let mut registry = self.lock();
            let before = (registry.sessions.len(), registry.current);
            f(&mut registry);
            if (registry.sessions.len(), registry.current) == before {
                return;
            }
            registry.revision += 1;
            let observers: Vec<_> = registry.observers.iter().map(|(_, o)| Arc::clone(o)).collect();
            (registry.snapshot(), observers)
        };
        for observer in observers {
            observer(&snapshot);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

fn log_routing(result: &Result<Arc<Session>, IntentError>) {
    if let Err(e) = result {
        warn!(error = %e, "Launch intent ignored");
    }
}
