//! Client de navigation: routage des requêtes et machine à états de
//! chargement de page.
//!
//! ## Routage
//!
//! [`NavigationRouter::route`] décide, avant que le moteur ne voie une URL :
//! - `about:blank` passe toujours ;
//! - les pseudo-URL internes sont rendues depuis les gabarits embarqués ;
//! - `error:<code>` affiche directement la page d'erreur demandée ;
//! - un schéma non supporté part vers une application externe, ou finit en
//!   page d'erreur si personne ne le prend en charge.
//!
//! ## Machine à états
//!
//! ```text
//! IDLE ──start──▶ STARTED ──finish──▶ FINISHED ──▶ IDLE
//!                    │
//!                    └──erreur──▶ ERROR ──finish──▶ FINISHED ──▶ IDLE
//! ```
//!
//! Renderers emit one spurious start right after a main-frame error (when
//! the error page itself loads). [`NavigationClient`] swallows exactly one
//! start per error, and ignores finishes outside a started navigation, so
//! consumers always see one `on_page_finished` per `on_page_started`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::queue::EventSender;
use super::EngineCallback;
use crate::config::GeneralConfig;
use crate::error_page::{self, ErrorType};
use crate::observable::Subscription;
use crate::resources;
use crate::session::Session;
use crate::tracking::TrackerCounter;
use crate::urlutil;

/// Progress reported when a page starts loading.
pub const PROGRESS_STARTED: u8 = 25;
pub const PROGRESS_FINISHED: u8 = 100;

/// Collaborateur qui ouvre une URL dans une application externe.
pub trait ExternalUrlDispatcher: Send + Sync {
    /// Renvoie `true` si une application a pris l'URL en charge.
    fn dispatch(&self, url: &str) -> bool;
}

/// Décision prise pour une navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Le moteur charge l'URL lui-même.
    Allow,
    /// Une application externe a pris l'URL.
    Handled,
    /// Page interne rendue localement.
    LoadInternal { url: String, html: String },
    /// Page d'erreur à afficher pour `failing_url`.
    LoadError { failing_url: String, error: ErrorType },
}

/// Chargement que la vue doit exécuter elle-même, hors du callback moteur
/// qui l'a déclenché.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredLoad {
    Internal { url: String, html: String },
    Error { failing_url: String, error: ErrorType },
    /// New-window request, loaded in the current view.
    Url(String),
}

/// Chargement concret à demander au moteur après routage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedLoad {
    /// Chargement réseau ordinaire.
    Network(String),
    /// HTML local chargé avec `base_url` comme adresse affichée.
    Data { base_url: String, html: String },
    /// Rien à charger.
    Nothing,
}

/// Routage des navigations, partagé entre la vue et le moteur.
pub struct NavigationRouter {
    general: GeneralConfig,
    dispatcher: Option<Arc<dyn ExternalUrlDispatcher>>,
}

impl NavigationRouter {
    pub fn new(general: GeneralConfig, dispatcher: Option<Arc<dyn ExternalUrlDispatcher>>) -> Self {
        Self { general, dispatcher }
    }

    pub fn route(&self, url: &str) -> NavigationDecision {
        if url == urlutil::ABOUT_BLANK {
            return NavigationDecision::Allow;
        }
        if let Some(html) = resources::load_localized(url, &self.general) {
            return NavigationDecision::LoadInternal {
                url: url.to_owned(),
                html,
            };
        }
        if let Some(error) = ErrorType::from_diagnostic_url(url) {
            return NavigationDecision::LoadError {
                failing_url: url.to_owned(),
                error,
            };
        }

        let scheme = urlutil::scheme_of(url);
        if scheme.as_deref().is_some_and(urlutil::is_supported_scheme) {
            return NavigationDecision::Allow;
        }

        if let Some(dispatcher) = &self.dispatcher
            && dispatcher.dispatch(url)
        {
            info!(url, "URL handed to an external application");
            return NavigationDecision::Handled;
        }
        warn!(url, "No handler for URL scheme");
        NavigationDecision::LoadError {
            failing_url: url.to_owned(),
            error: ErrorType::UnsupportedScheme,
        }
    }
}

/// Point d'entrée synchrone pour les navigations initiées par le moteur
/// (liens, redirections, nouvelles fenêtres).
pub struct NavigationGate<E> {
    router: Arc<NavigationRouter>,
    events: EventSender<E>,
}

impl<E> Clone for NavigationGate<E> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
            events: self.events.clone(),
        }
    }
}

impl<E: From<DeferredLoad>> NavigationGate<E> {
    pub fn new(router: Arc<NavigationRouter>, events: EventSender<E>) -> Self {
        Self { router, events }
    }

    /// Renvoie `true` si le moteur doit abandonner son propre chargement.
    pub fn should_override(&self, url: &str) -> bool {
        match self.router.route(url) {
            NavigationDecision::Allow => false,
            NavigationDecision::Handled => true,
            NavigationDecision::LoadInternal { url, html } => {
                self.events.send(DeferredLoad::Internal { url, html }.into());
                true
            }
            NavigationDecision::LoadError { failing_url, error } => {
                self.events.send(DeferredLoad::Error { failing_url, error }.into());
                true
            }
        }
    }

    /// Nouvelle fenêtre demandée : chargée dans la vue courante.
    pub fn open_in_current_view(&self, url: &str) {
        self.events.send(DeferredLoad::Url(url.to_owned()).into());
    }
}

/// État de chargement de la page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoadState {
    Idle,
    Started,
    Error,
    Finished,
}

type LoadStateListener = Box<dyn Fn(PageLoadState) + Send>;

/// Machine à états de chargement d'une vue. Vit sur le contexte
/// consommateur de la vue ; n'est jamais partagée entre threads.
pub struct NavigationClient {
    session: Arc<Session>,
    counter: Arc<TrackerCounter>,
    callback: Option<Box<dyn EngineCallback>>,
    state: PageLoadState,
    suppress_next_start: bool,
    current_page_url: Option<String>,
    is_secure: bool,
    listener: Option<(Subscription, LoadStateListener)>,
}

impl NavigationClient {
    pub fn new(session: Arc<Session>, counter: Arc<TrackerCounter>) -> Self {
        Self {
            session,
            counter,
            callback: None,
            state: PageLoadState::Idle,
            suppress_next_start: false,
            current_page_url: None,
            is_secure: false,
            listener: None,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn counter(&self) -> &Arc<TrackerCounter> {
        &self.counter
    }

    pub fn state(&self) -> PageLoadState {
        self.state
    }

    pub fn current_page_url(&self) -> Option<&str> {
        self.current_page_url.as_deref()
    }

    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    pub fn set_callback(&mut self, callback: Option<Box<dyn EngineCallback>>) {
        self.callback = callback;
    }

    /// Appelle le callback s'il est installé.
    pub fn emit(&self, f: impl FnOnce(&dyn EngineCallback)) {
        if let Some(callback) = &self.callback {
            f(callback.as_ref());
        }
    }

    // ── Écouteur d'état ──────────────────────────────────────────────────

    pub fn set_load_state_listener(&mut self, listener: LoadStateListener) -> Subscription {
        let handle = Subscription::next();
        self.listener = Some((handle, listener));
        handle
    }

    pub fn remove_load_state_listener(&mut self, handle: Subscription) -> bool {
        match &self.listener {
            Some((current, _)) if *current == handle => {
                self.listener = None;
                true
            }
            _ => false,
        }
    }

    pub fn has_load_state_listener(&self) -> bool {
        self.listener.is_some()
    }

    fn transition(&mut self, state: PageLoadState) {
        self.state = state;
        if let Some((_, listener)) = &self.listener {
            listener(state);
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Début de chargement du document principal. Renvoie `false` si le
    /// début a été absorbé.
    pub fn page_started(&mut self, url: &str) -> bool {
        if self.suppress_next_start {
            self.suppress_next_start = false;
            debug!(url, "Spurious page start after error ignored");
            return false;
        }
        if self.state == PageLoadState::Started {
            // A new navigation replaced one that never finished.
            self.finish(false);
        }

        self.counter.reset();
        self.current_page_url = Some(url.to_owned());
        self.is_secure = false;

        self.session.loading().set(true);
        self.session.secure().set(false);
        self.session.progress().set(PROGRESS_STARTED);
        self.session.blocked_trackers().set(0);
        self.session.url().set(url.to_owned());

        self.transition(PageLoadState::Started);
        self.emit(|cb| {
            cb.on_page_started(url);
            cb.reset_blocked_trackers();
            cb.on_progress(PROGRESS_STARTED);
        });
        true
    }

    /// Progression, avec l'URL affichée par le moteur à cet instant.
    pub fn progress(&mut self, percent: u8, renderer_url: Option<&str>) {
        let percent = percent.min(PROGRESS_FINISHED);
        self.session.progress().set(percent);
        self.emit(|cb| cb.on_progress(percent));
        if let Some(url) = renderer_url
            && !urlutil::is_internal_error_url(url)
            && self.session.url().get() != url
        {
            self.url_changed(url, false);
        }
    }

    pub fn url_changed(&mut self, url: &str, is_navigation: bool) {
        if urlutil::is_internal_error_url(url) {
            return;
        }
        self.session.url().set(url.to_owned());
        self.emit(|cb| cb.on_url_changed(url, is_navigation));
    }

    pub fn title_changed(&mut self, title: &str) {
        self.session.title().set(title.to_owned());
        self.emit(|cb| cb.on_title_changed(title));
    }

    /// Signal de sécurité du transport pour le document principal.
    pub fn security_changed(&mut self, secure: bool, host: Option<&str>, organization: Option<&str>) {
        let secure = secure || self.is_trusted_internal_page();
        self.is_secure = secure;
        self.session.secure().set(secure);
        self.emit(|cb| cb.on_security_changed(secure, host, organization));
    }

    /// Requête réseau du document principal vue par l'intercepteur :
    /// l'URL affichée est mise à jour sans attendre la fin du chargement.
    pub fn main_frame_requested(&mut self, url: &str) {
        if let Some(current) = self.current_page_url.clone()
            && urlutil::urls_match_except_for_trailing_slash(&current, url)
        {
            self.url_changed(&current, true);
        }
    }

    /// Fin de chargement. `secure` est le dernier signal de transport validé ;
    /// ignoré hors d'une navigation démarrée.
    pub fn page_finished(&mut self, secure: bool) {
        if !matches!(self.state, PageLoadState::Started | PageLoadState::Error) {
            debug!("Page finish without matching start ignored");
            return;
        }
        let secure = (secure && self.state == PageLoadState::Started) || self.is_trusted_internal_page();
        self.finish(secure);
    }

    /// Arrêt explicite : termine la navigation en cours avec le dernier état
    /// de sécurité connu.
    pub fn stop(&mut self) {
        if matches!(self.state, PageLoadState::Started | PageLoadState::Error) {
            let secure = self.is_secure;
            self.finish(secure);
        }
    }

    fn finish(&mut self, secure: bool) {
        self.is_secure = secure;
        self.session.secure().set(secure);
        self.session.progress().set(PROGRESS_FINISHED);
        self.session.loading().set(false);
        self.transition(PageLoadState::Finished);
        self.emit(|cb| {
            cb.on_progress(PROGRESS_FINISHED);
            cb.on_page_finished(secure);
        });
        self.transition(PageLoadState::Idle);
    }

    /// Échec de chargement. Renvoie la page d'erreur à charger quand
    /// l'échec concerne le document principal en cours (ou une URL de
    /// diagnostic) ; les autres échecs laissent le moteur poursuivre.
    pub fn received_error(&mut self, failing_url: &str, error: ErrorType, main_frame: bool) -> Option<String> {
        if !main_frame {
            return None;
        }
        // The renderer reports one extra start after a main-frame error.
        self.suppress_next_start = true;

        let synthetic = ErrorType::from_diagnostic_url(failing_url).is_some();
        let matches_page = self.current_page_url.as_deref() == Some(failing_url);
        if !synthetic && !matches_page {
            debug!(failing_url, "Main-frame error for another URL, no error page");
            return None;
        }
        Some(self.enter_error(failing_url, error))
    }

    /// Affiche une page d'erreur décidée avant tout chargement (routage).
    /// Le moteur chargera la page, d'où un début à absorber.
    pub fn show_error(&mut self, failing_url: &str, error: ErrorType) -> String {
        if self.state != PageLoadState::Started {
            self.suppress_next_start = false;
            self.page_started(failing_url);
        }
        self.suppress_next_start = true;
        self.enter_error(failing_url, error)
    }

    fn enter_error(&mut self, failing_url: &str, error: ErrorType) -> String {
        info!(failing_url, error = %error, "Showing error page");
        self.is_secure = false;
        self.transition(PageLoadState::Error);
        error_page::render(error, failing_url)
    }

    /// Traqueur bloqué, compté dans l'ordre des événements du moteur : un
    /// blocage posté après le début de page compte pour la nouvelle page.
    pub fn tracker_blocked(&mut self) {
        let count = self.counter.record_blocked();
        self.session.blocked_trackers().set(count);
        self.emit(|cb| cb.count_blocked_tracker());
    }

    /// Transforme une décision de routage en chargement moteur.
    pub fn plan_load(&mut self, url: &str, decision: NavigationDecision) -> PlannedLoad {
        match decision {
            NavigationDecision::Allow => {
                self.current_page_url = Some(url.to_owned());
                PlannedLoad::Network(url.to_owned())
            }
            NavigationDecision::Handled => PlannedLoad::Nothing,
            NavigationDecision::LoadInternal { url, html } => PlannedLoad::Data { base_url: url, html },
            NavigationDecision::LoadError { failing_url, error } => {
                let html = self.show_error(&failing_url, error);
                PlannedLoad::Data {
                    base_url: failing_url,
                    html,
                }
            }
        }
    }

    /// Chargement différé posté par le moteur via [`NavigationGate`].
    pub fn plan_deferred(&mut self, router: &NavigationRouter, load: DeferredLoad) -> PlannedLoad {
        match load {
            DeferredLoad::Internal { url, html } => PlannedLoad::Data { base_url: url, html },
            DeferredLoad::Error { failing_url, error } => {
                let html = self.show_error(&failing_url, error);
                PlannedLoad::Data {
                    base_url: failing_url,
                    html,
                }
            }
            DeferredLoad::Url(url) => {
                let decision = router.route(&url);
                self.plan_load(&url, decision)
            }
        }
    }

    /// Oublie la navigation en cours (après effacement de la session).
    pub fn reset(&mut self) {
        self.suppress_next_start = false;
        self.current_page_url = None;
        self.is_secure = false;
        self.counter.reset();
        if self.state != PageLoadState::Idle {
            self.transition(PageLoadState::Idle);
        }
    }

    fn is_trusted_internal_page(&self) -> bool {
        self.current_page_url
            .as_deref()
            .is_some_and(|url| urlutil::is_localized_content(url) || url == urlutil::ABOUT_BLANK)
    }
}
