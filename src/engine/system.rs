//! Backend « système »: moteur fourni par la plateforme.
//!
//! La protection contre le pistage se fait par interception : le moteur
//! soumet chaque sous-requête à [`SystemInterceptor::intercept`] depuis ses
//! threads réseau, qui répond immédiatement (autoriser / bloquer) et poste
//! le blocage dans la file de la vue. Tout le reste (début, progression,
//! fin, erreurs) arrive aussi par la file, et n'est traité que pendant
//! [`EngineView::pump_events`]. Le compteur suit donc l'ordre des
//! événements : un blocage posté après `PageStarted` compte pour la
//! nouvelle page, même si la vue n'a pas encore pompé ce début.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::navigation::{DeferredLoad, NavigationGate, NavigationRouter, PlannedLoad};
use super::queue::{EventQueue, EventSender};
use super::{
    Download, EngineCallback, EngineView, FullscreenExit, HitTarget, NavigationClient, PageLoadState,
    StorageKind, ViewContext,
};
use crate::error::EngineError;
use crate::error_page::ErrorType;
use crate::observable::Subscription;
use crate::preferences::RendererSettings;
use crate::session::{InstanceState, Session};
use crate::tracking::{RequestKind, TrackerClassifier, TrackerCounter, TrackingSettings};
use crate::urlutil;

/// Signal natif du moteur système.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    PageStarted {
        url: String,
    },
    PageFinished {
        url: String,
        has_certificate: bool,
    },
    ReceivedError {
        url: String,
        code: i32,
        main_frame: bool,
    },
    SslError {
        url: String,
    },
    Progress {
        percent: u8,
        view_url: Option<String>,
    },
    TitleChanged {
        title: String,
    },
    LongPress {
        is_link: bool,
        link_url: Option<String>,
        is_image: bool,
        image_url: Option<String>,
    },
    DownloadRequested {
        url: String,
        user_agent: Option<String>,
        content_disposition: Option<String>,
        mime_type: Option<String>,
        content_length: u64,
    },
    EnterFullscreen,
    ExitFullscreen,
    /// The UI asked to leave fullscreen through its [`FullscreenExit`].
    ExitFullscreenRequested,
    MainFrameRequested {
        url: String,
    },
    TrackerBlocked {
        url: String,
    },
    Deferred(DeferredLoad),
}

impl From<DeferredLoad> for SystemEvent {
    fn from(load: DeferredLoad) -> Self {
        Self::Deferred(load)
    }
}

/// Moteur de rendu natif piloté par la vue.
pub trait SystemRenderer: Send {
    fn load_url(&mut self, url: &str);
    /// Charge du HTML local ; `base_url` devient l'URL affichée.
    fn load_data(&mut self, base_url: &str, html: &str);
    fn reload(&mut self);
    fn stop_loading(&mut self);
    fn go_back(&mut self);
    fn go_forward(&mut self);
    fn can_go_back(&self) -> bool;
    fn can_go_forward(&self) -> bool;
    fn url(&self) -> Option<String>;
    fn title(&self) -> Option<String>;
    /// Historique opaque de navigation.
    fn save_history(&self) -> Vec<u8>;
    /// Rejoue un historique ; renvoie l'URL de l'entrée la plus récente.
    fn restore_history(&mut self, history: &[u8]) -> Option<String>;
    fn apply_settings(&mut self, settings: &RendererSettings);
    fn clear_data(&mut self, kind: StorageKind) -> Result<(), EngineError>;
    fn exit_fullscreen(&mut self);
    fn destroy(&mut self);
}

/// Points d'entrée remis au moteur à sa création.
#[derive(Clone)]
pub struct SystemHooks {
    pub interceptor: Arc<SystemInterceptor>,
    pub gate: NavigationGate<SystemEvent>,
    pub events: EventSender<SystemEvent>,
}

pub trait SystemRendererFactory: Send + Sync {
    fn create(&self, hooks: SystemHooks) -> Result<Box<dyn SystemRenderer>, EngineError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Interception
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    Allow,
    /// Answer with an empty response.
    Block,
}

/// Réponse à une erreur TLS : la navigation n'est jamais poursuivie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslDecision {
    Cancel,
}

/// Veto synchrone sur les requêtes, appelé depuis les threads du moteur.
pub struct SystemInterceptor {
    classifier: Arc<TrackerClassifier>,
    tracking: Arc<TrackingSettings>,
    blocking_enabled: AtomicBool,
    page_url: Mutex<Option<String>>,
    events: EventSender<SystemEvent>,
}

impl SystemInterceptor {
    pub fn new(
        classifier: Arc<TrackerClassifier>,
        tracking: Arc<TrackingSettings>,
        blocking_enabled: bool,
        events: EventSender<SystemEvent>,
    ) -> Self {
        Self {
            classifier,
            tracking,
            blocking_enabled: AtomicBool::new(blocking_enabled),
            page_url: Mutex::new(None),
            events,
        }
    }

    pub fn set_blocking_enabled(&self, enabled: bool) {
        self.blocking_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_blocking_enabled(&self) -> bool {
        self.blocking_enabled.load(Ordering::SeqCst)
    }

    /// Page dont les sous-requêtes sont en cours.
    pub fn set_page(&self, url: &str) {
        *self.lock_page() = Some(url.to_owned());
    }

    pub fn intercept(&self, url: &str, kind: RequestKind) -> InterceptDecision {
        let page_url = self.lock_page().clone();

        if kind == RequestKind::Document {
            if let Some(page_url) = &page_url
                && urlutil::urls_match_except_for_trailing_slash(page_url, url)
            {
                self.events.send(SystemEvent::MainFrameRequested { url: url.to_owned() });
            }
            return InterceptDecision::Allow;
        }

        if !self.is_blocking_enabled() {
            return InterceptDecision::Allow;
        }

        let page_url = page_url.unwrap_or_default();
        match self
            .classifier
            .should_block(url, &page_url, kind, self.tracking.categories())
        {
            None => InterceptDecision::Allow,
            Some(reason) => {
                if reason.is_tracker() {
                    self.events.send(SystemEvent::TrackerBlocked { url: url.to_owned() });
                }
                InterceptDecision::Block
            }
        }
    }

    /// Erreur de certificat : toujours annulée, la vue affiche la page
    /// d'erreur si elle concerne la page courante.
    pub fn on_ssl_error(&self, url: &str) -> SslDecision {
        warn!(url, "TLS error, navigation cancelled");
        self.events.send(SystemEvent::SslError { url: url.to_owned() });
        SslDecision::Cancel
    }

    fn lock_page(&self) -> MutexGuard<'_, Option<String>> {
        self.page_url.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vue
// ─────────────────────────────────────────────────────────────────────────────

pub struct SystemEngineView {
    renderer: Box<dyn SystemRenderer>,
    client: NavigationClient,
    interceptor: Arc<SystemInterceptor>,
    router: Arc<NavigationRouter>,
    queue: EventQueue<SystemEvent>,
    context: ViewContext,
    applied_revision: u64,
    destroyed: bool,
}

impl SystemEngineView {
    pub fn new(
        factory: &dyn SystemRendererFactory,
        session: Arc<Session>,
        context: ViewContext,
    ) -> Result<Self, EngineError> {
        let queue = EventQueue::new();
        let counter = Arc::new(TrackerCounter::new());
        let router = Arc::new(NavigationRouter::new(context.general.clone(), context.dispatcher.clone()));
        let blocking = session.is_blocking_enabled();
        let interceptor = Arc::new(SystemInterceptor::new(
            Arc::clone(&context.classifier),
            Arc::clone(&context.tracking),
            blocking,
            queue.sender(),
        ));
        let hooks = SystemHooks {
            interceptor: Arc::clone(&interceptor),
            gate: NavigationGate::new(Arc::clone(&router), queue.sender()),
            events: queue.sender(),
        };
        let renderer = factory.create(hooks)?;
        info!(session = %session.uuid(), blocking, "System engine view created");

        let mut view = Self {
            renderer,
            client: NavigationClient::new(session, counter),
            interceptor,
            router,
            queue,
            context,
            applied_revision: 0,
            destroyed: false,
        };
        view.apply_settings();
        Ok(view)
    }

    fn apply_settings(&mut self) {
        self.applied_revision = self.context.tracking.revision();
        let settings = self.context.renderer_settings(self.interceptor.is_blocking_enabled());
        self.renderer.apply_settings(&settings);
    }

    fn run(&mut self, plan: PlannedLoad) {
        match plan {
            PlannedLoad::Network(url) => {
                self.interceptor.set_page(&url);
                self.renderer.load_url(&url);
            }
            PlannedLoad::Data { base_url, html } => self.renderer.load_data(&base_url, &html),
            PlannedLoad::Nothing => {}
        }
    }

    fn handle(&mut self, event: SystemEvent) {
        match event {
            SystemEvent::PageStarted { url } => {
                if self.client.page_started(&url) {
                    self.interceptor.set_page(&url);
                }
            }
            SystemEvent::PageFinished { url, has_certificate } => {
                let secure = has_certificate
                    && self
                        .client
                        .current_page_url()
                        .is_some_and(|current| urlutil::urls_match_except_for_trailing_slash(current, &url));
                self.client.page_finished(secure);
            }
            SystemEvent::ReceivedError { url, code, main_frame } => {
                let error = ErrorType::for_system_code(code);
                if let Some(html) = self.client.received_error(&url, error, main_frame) {
                    self.renderer.load_data(&url, &html);
                }
            }
            SystemEvent::SslError { url } => {
                let is_current = self
                    .client
                    .current_page_url()
                    .is_some_and(|current| urlutil::urls_match_except_for_trailing_slash(current, &url));
                if is_current && let Some(html) = self.client.received_error(&url, ErrorType::TlsHandshake, true) {
                    self.renderer.load_data(&url, &html);
                }
            }
            SystemEvent::Progress { percent, view_url } => self.client.progress(percent, view_url.as_deref()),
            SystemEvent::TitleChanged { title } => self.client.title_changed(&title),
            SystemEvent::LongPress {
                is_link,
                link_url,
                is_image,
                image_url,
            } => match HitTarget::new(is_link, link_url, is_image, image_url) {
                Ok(target) => self.client.emit(|cb| cb.on_long_press(target)),
                Err(e) => warn!(error = %e, "Long press ignored"),
            },
            SystemEvent::DownloadRequested {
                url,
                user_agent,
                content_disposition,
                mime_type,
                content_length,
            } => match Download::new(url, user_agent, content_disposition, mime_type, content_length) {
                Ok(download) => self.client.emit(|cb| cb.on_download_start(download)),
                Err(e) => info!(error = %e, "Download dropped"),
            },
            SystemEvent::EnterFullscreen => {
                let events = self.queue.sender();
                let exit = FullscreenExit::new(move || {
                    events.send(SystemEvent::ExitFullscreenRequested);
                });
                self.client.emit(|cb| cb.on_enter_fullscreen(exit));
            }
            SystemEvent::ExitFullscreen => self.client.emit(|cb| cb.on_exit_fullscreen()),
            SystemEvent::ExitFullscreenRequested => self.renderer.exit_fullscreen(),
            SystemEvent::MainFrameRequested { url } => self.client.main_frame_requested(&url),
            SystemEvent::TrackerBlocked { url } => {
                debug!(url = %url, "Tracker blocked");
                self.client.tracker_blocked();
            }
            SystemEvent::Deferred(load) => {
                let plan = self.client.plan_deferred(&self.router, load);
                self.run(plan);
            }
        }
    }
}

impl EngineView for SystemEngineView {
    fn load_url(&mut self, url: &str) {
        if self.destroyed {
            debug!(url, "Load on destroyed view ignored");
            return;
        }
        let decision = self.router.route(url);
        let plan = self.client.plan_load(url, decision);
        self.run(plan);
    }

    fn reload(&mut self) {
        self.renderer.reload();
    }

    fn stop_loading(&mut self) {
        self.renderer.stop_loading();
    }

    fn go_back(&mut self) {
        self.renderer.go_back();
    }

    fn go_forward(&mut self) {
        self.renderer.go_forward();
    }

    fn can_go_back(&self) -> bool {
        self.renderer.can_go_back()
    }

    fn can_go_forward(&self) -> bool {
        self.renderer.can_go_forward()
    }

    fn set_blocking_enabled(&mut self, enabled: bool) {
        info!(enabled, "Tracking protection toggled");
        self.interceptor.set_blocking_enabled(enabled);
        self.client.session().set_blocking_enabled(enabled);
        self.apply_settings();
        self.client.emit(|cb| cb.on_blocking_state_changed(enabled));
    }

    fn is_blocking_enabled(&self) -> bool {
        self.interceptor.is_blocking_enabled()
    }

    fn save_state(&mut self, session: &Session) -> InstanceState {
        let history = self.renderer.save_history();
        super::store_state(session, history, self.url())
    }

    fn restore_state(&mut self, session: &Session, state: &InstanceState) -> bool {
        let Some(saved) = super::saved_state_for(session, state) else {
            return false;
        };
        let restored = self.renderer.restore_history(&saved.history);
        if restored.as_deref() == Some(saved.last_url.as_str()) {
            debug!(url = %saved.last_url, "History restored, reloading current entry");
            self.renderer.reload();
        } else {
            info!(url = %saved.last_url, "Last page was not committed, loading it again");
            self.load_url(&saved.last_url);
        }
        true
    }

    fn url(&self) -> Option<String> {
        match self.renderer.url() {
            Some(url) if urlutil::is_internal_error_url(&url) => self.client.current_page_url().map(str::to_owned),
            other => other,
        }
    }

    fn title(&self) -> Option<String> {
        self.renderer.title()
    }

    fn cleanup(&mut self) {
        let renderer = &mut self.renderer;
        super::wipe_storage(|kind| renderer.clear_data(kind));
        self.client.reset();
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.renderer.destroy();
        self.client.set_callback(None);
        self.destroyed = true;
        info!(session = %self.client.session().uuid(), "System engine view destroyed");
    }

    fn set_callback(&mut self, callback: Option<Box<dyn EngineCallback>>) {
        self.client.set_callback(callback);
    }

    fn pump_events(&mut self) -> usize {
        if self.destroyed {
            return 0;
        }
        if self.context.tracking.revision() != self.applied_revision {
            self.apply_settings();
        }
        let mut handled = 0;
        while let Some(event) = self.queue.try_next() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    fn set_load_state_listener(&mut self, listener: Box<dyn Fn(PageLoadState) + Send>) -> Subscription {
        self.client.set_load_state_listener(listener)
    }

    fn remove_load_state_listener(&mut self, handle: Subscription) -> bool {
        self.client.remove_load_state_listener(handle)
    }

    fn load_state(&self) -> PageLoadState {
        self.client.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fakes::{
        test_context, CallbackEvent, FakeSystemFactory, RecordingCallback, StaticDispatcher,
    };
    use crate::error_page::system_codes;
    use crate::session::Source;
    use uuid::Uuid;

    struct Harness {
        view: SystemEngineView,
        factory: FakeSystemFactory,
        callback: RecordingCallback,
        session: Arc<Session>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_dispatcher(None)
        }

        fn with_dispatcher(dispatcher: Option<Arc<StaticDispatcher>>) -> Self {
            let session = Arc::new(Session::new(Source::UserEntered, ""));
            let factory = FakeSystemFactory::default();
            let context = test_context(dispatcher.map(|d| d as Arc<dyn crate::engine::ExternalUrlDispatcher>));
            let mut view = SystemEngineView::new(&factory, Arc::clone(&session), context).unwrap();
            let callback = RecordingCallback::default();
            view.set_callback(Some(Box::new(callback.clone())));
            Self {
                view,
                factory,
                callback,
                session,
            }
        }

        fn send(&mut self, event: SystemEvent) {
            self.factory.hooks().events.send(event);
        }

        fn visit(&mut self, url: &str) {
            self.view.load_url(url);
            self.send(SystemEvent::PageStarted { url: url.into() });
            self.view.pump_events();
        }

        fn intercept(&self, url: &str, kind: RequestKind) -> InterceptDecision {
            self.factory.hooks().interceptor.intercept(url, kind)
        }
    }

    const PAGE: &str = "https://news.example/";
    const TRACKER: &str = "http://trackersimulator.org/collect.js";

    #[test]
    fn test_navigation_callbacks_in_order() {
        let mut h = Harness::new();
        h.view.load_url(PAGE);
        assert_eq!(h.factory.state.lock().unwrap().loads, vec![PAGE.to_string()]);

        h.send(SystemEvent::PageStarted { url: PAGE.into() });
        h.send(SystemEvent::Progress {
            percent: 60,
            view_url: Some(PAGE.into()),
        });
        h.send(SystemEvent::PageFinished {
            url: PAGE.into(),
            has_certificate: true,
        });
        assert_eq!(h.view.pump_events(), 3);

        assert_eq!(
            h.callback.events(),
            vec![
                CallbackEvent::Started(PAGE.into()),
                CallbackEvent::TrackersReset,
                CallbackEvent::Progress(25),
                CallbackEvent::Progress(60),
                CallbackEvent::Progress(100),
                CallbackEvent::Finished(true),
            ]
        );
        assert!(h.session.secure().get());
        assert_eq!(h.view.load_state(), PageLoadState::Idle);
    }

    #[test]
    fn test_certificate_for_other_url_is_not_secure() {
        let mut h = Harness::new();
        h.visit(PAGE);
        h.send(SystemEvent::PageFinished {
            url: "https://elsewhere.example/".into(),
            has_certificate: true,
        });
        h.view.pump_events();
        assert_eq!(h.callback.count(|e| *e == CallbackEvent::Finished(false)), 1);
    }

    #[test]
    fn test_trackers_blocked_and_counted() {
        let mut h = Harness::new();
        h.visit(PAGE);

        assert_eq!(h.intercept(TRACKER, RequestKind::Script), InterceptDecision::Block);
        assert_eq!(h.intercept("https://news.example/app.js", RequestKind::Script), InterceptDecision::Allow);
        assert_eq!(h.intercept("https://news.example/favicon.ico", RequestKind::Image), InterceptDecision::Block);
        h.view.pump_events();

        assert_eq!(h.session.blocked_trackers().get(), 1);
        assert_eq!(h.callback.count(|e| *e == CallbackEvent::TrackerCounted), 1);

        // A new navigation starts again from zero.
        h.visit("https://other.example/");
        assert_eq!(h.session.blocked_trackers().get(), 0);
    }

    #[test]
    fn test_blocks_before_first_pump_count_for_new_page() {
        let mut h = Harness::new();
        h.view.load_url(PAGE);
        h.send(SystemEvent::PageStarted { url: PAGE.into() });
        assert_eq!(h.intercept(TRACKER, RequestKind::Script), InterceptDecision::Block);
        h.view.pump_events();
        assert_eq!(h.session.blocked_trackers().get(), 1);
        assert_eq!(h.callback.count(|e| *e == CallbackEvent::TrackerCounted), 1);

        h.view.load_url("https://other.example/");
        h.send(SystemEvent::PageStarted {
            url: "https://other.example/".into(),
        });
        assert_eq!(h.intercept(TRACKER, RequestKind::Script), InterceptDecision::Block);
        h.view.pump_events();
        assert_eq!(h.session.blocked_trackers().get(), 1);
        assert_eq!(h.callback.count(|e| *e == CallbackEvent::TrackerCounted), 2);
    }

    #[test]
    fn test_disabling_blocking_stops_enforcement() {
        let mut h = Harness::new();
        h.visit(PAGE);

        h.view.set_blocking_enabled(false);
        assert!(!h.view.is_blocking_enabled());
        assert!(!h.session.is_blocking_enabled());
        assert_eq!(h.intercept(TRACKER, RequestKind::Script), InterceptDecision::Allow);
        h.view.pump_events();
        assert_eq!(h.session.blocked_trackers().get(), 0);
        assert!(h.factory.state.lock().unwrap().settings.last().unwrap().third_party_cookies);

        h.view.set_blocking_enabled(true);
        assert_eq!(h.intercept(TRACKER, RequestKind::Script), InterceptDecision::Block);
        h.view.pump_events();
        assert_eq!(h.session.blocked_trackers().get(), 1);
        assert_eq!(
            h.callback.count(|e| matches!(e, CallbackEvent::BlockingChanged(_))),
            2
        );
    }

    #[test]
    fn test_disabled_category_not_blocked() {
        let mut h = Harness::new();
        h.visit(PAGE);
        // Content blocking is off by default.
        assert_eq!(h.intercept("https://video.example/v.js", RequestKind::Script), InterceptDecision::Allow);
        h.view
            .context
            .tracking
            .set_category(crate::tracking::BlockCategory::Content, true);
        assert_eq!(h.intercept("https://video.example/v.js", RequestKind::Script), InterceptDecision::Block);
    }

    #[test]
    fn test_unpermitted_subresource_scheme_blocked() {
        let mut h = Harness::new();
        h.visit(PAGE);
        assert_eq!(h.intercept("intent://scan/#Intent;end", RequestKind::Other), InterceptDecision::Block);
        h.view.pump_events();
        assert_eq!(h.session.blocked_trackers().get(), 0);
    }

    #[test]
    fn test_main_frame_error_shows_page_once() {
        let mut h = Harness::new();
        let url = "https://down.example/";
        h.visit(url);
        h.send(SystemEvent::ReceivedError {
            url: url.into(),
            code: system_codes::HOST_LOOKUP,
            main_frame: true,
        });
        h.send(SystemEvent::PageFinished {
            url: url.into(),
            has_certificate: false,
        });
        // Loading the error page triggers another start and finish.
        h.send(SystemEvent::PageStarted { url: url.into() });
        h.send(SystemEvent::PageFinished {
            url: url.into(),
            has_certificate: false,
        });
        h.view.pump_events();

        let data_loads = h.factory.state.lock().unwrap().data_loads.clone();
        assert_eq!(data_loads.len(), 1);
        assert_eq!(data_loads[0].0, url);
        assert!(data_loads[0].1.contains("Server not found"));
        assert_eq!(h.callback.count(|e| matches!(e, CallbackEvent::Started(_))), 1);
        assert_eq!(h.callback.count(|e| matches!(e, CallbackEvent::Finished(_))), 1);
    }

    #[test]
    fn test_unknown_error_code_maps_to_unknown_page() {
        let mut h = Harness::new();
        h.visit(PAGE);
        h.send(SystemEvent::ReceivedError {
            url: PAGE.into(),
            code: -999,
            main_frame: true,
        });
        h.view.pump_events();
        let html = h.factory.state.lock().unwrap().data_loads[0].1.clone();
        assert!(html.contains(ErrorType::Unknown.title()));
    }

    #[test]
    fn test_subframe_error_ignored() {
        let mut h = Harness::new();
        h.visit(PAGE);
        h.send(SystemEvent::ReceivedError {
            url: "https://ads.example/frame".into(),
            code: system_codes::TIMEOUT,
            main_frame: false,
        });
        h.view.pump_events();
        assert!(h.factory.state.lock().unwrap().data_loads.is_empty());
        assert_eq!(h.view.load_state(), PageLoadState::Started);
    }

    #[test]
    fn test_ssl_error_cancelled_and_error_paged() {
        let mut h = Harness::new();
        h.visit(PAGE);
        assert_eq!(h.factory.hooks().interceptor.on_ssl_error(PAGE), SslDecision::Cancel);
        h.view.pump_events();
        let data_loads = h.factory.state.lock().unwrap().data_loads.clone();
        assert!(data_loads[0].1.contains("Secure connection failed"));

        // A certificate problem on a sub-resource only cancels it.
        h.factory.hooks().interceptor.on_ssl_error("https://cdn.example/x.js");
        h.view.pump_events();
        assert_eq!(h.factory.state.lock().unwrap().data_loads.len(), 1);
    }

    #[test]
    fn test_unsupported_scheme_delegated() {
        let dispatcher = Arc::new(StaticDispatcher::new(true));
        let mut h = Harness::with_dispatcher(Some(Arc::clone(&dispatcher)));
        h.view.load_url("mailto:someone@example.com");
        assert_eq!(dispatcher.dispatched(), vec!["mailto:someone@example.com".to_string()]);
        let state = h.factory.state.lock().unwrap();
        assert!(state.loads.is_empty());
        assert!(state.data_loads.is_empty());
    }

    #[test]
    fn test_unsupported_scheme_without_handler_errors() {
        let dispatcher = Arc::new(StaticDispatcher::new(false));
        let mut h = Harness::with_dispatcher(Some(dispatcher));
        h.view.load_url("market://details?id=1");
        h.send(SystemEvent::PageStarted {
            url: "market://details?id=1".into(),
        });
        h.send(SystemEvent::PageFinished {
            url: "market://details?id=1".into(),
            has_certificate: false,
        });
        h.view.pump_events();

        assert!(h.factory.state.lock().unwrap().data_loads[0]
            .1
            .contains(ErrorType::UnsupportedScheme.title()));
        assert_eq!(h.callback.count(|e| matches!(e, CallbackEvent::Started(_))), 1);
        assert_eq!(h.callback.count(|e| matches!(e, CallbackEvent::Finished(_))), 1);
    }

    #[test]
    fn test_renderer_initiated_navigation_through_gate() {
        let mut h = Harness::new();
        let gate = h.factory.hooks().gate;
        assert!(!gate.should_override(PAGE));
        assert!(gate.should_override(crate::urlutil::URL_ABOUT));
        gate.open_in_current_view("https://popup.example/");
        h.view.pump_events();

        let state = h.factory.state.lock().unwrap();
        assert_eq!(state.data_loads[0].0, crate::urlutil::URL_ABOUT);
        assert_eq!(state.loads, vec!["https://popup.example/".to_string()]);
    }

    #[test]
    fn test_main_frame_request_updates_url_early() {
        let mut h = Harness::new();
        h.view.load_url("https://news.example");
        assert_eq!(h.intercept("https://news.example/", RequestKind::Document), InterceptDecision::Allow);
        h.view.pump_events();
        assert_eq!(
            h.callback.events(),
            vec![CallbackEvent::UrlChanged("https://news.example".into())]
        );
    }

    #[test]
    fn test_save_and_restore_reloads_committed_entry() {
        let mut h = Harness::new();
        h.visit(PAGE);
        let state = h.view.save_state(&h.session);
        assert_eq!(state.current_url, PAGE);
        assert!(h.session.has_saved_engine_state());

        let factory = FakeSystemFactory::default();
        let mut restored = SystemEngineView::new(&factory, Arc::clone(&h.session), test_context(None)).unwrap();
        assert!(restored.restore_state(&h.session, &state));
        let fake = factory.state.lock().unwrap();
        assert_eq!(fake.reloads, 1);
        assert!(fake.loads.is_empty());
    }

    #[test]
    fn test_restore_reloads_uncommitted_url() {
        let mut h = Harness::new();
        h.visit(PAGE);
        let state = h.view.save_state(&h.session);

        let factory = FakeSystemFactory::default();
        factory.state.lock().unwrap().lose_uncommitted_entry = true;
        let mut restored = SystemEngineView::new(&factory, Arc::clone(&h.session), test_context(None)).unwrap();
        assert!(restored.restore_state(&h.session, &state));
        let fake = factory.state.lock().unwrap();
        assert_eq!(fake.reloads, 0);
        assert_eq!(fake.loads, vec![PAGE.to_string()]);
    }

    #[test]
    fn test_restore_rejects_foreign_state() {
        let mut h = Harness::new();
        h.visit(PAGE);
        h.session.title().set("News".into());
        let state = h.view.save_state(&h.session);
        let foreign = InstanceState {
            state_uuid: Uuid::new_v4(),
            ..state
        };

        let factory = FakeSystemFactory::default();
        let mut restored = SystemEngineView::new(&factory, Arc::clone(&h.session), test_context(None)).unwrap();
        assert!(!restored.restore_state(&h.session, &foreign));
        assert_eq!(h.session.url().get(), PAGE);
        assert_eq!(h.session.title().get(), "News");
        let fake = factory.state.lock().unwrap();
        assert_eq!(fake.reloads, 0);
        assert!(fake.loads.is_empty());
    }

    #[test]
    fn test_cleanup_wipes_everything_despite_failure() {
        let mut h = Harness::new();
        h.factory.state.lock().unwrap().fail_clear = Some(StorageKind::Cookies);
        h.view.cleanup();
        assert_eq!(h.factory.state.lock().unwrap().cleared, StorageKind::ALL.to_vec());
    }

    #[test]
    fn test_long_press_and_download_events() {
        let mut h = Harness::new();
        h.send(SystemEvent::LongPress {
            is_link: true,
            link_url: Some("https://a.example/".into()),
            is_image: false,
            image_url: None,
        });
        h.send(SystemEvent::LongPress {
            is_link: false,
            link_url: None,
            is_image: true,
            image_url: None,
        });
        h.send(SystemEvent::DownloadRequested {
            url: "ftp://files.example/a.zip".into(),
            user_agent: None,
            content_disposition: None,
            mime_type: None,
            content_length: 0,
        });
        h.send(SystemEvent::DownloadRequested {
            url: "https://files.example/a.zip".into(),
            user_agent: None,
            content_disposition: None,
            mime_type: Some("application/zip".into()),
            content_length: 10,
        });
        h.view.pump_events();

        let events = h.callback.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], CallbackEvent::LongPress(t) if t.link_url() == Some("https://a.example/")));
        assert_eq!(events[1], CallbackEvent::DownloadStarted("https://files.example/a.zip".into()));
    }

    #[test]
    fn test_fullscreen_exit_handle_reaches_renderer() {
        let mut h = Harness::new();
        h.send(SystemEvent::EnterFullscreen);
        h.view.pump_events();
        h.callback.take_fullscreen_exit().unwrap().exit();
        h.view.pump_events();
        assert_eq!(h.factory.state.lock().unwrap().exited_fullscreen, 1);

        h.send(SystemEvent::ExitFullscreen);
        h.view.pump_events();
        assert_eq!(h.callback.count(|e| *e == CallbackEvent::ExitFullscreen), 1);
    }

    #[test]
    fn test_preference_change_reapplied_on_pump() {
        let mut h = Harness::new();
        let applied = h.factory.state.lock().unwrap().settings.len();
        h.view.context.tracking.set_block_images(true);
        h.view.pump_events();
        let state = h.factory.state.lock().unwrap();
        assert_eq!(state.settings.len(), applied + 1);
        assert!(state.settings.last().unwrap().block_images);
    }

    #[test]
    fn test_url_hides_error_data_url() {
        let mut h = Harness::new();
        h.visit(PAGE);
        h.factory.state.lock().unwrap().current_url =
            Some(crate::resources::html_data_url("<p>error</p>"));
        assert_eq!(h.view.url().as_deref(), Some(PAGE));
    }

    #[test]
    fn test_destroy_is_final() {
        let mut h = Harness::new();
        h.view.destroy();
        h.view.destroy();
        assert!(h.factory.state.lock().unwrap().destroyed);
        h.view.load_url(PAGE);
        h.send(SystemEvent::PageStarted { url: PAGE.into() });
        assert_eq!(h.view.pump_events(), 0);
        assert!(h.factory.state.lock().unwrap().loads.is_empty());
    }
}
