//! Backend « autonome »: moteur embarqué dans l'application.
//!
//! Ici la protection est déclarative : la vue remet au moteur une
//! [`TrackingPolicy`] (catégories actives + classifieur partagé) et le
//! moteur applique lui-même le blocage, en signalant chaque traqueur par un
//! [`StandaloneEvent::TrackerBlocked`]. Le classifieur étant le même que
//! celui du backend système, les décisions sont identiques pour une même
//! configuration.
//!
//! Un plantage du processus de contenu est récupéré : la session moteur est
//! recréée, la politique et les réglages réappliqués, puis l'URL courante
//! rechargée.

use std::sync::Arc;

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
use crate::tracking::{BlockReason, CategorySet, RequestKind, TrackerClassifier, TrackerCounter};

/// Signal natif du moteur embarqué.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandaloneEvent {
    PageStart {
        url: String,
    },
    PageStop {
        success: bool,
    },
    SecurityChange {
        secure: bool,
        host: Option<String>,
        organization: Option<String>,
    },
    Progress {
        percent: u8,
    },
    LocationChange {
        url: String,
    },
    TitleChange {
        title: String,
    },
    LoadError {
        url: String,
        code: u32,
        main_frame: bool,
    },
    ContextMenu {
        link_url: Option<String>,
        src_url: Option<String>,
        is_image: bool,
    },
    ExternalResponse {
        url: String,
        content_disposition: Option<String>,
        mime_type: Option<String>,
        content_length: u64,
    },
    FullScreen(bool),
    /// Le processus de contenu a planté.
    Crash,
    TrackerBlocked {
        url: String,
    },
    ExitFullscreenRequested,
    Deferred(DeferredLoad),
}

impl From<DeferredLoad> for StandaloneEvent {
    fn from(load: DeferredLoad) -> Self {
        Self::Deferred(load)
    }
}

/// Politique de blocage remise au moteur.
#[derive(Debug, Clone)]
pub struct TrackingPolicy {
    pub categories: CategorySet,
    pub classifier: Arc<TrackerClassifier>,
}

impl TrackingPolicy {
    /// Décision pour une sous-requête, telle que le moteur doit l'appliquer.
    pub fn evaluate(&self, url: &str, page_url: &str, kind: RequestKind) -> Option<BlockReason> {
        self.classifier.should_block(url, page_url, kind, self.categories)
    }
}

pub trait StandaloneRenderer: Send {
    fn load_url(&mut self, url: &str);
    fn load_data(&mut self, base_url: &str, html: &str);
    fn reload(&mut self);
    fn stop_loading(&mut self);
    fn go_back(&mut self);
    fn go_forward(&mut self);
    fn can_go_back(&self) -> bool;
    fn can_go_forward(&self) -> bool;
    fn url(&self) -> Option<String>;
    fn title(&self) -> Option<String>;
    fn save_history(&self) -> Vec<u8>;
    fn restore_history(&mut self, history: &[u8]) -> Option<String>;
    /// `None` désactive complètement le blocage.
    fn set_tracking_protection(&mut self, policy: Option<TrackingPolicy>);
    fn apply_settings(&mut self, settings: &RendererSettings);
    fn clear_data(&mut self, kind: StorageKind) -> Result<(), EngineError>;
    fn exit_fullscreen(&mut self);
    /// Recrée la session moteur après un plantage du contenu.
    fn restart_session(&mut self) -> Result<(), EngineError>;
    fn destroy(&mut self);
}

#[derive(Clone)]
pub struct StandaloneHooks {
    pub gate: NavigationGate<StandaloneEvent>,
    pub events: EventSender<StandaloneEvent>,
}

pub trait StandaloneRendererFactory: Send + Sync {
    fn create(&self, hooks: StandaloneHooks) -> Result<Box<dyn StandaloneRenderer>, EngineError>;
}

pub struct StandaloneEngineView {
    renderer: Box<dyn StandaloneRenderer>,
    client: NavigationClient,
    router: Arc<NavigationRouter>,
    queue: EventQueue<StandaloneEvent>,
    context: ViewContext,
    blocking_enabled: bool,
    applied_revision: u64,
    destroyed: bool,
}

impl StandaloneEngineView {
    pub fn new(
        factory: &dyn StandaloneRendererFactory,
        session: Arc<Session>,
        context: ViewContext,
    ) -> Result<Self, EngineError> {
        let queue = EventQueue::new();
        let router = Arc::new(NavigationRouter::new(context.general.clone(), context.dispatcher.clone()));
        let hooks = StandaloneHooks {
            gate: NavigationGate::new(Arc::clone(&router), queue.sender()),
            events: queue.sender(),
        };
        let renderer = factory.create(hooks)?;
        let blocking_enabled = session.is_blocking_enabled();
        info!(session = %session.uuid(), blocking = blocking_enabled, "Standalone engine view created");

        let mut view = Self {
            renderer,
            client: NavigationClient::new(session, Arc::new(TrackerCounter::new())),
            router,
            queue,
            context,
            blocking_enabled,
            applied_revision: 0,
            destroyed: false,
        };
        view.apply_preferences();
        Ok(view)
    }

    fn policy(&self) -> Option<TrackingPolicy> {
        self.blocking_enabled.then(|| TrackingPolicy {
            categories: self.context.tracking.categories(),
            classifier: Arc::clone(&self.context.classifier),
        })
    }

    fn apply_preferences(&mut self) {
        self.applied_revision = self.context.tracking.revision();
        let policy = self.policy();
        debug!(
            categories = policy.as_ref().map(|p| p.categories.bits()),
            "Tracking policy handed to renderer"
        );
        self.renderer.set_tracking_protection(policy);
        let settings = self.context.renderer_settings(self.blocking_enabled);
        self.renderer.apply_settings(&settings);
    }

    fn run(&mut self, plan: PlannedLoad) {
        match plan {
            PlannedLoad::Network(url) => self.renderer.load_url(&url),
            PlannedLoad::Data { base_url, html } => self.renderer.load_data(&base_url, &html),
            PlannedLoad::Nothing => {}
        }
    }

    fn recover_from_crash(&mut self) {
        warn!(session = %self.client.session().uuid(), "Content process crashed, restarting");
        self.client.stop();
        if let Err(e) = self.renderer.restart_session() {
            warn!(error = %e, "Renderer session could not be restarted");
            return;
        }
        self.apply_preferences();
        let url = self.client.session().url().get();
        if !url.is_empty() {
            self.load_url(&url);
        }
    }

    fn handle(&mut self, event: StandaloneEvent) {
        match event {
            StandaloneEvent::PageStart { url } => {
                self.client.page_started(&url);
            }
            StandaloneEvent::PageStop { success } => {
                debug!(success, "Page stop");
                let secure = self.client.is_secure();
                self.client.page_finished(secure);
            }
            StandaloneEvent::SecurityChange {
                secure,
                host,
                organization,
            } => self
                .client
                .security_changed(secure, host.as_deref(), organization.as_deref()),
            StandaloneEvent::Progress { percent } => self.client.progress(percent, None),
            StandaloneEvent::LocationChange { url } => self.client.url_changed(&url, true),
            StandaloneEvent::TitleChange { title } => self.client.title_changed(&title),
            StandaloneEvent::LoadError { url, code, main_frame } => {
                let error = ErrorType::for_standalone_code(code);
                if let Some(html) = self.client.received_error(&url, error, main_frame) {
                    self.renderer.load_data(&url, &html);
                }
            }
            StandaloneEvent::ContextMenu {
                link_url,
                src_url,
                is_image,
            } => match HitTarget::new(link_url.is_some(), link_url, is_image, src_url) {
                Ok(target) => self.client.emit(|cb| cb.on_long_press(target)),
                Err(e) => warn!(error = %e, "Context menu ignored"),
            },
            StandaloneEvent::ExternalResponse {
                url,
                content_disposition,
                mime_type,
                content_length,
            } => {
                let user_agent = Some(self.context.renderer_settings(self.blocking_enabled).user_agent);
                match Download::new(url, user_agent, content_disposition, mime_type, content_length) {
                    Ok(download) => self.client.emit(|cb| cb.on_download_start(download)),
                    Err(e) => info!(error = %e, "Download dropped"),
                }
            }
            StandaloneEvent::FullScreen(true) => {
                let events = self.queue.sender();
                let exit = FullscreenExit::new(move || {
                    events.send(StandaloneEvent::ExitFullscreenRequested);
                });
                self.client.emit(|cb| cb.on_enter_fullscreen(exit));
            }
            StandaloneEvent::FullScreen(false) => self.client.emit(|cb| cb.on_exit_fullscreen()),
            StandaloneEvent::ExitFullscreenRequested => self.renderer.exit_fullscreen(),
            StandaloneEvent::Crash => self.recover_from_crash(),
            StandaloneEvent::TrackerBlocked { url } => {
                debug!(url = %url, "Tracker blocked by renderer");
                self.client.tracker_blocked();
            }
            StandaloneEvent::Deferred(load) => {
                let plan = self.client.plan_deferred(&self.router, load);
                self.run(plan);
            }
        }
    }
}

impl EngineView for StandaloneEngineView {
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

    /// Le moteur embarqué ne signale pas la fin d'un chargement interrompu.
    fn stop_loading(&mut self) {
        self.renderer.stop_loading();
        self.client.stop();
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
        self.blocking_enabled = enabled;
        self.client.session().set_blocking_enabled(enabled);
        self.apply_preferences();
        self.client.emit(|cb| cb.on_blocking_state_changed(enabled));
    }

    fn is_blocking_enabled(&self) -> bool {
        self.blocking_enabled
    }

    fn save_state(&mut self, session: &Session) -> InstanceState {
        let history = self.renderer.save_history();
        super::store_state(session, history, self.renderer.url())
    }

    fn restore_state(&mut self, session: &Session, state: &InstanceState) -> bool {
        let Some(saved) = super::saved_state_for(session, state) else {
            return false;
        };
        if self.renderer.restore_history(&saved.history).as_deref() == Some(saved.last_url.as_str()) {
            self.renderer.reload();
        } else {
            info!(url = %saved.last_url, "Last page was not committed, loading it again");
            self.load_url(&saved.last_url);
        }
        true
    }

    fn url(&self) -> Option<String> {
        self.renderer.url()
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
    }

    fn set_callback(&mut self, callback: Option<Box<dyn EngineCallback>>) {
        self.client.set_callback(callback);
    }

    fn pump_events(&mut self) -> usize {
        if self.destroyed {
            return 0;
        }
        if self.context.tracking.revision() != self.applied_revision {
            self.apply_preferences();
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
