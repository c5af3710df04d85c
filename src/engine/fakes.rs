//! Doublures de test pour les deux backends et le callback UI.

use std::sync::{Arc, Mutex};

use super::standalone::{
    StandaloneEvent, StandaloneHooks, StandaloneRenderer, StandaloneRendererFactory, TrackingPolicy,
};
use super::system::{SystemHooks, SystemRenderer, SystemRendererFactory};
use super::{Download, EngineCallback, ExternalUrlDispatcher, FullscreenExit, HitTarget, StorageKind, ViewContext};
use crate::config::{EngineConfig, GeneralConfig};
use crate::error::EngineError;
use crate::preferences::RendererSettings;
use crate::tracking::classifier::tests::test_classifier;
use crate::tracking::{RequestKind, TrackingSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Callback
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    Started(String),
    Finished(bool),
    Security(bool),
    Progress(u8),
    UrlChanged(String),
    TitleChanged(String),
    LongPress(HitTarget),
    DownloadStarted(String),
    EnterFullscreen,
    ExitFullscreen,
    TrackerCounted,
    TrackersReset,
    BlockingChanged(bool),
}

#[derive(Clone, Default)]
pub struct RecordingCallback {
    events: Arc<Mutex<Vec<CallbackEvent>>>,
    fullscreen_exit: Arc<Mutex<Option<FullscreenExit>>>,
}

impl RecordingCallback {
    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&CallbackEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }

    pub fn take_fullscreen_exit(&self) -> Option<FullscreenExit> {
        self.fullscreen_exit.lock().unwrap().take()
    }

    fn push(&self, event: CallbackEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl EngineCallback for RecordingCallback {
    fn on_page_started(&self, url: &str) {
        self.push(CallbackEvent::Started(url.to_owned()));
    }

    fn on_page_finished(&self, is_secure: bool) {
        self.push(CallbackEvent::Finished(is_secure));
    }

    fn on_security_changed(&self, is_secure: bool, _host: Option<&str>, _organization: Option<&str>) {
        self.push(CallbackEvent::Security(is_secure));
    }

    fn on_progress(&self, progress: u8) {
        self.push(CallbackEvent::Progress(progress));
    }

    fn on_url_changed(&self, url: &str, _is_navigation: bool) {
        self.push(CallbackEvent::UrlChanged(url.to_owned()));
    }

    fn on_title_changed(&self, title: &str) {
        self.push(CallbackEvent::TitleChanged(title.to_owned()));
    }

    fn on_long_press(&self, hit_target: HitTarget) {
        self.push(CallbackEvent::LongPress(hit_target));
    }

    fn on_download_start(&self, download: Download) {
        self.push(CallbackEvent::DownloadStarted(download.url));
    }

    fn on_enter_fullscreen(&self, exit: FullscreenExit) {
        *self.fullscreen_exit.lock().unwrap() = Some(exit);
        self.push(CallbackEvent::EnterFullscreen);
    }

    fn on_exit_fullscreen(&self) {
        self.push(CallbackEvent::ExitFullscreen);
    }

    fn count_blocked_tracker(&self) {
        self.push(CallbackEvent::TrackerCounted);
    }

    fn reset_blocked_trackers(&self) {
        self.push(CallbackEvent::TrackersReset);
    }

    fn on_blocking_state_changed(&self, enabled: bool) {
        self.push(CallbackEvent::BlockingChanged(enabled));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// External dispatch
// ─────────────────────────────────────────────────────────────────────────────

pub struct StaticDispatcher {
    handles: bool,
    dispatched: Mutex<Vec<String>>,
}

impl StaticDispatcher {
    pub fn new(handles: bool) -> Self {
        Self {
            handles,
            dispatched: Mutex::new(Vec::new()),
        }
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }
}

impl ExternalUrlDispatcher for StaticDispatcher {
    fn dispatch(&self, url: &str) -> bool {
        self.dispatched.lock().unwrap().push(url.to_owned());
        self.handles
    }
}

pub fn test_context(dispatcher: Option<Arc<dyn ExternalUrlDispatcher>>) -> ViewContext {
    ViewContext {
        classifier: Arc::new(test_classifier()),
        tracking: Arc::new(TrackingSettings::default()),
        general: GeneralConfig::default(),
        engine: EngineConfig::default(),
        dispatcher,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Renderers
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a fake renderer was asked to do.
#[derive(Debug, Default)]
pub struct FakeState {
    pub loads: Vec<String>,
    pub data_loads: Vec<(String, String)>,
    pub reloads: usize,
    pub stops: usize,
    pub current_url: Option<String>,
    pub title: Option<String>,
    pub back_forward: Vec<&'static str>,
    /// When set, restoring history yields no committed entry.
    pub lose_uncommitted_entry: bool,
    pub settings: Vec<RendererSettings>,
    pub policies: Vec<Option<TrackingPolicy>>,
    pub cleared: Vec<StorageKind>,
    pub fail_clear: Option<StorageKind>,
    pub exited_fullscreen: usize,
    pub restarts: usize,
    pub destroyed: bool,
}

pub type SharedFake = Arc<Mutex<FakeState>>;

struct FakeRenderer {
    state: SharedFake,
}

impl FakeRenderer {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn load_url(&mut self, url: &str) {
        let mut state = self.state();
        state.loads.push(url.to_owned());
        state.current_url = Some(url.to_owned());
    }

    fn load_data(&mut self, base_url: &str, html: &str) {
        let mut state = self.state();
        state.data_loads.push((base_url.to_owned(), html.to_owned()));
        state.current_url = Some(base_url.to_owned());
    }

    fn save_history(&self) -> Vec<u8> {
        self.state().current_url.clone().unwrap_or_default().into_bytes()
    }

    fn restore_history(&mut self, history: &[u8]) -> Option<String> {
        let mut state = self.state();
        if state.lose_uncommitted_entry {
            return None;
        }
        let url = String::from_utf8(history.to_vec()).ok()?;
        state.current_url = Some(url.clone());
        Some(url)
    }

    fn clear_data(&mut self, kind: StorageKind) -> Result<(), EngineError> {
        let mut state = self.state();
        state.cleared.push(kind);
        if state.fail_clear == Some(kind) {
            return Err(EngineError::renderer("clear data", "storage locked"));
        }
        Ok(())
    }
}

macro_rules! delegate_common {
    () => {
        fn load_url(&mut self, url: &str) {
            self.0.load_url(url)
        }
        fn load_data(&mut self, base_url: &str, html: &str) {
            self.0.load_data(base_url, html)
        }
        fn reload(&mut self) {
            self.0.state().reloads += 1;
        }
        fn stop_loading(&mut self) {
            self.0.state().stops += 1;
        }
        fn go_back(&mut self) {
            self.0.state().back_forward.push("back");
        }
        fn go_forward(&mut self) {
            self.0.state().back_forward.push("forward");
        }
        fn can_go_back(&self) -> bool {
            self.0.state().loads.len() > 1
        }
        fn can_go_forward(&self) -> bool {
            false
        }
        fn url(&self) -> Option<String> {
            self.0.state().current_url.clone()
        }
        fn title(&self) -> Option<String> {
            self.0.state().title.clone()
        }
        fn save_history(&self) -> Vec<u8> {
            self.0.save_history()
        }
        fn restore_history(&mut self, history: &[u8]) -> Option<String> {
            self.0.restore_history(history)
        }
        fn apply_settings(&mut self, settings: &RendererSettings) {
            self.0.state().settings.push(settings.clone());
        }
        fn clear_data(&mut self, kind: StorageKind) -> Result<(), EngineError> {
            self.0.clear_data(kind)
        }
        fn exit_fullscreen(&mut self) {
            self.0.state().exited_fullscreen += 1;
        }
        fn destroy(&mut self) {
            self.0.state().destroyed = true;
        }
    };
}

struct FakeSystemRenderer(FakeRenderer);

impl SystemRenderer for FakeSystemRenderer {
    delegate_common!();
}

struct FakeStandaloneRenderer(FakeRenderer);

impl StandaloneRenderer for FakeStandaloneRenderer {
    delegate_common!();

    fn set_tracking_protection(&mut self, policy: Option<TrackingPolicy>) {
        self.0.state().policies.push(policy);
    }

    fn restart_session(&mut self) -> Result<(), EngineError> {
        self.0.state().restarts += 1;
        Ok(())
    }
}

/// Fabrique système qui garde les hooks pour simuler le moteur.
#[derive(Clone, Default)]
pub struct FakeSystemFactory {
    pub state: SharedFake,
    hooks: Arc<Mutex<Option<SystemHooks>>>,
}

impl FakeSystemFactory {
    pub fn hooks(&self) -> SystemHooks {
        self.hooks.lock().unwrap().clone().unwrap()
    }
}

impl SystemRendererFactory for FakeSystemFactory {
    fn create(&self, hooks: SystemHooks) -> Result<Box<dyn SystemRenderer>, EngineError> {
        *self.hooks.lock().unwrap() = Some(hooks);
        Ok(Box::new(FakeSystemRenderer(FakeRenderer {
            state: Arc::clone(&self.state),
        })))
    }
}

/// Fabrique autonome ; applique la politique déclarée comme le ferait le
/// moteur embarqué.
#[derive(Clone, Default)]
pub struct FakeStandaloneFactory {
    pub state: SharedFake,
    hooks: Arc<Mutex<Option<StandaloneHooks>>>,
}

impl FakeStandaloneFactory {
    pub fn hooks(&self) -> StandaloneHooks {
        self.hooks.lock().unwrap().clone().unwrap()
    }

    pub fn send(&self, event: StandaloneEvent) {
        self.hooks().events.send(event);
    }

    /// Sous-requête vue par le moteur : bloquée selon la dernière politique
    /// reçue. Renvoie `true` si bloquée.
    pub fn request(&self, url: &str, page_url: &str, kind: RequestKind) -> bool {
        let policy = self.state.lock().unwrap().policies.last().cloned().flatten();
        let Some(policy) = policy else {
            return false;
        };
        match policy.evaluate(url, page_url, kind) {
            Some(reason) if reason.is_tracker() => {
                self.send(StandaloneEvent::TrackerBlocked { url: url.to_owned() });
                true
            }
            Some(_) => true,
            None => false,
        }
    }
}

impl StandaloneRendererFactory for FakeStandaloneFactory {
    fn create(&self, hooks: StandaloneHooks) -> Result<Box<dyn StandaloneRenderer>, EngineError> {
        *self.hooks.lock().unwrap() = Some(hooks);
        Ok(Box::new(FakeStandaloneRenderer(FakeRenderer {
            state: Arc::clone(&self.state),
        })))
    }
}
