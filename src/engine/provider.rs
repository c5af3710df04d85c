//! Sélection du backend et hébergement des vues par session.
//!
//! [`EngineProvider`] construit une vue pour le backend choisi dans la
//! configuration ; [`EngineHost`] garde exactement une vue par session et
//! la libère quand la session disparaît.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::standalone::{StandaloneEngineView, StandaloneRendererFactory};
use super::system::{SystemEngineView, SystemRendererFactory};
use super::{EngineView, ExternalUrlDispatcher, ViewContext};
use crate::config::{Config, EngineKind};
use crate::error::EngineError;
use crate::observable::Subscription;
use crate::preferences::{self, PreferenceStore};
use crate::session::manager::SessionSnapshot;
use crate::session::{InstanceState, Session};
use crate::tracking::{TrackerClassifier, TrackingSettings};

pub struct EngineProvider {
    kind: EngineKind,
    context: ViewContext,
    system: Option<Arc<dyn SystemRendererFactory>>,
    standalone: Option<Arc<dyn StandaloneRendererFactory>>,
}

impl EngineProvider {
    /// Classifieur et réglages construits depuis la configuration.
    pub fn from_config(config: &Config) -> Self {
        let tracking = TrackingSettings::new(config.privacy.categories(), config.privacy.block_images);
        Self::new(config, Arc::new(TrackerClassifier::new()), Arc::new(tracking))
    }

    pub fn new(config: &Config, classifier: Arc<TrackerClassifier>, tracking: Arc<TrackingSettings>) -> Self {
        Self {
            kind: config.engine.backend,
            context: ViewContext {
                classifier,
                tracking,
                general: config.general.clone(),
                engine: config.engine.clone(),
                dispatcher: None,
            },
            system: None,
            standalone: None,
        }
    }

    pub fn with_system_factory(mut self, factory: Arc<dyn SystemRendererFactory>) -> Self {
        self.system = Some(factory);
        self
    }

    pub fn with_standalone_factory(mut self, factory: Arc<dyn StandaloneRendererFactory>) -> Self {
        self.standalone = Some(factory);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn ExternalUrlDispatcher>) -> Self {
        self.context.dispatcher = Some(dispatcher);
        self
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn context(&self) -> &ViewContext {
        &self.context
    }

    /// Branche le magasin de préférences sur les réglages de blocage
    /// partagés par toutes les vues.
    pub fn attach_preferences(&self, store: &PreferenceStore) -> Subscription {
        preferences::attach_tracking_listener(store, Arc::clone(&self.context.tracking))
    }

    pub fn create_view(&self, session: Arc<Session>) -> Result<Box<dyn EngineView>, EngineError> {
        let context = self.context.clone();
        match self.kind {
            EngineKind::System => {
                let factory = self.system.as_ref().ok_or(EngineError::BackendUnavailable("system"))?;
                Ok(Box::new(SystemEngineView::new(factory.as_ref(), session, context)?))
            }
            EngineKind::Standalone => {
                let factory = self
                    .standalone
                    .as_ref()
                    .ok_or(EngineError::BackendUnavailable("standalone"))?;
                Ok(Box::new(StandaloneEngineView::new(factory.as_ref(), session, context)?))
            }
        }
    }
}

/// Une vue par session, jamais partagée.
pub struct EngineHost {
    provider: EngineProvider,
    views: HashMap<Uuid, Box<dyn EngineView>>,
}

impl EngineHost {
    pub fn new(provider: EngineProvider) -> Self {
        Self {
            provider,
            views: HashMap::new(),
        }
    }

    pub fn provider(&self) -> &EngineProvider {
        &self.provider
    }

    pub fn has_view(&self, uuid: Uuid) -> bool {
        self.views.contains_key(&uuid)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Vue de la session, créée au besoin (sans rien charger).
    pub fn view_for(&mut self, session: &Arc<Session>) -> Result<&mut dyn EngineView, EngineError> {
        let view = match self.views.entry(session.uuid()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.provider.create_view(Arc::clone(session))?),
        };
        Ok(&mut **view)
    }

    /// Ouvre la session : restaure `state` s'il lui appartient, sinon charge
    /// son URL.
    pub fn open(
        &mut self,
        session: &Arc<Session>,
        state: Option<&InstanceState>,
    ) -> Result<&mut dyn EngineView, EngineError> {
        let view = self.view_for(session)?;
        let restored = state.is_some_and(|state| view.restore_state(session, state));
        if !restored {
            let url = session.url().get();
            if !url.is_empty() {
                view.load_url(&url);
            }
        }
        Ok(view)
    }

    /// Efface puis détruit la vue de la session, et oublie son état sauvegardé.
    pub fn erase(&mut self, session: &Session) -> bool {
        session.clear_engine_state();
        match self.views.remove(&session.uuid()) {
            Some(mut view) => {
                view.cleanup();
                view.destroy();
                info!(session = %session.uuid(), "Session erased");
                true
            }
            None => false,
        }
    }

    /// Libère les vues des sessions qui ne sont plus dans le registre.
    pub fn sync(&mut self, snapshot: &SessionSnapshot) -> usize {
        let stale: Vec<Uuid> = self
            .views
            .keys()
            .filter(|uuid| !snapshot.sessions.iter().any(|s| s.uuid() == **uuid))
            .copied()
            .collect();
        for uuid in &stale {
            if let Some(mut view) = self.views.remove(uuid) {
                view.cleanup();
                view.destroy();
            }
        }
        if !stale.is_empty() {
            info!(released = stale.len(), "Released views of removed sessions");
        }
        stale.len()
    }

    pub fn erase_all(&mut self) {
        for (uuid, mut view) in self.views.drain() {
            view.cleanup();
            view.destroy();
            info!(session = %uuid, "Session erased");
        }
    }

    /// Traite les événements de toutes les vues.
    pub fn pump_all(&mut self) -> usize {
        self.views.values_mut().map(|view| view.pump_events()).sum()
    }
}

impl Drop for EngineHost {
    fn drop(&mut self) {
        if !self.views.is_empty() {
            warn!(views = self.views.len(), "Engine host dropped with live views");
            self.erase_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fakes::{FakeStandaloneFactory, FakeSystemFactory};
    use crate::engine::system::SystemEvent;
    use crate::preferences::BLOCK_OTHER;
    use crate::session::SessionManager;
    use crate::session::Source;
    use crate::tracking::BlockCategory;
    use crate::tracking::classifier::tests::test_classifier;

    fn provider(kind: EngineKind) -> (EngineProvider, FakeSystemFactory, FakeStandaloneFactory) {
        let mut config = Config::default();
        config.engine.backend = kind;
        let system = FakeSystemFactory::default();
        let standalone = FakeStandaloneFactory::default();
        let provider = EngineProvider::new(
            &config,
            Arc::new(test_classifier()),
            Arc::new(TrackingSettings::new(config.privacy.categories(), false)),
        )
        .with_system_factory(Arc::new(system.clone()))
        .with_standalone_factory(Arc::new(standalone.clone()));
        (provider, system, standalone)
    }

    #[test]
    fn test_backend_follows_config() {
        let session = Arc::new(Session::new(Source::UserEntered, ""));

        let (system_provider, system, standalone) = provider(EngineKind::System);
        system_provider.create_view(Arc::clone(&session)).unwrap();
        assert!(!system.state.lock().unwrap().settings.is_empty());
        assert!(standalone.state.lock().unwrap().settings.is_empty());

        let (standalone_provider, system, standalone) = provider(EngineKind::Standalone);
        standalone_provider.create_view(session).unwrap();
        assert!(system.state.lock().unwrap().settings.is_empty());
        assert!(!standalone.state.lock().unwrap().policies.is_empty());
    }

    #[test]
    fn test_missing_backend_reported() {
        let mut config = Config::default();
        config.engine.backend = EngineKind::Standalone;
        let provider = EngineProvider::new(
            &config,
            Arc::new(test_classifier()),
            Arc::new(TrackingSettings::default()),
        );
        let session = Arc::new(Session::new(Source::UserEntered, ""));
        assert_eq!(
            provider.create_view(session).err(),
            Some(EngineError::BackendUnavailable("standalone"))
        );
    }

    #[test]
    fn test_preferences_reach_shared_settings() {
        let (provider, _, _) = provider(EngineKind::System);
        let store = PreferenceStore::from_config(&Config::default().privacy);
        let handle = provider.attach_preferences(&store);
        store.set(BLOCK_OTHER, true);
        assert!(provider.context().tracking.categories().contains(BlockCategory::Content));
        assert!(store.unsubscribe(handle));
    }

    #[test]
    fn test_one_view_per_session() {
        let (provider, system, _) = provider(EngineKind::System);
        let mut host = EngineHost::new(provider);
        let a = Arc::new(Session::new(Source::UserEntered, "https://a.example/"));
        let b = Arc::new(Session::new(Source::UserEntered, "https://b.example/"));

        host.open(&a, None).unwrap();
        host.open(&b, None).unwrap();
        host.view_for(&a).unwrap();
        assert_eq!(host.len(), 2);
        assert_eq!(
            system.state.lock().unwrap().loads,
            vec!["https://a.example/".to_string(), "https://b.example/".to_string()]
        );
    }

    #[test]
    fn test_open_restores_matching_state() {
        let (provider, system, _) = provider(EngineKind::System);
        let mut host = EngineHost::new(provider);
        let session = Arc::new(Session::new(Source::UserEntered, "https://a.example/"));
        let state = host.open(&session, None).unwrap().save_state(&session);
        host.erase_all();
        assert!(session.has_saved_engine_state());

        host.open(&session, Some(&state)).unwrap();
        let fake = system.state.lock().unwrap();
        assert_eq!(fake.reloads, 1);
        assert_eq!(fake.loads.len(), 1);
    }

    #[test]
    fn test_erase_cleans_and_destroys() {
        let (provider, system, _) = provider(EngineKind::System);
        let mut host = EngineHost::new(provider);
        let session = Arc::new(Session::new(Source::UserEntered, "https://a.example/"));
        host.open(&session, None).unwrap().save_state(&session);
        assert!(session.has_saved_engine_state());

        assert!(host.erase(&session));
        assert!(!host.erase(&session));
        assert!(!session.has_saved_engine_state());
        let fake = system.state.lock().unwrap();
        assert!(fake.destroyed);
        assert_eq!(fake.cleared.len(), crate::engine::StorageKind::ALL.len());
    }

    #[test]
    fn test_sync_releases_removed_sessions() {
        let (provider, _, _) = provider(EngineKind::System);
        let mut host = EngineHost::new(provider);
        let manager = SessionManager::default();
        let a = manager.create_session(Source::UserEntered, "https://a.example/");
        let b = manager.create_session(Source::UserEntered, "https://b.example/");
        host.open(&a, None).unwrap();
        host.open(&b, None).unwrap();

        manager.remove_session_by_uuid(a.uuid());
        assert_eq!(host.sync(&manager.snapshot()), 1);
        assert!(!host.has_view(a.uuid()));
        assert!(host.has_view(b.uuid()));
    }

    #[test]
    fn test_pump_all_drains_every_view() {
        let (provider, system, _) = provider(EngineKind::System);
        let mut host = EngineHost::new(provider);
        let session = Arc::new(Session::new(Source::UserEntered, "https://a.example/"));
        host.open(&session, None).unwrap();
        system.hooks().events.send(SystemEvent::PageStarted {
            url: "https://a.example/".into(),
        });
        assert_eq!(host.pump_all(), 1);
        assert!(session.loading().get());
    }
}
