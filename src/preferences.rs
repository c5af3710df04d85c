//! Préférences de confidentialité et réglages du moteur de rendu.
//!
//! - [`PreferenceStore`] : valeurs booléennes par clé, avec écouteurs de
//!   changement (le stockage durable n'est pas de son ressort).
//! - [`attach_tracking_listener`] : traduit les clés en drapeaux de
//!   [`TrackingSettings`], relus par les backends à chaque changement.
//! - [`RendererSettings`] : réglages poussés au moteur (images, user-agent).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::config::{EngineConfig, PrivacyConfig};
use crate::observable::Subscription;
use crate::tracking::{BlockCategory, TrackingSettings};

pub const BLOCK_ADS: &str = "privacy.block_ads";
pub const BLOCK_ANALYTICS: &str = "privacy.block_analytics";
pub const BLOCK_SOCIAL: &str = "privacy.block_social";
pub const BLOCK_OTHER: &str = "privacy.block_other";
pub const BLOCK_IMAGES: &str = "privacy.block_images";

/// Default user-agent when the configuration leaves it empty. Generic, to
/// reduce the fingerprinting surface.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

type Listener = Arc<dyn Fn(&str, bool) + Send + Sync>;

#[derive(Default)]
struct StoreInner {
    values: HashMap<String, bool>,
    listeners: Vec<(Subscription, Listener)>,
}

/// Magasin de préférences booléennes en mémoire.
#[derive(Default)]
pub struct PreferenceStore {
    inner: Mutex<StoreInner>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Magasin initialisé depuis la section `[privacy]` de la configuration.
    pub fn from_config(privacy: &PrivacyConfig) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for (key, value) in [
                (BLOCK_ADS, privacy.block_ads),
                (BLOCK_ANALYTICS, privacy.block_analytics),
                (BLOCK_SOCIAL, privacy.block_social),
                (BLOCK_OTHER, privacy.block_other),
                (BLOCK_IMAGES, privacy.block_images),
            ] {
                inner.values.insert(key.to_owned(), value);
            }
        }
        store
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.lock().values.get(key).copied()
    }

    /// Modifie une valeur. Les écouteurs ne sont appelés que si elle change.
    pub fn set(&self, key: &str, value: bool) {
        let listeners: Vec<Listener> = {
            let mut inner = self.lock();
            if inner.values.insert(key.to_owned(), value) == Some(value) {
                return;
            }
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        debug!(key, value, "Préférence modifiée");
        for listener in listeners {
            listener(key, value);
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&str, bool) + Send + Sync + 'static) -> Subscription {
        let handle = Subscription::next();
        self.lock().listeners.push((handle, Arc::new(listener)));
        handle
    }

    pub fn unsubscribe(&self, handle: Subscription) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(id, _)| *id != handle);
        inner.listeners.len() != before
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Catégorie pilotée par une clé de préférence.
pub fn category_for_key(key: &str) -> Option<BlockCategory> {
    match key {
        BLOCK_ADS => Some(BlockCategory::Ad),
        BLOCK_ANALYTICS => Some(BlockCategory::Analytics),
        BLOCK_SOCIAL => Some(BlockCategory::Social),
        BLOCK_OTHER => Some(BlockCategory::Content),
        _ => None,
    }
}

/// Copie l'état courant du magasin dans `settings`, puis le tient à jour.
pub fn attach_tracking_listener(
    store: &PreferenceStore,
    settings: Arc<TrackingSettings>,
) -> Subscription {
    for category in BlockCategory::ALL {
        let key = key_for_category(category);
        if let Some(value) = store.get(key) {
            settings.set_category(category, value);
        }
    }
    if let Some(value) = store.get(BLOCK_IMAGES) {
        settings.set_block_images(value);
    }

    store.subscribe(move |key, value| {
        if let Some(category) = category_for_key(key) {
            settings.set_category(category, value);
        } else if key == BLOCK_IMAGES {
            settings.set_block_images(value);
        }
    })
}

fn key_for_category(category: BlockCategory) -> &'static str {
    match category {
        BlockCategory::Ad => BLOCK_ADS,
        BlockCategory::Analytics => BLOCK_ANALYTICS,
        BlockCategory::Social => BLOCK_SOCIAL,
        BlockCategory::Content => BLOCK_OTHER,
    }
}

/// Réglages appliqués au moteur de rendu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererSettings {
    pub block_images: bool,
    pub user_agent: String,
    pub javascript_enabled: bool,
    pub geolocation_enabled: bool,
    /// Third-party cookies are refused whenever tracking protection is on.
    pub third_party_cookies: bool,
}

impl RendererSettings {
    /// Construit les réglages pour l'état courant des préférences.
    pub fn build(engine: &EngineConfig, tracking: &TrackingSettings, blocking_enabled: bool) -> Self {
        let user_agent = if engine.user_agent.is_empty() {
            DEFAULT_USER_AGENT.to_string()
        } else {
            engine.user_agent.clone()
        };
        let settings = Self {
            block_images: tracking.block_images(),
            user_agent,
            javascript_enabled: true,
            geolocation_enabled: false,
            third_party_cookies: !blocking_enabled,
        };
        info!(
            block_images = settings.block_images,
            third_party_cookies = settings.third_party_cookies,
            "Renderer settings configured"
        );
        settings
    }
}
