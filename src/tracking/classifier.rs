//! Classification des requêtes tierces par catégorie de traqueur.
//!
//! Encapsule un moteur `adblock` de Brave par catégorie. La classification
//! ne dépend pas des catégories actives : le cache mémorise la catégorie
//! trouvée pour `(url, page, type)`, et le masque est appliqué ensuite.
//! Basculer une catégorie à chaud ne peut donc jamais renvoyer une décision
//! périmée. Le caractère tiers d'une requête vient de `adblock`, qui résout
//! les domaines avec la liste des suffixes publics (`co.uk`, `com.au`...).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use adblock::Engine;
use adblock::lists::{FilterSet, ParseOptions};
use adblock::request::Request;
use tracing::{debug, info};
use url::Url;

use super::lists::{self, EntityList};
use super::{BlockCategory, CategorySet};
use crate::urlutil;

/// Cache entries beyond this count are dropped wholesale.
const CACHE_LIMIT: usize = 4096;

/// Type de ressource, tel que compris par `adblock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Top-level document. Never blocked.
    Document,
    Subdocument,
    Script,
    Image,
    Stylesheet,
    Xhr,
    Other,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Subdocument => "subdocument",
            Self::Script => "script",
            Self::Image => "image",
            Self::Stylesheet => "stylesheet",
            Self::Xhr => "xmlhttprequest",
            Self::Other => "other",
        }
    }
}

/// Pourquoi une requête est bloquée.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Tracker of an enabled category. Counts toward the page tally.
    Tracker(BlockCategory),
    /// `/favicon.ico` probes, which nothing displays.
    Favicon,
    /// Sub-resource whose scheme may not load inside the engine.
    Scheme,
}

impl BlockReason {
    pub fn is_tracker(self) -> bool {
        matches!(self, Self::Tracker(_))
    }
}

type CacheKey = (String, String, RequestKind);

/// Classifieur partagé par les deux backends moteur.
pub struct TrackerClassifier {
    engines: Vec<(BlockCategory, Engine)>,
    entities: EntityList,
    cache: Mutex<HashMap<CacheKey, Option<BlockCategory>>>,
}

impl TrackerClassifier {
    /// Construit les moteurs à partir des listes intégrées et des listes
    /// additionnelles trouvées dans `resources/filters/`.
    pub fn new() -> Self {
        Self::from_rules(
            BlockCategory::ALL
                .into_iter()
                .map(|category| (category, lists::category_rules(category))),
            EntityList::builtin(),
        )
    }

    /// Construit les moteurs à partir de règles ABP explicites.
    pub fn from_rules(
        rules: impl IntoIterator<Item = (BlockCategory, String)>,
        entities: EntityList,
    ) -> Self {
        let engines: Vec<_> = rules
            .into_iter()
            .map(|(category, content)| {
                let mut filter_set = FilterSet::new(false);
                filter_set.add_filter_list(&content, ParseOptions::default());
                (category, Engine::from_filter_set(filter_set, true))
            })
            .collect();
        info!(categories = engines.len(), "Classifieur de traqueurs initialisé");
        Self {
            engines,
            entities,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Décide si une requête doit être bloquée pour les catégories actives.
    ///
    /// - le document principal n'est jamais bloqué ;
    /// - les schémas non autorisés dans le moteur sont toujours bloqués ;
    /// - `/favicon.ico` est toujours bloqué ;
    /// - les ressources first-party et celles autorisées par la liste
    ///   d'entités passent ;
    /// - sinon la requête est bloquée si sa catégorie est active.
    pub fn should_block(
        &self,
        url: &str,
        page_url: &str,
        kind: RequestKind,
        enabled: CategorySet,
    ) -> Option<BlockReason> {
        if kind == RequestKind::Document {
            return None;
        }
        let scheme = urlutil::scheme_of(url);
        if !scheme.as_deref().is_some_and(urlutil::is_permitted_resource_scheme) {
            debug!(url, "Sub-resource scheme not permitted");
            return Some(BlockReason::Scheme);
        }
        let parsed = Url::parse(url).ok()?;
        if !urlutil::is_http_or_https(parsed.as_str()) {
            return None;
        }
        if parsed.path() == "/favicon.ico" {
            return Some(BlockReason::Favicon);
        }
        if enabled.is_empty() {
            return None;
        }
        let category = self.classify(url, page_url, kind)?;
        if enabled.contains(category) {
            debug!(url, page_url, category = %category, "Requête bloquée");
            Some(BlockReason::Tracker(category))
        } else {
            None
        }
    }

    /// Catégorie de traqueur d'une requête tierce, indépendamment des
    /// catégories actives. `None` pour le first-party et les entités.
    pub fn classify(&self, url: &str, page_url: &str, kind: RequestKind) -> Option<BlockCategory> {
        let key = (url.to_owned(), page_url.to_owned(), kind);
        if let Some(cached) = self.lock_cache().get(&key) {
            return *cached;
        }

        let category = self.classify_uncached(url, page_url, kind);

        let mut cache = self.lock_cache();
        if cache.len() >= CACHE_LIMIT {
            cache.clear();
        }
        cache.insert(key, category);
        category
    }

    fn classify_uncached(&self, url: &str, page_url: &str, kind: RequestKind) -> Option<BlockCategory> {
        let resource_host = urlutil::host_of(url)?;
        let page_host = urlutil::host_of(page_url);
        let source_url = if page_host.is_some() { page_url } else { "" };
        let request = Request::new(url, source_url, kind.as_str()).ok()?;
        if let Some(page_host) = page_host {
            if !request.is_third_party {
                return None;
            }
            if self.entities.is_allowed(&page_host, &resource_host) {
                return None;
            }
        }

        self.engines
            .iter()
            .find(|(_, engine)| engine.check_network_request(&request).matched)
            .map(|(category, _)| *category)
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<CacheKey, Option<BlockCategory>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TrackerClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TrackerClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerClassifier")
            .field("categories", &self.engines.len())
            .finish_non_exhaustive()
    }
}
