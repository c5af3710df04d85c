//! Listes de traqueurs intégrées et liste d'entités.
//!
//! Chaque catégorie a une liste de domaines convertie en règles Adblock Plus
//! (`||domaine^`). Des listes ABP additionnelles peuvent être déposées dans
//! `resources/filters/<catégorie>.txt` ; elles sont ajoutées à la catégorie
//! correspondante au démarrage.

use std::fs;

use tracing::{info, warn};

use super::BlockCategory;
use crate::resources;

const AD_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "adnxs.com",
    "adsrvr.org",
    "criteo.com",
    "taboola.com",
    "outbrain.com",
    "moatads.com",
    "pubmatic.com",
    "rubiconproject.com",
    "openx.net",
];

const ANALYTICS_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "scorecardresearch.com",
    "hotjar.com",
    "mixpanel.com",
    "segment.io",
    "quantserve.com",
    "chartbeat.com",
    "newrelic.com",
    "trackersimulator.org",
];

const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.net",
    "connect.facebook.net",
    "platform.twitter.com",
    "syndication.twitter.com",
    "platform.linkedin.com",
    "addthis.com",
    "sharethis.com",
    "disqus.com",
];

const CONTENT_DOMAINS: &[&str] = &[
    "youtube-nocookie.com",
    "vimeocdn.com",
    "brightcove.net",
    "jwpcdn.com",
    "fonts.googleapis.com",
    "typekit.net",
];

/// Entity allow-list: a site may load resources from domains owned by the
/// same organisation. Properties match by domain suffix, and a more
/// specific property adds to (never replaces) the allowances of its parent.
const ENTITIES: &[(&str, &[&str])] = &[
    ("facebook.com", &["facebook.net", "fbcdn.net"]),
    ("instagram.com", &["facebook.net", "fbcdn.net", "cdninstagram.com"]),
    ("twitter.com", &["twimg.com", "platform.twitter.com", "syndication.twitter.com"]),
    ("linkedin.com", &["licdn.com", "platform.linkedin.com"]),
    ("youtube.com", &["youtube-nocookie.com", "ytimg.com", "googlevideo.com"]),
    ("vimeo.com", &["vimeocdn.com"]),
];

/// Domaines intégrés d'une catégorie.
pub fn builtin_domains(category: BlockCategory) -> &'static [&'static str] {
    match category {
        BlockCategory::Ad => AD_DOMAINS,
        BlockCategory::Analytics => ANALYTICS_DOMAINS,
        BlockCategory::Social => SOCIAL_DOMAINS,
        BlockCategory::Content => CONTENT_DOMAINS,
    }
}

/// Convertit une liste de domaines en règles ABP bloquant le domaine et ses
/// sous-domaines.
pub fn domain_rules<'a>(domains: impl IntoIterator<Item = &'a str>) -> String {
    domains
        .into_iter()
        .map(|domain| format!("||{domain}^\n"))
        .collect()
}

/// Liste complète d'une catégorie : règles intégrées puis liste additionnelle
/// éventuelle.
pub fn category_rules(category: BlockCategory) -> String {
    let mut rules = domain_rules(builtin_domains(category).iter().copied());
    if let Some(extra) = load_extra_list(category) {
        rules.push_str(&extra);
    }
    rules
}

/// Charge `resources/filters/<catégorie>.txt` s'il existe.
fn load_extra_list(category: BlockCategory) -> Option<String> {
    let path = resources::filters_dir()?.join(format!("{}.txt", category.name()));
    if !path.is_file() {
        return None;
    }
    match fs::read_to_string(&path) {
        Ok(content) => {
            info!(
                category = %category,
                path = %path.display(),
                lines = content.lines().count(),
                "Liste de filtres additionnelle chargée"
            );
            // Ensure the built-in rules and the extra list stay on separate lines.
            Some(format!("\n{content}\n"))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Impossible de lire la liste de filtres");
            None
        }
    }
}

/// Liste d'entités : quelles ressources tierces une propriété peut charger.
#[derive(Debug, Clone, Default)]
pub struct EntityList {
    entries: Vec<(String, Vec<String>)>,
}

impl EntityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Liste intégrée.
    pub fn builtin() -> Self {
        let mut list = Self::new();
        for (property, resources) in ENTITIES {
            list.allow(property, resources.iter().copied());
        }
        list
    }

    /// Autorise `property` (et ses sous-domaines) à charger `resources`.
    pub fn allow<'a>(&mut self, property: &str, resources: impl IntoIterator<Item = &'a str>) {
        self.entries.push((
            property.to_ascii_lowercase(),
            resources.into_iter().map(str::to_ascii_lowercase).collect(),
        ));
    }

    /// `true` si la page `page_host` peut charger depuis `resource_host`.
    pub fn is_allowed(&self, page_host: &str, resource_host: &str) -> bool {
        let page_host = page_host.to_ascii_lowercase();
        let resource_host = resource_host.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|(property, _)| matches_domain(&page_host, property))
            .flat_map(|(_, resources)| resources.iter())
            .any(|resource| matches_domain(&resource_host, resource))
    }
}

/// `host` est `domain` ou l'un de ses sous-domaines.
fn matches_domain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
