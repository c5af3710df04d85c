//! Classification d'URL: URL ou recherche, schémas supportés, comparaisons.
//!
//! Aucune dépendance au moteur : ce module est purement logique et sert
//! au routage des intents comme au client de navigation.

use url::Url;

/// Internal pseudo-URL of the about page.
pub const URL_ABOUT: &str = "veilbrows:about";
/// Internal pseudo-URL of the "your rights" page.
pub const URL_RIGHTS: &str = "veilbrows:rights";
/// The blank page. Always allowed through.
pub const ABOUT_BLANK: &str = "about:blank";

/// Base URL under which internal error pages are loaded. The page body is
/// appended after the comma, so the bare prefix is what renderers report
/// back as the page URL.
pub const INTERNAL_ERROR_URL: &str = "data:text/html;charset=utf-8;base64,";

/// Scheme of synthetic diagnostic error URLs (`error:<code>`).
pub const ERROR_SCHEME: &str = "error";

const INTERNAL_SCHEME: &str = "veilbrows";

/// Schemes that may load inside the engine (pages and sub-resources).
const PERMITTED_RESOURCE_SCHEMES: &[&str] = &["http", "https", "file", "data", "javascript", "about"];

/// Décide si une saisie est une URL ou une recherche.
///
/// Une URL ne contient pas d'espace et contient un point ou deux-points.
/// Volontairement simple : `localhost:8080` est une URL, `hello world` non.
pub fn is_url(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.contains(' ') {
        return false;
    }
    trimmed.contains('.') || trimmed.contains(':')
}

/// Ajoute `http://` si la saisie n'a pas de schéma.
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    match Url::parse(trimmed) {
        // `example.com:8080` parses with scheme "example.com"; a real scheme
        // never contains a dot.
        Ok(url) if !url.scheme().contains('.') => url.to_string(),
        _ => format!("http://{trimmed}"),
    }
}

/// Applique un gabarit de recherche (`%s`) aux termes saisis.
pub fn search_url(template: &str, terms: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(terms.trim().as_bytes()).collect();
    template.replace("%s", &encoded)
}

/// `true` pour les schémas de sous-ressources autorisés dans le moteur.
pub fn is_permitted_resource_scheme(scheme: &str) -> bool {
    PERMITTED_RESOURCE_SCHEMES.contains(&scheme)
}

/// `true` pour les schémas que le moteur charge lui-même (le reste part
/// vers une application externe).
pub fn is_supported_scheme(scheme: &str) -> bool {
    is_permitted_resource_scheme(scheme) || scheme == ERROR_SCHEME || scheme == INTERNAL_SCHEME
}

/// Scheme of a URL string, lower-cased, or `None` when it has none.
pub fn scheme_of(url: &str) -> Option<String> {
    let (scheme, _) = url.split_once(':')?;
    let valid = !scheme.is_empty()
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_ascii_lowercase())
}

pub fn is_http_or_https(url: &str) -> bool {
    url.starts_with("http:") || url.starts_with("https:")
}

/// Error pages loaded as inline data carry this prefix.
pub fn is_internal_error_url(url: &str) -> bool {
    url.starts_with(INTERNAL_ERROR_URL)
}

/// Internal pages rendered from bundled templates.
pub fn is_localized_content(url: &str) -> bool {
    url == URL_ABOUT || url == URL_RIGHTS
}

/// Compare deux URL en ignorant la casse et un éventuel `/` final.
pub fn urls_match_except_for_trailing_slash(a: &str, b: &str) -> bool {
    let (longer, shorter) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    match longer.len() - shorter.len() {
        0 => longer.eq_ignore_ascii_case(shorter),
        1 => {
            longer.ends_with('/')
                && longer
                    .get(..shorter.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(shorter))
        }
        _ => false,
    }
}

/// Hôte d'une URL, sans `www.`, en minuscules.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_owned).unwrap_or(host))
}
