//! Ressources embarquées et dossier `resources/`.
//!
//! Les gabarits des pages internes (à propos, droits, page d'erreur) sont
//! compilés dans le binaire. Le dossier `resources/` n'est consulté que pour
//! les listes de filtres additionnelles, cherché dans cet ordre :
//! 1. Variable d'environnement `VEILBROWS_RESOURCES_PATH`
//! 2. À côté de l'exécutable (`<exe_dir>/resources/`)
//! 3. Au projet root si l'exécutable est dans `target/{debug,release}/`
//! 4. Dans le répertoire courant (`./resources/`)

use std::env;
use std::path::PathBuf;
use std::sync::Mutex;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::config::GeneralConfig;
use crate::urlutil;

const ABOUT_TEMPLATE: &str = include_str!("../resources/about.html");
const RIGHTS_TEMPLATE: &str = include_str!("../resources/rights.html");
pub(crate) const ERROR_TEMPLATE: &str = include_str!("../resources/errorpage.html");
pub(crate) const ERROR_CSS: &str = include_str!("../resources/errorpage.css");
const WORDMARK_SVG: &str = include_str!("../resources/wordmark.svg");

/// Chemin vers le dossier resources/, mis en cache après la première résolution.
static RESOURCES_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Résout et met en cache le chemin du dossier `resources/`.
///
/// Renvoie `None` si aucun dossier n'est trouvé ; le navigateur fonctionne
/// alors avec les seules listes intégrées.
pub fn resources_dir() -> Option<PathBuf> {
    let mut dir = RESOURCES_DIR.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(ref path) = *dir {
        return Some(path.clone());
    }
    let found = find_resources_dir()?;
    debug!(path = %found.display(), "Dossier resources/ trouvé");
    *dir = Some(found.clone());
    Some(found)
}

/// `resources/filters/`, s'il existe.
pub fn filters_dir() -> Option<PathBuf> {
    let path = resources_dir()?.join("filters");
    path.is_dir().then_some(path)
}

fn find_resources_dir() -> Option<PathBuf> {
    // 1. Variable d'environnement
    if let Ok(path) = env::var("VEILBROWS_RESOURCES_PATH") {
        let path = PathBuf::from(path);
        if path.is_dir() {
            return Some(path);
        }
    }

    // 2. À côté de l'exécutable
    if let Ok(exe_path) = env::current_exe()
        && let Ok(canonical) = exe_path.canonicalize()
    {
        let mut path = canonical.clone();
        path.pop(); // Enlève le nom de l'exécutable
        path.push("resources");
        if path.is_dir() {
            return Some(path);
        }

        // 2b. Si l'exécutable est dans target/{debug,release}/, remonter
        //     au projet root (typique pendant le développement avec cargo).
        let exe_dir = canonical.parent().unwrap_or(&canonical);
        if let Some(target_dir) = exe_dir.parent()
            && target_dir.file_name().is_some_and(|n| n == "target")
            && let Some(project_root) = target_dir.parent()
        {
            let path = project_root.join("resources");
            if path.is_dir() {
                return Some(path);
            }
        }
    }

    // 3. Répertoire courant
    if let Ok(cwd) = env::current_dir() {
        let path = cwd.join("resources");
        if path.is_dir() {
            return Some(path);
        }
    }

    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Pages internes
// ─────────────────────────────────────────────────────────────────────────────

struct LocalizedStrings {
    about_title: &'static str,
    about_content: &'static str,
    rights_title: &'static str,
    rights_content: &'static str,
}

const EN: LocalizedStrings = LocalizedStrings {
    about_title: "About %app%",
    about_content: "<p>%app% puts you in control.</p>\
        <p>Use it as a private browser: search and browse right in the app. \
        It blocks trackers (or update settings to allow trackers) and erases \
        your cookies as well as your browsing history with one tap.</p>",
    rights_title: "Your rights",
    rights_content: "<p>%app% is free and open source software.</p>\
        <p>You are not granted any trademark rights or licenses to the \
        trademarks of the %app% project.</p>\
        <p>Tracker lists are provided under their own licenses.</p>",
};

const FR: LocalizedStrings = LocalizedStrings {
    about_title: "À propos de %app%",
    about_content: "<p>%app% vous laisse le contrôle.</p>\
        <p>Utilisez-le comme navigateur privé : recherchez et naviguez \
        directement dans l'application. Il bloque les traqueurs et efface vos \
        cookies ainsi que votre historique en un geste.</p>",
    rights_title: "Vos droits",
    rights_content: "<p>%app% est un logiciel libre et open source.</p>\
        <p>Aucun droit sur les marques du projet %app% ne vous est concédé.</p>\
        <p>Les listes de traqueurs sont distribuées sous leurs propres licences.</p>",
};

const AR: LocalizedStrings = LocalizedStrings {
    about_title: "عن %app%",
    about_content: "<p>%app% يضعك في موضع التحكم.</p>\
        <p>استخدمه كمتصفح خاص: ابحث وتصفح داخل التطبيق مباشرة. \
        يحجب المتتبعات ويمسح الكعكات وتاريخ التصفح بلمسة واحدة.</p>",
    rights_title: "حقوقك",
    rights_content: "<p>%app% برمجية حرة ومفتوحة المصدر.</p>",
};

fn strings_for(locale: &str) -> &'static LocalizedStrings {
    match language_of(locale) {
        "fr" => &FR,
        "ar" => &AR,
        _ => &EN,
    }
}

fn language_of(locale: &str) -> &str {
    locale.split(['-', '_']).next().unwrap_or(locale)
}

/// Sens d'écriture (`rtl` / `ltr`) déduit de la locale active.
pub fn text_direction(locale: &str) -> &'static str {
    const RTL: &[&str] = &["ar", "dv", "fa", "he", "iw", "ks", "ps", "sd", "ug", "ur", "yi"];
    let language = language_of(locale).to_ascii_lowercase();
    if RTL.contains(&language.as_str()) { "rtl" } else { "ltr" }
}

/// `"<version> (Build #<n>)"`.
pub fn version_string(general: &GeneralConfig) -> String {
    format!("{} (Build #{})", general.version, general.build_number)
}

/// Logo embarqué en URI `data:`.
pub fn wordmark_data_uri() -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(WORDMARK_SVG))
}

/// Page « à propos » rendue pour la configuration courante.
pub fn load_about(general: &GeneralConfig) -> String {
    let strings = strings_for(&general.locale);
    ABOUT_TEMPLATE
        .replace("%about-title%", &strings.about_title.replace("%app%", &general.app_name))
        .replace("%about-content%", &strings.about_content.replace("%app%", &general.app_name))
        .replace("%about-version%", &version_string(general))
        .replace("%wordmark%", &wordmark_data_uri())
        .replace("%dir%", text_direction(&general.locale))
}

/// Page « vos droits ».
pub fn load_rights(general: &GeneralConfig) -> String {
    let strings = strings_for(&general.locale);
    RIGHTS_TEMPLATE
        .replace("%rights-title%", strings.rights_title)
        .replace("%rights-content%", &strings.rights_content.replace("%app%", &general.app_name))
        .replace("%dir%", text_direction(&general.locale))
}

/// Rend la page interne correspondant à une pseudo-URL.
pub fn load_localized(url: &str, general: &GeneralConfig) -> Option<String> {
    match url {
        urlutil::URL_ABOUT => Some(load_about(general)),
        urlutil::URL_RIGHTS => Some(load_rights(general)),
        _ => None,
    }
}

/// Encode une page HTML en URL `data:` chargeable par le moteur.
pub fn html_data_url(html: &str) -> String {
    format!("{}{}", urlutil::INTERNAL_ERROR_URL, STANDARD.encode(html))
}
