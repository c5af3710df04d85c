//! Point d'entrée de VeilBrows (mode sans interface).
//!
//! Usage :
//!   veilbrows route view|custom-tab|share <arg>
//!   veilbrows classify <url> [--page <url>]
//!   veilbrows error-page <code> [url]
//!   veilbrows about
//!
//! Exemples :
//!   cargo run -- route share "open source software"
//!   cargo run -- classify https://trackersimulator.org/x.js --page https://example.com
//!   cargo run -- error-page -2 https://down.example

use std::env;
use std::error::Error;

use veilbrows::config::Config;
use veilbrows::error_page::{self, ErrorType};
use veilbrows::resources;
use veilbrows::session::{LaunchIntent, SessionManager};
use veilbrows::tracking::{BlockReason, RequestKind, TrackerClassifier};

const USAGE: &str = "usage: veilbrows route view|custom-tab|share <arg>\n       \
                     veilbrows classify <url> [--page <url>]\n       \
                     veilbrows error-page <code> [url]\n       \
                     veilbrows about";

fn main() -> Result<(), Box<dyn Error>> {
    // ── 1. Logging / Tracing ───────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // ── 2. Configuration ───────────────────────────────────────────────
    let config = Config::load();

    // ── 3. Commande ────────────────────────────────────────────────────
    let args: Vec<String> = env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["route", kind, arg] => route(&config, kind, arg),
        ["classify", url] => classify(&config, url, ""),
        ["classify", url, "--page", page] => classify(&config, url, page),
        ["error-page", code] => render_error_page(code, None),
        ["error-page", code, url] => render_error_page(code, Some(*url)),
        ["about"] => {
            println!("{}", resources::load_about(&config.general));
            Ok(())
        }
        _ => Err(USAGE.into()),
    }
}

fn route(config: &Config, kind: &str, arg: &str) -> Result<(), Box<dyn Error>> {
    let manager = SessionManager::new(config.search.clone());
    let session = match kind {
        "view" => manager.handle_intent(&LaunchIntent::view(arg), None)?,
        "custom-tab" => manager.handle_intent(&LaunchIntent::custom_tab(arg), None)?,
        "share" => manager.handle_new_intent(&LaunchIntent::share(arg))?,
        _ => return Err(USAGE.into()),
    };
    println!("uuid:      {}", session.uuid());
    println!("source:    {:?}", session.source());
    println!("url:       {}", session.url().get());
    println!("search:    {}", session.search_terms().unwrap_or("-"));
    println!("blocking:  {}", session.is_blocking_enabled());
    println!("sessions:  {}", manager.number_of_sessions());
    Ok(())
}

fn classify(config: &Config, url: &str, page_url: &str) -> Result<(), Box<dyn Error>> {
    let classifier = TrackerClassifier::new();
    let verdict = classifier.should_block(url, page_url, RequestKind::Script, config.privacy.categories());
    match verdict {
        Some(BlockReason::Tracker(category)) => println!("blocked ({category})"),
        Some(BlockReason::Favicon) => println!("blocked (favicon)"),
        Some(BlockReason::Scheme) => println!("blocked (scheme)"),
        None => match classifier.classify(url, page_url, RequestKind::Script) {
            Some(category) => println!("allowed ({category} blocking disabled)"),
            None => println!("allowed"),
        },
    }
    Ok(())
}

fn render_error_page(code: &str, url: Option<&str>) -> Result<(), Box<dyn Error>> {
    let code: i32 = code.parse().map_err(|e| format!("invalid error code `{code}`: {e}"))?;
    let error = ErrorType::for_system_code(code);
    let default_url = format!("error:{code}");
    println!("{}", error_page::render(error, url.unwrap_or(&default_url)));
    Ok(())
}
