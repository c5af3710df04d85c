//! Pages d'erreur: taxonomie fermée des échecs de navigation.
//!
//! Every engine failure code, from either backend, lands in exactly one
//! [`ErrorType`]. Codes outside the table become [`ErrorType::Unknown`]; raw
//! platform codes never reach the page.

use std::fmt;

use crate::resources::{self, ERROR_CSS, ERROR_TEMPLATE};
use crate::urlutil;

/// Error codes reported by the system renderer.
pub mod system_codes {
    pub const UNKNOWN: i32 = -1;
    pub const HOST_LOOKUP: i32 = -2;
    pub const CONNECT: i32 = -6;
    pub const IO: i32 = -7;
    pub const TIMEOUT: i32 = -8;
    pub const REDIRECT_LOOP: i32 = -9;
    pub const UNSUPPORTED_SCHEME: i32 = -10;
    pub const FAILED_SSL_HANDSHAKE: i32 = -11;
    pub const BAD_URL: i32 = -12;
    pub const TOO_MANY_REQUESTS: i32 = -15;
}

/// Error codes reported by the standalone renderer (category in the low
/// nibble, detail in the high nibble).
pub mod standalone_codes {
    pub const UNKNOWN: u32 = 0x11;
    pub const SECURITY_SSL: u32 = 0x22;
    pub const NET_INTERRUPT: u32 = 0x23;
    pub const UNKNOWN_HOST: u32 = 0x25;
    pub const SECURITY_BAD_CERT: u32 = 0x32;
    pub const NET_TIMEOUT: u32 = 0x33;
    pub const MALFORMED_URI: u32 = 0x35;
    pub const CONNECTION_REFUSED: u32 = 0x43;
    pub const CONTENT_CRASHED: u32 = 0x44;
    pub const UNKNOWN_PROTOCOL: u32 = 0x45;
    pub const PROXY_CONNECTION_REFUSED: u32 = 0x46;
    pub const UNKNOWN_PROXY_HOST: u32 = 0x56;
    pub const REDIRECT_LOOP: u32 = 0x63;
    pub const OFFLINE: u32 = 0x73;
}

/// Catégorie d'erreur présentée à l'utilisateur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Unknown,
    HostLookup,
    ConnectionRefused,
    Timeout,
    RedirectLoop,
    UnsupportedScheme,
    TlsHandshake,
    MalformedUrl,
    TooManyRequests,
}

impl ErrorType {
    pub const ALL: [ErrorType; 9] = [
        Self::Unknown,
        Self::HostLookup,
        Self::ConnectionRefused,
        Self::Timeout,
        Self::RedirectLoop,
        Self::UnsupportedScheme,
        Self::TlsHandshake,
        Self::MalformedUrl,
        Self::TooManyRequests,
    ];

    /// Exact lookup of a system renderer code; `None` outside the table.
    pub fn from_system_code(code: i32) -> Option<Self> {
        use system_codes::*;
        Some(match code {
            UNKNOWN | IO => Self::Unknown,
            HOST_LOOKUP => Self::HostLookup,
            CONNECT => Self::ConnectionRefused,
            TIMEOUT => Self::Timeout,
            REDIRECT_LOOP => Self::RedirectLoop,
            UNSUPPORTED_SCHEME => Self::UnsupportedScheme,
            FAILED_SSL_HANDSHAKE => Self::TlsHandshake,
            BAD_URL => Self::MalformedUrl,
            TOO_MANY_REQUESTS => Self::TooManyRequests,
            _ => return None,
        })
    }

    /// System renderer code, unknown codes folded into `Unknown`.
    pub fn for_system_code(code: i32) -> Self {
        Self::from_system_code(code).unwrap_or(Self::Unknown)
    }

    /// Standalone renderer code, unknown codes folded into `Unknown`.
    pub fn for_standalone_code(code: u32) -> Self {
        use standalone_codes::*;
        match code {
            UNKNOWN_HOST | UNKNOWN_PROXY_HOST => Self::HostLookup,
            CONNECTION_REFUSED | PROXY_CONNECTION_REFUSED => Self::ConnectionRefused,
            NET_TIMEOUT => Self::Timeout,
            REDIRECT_LOOP => Self::RedirectLoop,
            UNKNOWN_PROTOCOL => Self::UnsupportedScheme,
            SECURITY_SSL | SECURITY_BAD_CERT => Self::TlsHandshake,
            MALFORMED_URI => Self::MalformedUrl,
            _ => Self::Unknown,
        }
    }

    /// Code used in `error:<code>` diagnostic URLs.
    pub fn system_code(self) -> i32 {
        use system_codes::*;
        match self {
            Self::Unknown => UNKNOWN,
            Self::HostLookup => HOST_LOOKUP,
            Self::ConnectionRefused => CONNECT,
            Self::Timeout => TIMEOUT,
            Self::RedirectLoop => REDIRECT_LOOP,
            Self::UnsupportedScheme => UNSUPPORTED_SCHEME,
            Self::TlsHandshake => FAILED_SSL_HANDSHAKE,
            Self::MalformedUrl => BAD_URL,
            Self::TooManyRequests => TOO_MANY_REQUESTS,
        }
    }

    /// Interprète une URL de diagnostic `error:<code>`.
    ///
    /// Un code numérique connu donne sa page, un code numérique inconnu la
    /// page générique, un code non numérique la page « URL invalide ».
    /// Renvoie `None` si l'URL n'a pas le schéma `error:`.
    pub fn from_diagnostic_url(url: &str) -> Option<Self> {
        let (scheme, code) = url.split_once(':')?;
        if !scheme.eq_ignore_ascii_case(urlutil::ERROR_SCHEME) {
            return None;
        }
        Some(match code.trim().parse::<i32>() {
            Ok(code) => Self::for_system_code(code),
            Err(_) => Self::MalformedUrl,
        })
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Unknown => "The connection was interrupted",
            Self::HostLookup => "Server not found",
            Self::ConnectionRefused => "Unable to connect",
            Self::Timeout => "The connection has timed out",
            Self::RedirectLoop => "The page isn’t redirecting properly",
            Self::UnsupportedScheme => "The address wasn’t understood",
            Self::TlsHandshake => "Secure connection failed",
            Self::MalformedUrl => "The address isn’t valid",
            Self::TooManyRequests => "Something went wrong",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Unknown => {
                "<p>The connection to %url% was interrupted while the page was loading.</p>\
                 <ul><li>The site could be temporarily unavailable or too busy. Try again in a few moments.</li>\
                 <li>Check your network connection.</li></ul>"
            }
            Self::HostLookup => {
                "<p>The browser can’t find the server at %url%.</p>\
                 <ul><li>Check the address for typing errors such as <strong>ww</strong>.example.com \
                 instead of <strong>www</strong>.example.com.</li>\
                 <li>Check your network connection.</li></ul>"
            }
            Self::ConnectionRefused => {
                "<p>The server at %url% refused the connection.</p>\
                 <ul><li>The site could be temporarily unavailable or too busy. Try again in a few moments.</li>\
                 <li>Check your network connection.</li></ul>"
            }
            Self::Timeout => {
                "<p>The server at %url% is taking too long to respond.</p>\
                 <ul><li>The site could be temporarily unavailable or too busy. Try again in a few moments.</li></ul>"
            }
            Self::RedirectLoop => {
                "<p>The server is redirecting the request for %url% in a way that will never complete.</p>\
                 <ul><li>This problem can sometimes be caused by disabling or refusing to accept cookies.</li></ul>"
            }
            Self::UnsupportedScheme => {
                "<p>The address %url% specifies a protocol that isn’t associated with any program \
                 and can’t be opened in the browser.</p>"
            }
            Self::TlsHandshake => {
                "<p>An error occurred during a connection to %url%.</p>\
                 <ul><li>The page you are trying to view cannot be shown because the authenticity \
                 of the received data could not be verified.</li></ul>"
            }
            Self::MalformedUrl => {
                "<p>The provided address %url% is not in a recognized format.</p>\
                 <ul><li>Check the address bar for mistakes and try again.</li></ul>"
            }
            Self::TooManyRequests => {
                "<p>The browser couldn’t load %url%. Too many requests are pending.</p>\
                 <ul><li>Try again in a few moments.</li></ul>"
            }
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::HostLookup => "host-lookup",
            Self::ConnectionRefused => "connection-refused",
            Self::Timeout => "timeout",
            Self::RedirectLoop => "redirect-loop",
            Self::UnsupportedScheme => "unsupported-scheme",
            Self::TlsHandshake => "tls-handshake",
            Self::MalformedUrl => "malformed-url",
            Self::TooManyRequests => "too-many-requests",
        };
        f.write_str(name)
    }
}

/// Rend la page d'erreur HTML pour `failing_url`.
pub fn render(error: ErrorType, failing_url: &str) -> String {
    let url = format!("<strong>{}</strong>", escape_html(failing_url));
    ERROR_TEMPLATE
        .replace("%page-title%", "Problem loading page")
        .replace("%button%", "Try Again")
        .replace("%messageShort%", error.title())
        .replace("%messageLong%", &error.message().replace("%url%", &url))
        .replace("%css%", ERROR_CSS)
}

/// Page d'erreur encodée en URL `data:` prête à charger.
pub fn data_url(error: ErrorType, failing_url: &str) -> String {
    resources::html_data_url(&render(error, failing_url))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
