//! # VeilBrows: couche session et abstraction moteur
//!
//! Cœur d'un navigateur privacy-first : sessions éphémères, routage des
//! intents de lancement, contrat uniforme au-dessus de deux backends de
//! rendu interchangeables, protection contre le pistage par catégories et
//! pages d'erreur à taxonomie fermée.
//!
//! ## Architecture des modules
//!
//! - [`session`] : [`session::Session`] et [`session::SessionManager`], le
//!   registre des sessions ouvertes et le routage des intents (vue, onglet
//!   personnalisé, partage).
//!
//! - [`engine`] : contrat [`engine::EngineView`] + [`engine::EngineCallback`],
//!   machine à états de chargement, et les deux backends :
//!   interception synchrone ([`engine::system`]) ou drapeaux déclaratifs
//!   ([`engine::standalone`]).
//!
//! - [`tracking`] : catégories de traqueurs, classification via le crate
//!   `adblock` (Brave), compteur par page.
//!
//! - [`error_page`] : codes natifs → taxonomie fermée → page HTML.
//!
//! - [`config`], [`preferences`] : configuration TOML et préférences
//!   modifiables à chaud.
//!
//! - [`resources`] : gabarits embarqués (pages internes, page d'erreur) et
//!   listes de filtres additionnelles sur disque.

pub mod config;
pub mod engine;
pub mod error;
pub mod error_page;
pub mod observable;
pub mod preferences;
pub mod resources;
pub mod session;
pub mod tracking;
pub mod urlutil;
