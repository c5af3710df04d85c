//! Intents de lancement entrants (vue, onglet personnalisé, partage).

use std::collections::BTreeMap;

use super::{CustomTabActionButton, CustomTabConfig, CustomTabMenuItem};

/// Marks a view intent as a custom tab launch.
pub const EXTRA_CUSTOM_TAB_SESSION: &str = "custom_tab.session";
pub const EXTRA_TOOLBAR_COLOR: &str = "custom_tab.toolbar_color";
pub const EXTRA_SHARE_MENU_ITEM: &str = "custom_tab.share_menu_item";
pub const EXTRA_CLOSE_BUTTON_ICON: &str = "custom_tab.close_button_icon";
pub const EXTRA_DISABLE_URL_BAR_HIDING: &str = "custom_tab.disable_url_bar_hiding";
pub const EXTRA_MENU_ITEMS: &str = "custom_tab.menu_items";
pub const EXTRA_ACTION_BUTTON: &str = "custom_tab.action_button";
/// Marks a view intent fired by a home-screen shortcut.
pub const EXTRA_HOME_SCREEN: &str = "add_to_homescreen";
pub const EXTRA_BLOCKING_ENABLED: &str = "blocking_enabled";

/// Keys inside menu item and action button bundles.
pub const KEY_NAME: &str = "name";
pub const KEY_DESCRIPTION: &str = "description";
pub const KEY_TARGET: &str = "target";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentAction {
    View,
    Send,
    Other(String),
}

/// Valeur d'un extra d'intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extra {
    Bool(bool),
    Int(i64),
    Text(String),
    Bundle(BTreeMap<String, Extra>),
    List(Vec<BTreeMap<String, Extra>>),
}

/// Intent de lancement tel que reçu de l'environnement hôte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchIntent {
    pub action: IntentAction,
    /// Target URL of a view intent.
    pub data: Option<String>,
    /// Plain text of a share intent.
    pub text: Option<String>,
    /// Relaunched from the recent-apps history.
    pub from_history: bool,
    pub extras: BTreeMap<String, Extra>,
}

impl LaunchIntent {
    pub fn new(action: IntentAction) -> Self {
        Self {
            action,
            data: None,
            text: None,
            from_history: false,
            extras: BTreeMap::new(),
        }
    }

    pub fn view(url: impl Into<String>) -> Self {
        Self {
            data: Some(url.into()),
            ..Self::new(IntentAction::View)
        }
    }

    /// Intent de vue marqué comme onglet personnalisé.
    pub fn custom_tab(url: impl Into<String>) -> Self {
        Self::view(url).with_extra(EXTRA_CUSTOM_TAB_SESSION, Extra::Bool(true))
    }

    pub fn share(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(IntentAction::Send)
        }
    }

    pub fn with_extra(mut self, key: &str, value: Extra) -> Self {
        self.extras.insert(key.to_owned(), value);
        self
    }

    pub fn launched_from_history(mut self) -> Self {
        self.from_history = true;
        self
    }

    pub fn bool_extra(&self, key: &str) -> Option<bool> {
        match self.extras.get(key)? {
            Extra::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_custom_tab(&self) -> bool {
        self.extras.contains_key(EXTRA_CUSTOM_TAB_SESSION)
    }

    pub fn is_home_screen_launch(&self) -> bool {
        self.bool_extra(EXTRA_HOME_SCREEN).unwrap_or(false)
    }

    /// Extracts the custom tab styling. Malformed extras are skipped.
    pub fn custom_tab_config(&self) -> CustomTabConfig {
        let toolbar_color = match self.extras.get(EXTRA_TOOLBAR_COLOR) {
            Some(Extra::Int(color)) => u32::try_from(*color & 0xFFFF_FFFF).ok(),
            _ => None,
        };

        let menu_items = match self.extras.get(EXTRA_MENU_ITEMS) {
            Some(Extra::List(items)) => items
                .iter()
                .filter_map(|item| {
                    Some(CustomTabMenuItem {
                        name: text_of(item, KEY_NAME)?,
                        target: text_of(item, KEY_TARGET)?,
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        let action_button = match self.extras.get(EXTRA_ACTION_BUTTON) {
            Some(Extra::Bundle(bundle)) => text_of(bundle, KEY_TARGET).map(|target| CustomTabActionButton {
                description: text_of(bundle, KEY_DESCRIPTION).unwrap_or_default(),
                target,
            }),
            _ => None,
        };

        CustomTabConfig {
            toolbar_color,
            show_share_menu_item: self.bool_extra(EXTRA_SHARE_MENU_ITEM).unwrap_or(false),
            has_close_button_icon: self.extras.contains_key(EXTRA_CLOSE_BUTTON_ICON),
            disable_url_bar_hiding: self.bool_extra(EXTRA_DISABLE_URL_BAR_HIDING).unwrap_or(false),
            menu_items,
            action_button,
        }
    }
}

fn text_of(bundle: &BTreeMap<String, Extra>, key: &str) -> Option<String> {
    match bundle.get(key)? {
        Extra::Text(text) => Some(text.clone()),
        _ => None,
    }
}
