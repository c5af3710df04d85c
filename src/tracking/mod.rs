//! Protection contre le pistage: catégories, configuration, classification.
//!
//! Une requête tierce est classée dans au plus une [`BlockCategory`] par le
//! [`classifier::TrackerClassifier`] ; elle n'est bloquée que si cette
//! catégorie fait partie du [`CategorySet`] actif. Les deux backends moteur
//! partagent ce même classifieur, ce qui garantit des décisions identiques
//! pour une même configuration.

pub mod classifier;
pub mod counter;
pub mod lists;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

pub use classifier::{BlockReason, RequestKind, TrackerClassifier};
pub use counter::TrackerCounter;

/// Catégorie de traqueur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCategory {
    Ad,
    Analytics,
    Social,
    /// Other content trackers (embedded players, fonts, widgets).
    Content,
}

impl BlockCategory {
    pub const ALL: [BlockCategory; 4] = [Self::Ad, Self::Analytics, Self::Social, Self::Content];

    const fn bit(self) -> u8 {
        match self {
            Self::Ad => 1 << 0,
            Self::Analytics => 1 << 1,
            Self::Social => 1 << 2,
            Self::Content => 1 << 3,
        }
    }

    /// Nom utilisé pour les listes additionnelles (`resources/filters/<name>.txt`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Ad => "ads",
            Self::Analytics => "analytics",
            Self::Social => "social",
            Self::Content => "content",
        }
    }
}

impl fmt::Display for BlockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ensemble de catégories activées, sous forme de masque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CategorySet(u8);

impl CategorySet {
    pub const NONE: CategorySet = CategorySet(0);

    pub fn all() -> Self {
        BlockCategory::ALL.into_iter().collect()
    }

    pub fn from_flags(ads: bool, analytics: bool, social: bool, content: bool) -> Self {
        let mut set = Self::NONE;
        set.set(BlockCategory::Ad, ads);
        set.set(BlockCategory::Analytics, analytics);
        set.set(BlockCategory::Social, social);
        set.set(BlockCategory::Content, content);
        set
    }

    pub fn contains(self, category: BlockCategory) -> bool {
        self.0 & category.bit() != 0
    }

    pub fn set(&mut self, category: BlockCategory, enabled: bool) {
        if enabled {
            self.0 |= category.bit();
        } else {
            self.0 &= !category.bit();
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::all().0)
    }

    pub fn iter(self) -> impl Iterator<Item = BlockCategory> {
        BlockCategory::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<BlockCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = BlockCategory>>(iter: I) -> Self {
        let mut set = Self::NONE;
        for category in iter {
            set.set(category, true);
        }
        set
    }
}

/// Configuration partagée entre le magasin de préférences et les moteurs.
///
/// Lue à la construction d'un backend puis à chaque changement ; la
/// `revision` permet aux backends déclaratifs de détecter qu'ils doivent
/// repousser leurs drapeaux au moteur.
#[derive(Debug)]
pub struct TrackingSettings {
    categories: AtomicU8,
    block_images: AtomicBool,
    revision: AtomicU64,
}

impl TrackingSettings {
    pub fn new(categories: CategorySet, block_images: bool) -> Self {
        Self {
            categories: AtomicU8::new(categories.bits()),
            block_images: AtomicBool::new(block_images),
            revision: AtomicU64::new(0),
        }
    }

    pub fn categories(&self) -> CategorySet {
        CategorySet::from_bits(self.categories.load(Ordering::Acquire))
    }

    pub fn set_category(&self, category: BlockCategory, enabled: bool) {
        let update = |bits: u8| {
            let mut set = CategorySet::from_bits(bits);
            set.set(category, enabled);
            Some(set.bits())
        };
        // The closure never returns None, so this cannot fail.
        let _ = self
            .categories
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, update);
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    pub fn block_images(&self) -> bool {
        self.block_images.load(Ordering::Acquire)
    }

    pub fn set_block_images(&self, block: bool) {
        self.block_images.store(block, Ordering::Release);
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

impl Default for TrackingSettings {
    fn default() -> Self {
        let privacy = crate::config::PrivacyConfig::default();
        Self::new(privacy.categories(), privacy.block_images)
    }
}
