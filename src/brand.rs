use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::models::CampaignBrief;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandPalette {
    pub primary: [u8; 3],
    pub secondary: [u8; 3],
    pub accent: [u8; 3],
}

impl Default for BrandPalette {
    fn default() -> Self {
        Self {
            primary: [70, 130, 180],
            secondary: [255, 255, 255],
            accent: [255, 215, 0],
        }
    }
}

impl BrandPalette {
    pub fn colors(&self) -> [[u8; 3]; 3] {
        [self.primary, self.secondary, self.accent]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBrand {
    Nike,
    Adidas,
    CocaCola,
    Apple,
    Samsung,
}

impl KnownBrand {
    pub const ALL: [KnownBrand; 5] = [
        KnownBrand::Nike,
        KnownBrand::Adidas,
        KnownBrand::CocaCola,
        KnownBrand::Apple,
        KnownBrand::Samsung,
    ];

    pub fn from_name(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "nike" => Some(KnownBrand::Nike),
            "adidas" => Some(KnownBrand::Adidas),
            "cocacola" => Some(KnownBrand::CocaCola),
            "apple" => Some(KnownBrand::Apple),
            "samsung" => Some(KnownBrand::Samsung),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            KnownBrand::Nike => "Nike",
            KnownBrand::Adidas => "Adidas",
            KnownBrand::CocaCola => "Coca-Cola",
            KnownBrand::Apple => "Apple",
            KnownBrand::Samsung => "Samsung",
        }
    }
}

impl fmt::Display for KnownBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrandTemplate {
    pub palette: BrandPalette,
    pub guidelines: String,
}

impl BrandTemplate {
    fn new(primary: [u8; 3], secondary: [u8; 3], accent: [u8; 3], guidelines: &str) -> Self {
        Self {
            palette: BrandPalette {
                primary,
                secondary,
                accent,
            },
            guidelines: guidelines.to_string(),
        }
    }
}

/// Immutable brand lookup handed to the compositor and prompt builder at construction.
#[derive(Debug, Clone)]
pub struct BrandRegistry {
    templates: HashMap<KnownBrand, BrandTemplate>,
}

impl Default for BrandRegistry {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            KnownBrand::Nike,
            BrandTemplate::new(
                [0, 0, 0],
                [255, 255, 255],
                [255, 0, 0],
                "Just Do It - Bold, athletic, motivational",
            ),
        );
        templates.insert(
            KnownBrand::Adidas,
            BrandTemplate::new(
                [0, 0, 0],
                [255, 255, 255],
                [0, 150, 0],
                "Impossible is Nothing - Sporty, innovative, three stripes",
            ),
        );
        templates.insert(
            KnownBrand::CocaCola,
            BrandTemplate::new(
                [255, 0, 0],
                [255, 255, 255],
                [0, 0, 0],
                "Taste the Feeling - Classic, refreshing, happiness",
            ),
        );
        templates.insert(
            KnownBrand::Apple,
            BrandTemplate::new(
                [0, 0, 0],
                [255, 255, 255],
                [100, 100, 100],
                "Think Different - Clean, minimalist, premium",
            ),
        );
        templates.insert(
            KnownBrand::Samsung,
            BrandTemplate::new(
                [0, 0, 139],
                [255, 255, 255],
                [255, 165, 0],
                "Innovation for Everyone - Technology, innovation, accessible",
            ),
        );
        Self { templates }
    }
}

impl BrandRegistry {
    pub fn get(&self, brand: KnownBrand) -> Option<&BrandTemplate> {
        self.templates.get(&brand)
    }

    pub fn known_brand(brief: &CampaignBrief) -> Option<KnownBrand> {
        brief
            .asset_params()
            .and_then(|params| params.brand.as_deref())
            .and_then(KnownBrand::from_name)
    }

    /// A palette supplied in the brief wins over the registry entry.
    pub fn palette_for(&self, brief: &CampaignBrief) -> Option<BrandPalette> {
        if let Some(palette) = brief.asset_params().and_then(|params| params.brand_template) {
            return Some(palette);
        }
        Self::known_brand(brief)
            .and_then(|brand| self.get(brand))
            .map(|template| template.palette)
    }

    pub fn guidelines_for(&self, brief: &CampaignBrief) -> Option<&str> {
        Self::known_brand(brief)
            .and_then(|brand| self.get(brand))
            .map(|template| template.guidelines.as_str())
    }
}
