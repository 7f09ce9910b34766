//! Dream wedding simulator state.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::RecordId;
use crate::palette::{Palette, PaletteError, StyleSelection, derive_styles, is_hex_color};

pub const DEFAULT_DREAM_BUDGET: f64 = 25_000.0;
pub const DEFAULT_THEME: &str = "Modern Romantic";
const DRESS_COST: f64 = 2_500.0;
const FALLBACK_THEME_COST: f64 = 15_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub name: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub cost: f64,
}

pub const THEMES: [Theme; 4] = [
    Theme {
        name: "Modern Romantic",
        icon: "💖",
        color: "#F7CAC9",
        cost: 15_000.0,
    },
    Theme {
        name: "Rustic Bohemian",
        icon: "🌿",
        color: "#B2AC88",
        cost: 12_000.0,
    },
    Theme {
        name: "Classic Elegance",
        icon: "💎",
        color: "#92A8D1",
        cost: 20_000.0,
    },
    Theme {
        name: "Tropical Getaway",
        icon: "🌴",
        color: "#FF8C69",
        cost: 25_000.0,
    },
];

pub const SUIT_COLORS: [(&str, &str); 4] = [
    ("Navy", "#1e3a8a"),
    ("Charcoal", "#374151"),
    ("Black", "#111827"),
    ("Tan", "#d2b48c"),
];

pub fn find_theme(name: &str) -> Option<&'static Theme> {
    THEMES.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPalette {
    pub id: RecordId,
    pub colors: Palette,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamState {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default, deserialize_with = "lenient_palette")]
    pub palette: Palette,
    #[serde(default = "default_budget")]
    pub budget: f64,
    #[serde(default)]
    pub styles: StyleSelection,
    #[serde(default, deserialize_with = "lenient_saved_palettes")]
    pub saved_palettes: Vec<SavedPalette>,
}

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

fn default_budget() -> f64 {
    DEFAULT_DREAM_BUDGET
}

impl Default for DreamState {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            palette: Palette::default(),
            budget: DEFAULT_DREAM_BUDGET,
            styles: StyleSelection::default(),
            saved_palettes: Vec::new(),
        }
    }
}

/// A stored palette of the wrong shape must not make the whole document
/// unreadable; keep its base colour and fill in the fallback tones.
fn lenient_palette<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Palette, D::Error> {
    let colors = Vec::<String>::deserialize(deserializer)?;
    Ok(match Palette::try_from(colors.clone()) {
        Ok(palette) => palette,
        Err(e) => {
            warn!("Stored palette rejected ({}), using fallback", e);
            match colors.first().filter(|c| is_hex_color(c)) {
                Some(base) => Palette::fallback(base),
                None => Palette::default(),
            }
        }
    })
}

fn lenient_saved_palettes<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<SavedPalette>, D::Error> {
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<SavedPalette>(v) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Dropping malformed saved palette: {}", e);
                None
            }
        })
        .collect())
}

impl DreamState {
    /// Switch theme. Only the base colour of the palette follows the theme;
    /// dependent styles wait for an explicit palette generation.
    pub fn select_theme(&mut self, name: &str) -> Result<(), PaletteError> {
        let theme = find_theme(name).ok_or_else(|| PaletteError::UnknownTheme(name.to_string()))?;
        self.theme = theme.name.to_string();
        self.palette = self.palette.with_base(theme.color);
        Ok(())
    }

    pub fn set_base_color(&mut self, color: &str) -> Result<(), PaletteError> {
        if !is_hex_color(color) {
            return Err(PaletteError::InvalidColor(color.to_string()));
        }
        self.palette = self.palette.with_base(color);
        Ok(())
    }

    /// Install a palette and derive the dependent styles from it.
    pub fn apply_palette(&mut self, palette: Palette, explicit_regenerate: bool) {
        self.styles = derive_styles(&palette, &self.styles, explicit_regenerate);
        self.palette = palette;
    }

    /// Install a palette without touching styles (generation fallback).
    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    /// Save the current palette unless an identical one is already saved.
    pub fn save_palette(&mut self, id: RecordId) -> bool {
        if self.saved_palettes.iter().any(|p| p.colors == self.palette) {
            return false;
        }
        self.saved_palettes.push(SavedPalette {
            id,
            colors: self.palette.clone(),
        });
        true
    }

    pub fn apply_saved_palette(&mut self, id: RecordId) -> Result<(), PaletteError> {
        let saved = self
            .saved_palettes
            .iter()
            .find(|p| p.id == id)
            .ok_or(PaletteError::UnknownSavedPalette(id))?;
        let colors = saved.colors.clone();
        self.apply_palette(colors, false);
        Ok(())
    }

    pub fn delete_saved_palette(&mut self, id: RecordId) -> bool {
        let before = self.saved_palettes.len();
        self.saved_palettes.retain(|p| p.id != id);
        self.saved_palettes.len() != before
    }

    pub fn estimated_cost(&self) -> f64 {
        let theme_cost = find_theme(&self.theme)
            .map(|t| t.cost)
            .unwrap_or(FALLBACK_THEME_COST);
        theme_cost + DRESS_COST
    }

    /// Fixed suit colours plus any non-base palette colour not already listed.
    pub fn suit_color_options(&self) -> Vec<(String, String)> {
        let mut options: Vec<(String, String)> = SUIT_COLORS
            .iter()
            .map(|(name, color)| (name.to_string(), color.to_string()))
            .collect();
        for (i, color) in self.palette.colors().iter().skip(1).enumerate() {
            if !options.iter().any(|(_, c)| c.eq_ignore_ascii_case(color)) {
                options.push((format!("Theme Color {}", i + 1), color.clone()));
            }
        }
        options
    }
}
