//! Colour palettes and the style fields derived from them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::RecordId;

pub const PALETTE_LEN: usize = 5;

/// Secondary, accent, accent and neutral tones used when no generated palette
/// is available.
pub const FALLBACK_TONES: [&str; PALETTE_LEN - 1] = ["#e2e8f0", "#94a3b8", "#475569", "#1e293b"];

pub const DEFAULT_PALETTE: [&str; PALETTE_LEN] =
    ["#F7CAC9", "#E2E8F0", "#94A3B8", "#475569", "#1E293B"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaletteError {
    #[error("Palette must have exactly {PALETTE_LEN} colors, got {0}")]
    WrongLength(usize),
    #[error("'{0}' is not a hex color")]
    InvalidColor(String),
    #[error("Unknown theme '{0}'")]
    UnknownTheme(String),
    #[error("No saved palette with id {0}")]
    UnknownSavedPalette(RecordId),
}

/// `#rgb` or `#rrggbb`.
pub fn is_hex_color(s: &str) -> bool {
    let Some(digits) = s.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Exactly five colours: base, secondary, two accents, neutral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Palette(Vec<String>);

impl TryFrom<Vec<String>> for Palette {
    type Error = PaletteError;

    fn try_from(colors: Vec<String>) -> Result<Self, Self::Error> {
        if colors.len() != PALETTE_LEN {
            return Err(PaletteError::WrongLength(colors.len()));
        }
        if let Some(bad) = colors.iter().find(|c| !is_hex_color(c)) {
            return Err(PaletteError::InvalidColor(bad.clone()));
        }
        Ok(Self(colors))
    }
}

impl From<Palette> for Vec<String> {
    fn from(palette: Palette) -> Self {
        palette.0
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self(DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect())
    }
}

impl Palette {
    /// Accept a generated palette, forcing index 0 back to `base`.
    pub fn from_generated(base: &str, mut colors: Vec<String>) -> Result<Self, PaletteError> {
        if let Some(first) = colors.first_mut() {
            *first = base.to_string();
        }
        Self::try_from(colors)
    }

    /// Base colour followed by the fixed fallback tones.
    pub fn fallback(base: &str) -> Self {
        let mut colors = Vec::with_capacity(PALETTE_LEN);
        colors.push(base.to_string());
        colors.extend(FALLBACK_TONES.iter().map(|c| c.to_string()));
        Self(colors)
    }

    /// Same palette with a different base colour; indices 1..4 are kept.
    pub fn with_base(&self, base: &str) -> Self {
        let mut colors = self.0.clone();
        colors[0] = base.to_string();
        Self(colors)
    }

    pub fn colors(&self) -> &[String] {
        &self.0
    }

    pub fn base(&self) -> &str {
        &self.0[0]
    }

    pub fn secondary(&self) -> &str {
        &self.0[1]
    }

    pub fn neutral(&self) -> &str {
        &self.0[PALETTE_LEN - 1]
    }
}

// =============================================================================
// Styles
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DressLength {
    #[default]
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroomAccessory {
    #[default]
    Necktie,
    Bowtie,
}

pub const DEFAULT_NECKLINE: &str = "Sweetheart";
pub const DEFAULT_BRIDESMAID_COLOR: &str = "#92A8D1";
pub const DEFAULT_GROOM_SUIT: &str = "#374151";
pub const DEFAULT_SHOE_COLOR: &str = "#5d4037";

/// Values last written into the style fields by palette derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivedStyles {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridesmaid_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groom_suit: Option<String>,
}

/// Independently settable style fields. Each field falls back to its own
/// default when missing from a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSelection {
    #[serde(default = "default_neckline")]
    pub bride_neckline: String,
    #[serde(default)]
    pub bride_has_veil: bool,
    #[serde(default = "default_bridesmaid_color")]
    pub bridesmaid_color: String,
    #[serde(default)]
    pub bridesmaid_dress_length: DressLength,
    #[serde(default = "default_groom_suit")]
    pub groom_suit: String,
    #[serde(default)]
    pub groom_accessory: GroomAccessory,
    #[serde(default = "default_shoe_color")]
    pub groom_shoe_color: String,
    #[serde(default)]
    pub background_scene: String,
    #[serde(default, skip_serializing_if = "is_default_derived")]
    pub derived: DerivedStyles,
}

fn default_neckline() -> String {
    DEFAULT_NECKLINE.to_string()
}

fn default_bridesmaid_color() -> String {
    DEFAULT_BRIDESMAID_COLOR.to_string()
}

fn default_groom_suit() -> String {
    DEFAULT_GROOM_SUIT.to_string()
}

fn default_shoe_color() -> String {
    DEFAULT_SHOE_COLOR.to_string()
}

fn is_default_derived(d: &DerivedStyles) -> bool {
    *d == DerivedStyles::default()
}

impl Default for StyleSelection {
    fn default() -> Self {
        Self {
            bride_neckline: default_neckline(),
            bride_has_veil: false,
            bridesmaid_color: default_bridesmaid_color(),
            bridesmaid_dress_length: DressLength::default(),
            groom_suit: default_groom_suit(),
            groom_accessory: GroomAccessory::default(),
            groom_shoe_color: default_shoe_color(),
            background_scene: String::new(),
            derived: DerivedStyles::default(),
        }
    }
}

/// A change to exactly one style field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StyleUpdate {
    BrideNeckline(String),
    BrideHasVeil(bool),
    BridesmaidColor(String),
    BridesmaidDressLength(DressLength),
    GroomSuit(String),
    GroomAccessory(GroomAccessory),
    GroomShoeColor(String),
    BackgroundScene(String),
}

impl StyleSelection {
    pub fn apply(&mut self, update: StyleUpdate) {
        match update {
            StyleUpdate::BrideNeckline(v) => self.bride_neckline = v,
            StyleUpdate::BrideHasVeil(v) => self.bride_has_veil = v,
            StyleUpdate::BridesmaidColor(v) => self.bridesmaid_color = v,
            StyleUpdate::BridesmaidDressLength(v) => self.bridesmaid_dress_length = v,
            StyleUpdate::GroomSuit(v) => self.groom_suit = v,
            StyleUpdate::GroomAccessory(v) => self.groom_accessory = v,
            StyleUpdate::GroomShoeColor(v) => self.groom_shoe_color = v,
            StyleUpdate::BackgroundScene(v) => self.background_scene = v,
        }
    }

    /// The bridesmaid colour is still the default or the last derived value.
    pub fn bridesmaid_color_is_derived(&self) -> bool {
        owned_by_palette(
            &self.bridesmaid_color,
            DEFAULT_BRIDESMAID_COLOR,
            self.derived.bridesmaid_color.as_deref(),
        )
    }

    /// The suit colour is still the default or the last derived value.
    pub fn groom_suit_is_derived(&self) -> bool {
        owned_by_palette(
            &self.groom_suit,
            DEFAULT_GROOM_SUIT,
            self.derived.groom_suit.as_deref(),
        )
    }
}

/// A field is still owned by the palette while it holds its default or the
/// value last derived for it. A colour the user picked by hand that happens
/// to equal one of those cannot be told apart and is treated the same way.
fn owned_by_palette(current: &str, default: &str, derived: Option<&str>) -> bool {
    current.eq_ignore_ascii_case(default) || derived.is_some_and(|d| current.eq_ignore_ascii_case(d))
}

/// Derive the dependent style fields from a freshly generated palette.
///
/// Bridesmaid colour follows the secondary colour and the suit follows the
/// neutral. A field the user has customised is only overwritten when
/// `explicit_regenerate` is set; every other field is carried over.
pub fn derive_styles(
    new_palette: &Palette,
    previous: &StyleSelection,
    explicit_regenerate: bool,
) -> StyleSelection {
    let mut next = previous.clone();

    if explicit_regenerate || previous.bridesmaid_color_is_derived() {
        next.bridesmaid_color = new_palette.secondary().to_string();
        next.derived.bridesmaid_color = Some(next.bridesmaid_color.clone());
    }
    if explicit_regenerate || previous.groom_suit_is_derived() {
        next.groom_suit = new_palette.neutral().to_string();
        next.derived.groom_suit = Some(next.groom_suit.clone());
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette(colors: [&str; 5]) -> Palette {
        Palette::try_from(colors.iter().map(|c| c.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#abc"));
        assert!(is_hex_color("#A1B2C3"));
        assert!(!is_hex_color("abc"));
        assert!(!is_hex_color("#abcd"));
        assert!(!is_hex_color("#ggg"));
    }

    #[test]
    fn generated_palette_keeps_base_verbatim() {
        let colors = ["#000000", "#111111", "#222222", "#333333", "#444444"]
            .map(String::from)
            .to_vec();
        let p = Palette::from_generated("#112233", colors).unwrap();
        assert_eq!(p.base(), "#112233");
        assert_eq!(p.secondary(), "#111111");
    }

    #[test]
    fn short_palette_is_not_padded() {
        let err = Palette::from_generated("#abc", vec!["#abc".to_string()]).unwrap_err();
        assert_eq!(err, PaletteError::WrongLength(1));
    }

    #[test]
    fn fallback_is_base_plus_fixed_tones() {
        let p = Palette::fallback("#abc");
        assert_eq!(
            p.colors(),
            &["#abc", "#e2e8f0", "#94a3b8", "#475569", "#1e293b"]
        );
    }

    #[test]
    fn with_base_only_touches_index_zero() {
        let p = Palette::default().with_base("#B2AC88");
        assert_eq!(p.base(), "#B2AC88");
        assert_eq!(&p.colors()[1..], &Palette::default().colors()[1..]);
    }

    #[test]
    fn style_update_touches_one_field() {
        let mut styles = StyleSelection::default();
        styles.apply(StyleUpdate::BrideHasVeil(true));
        styles.apply(StyleUpdate::GroomAccessory(GroomAccessory::Bowtie));
        assert!(styles.bride_has_veil);
        assert_eq!(styles.groom_accessory, GroomAccessory::Bowtie);
        assert_eq!(styles.bride_neckline, DEFAULT_NECKLINE);
        assert_eq!(styles.groom_suit, DEFAULT_GROOM_SUIT);
    }

    #[test]
    fn derive_sets_unset_fields() {
        let p = palette(["#112233", "#aa0000", "#00aa00", "#0000aa", "#333333"]);
        let styles = derive_styles(&p, &StyleSelection::default(), false);
        assert_eq!(styles.bridesmaid_color, "#aa0000");
        assert_eq!(styles.groom_suit, "#333333");
    }

    #[test]
    fn derive_follows_previous_derived_values() {
        let first = palette(["#112233", "#aa0000", "#00aa00", "#0000aa", "#333333"]);
        let second = palette(["#112233", "#bb0000", "#00bb00", "#0000bb", "#444444"]);
        let styles = derive_styles(&first, &StyleSelection::default(), false);
        let styles = derive_styles(&second, &styles, false);
        assert_eq!(styles.bridesmaid_color, "#bb0000");
        assert_eq!(styles.groom_suit, "#444444");
    }

    #[test]
    fn derive_preserves_manual_override_unless_explicit() {
        let first = palette(["#112233", "#aa0000", "#00aa00", "#0000aa", "#333333"]);
        let second = palette(["#112233", "#bb0000", "#00bb00", "#0000bb", "#444444"]);
        let mut styles = derive_styles(&first, &StyleSelection::default(), false);
        styles.apply(StyleUpdate::BridesmaidColor("#ff00ff".to_string()));
        styles.apply(StyleUpdate::BrideNeckline("V-Neck".to_string()));

        let kept = derive_styles(&second, &styles, false);
        assert_eq!(kept.bridesmaid_color, "#ff00ff");
        assert_eq!(kept.groom_suit, "#444444");
        assert_eq!(kept.bride_neckline, "V-Neck");

        let forced = derive_styles(&second, &styles, true);
        assert_eq!(forced.bridesmaid_color, "#bb0000");
        assert_eq!(forced.bride_neckline, "V-Neck");
    }

    #[test]
    fn manual_pick_equal_to_default_counts_as_unset() {
        let p = palette(["#112233", "#aa0000", "#00aa00", "#0000aa", "#333333"]);
        let mut styles = StyleSelection::default();
        styles.apply(StyleUpdate::BridesmaidColor(DEFAULT_BRIDESMAID_COLOR.to_lowercase()));
        assert!(styles.bridesmaid_color_is_derived());
        assert_eq!(derive_styles(&p, &styles, false).bridesmaid_color, "#aa0000");
    }

    #[test]
    fn partial_styles_document_fills_defaults() {
        let styles: StyleSelection =
            serde_json::from_str(r#"{"brideHasVeil": true, "groomAccessory": "bowtie"}"#).unwrap();
        assert!(styles.bride_has_veil);
        assert_eq!(styles.bridesmaid_color, DEFAULT_BRIDESMAID_COLOR);
        assert_eq!(styles.bridesmaid_dress_length, DressLength::Long);
    }

    #[test]
    fn palette_deserialization_checks_length() {
        assert!(serde_json::from_str::<Palette>(r##"["#abc"]"##).is_err());
        let p: Palette =
            serde_json::from_str(r##"["#abc","#def","#123","#456","#789"]"##).unwrap();
        assert_eq!(p.neutral(), "#789");
    }
}
