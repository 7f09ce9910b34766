pub mod dream;
pub mod merge;
pub mod palette;
pub mod seating;
pub mod stats;
mod model;
mod validation;

pub use dream::{DreamState, SavedPalette, THEMES, Theme};
pub use merge::{MergeError, WriteMode, merge, merge_fields};
pub use model::*;
pub use palette::{Palette, PaletteError, StyleSelection, StyleUpdate, derive_styles};
pub use seating::{SeatTarget, SeatingError, SeatingPlan};
pub use stats::{CategorySpend, DashboardStats, spending_by_category};
pub use validation::*;
