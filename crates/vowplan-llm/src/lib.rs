mod client;
mod error;
mod extract;
mod generate;
mod normalize;
mod prompt;
mod repair;
mod types;


pub use client::*;
pub use error::*;
pub use extract::{JsonShape, extract};
pub use generate::*;
pub use normalize::{PaletteOutcome, normalize_palette, normalize_tasks, normalize_venues};
pub use prompt::{palette_prompt, task_prompt, venue_prompt};
pub use types::*;
