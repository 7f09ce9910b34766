//! The three AI flows: prompt, call, extract, normalize.

use chrono::NaiveDate;
use tracing::{info, warn};
use vowplan_core::{GeneratedVenue, Palette, RecordId, TodoItem};

use crate::normalize::{PaletteOutcome, normalize_palette, normalize_tasks, normalize_venues};
use crate::prompt::{palette_prompt, task_prompt, venue_prompt};
use crate::repair::generate_with_repair;
use crate::{AiError, GenerateBackend, JsonShape, extract};

/// Per-call options for task and venue generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateOptions {
    /// How many times an unusable answer is sent back with the error. Off by
    /// default.
    pub repair_attempts: usize,
}

impl GenerateOptions {
    pub fn with_repair(repair_attempts: usize) -> Self {
        Self { repair_attempts }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VenueQuery {
    pub location: String,
    pub budget: String,
}

impl VenueQuery {
    pub fn new(location: impl Into<String>, budget: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            budget: budget.into(),
        }
    }

    /// Both fields are required before anything is sent.
    pub fn validate(&self) -> Result<(), AiError> {
        if self.location.trim().is_empty() || self.budget.trim().is_empty() {
            return Err(AiError::InvalidRequest(
                "Please enter a location and budget.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate planning tasks for `wedding_date`. Returned ids start at `base_id`.
pub async fn generate_tasks(
    backend: &impl GenerateBackend,
    wedding_date: NaiveDate,
    base_id: RecordId,
    options: &GenerateOptions,
) -> Result<Vec<TodoItem>, AiError> {
    let prompt = task_prompt(wedding_date);
    let tasks = generate_with_repair(backend, "Tasks", &prompt, options.repair_attempts, |raw| {
        let parsed = extract(raw, JsonShape::Array)?;
        Ok(normalize_tasks(&parsed, base_id)?)
    })
    .await?;

    info!(count = tasks.len(), model = backend.model_name(), "Generated tasks");
    Ok(tasks)
}

/// Ask for venues matching `query`. An answer without venues is an empty list.
pub async fn find_venues(
    backend: &impl GenerateBackend,
    query: &VenueQuery,
    options: &GenerateOptions,
) -> Result<Vec<GeneratedVenue>, AiError> {
    query.validate()?;

    let prompt = venue_prompt(query.location.trim(), query.budget.trim());
    let venues = generate_with_repair(backend, "Venues", &prompt, options.repair_attempts, |raw| {
        let parsed = extract(raw, JsonShape::Object)?;
        Ok(normalize_venues(&parsed)?)
    })
    .await?;

    info!(count = venues.len(), location = %query.location, "Found venues");
    Ok(venues)
}

/// Generate a palette anchored on `base`. Never fails: any error yields the
/// deterministic fallback palette.
pub async fn generate_palette(backend: &impl GenerateBackend, base: &str, theme: &str) -> PaletteOutcome {
    let prompt = palette_prompt(base, theme);

    let parsed = match backend.generate(&prompt).await {
        Ok(raw) => extract(&raw, JsonShape::Object).map_err(AiError::from),
        Err(e) => Err(AiError::from(e)),
    };

    match parsed {
        Ok(value) => normalize_palette(&value, base),
        Err(e) => {
            warn!("Palette generation failed ({}), using fallback", e);
            PaletteOutcome::Fallback {
                palette: Palette::fallback(base),
                reason: e.to_string(),
            }
        }
    }
}
