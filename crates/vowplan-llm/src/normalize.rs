//! Map parsed generator output onto the planner's record shapes.
//!
//! Ids are always assigned here; anything the generator calls an id is
//! ignored.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tracing::warn;
use vowplan_core::{GeneratedVenue, Palette, RecordId, TodoItem};

use crate::NormalizationError;

/// Turn `[{task, dueDate}, ...]` into to-do items with ids `base_id + index`.
///
/// Any malformed entry rejects the whole batch.
pub fn normalize_tasks(parsed: &Value, base_id: RecordId) -> Result<Vec<TodoItem>, NormalizationError> {
    let items = parsed
        .as_array()
        .ok_or(NormalizationError::WrongShape("array of tasks"))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let obj = item
                .as_object()
                .ok_or(NormalizationError::TaskNotObject { index })?;

            let task = obj
                .get("task")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or(NormalizationError::MissingTask { index })?;

            let due_date = match obj.get("dueDate") {
                Some(Value::String(s)) => parse_due_date(s).ok_or_else(|| {
                    NormalizationError::InvalidDueDate {
                        index,
                        value: s.clone(),
                    }
                })?,
                other => {
                    return Err(NormalizationError::InvalidDueDate {
                        index,
                        value: other.map(Value::to_string).unwrap_or_else(|| "missing".to_string()),
                    });
                }
            };

            Ok(TodoItem {
                id: base_id + index as RecordId,
                task: task.to_string(),
                due_date,
                completed: false,
            })
        })
        .collect()
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp reduced to its date.
fn parse_due_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

/// Turn `{venues: [...]}` into scouted venues.
///
/// A missing or non-array `venues` key means the generator found nothing and
/// yields an empty list. A venue entry that is present but malformed rejects
/// the batch.
pub fn normalize_venues(parsed: &Value) -> Result<Vec<GeneratedVenue>, NormalizationError> {
    let Some(items) = parsed.get("venues").and_then(Value::as_array) else {
        warn!("AI response has no venues array, treating as empty");
        return Ok(Vec::new());
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| venue_from_value(index, item))
        .collect()
}

fn venue_from_value(index: usize, item: &Value) -> Result<GeneratedVenue, NormalizationError> {
    let invalid = |reason: &str| NormalizationError::InvalidVenue {
        index,
        reason: reason.to_string(),
    };

    let obj = item.as_object().ok_or_else(|| invalid("not an object"))?;
    let text = |key: &str| -> Result<String, NormalizationError> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.trim().to_string()),
            Some(_) => Err(invalid(&format!("'{}' is not a string", key))),
        }
    };

    let name = text("name")?;
    if name.is_empty() {
        return Err(invalid("missing name"));
    }

    let estimated_price = match obj.get("estimated_price") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => Some(
            parse_price(s).ok_or_else(|| invalid(&format!("unreadable price '{}'", s)))?,
        ),
        Some(_) => return Err(invalid("'estimated_price' is not a number")),
    };

    Ok(GeneratedVenue {
        name,
        location: text("location")?,
        aesthetic_description: text("aesthetic_description")?,
        estimated_price,
        website_url: text("website_url")?,
        image_url: text("image_url")?,
    })
}

/// Read the first amount in a price string. "$12,500", "12500 USD" and the
/// low end of "$10,000 - $15,000" are accepted; an amount glued to a suffix
/// such as "15k" is not.
fn parse_price(s: &str) -> Option<f64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
        .unwrap_or(rest.len());
    if rest[end..].starts_with(|c: char| c.is_alphabetic()) {
        return None;
    }
    let token = rest[..end].trim_end_matches(['.', ',']);
    let grouped_ok = token
        .split('.')
        .next()
        .is_some_and(|whole| whole.split(',').skip(1).all(|g| g.len() == 3));
    if !grouped_ok {
        return None;
    }
    token.replace(',', "").parse().ok()
}

/// Result of normalizing a palette response.
#[derive(Debug, Clone, PartialEq)]
pub enum PaletteOutcome {
    Generated(Palette),
    /// The response was unusable; the deterministic fallback was built from
    /// the base colour instead.
    Fallback { palette: Palette, reason: String },
}

impl PaletteOutcome {
    pub fn palette(&self) -> &Palette {
        match self {
            PaletteOutcome::Generated(p) => p,
            PaletteOutcome::Fallback { palette, .. } => palette,
        }
    }

    pub fn into_palette(self) -> Palette {
        match self {
            PaletteOutcome::Generated(p) => p,
            PaletteOutcome::Fallback { palette, .. } => palette,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, PaletteOutcome::Fallback { .. })
    }
}

/// Turn `{palette: [5 colours]}` into a palette whose base is `base`.
///
/// Anything other than exactly five hex colours falls back; short palettes
/// are never padded with guesses.
pub fn normalize_palette(parsed: &Value, base: &str) -> PaletteOutcome {
    let colors: Option<Vec<String>> = parsed
        .get("palette")
        .and_then(Value::as_array)
        .and_then(|arr| {
            arr.iter()
                .map(|c| c.as_str().map(|s| s.trim().to_string()))
                .collect()
        });

    let result = match colors {
        Some(colors) => Palette::from_generated(base, colors).map_err(|e| e.to_string()),
        None => Err("response has no 'palette' array of strings".to_string()),
    };

    match result {
        Ok(palette) => PaletteOutcome::Generated(palette),
        Err(reason) => {
            warn!("Palette response rejected ({}), using fallback", reason);
            PaletteOutcome::Fallback {
                palette: Palette::fallback(base),
                reason,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tasks_get_sequential_local_ids() {
        let parsed = json!([
            {"id": 999, "task": "Book DJ", "dueDate": "2026-05-01"},
            {"task": "  Send invites ", "dueDate": "2026-06-01T09:00:00Z"}
        ]);
        let tasks = normalize_tasks(&parsed, 1_000).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, 1_000);
        assert_eq!(tasks[1].id, 1_001);
        assert_eq!(tasks[1].task, "Send invites");
        assert_eq!(tasks[1].due_date, "2026-06-01".parse::<NaiveDate>().unwrap());
        assert!(tasks.iter().all(|t| !t.completed));
    }

    #[test]
    fn empty_task_array_is_fine() {
        assert_eq!(normalize_tasks(&json!([]), 1), Ok(Vec::new()));
    }

    #[test]
    fn task_batch_rejected_on_bad_entry() {
        let parsed = json!([
            {"task": "Book DJ", "dueDate": "2026-05-01"},
            {"task": "Cake tasting", "dueDate": "next spring"}
        ]);
        assert_eq!(
            normalize_tasks(&parsed, 1),
            Err(NormalizationError::InvalidDueDate {
                index: 1,
                value: "next spring".to_string()
            })
        );

        let parsed = json!([{"task": "", "dueDate": "2026-05-01"}]);
        assert_eq!(
            normalize_tasks(&parsed, 1),
            Err(NormalizationError::MissingTask { index: 0 })
        );

        let parsed = json!([{"task": "Florist"}]);
        assert_eq!(
            normalize_tasks(&parsed, 1),
            Err(NormalizationError::InvalidDueDate {
                index: 0,
                value: "missing".to_string()
            })
        );

        let parsed = json!([{"task": "Florist", "dueDate": "2026-02-30"}]);
        assert!(normalize_tasks(&parsed, 1).is_err());
    }

    #[test]
    fn tasks_require_array() {
        assert_eq!(
            normalize_tasks(&json!({"tasks": []}), 1),
            Err(NormalizationError::WrongShape("array of tasks"))
        );
    }

    #[test]
    fn venues_missing_key_is_empty() {
        assert_eq!(normalize_venues(&json!({})), Ok(Vec::new()));
        assert_eq!(normalize_venues(&json!({"venues": "none"})), Ok(Vec::new()));
    }

    #[test]
    fn venues_parse_with_defaults() {
        let parsed = json!({"venues": [{
            "name": "Rosewood Barn",
            "location": "Hudson, NY",
            "aesthetic_description": "Rustic",
            "estimated_price": "$12,500",
            "website_url": "rosewoodbarn.com"
        }]});
        let venues = normalize_venues(&parsed).unwrap();
        assert_eq!(venues.len(), 1);
        assert_eq!(venues[0].estimated_price, Some(12_500.0));
        assert_eq!(venues[0].image_url, "");
    }

    #[test]
    fn venue_price_takes_first_amount() {
        let price = |p: &str| {
            normalize_venues(&json!({"venues": [{"name": "A", "estimated_price": p}]}))
                .map(|v| v[0].estimated_price)
        };
        assert_eq!(price("$10,000 - $15,000"), Ok(Some(10_000.0)));
        assert_eq!(price("12,500 USD"), Ok(Some(12_500.0)));
        assert_eq!(price("Approx. $8,750.50 per event"), Ok(Some(8_750.5)));
        assert_eq!(price("$9,000."), Ok(Some(9_000.0)));
        for bad in ["$15k", "call for pricing", "1,00,000"] {
            assert!(
                matches!(price(bad), Err(NormalizationError::InvalidVenue { index: 0, .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn venue_without_name_rejects_batch() {
        let parsed = json!({"venues": [{"name": "A"}, {"location": "B"}]});
        assert!(matches!(
            normalize_venues(&parsed),
            Err(NormalizationError::InvalidVenue { index: 1, .. })
        ));
    }

    #[test]
    fn palette_keeps_base() {
        let parsed = json!({"palette": ["#ffffff", "#aa0000", "#00aa00", "#0000aa", "#333333"]});
        let outcome = normalize_palette(&parsed, "#112233");
        assert!(!outcome.is_fallback());
        assert_eq!(outcome.palette().base(), "#112233");
        assert_eq!(outcome.palette().neutral(), "#333333");
    }

    #[test]
    fn short_palette_falls_back() {
        let outcome = normalize_palette(&json!({"palette": ["#abc"]}), "#abc");
        assert!(outcome.is_fallback());
        assert_eq!(outcome.into_palette(), Palette::fallback("#abc"));
    }

    #[test]
    fn palette_with_non_colors_falls_back() {
        let parsed = json!({"palette": ["#abc", "blue", "#000", "#111", "#222"]});
        assert!(normalize_palette(&parsed, "#abc").is_fallback());
        let parsed = json!({"palette": ["#abc", 1, "#000", "#111", "#222"]});
        assert!(normalize_palette(&parsed, "#abc").is_fallback());
        assert!(normalize_palette(&json!({}), "#abc").is_fallback());
    }
}
