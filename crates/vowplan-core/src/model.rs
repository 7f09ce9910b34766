use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::dream::DreamState;
use crate::seating::SeatingPlan;

/// Record identifiers are derived from the creation timestamp in milliseconds.
pub type RecordId = i64;

pub const DEFAULT_ESTIMATED_BUDGET: f64 = 10_000.0;

/// Hands out timestamp-derived ids that stay unique within one session even
/// when several records are created in the same millisecond.
#[derive(Debug, Default, Clone)]
pub struct IdSource {
    last: RecordId,
}

impl IdSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, now_ms: i64) -> RecordId {
        self.reserve(now_ms, 1)
    }

    /// Reserve `count` consecutive ids and return the first one.
    pub fn reserve(&mut self, now_ms: i64, count: usize) -> RecordId {
        let base = now_ms.max(self.last + 1);
        self.last = base + count.max(1) as i64 - 1;
        base
    }

    /// Never hand out an id at or below `id` again.
    pub fn observe(&mut self, id: RecordId) {
        self.last = self.last.max(id);
    }
}

/// Anything stored in one of the planning lists.
pub trait Record {
    fn id(&self) -> RecordId;
}

/// Replace the record with the same id, or append it. Returns true on insert.
pub fn upsert_record<T: Record>(list: &mut Vec<T>, record: T) -> bool {
    match list.iter_mut().find(|r| r.id() == record.id()) {
        Some(existing) => {
            *existing = record;
            false
        }
        None => {
            list.push(record);
            true
        }
    }
}

/// Remove the record with `id`. Returns the removed record, if any.
pub fn remove_record<T: Record>(list: &mut Vec<T>, id: RecordId) -> Option<T> {
    let pos = list.iter().position(|r| r.id() == id)?;
    Some(list.remove(pos))
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuestStatus {
    #[default]
    Pending,
    Attending,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub status: GuestStatus,
    #[serde(default)]
    pub notes: String,
}

impl GuestRecord {
    pub fn new(id: RecordId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            group: String::new(),
            status: GuestStatus::Pending,
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: RecordId,
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub estimated: f64,
    #[serde(default)]
    pub actual: f64,
    /// Who the money goes to, free text.
    #[serde(default)]
    pub vendor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default = "default_estimated_budget")]
    pub estimated: f64,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

fn default_estimated_budget() -> f64 {
    DEFAULT_ESTIMATED_BUDGET
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            estimated: DEFAULT_ESTIMATED_BUDGET,
            expenses: Vec::new(),
        }
    }
}

impl Budget {
    pub fn actual_spending(&self) -> f64 {
        self.expenses.iter().map(|e| e.actual).sum()
    }
}

/// A to-do entry. Generated tasks land here with `completed: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: RecordId,
    pub task: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueRecord {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub capacity: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub image_url: String,
}

/// A venue as suggested by the generator, before the user saves it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedVenue {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub aesthetic_description: String,
    #[serde(default)]
    pub estimated_price: Option<f64>,
    #[serde(default)]
    pub website_url: String,
    #[serde(default)]
    pub image_url: String,
}

impl VenueRecord {
    /// Turn a scouted venue into a saved one with a local id.
    pub fn from_generated(id: RecordId, venue: &GeneratedVenue) -> Self {
        let aesthetic = if venue.aesthetic_description.trim().is_empty() {
            "N/A"
        } else {
            venue.aesthetic_description.trim()
        };
        Self {
            id,
            name: venue.name.clone(),
            location: venue.location.clone(),
            notes: format!("Aesthetic: {}.", aesthetic),
            price: venue.estimated_price.unwrap_or(0.0),
            capacity: String::new(),
            website: venue.website_url.clone(),
            image_url: venue.image_url.clone(),
        }
    }
}

/// Prefix `https://` when a link has no scheme. Empty links stay empty.
pub fn ensure_protocol(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorRecord {
    pub id: RecordId,
    pub name: String,
    /// What the vendor provides: catering, photography, ...
    #[serde(default, alias = "category")]
    pub service: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub notes: String,
}

macro_rules! impl_record {
    ($($ty:ty),*) => {
        $(impl Record for $ty {
            fn id(&self) -> RecordId {
                self.id
            }
        })*
    };
}

impl_record!(GuestRecord, Expense, TodoItem, VenueRecord, VendorRecord, ProposalTodo);

// =============================================================================
// Planning document
// =============================================================================

/// The planning document for one user: everything the planner tracks except
/// the dream simulator, which lives in its own document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanningState {
    pub wedding_date: Option<NaiveDate>,
    pub guest_list: Vec<GuestRecord>,
    pub budget: Budget,
    pub todo_list: Vec<TodoItem>,
    pub venues: Vec<VenueRecord>,
    pub vendors: Vec<VendorRecord>,
    pub seating_plan: SeatingPlan,
}

/// Top-level keys of the planning document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanningField {
    WeddingDate,
    GuestList,
    Budget,
    TodoList,
    Venues,
    Vendors,
    SeatingPlan,
}

impl PlanningField {
    /// The key as stored in the document.
    pub fn key(&self) -> &'static str {
        match self {
            PlanningField::WeddingDate => "weddingDate",
            PlanningField::GuestList => "guestList",
            PlanningField::Budget => "budget",
            PlanningField::TodoList => "todoList",
            PlanningField::Venues => "venues",
            PlanningField::Vendors => "vendors",
            PlanningField::SeatingPlan => "seatingPlan",
        }
    }
}

/// A partial planning document. Present fields carry absolute values and
/// replace the whole subtree they name; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wedding_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_list: Option<Vec<GuestRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub todo_list: Option<Vec<TodoItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venues: Option<Vec<VenueRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendors: Option<Vec<VendorRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seating_plan: Option<SeatingPlan>,
}

impl PlanningPatch {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    pub fn fields(&self) -> Vec<PlanningField> {
        let mut fields = Vec::new();
        if self.wedding_date.is_some() {
            fields.push(PlanningField::WeddingDate);
        }
        if self.guest_list.is_some() {
            fields.push(PlanningField::GuestList);
        }
        if self.budget.is_some() {
            fields.push(PlanningField::Budget);
        }
        if self.todo_list.is_some() {
            fields.push(PlanningField::TodoList);
        }
        if self.venues.is_some() {
            fields.push(PlanningField::Venues);
        }
        if self.vendors.is_some() {
            fields.push(PlanningField::Vendors);
        }
        if self.seating_plan.is_some() {
            fields.push(PlanningField::SeatingPlan);
        }
        fields
    }
}

impl PlanningState {
    /// A fresh planning document: wedding one year out, default budget,
    /// empty lists and the default four tables.
    pub fn initial(today: NaiveDate) -> Self {
        Self {
            wedding_date: today.checked_add_months(Months::new(12)),
            ..Default::default()
        }
    }

    /// A fresh planning document seeded from the dream simulator: the dream
    /// budget becomes the estimate, and two starter tasks are added.
    pub fn from_dream(dream: &DreamState, today: NaiveDate, first_id: RecordId) -> Self {
        let mut state = Self::initial(today);
        state.budget.estimated = dream.budget;
        state.todo_list = vec![
            TodoItem {
                id: first_id,
                task: "Create initial wedding budget".to_string(),
                due_date: today,
                completed: true,
            },
            TodoItem {
                id: first_id + 1,
                task: format!("Find vendors that match our \"{}\" theme!", dream.theme),
                due_date: today + Duration::days(7),
                completed: false,
            },
        ];
        state
    }

    /// Copy the named fields out into a patch.
    pub fn patch(&self, fields: &[PlanningField]) -> PlanningPatch {
        let mut patch = PlanningPatch::default();
        for field in fields {
            match field {
                PlanningField::WeddingDate => patch.wedding_date = self.wedding_date,
                PlanningField::GuestList => patch.guest_list = Some(self.guest_list.clone()),
                PlanningField::Budget => patch.budget = Some(self.budget.clone()),
                PlanningField::TodoList => patch.todo_list = Some(self.todo_list.clone()),
                PlanningField::Venues => patch.venues = Some(self.venues.clone()),
                PlanningField::Vendors => patch.vendors = Some(self.vendors.clone()),
                PlanningField::SeatingPlan => patch.seating_plan = Some(self.seating_plan.clone()),
            }
        }
        patch
    }

    pub fn guest_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.guest_list.iter().map(|g| g.id)
    }

    pub fn find_guest(&self, id: RecordId) -> Option<&GuestRecord> {
        self.guest_list.iter().find(|g| g.id == id)
    }

    /// Guests not sitting at any table, in guest-list order.
    pub fn unseated_guests(&self) -> Vec<&GuestRecord> {
        let unseated = self.seating_plan.unseated(self.guest_ids());
        self.guest_list
            .iter()
            .filter(|g| unseated.contains(&g.id))
            .collect()
    }

    /// Delete a guest and purge it from every table.
    pub fn delete_guest(&mut self, id: RecordId) -> Option<GuestRecord> {
        let removed = remove_record(&mut self.guest_list, id);
        self.seating_plan.remove_guest(id);
        removed
    }

    /// Flip a to-do's completion. Returns the new value.
    pub fn toggle_todo(&mut self, id: RecordId) -> Option<bool> {
        let todo = self.todo_list.iter_mut().find(|t| t.id == id)?;
        todo.completed = !todo.completed;
        Some(todo.completed)
    }

    /// Largest record id in any list, for seeding an [`IdSource`].
    pub fn max_record_id(&self) -> RecordId {
        self.guest_list
            .iter()
            .map(Record::id)
            .chain(self.budget.expenses.iter().map(Record::id))
            .chain(self.todo_list.iter().map(Record::id))
            .chain(self.venues.iter().map(Record::id))
            .chain(self.vendors.iter().map(Record::id))
            .max()
            .unwrap_or(0)
    }
}

// =============================================================================
// Proposal document
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalTodo {
    pub id: RecordId,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProposalPlan {
    pub todo_list: Vec<ProposalTodo>,
}

impl ProposalPlan {
    pub fn initial() -> Self {
        Self {
            todo_list: vec![ProposalTodo {
                id: 1,
                text: "Research rings".to_string(),
                completed: false,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seating::SeatTarget;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn initial_state_is_one_year_out_with_four_tables() {
        let state = PlanningState::initial(date("2026-10-19"));
        assert_eq!(state.wedding_date, Some(date("2027-10-19")));
        assert_eq!(state.budget.estimated, 10_000.0);
        assert_eq!(state.seating_plan.table_names().count(), 4);
    }

    #[test]
    fn from_dream_seeds_budget_and_tasks() {
        let dream = DreamState {
            theme: "Rustic Bohemian".to_string(),
            budget: 18_000.0,
            ..Default::default()
        };
        let state = PlanningState::from_dream(&dream, date("2026-10-19"), 500);
        assert_eq!(state.budget.estimated, 18_000.0);
        assert_eq!(state.todo_list.len(), 2);
        assert!(state.todo_list[0].completed);
        assert_eq!(state.todo_list[1].id, 501);
        assert_eq!(state.todo_list[1].due_date, date("2026-10-26"));
        assert!(state.todo_list[1].task.contains("\"Rustic Bohemian\""));
    }

    #[test]
    fn delete_guest_cascades_into_seating() {
        let mut state = PlanningState::initial(date("2026-10-19"));
        state.guest_list.push(GuestRecord::new(1, "Ada"));
        state.guest_list.push(GuestRecord::new(2, "Grace"));
        state
            .seating_plan
            .move_guest(1, &SeatTarget::table("Table 1"))
            .unwrap();

        let removed = state.delete_guest(1).unwrap();
        assert_eq!(removed.name, "Ada");
        assert_eq!(state.seating_plan.table_of(1), None);
        assert_eq!(state.guest_ids().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut guests = vec![GuestRecord::new(1, "Ada")];
        assert!(!upsert_record(&mut guests, GuestRecord::new(1, "Ada L.")));
        assert!(upsert_record(&mut guests, GuestRecord::new(2, "Grace")));
        assert_eq!(guests[0].name, "Ada L.");
        assert_eq!(guests.len(), 2);
    }

    #[test]
    fn scouted_venue_becomes_record() {
        let venue = GeneratedVenue {
            name: "Rosewood Barn".to_string(),
            location: "Hudson, NY".to_string(),
            aesthetic_description: "Rustic barn with string lights".to_string(),
            estimated_price: Some(12_500.0),
            website_url: "rosewoodbarn.com".to_string(),
            image_url: String::new(),
        };
        let record = VenueRecord::from_generated(42, &venue);
        assert_eq!(record.id, 42);
        assert_eq!(record.notes, "Aesthetic: Rustic barn with string lights.");
        assert_eq!(record.price, 12_500.0);
        assert_eq!(record.capacity, "");

        let bare = VenueRecord::from_generated(43, &GeneratedVenue::default());
        assert_eq!(bare.notes, "Aesthetic: N/A.");
        assert_eq!(bare.price, 0.0);
    }

    #[test]
    fn ensure_protocol_adds_https() {
        assert_eq!(ensure_protocol("example.com"), "https://example.com");
        assert_eq!(ensure_protocol("HTTP://example.com"), "HTTP://example.com");
        assert_eq!(ensure_protocol(""), "");
    }

    #[test]
    fn id_source_never_repeats() {
        let mut ids = IdSource::new();
        assert_eq!(ids.next(1_000), 1_000);
        assert_eq!(ids.next(1_000), 1_001);
        assert_eq!(ids.reserve(1_000, 3), 1_002);
        assert_eq!(ids.next(999), 1_005);
        ids.observe(2_000);
        assert_eq!(ids.next(1_500), 2_001);
    }

    #[test]
    fn patch_lists_only_named_fields() {
        let state = PlanningState::initial(date("2026-10-19"));
        let patch = state.patch(&[PlanningField::Budget, PlanningField::SeatingPlan]);
        assert_eq!(
            patch.fields(),
            vec![PlanningField::Budget, PlanningField::SeatingPlan]
        );
        let json = serde_json::to_value(&patch).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"seatingPlan".to_string()));
    }

    #[test]
    fn snapshot_with_missing_fields_uses_defaults() {
        let state: PlanningState =
            serde_json::from_value(serde_json::json!({"guestList": [{"id": 7, "name": "Lin"}]}))
                .unwrap();
        assert_eq!(state.guest_list[0].status, GuestStatus::Pending);
        assert_eq!(state.budget.estimated, 10_000.0);
        assert_eq!(state.seating_plan.table_names().count(), 4);
    }

    #[test]
    fn vendor_and_expense_fields_survive_a_rewrite() {
        let state: PlanningState = serde_json::from_value(serde_json::json!({
            "vendors": [{
                "id": 4, "name": "Lens & Light", "service": "Photography",
                "contact": "hi@lens.com", "price": 3200, "notes": "8 hours"
            }],
            "budget": {"estimated": 20000, "expenses": [
                {"id": 5, "item": "Deposit", "category": "Photo", "actual": 800, "vendor": "Lens & Light"}
            ]}
        }))
        .unwrap();
        assert_eq!(state.vendors[0].service, "Photography");
        assert_eq!(state.vendors[0].price, 3200.0);
        assert_eq!(state.budget.expenses[0].vendor, "Lens & Light");

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["vendors"][0]["service"], "Photography");
        assert_eq!(json["vendors"][0]["price"], 3200.0);
        assert_eq!(json["budget"]["expenses"][0]["vendor"], "Lens & Light");

        let legacy: VendorRecord =
            serde_json::from_value(serde_json::json!({"id": 1, "name": "DJ", "category": "Music"}))
                .unwrap();
        assert_eq!(legacy.service, "Music");
    }
}
