//! One user's planning session: the single owner of local state.
//!
//! Every change goes through a reducer entry point, which updates the local
//! state optimistically and queues the changed top-level keys in the outbox.
//! Store snapshots replace local state except for keys that still have a
//! local write in flight.

use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};
use vowplan_core::{
    DashboardStats, DreamState, Expense, GeneratedVenue, GuestRecord, IdSource, MergeError,
    PaletteError, PlanningField, PlanningState, ProposalPlan, ProposalTodo, RecordId, SeatTarget,
    SeatingError, StyleUpdate, TodoItem, VendorRecord, VenueRecord, WriteMode, merge, merge_fields,
    remove_record, repair_seating, upsert_record, validate_planning_state,
};
use vowplan_llm::{AiError, GenerateBackend, GenerateOptions, PaletteOutcome, VenueQuery};

use crate::events::{Notice, SessionEvent};
use crate::outbox::{FlushReport, Outbox, OutboxConfig};
use crate::sequence::{RequestKind, RequestSequence, RequestTicket};
use crate::store::{Collection, DocKey, DocumentStore, StoreError, Subscription};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Seating(#[from] SeatingError),

    #[error(transparent)]
    Palette(#[from] PaletteError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("Unknown guest {0}")]
    UnknownGuest(RecordId),

    #[error("No record with id {0}")]
    UnknownRecord(RecordId),

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Changes to the planning document.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanningAction {
    SetWeddingDate(NaiveDate),
    SetEstimatedBudget(f64),
    UpsertGuest(GuestRecord),
    /// Also unseats the guest.
    DeleteGuest(RecordId),
    UpsertExpense(Expense),
    DeleteExpense(RecordId),
    UpsertTodo(TodoItem),
    DeleteTodo(RecordId),
    ToggleTodo(RecordId),
    UpsertVenue(VenueRecord),
    DeleteVenue(RecordId),
    UpsertVendor(VendorRecord),
    DeleteVendor(RecordId),
    MoveGuest { guest: RecordId, target: SeatTarget },
    /// Generated tasks; ids are reassigned on the way in.
    AddTasks(Vec<TodoItem>),
    /// Save a scouted venue to the venue list.
    SaveVenue(GeneratedVenue),
}

/// Changes to the dream simulator document.
#[derive(Debug, Clone, PartialEq)]
pub enum DreamAction {
    SelectTheme(String),
    SetBaseColor(String),
    SetBudget(f64),
    UpdateStyle(StyleUpdate),
    SavePalette,
    ApplySavedPalette(RecordId),
    DeleteSavedPalette(RecordId),
}

/// Changes to the proposal document.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalAction {
    AddTodo(String),
    ToggleTodo(RecordId),
    DeleteTodo(RecordId),
}

/// What became of a generation result.
#[derive(Debug)]
pub enum GenerationOutcome {
    Applied { count: usize, fallback: bool },
    /// A newer request of the same kind was started meanwhile.
    Discarded,
    /// State was left untouched.
    Failed(AiError),
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>, SessionError> {
    Ok(vowplan_core::merge::into_object(serde_json::to_value(value)?)?)
}

pub struct PlanningSession<S: DocumentStore> {
    user: String,
    store: Arc<S>,
    planning: PlanningState,
    dream: DreamState,
    proposal: ProposalPlan,
    venue_results: Vec<GeneratedVenue>,
    outbox: Outbox,
    subscriptions: Vec<(Collection, Subscription)>,
    sequence: RequestSequence,
    ids: IdSource,
    event_tx: Option<Sender<SessionEvent>>,
}

impl<S: DocumentStore> PlanningSession<S> {
    /// Subscribe to the user's three documents, creating any that are
    /// missing, and apply the first snapshots.
    pub async fn open(
        store: Arc<S>,
        user: impl Into<String>,
        config: OutboxConfig,
    ) -> Result<Self, SessionError> {
        Self::open_with_events(store, user, config, None).await
    }

    pub async fn open_with_events(
        store: Arc<S>,
        user: impl Into<String>,
        config: OutboxConfig,
        event_tx: Option<Sender<SessionEvent>>,
    ) -> Result<Self, SessionError> {
        let user = user.into();
        let subscriptions = Collection::ALL
            .iter()
            .map(|c| (*c, store.subscribe(*c, &user)))
            .collect();

        let mut session = Self {
            user,
            store,
            planning: PlanningState::default(),
            dream: DreamState::default(),
            proposal: ProposalPlan::default(),
            venue_results: Vec::new(),
            outbox: Outbox::new(config),
            subscriptions,
            sequence: RequestSequence::new(),
            ids: IdSource::new(),
            event_tx,
        };
        info!(user = %session.user, "Opening planning session");
        session.poll_snapshots()?;
        session.flush().await;
        session.poll_snapshots()?;
        Ok(session)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn planning(&self) -> &PlanningState {
        &self.planning
    }

    pub fn dream(&self) -> &DreamState {
        &self.dream
    }

    pub fn proposal(&self) -> &ProposalPlan {
        &self.proposal
    }

    /// Venues from the last search, not yet saved.
    pub fn venue_results(&self) -> &[GeneratedVenue] {
        &self.venue_results
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn stats(&self, today: NaiveDate) -> DashboardStats {
        DashboardStats::compute(&self.planning, today)
    }

    /// A fresh record id.
    pub fn next_id(&mut self) -> RecordId {
        self.ids.next(now_millis())
    }

    fn doc(&self, collection: Collection) -> DocKey {
        DocKey::new(collection, self.user.clone())
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.event_tx
            && let Err(e) = tx.try_send(event)
        {
            error!("Failed to send session event: {}", e);
        }
    }

    fn notify_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.emit(SessionEvent::Notice(Notice::error(message)));
    }

    // ── Planning reducer ────────────────────────────────────────

    /// Apply a planning change locally and queue it for persistence.
    ///
    /// On error nothing changes and nothing is queued.
    pub fn apply(&mut self, action: PlanningAction) -> Result<(), SessionError> {
        let mut next = self.planning.clone();
        let fields = reduce_planning(&mut next, action, &mut self.ids)?;
        if fields.is_empty() {
            return Ok(());
        }
        let patch = next.patch(&fields);
        self.planning = merge(&self.planning, &patch, WriteMode::Merge)?;
        self.outbox
            .enqueue(self.doc(Collection::Planning), to_object(&patch)?, WriteMode::Merge);
        debug!(fields = ?fields, "Planning update queued");
        Ok(())
    }

    fn enqueue_planning(&mut self, fields: &[PlanningField]) -> Result<(), SessionError> {
        let patch = self.planning.patch(fields);
        self.outbox
            .enqueue(self.doc(Collection::Planning), to_object(&patch)?, WriteMode::Merge);
        Ok(())
    }

    /// Start planning from the dream simulator: replaces the planning
    /// document with one seeded from the dream.
    pub fn start_planning(&mut self, today: NaiveDate) -> Result<(), SessionError> {
        let first_id = self.ids.reserve(now_millis(), 2);
        self.planning = PlanningState::from_dream(&self.dream, today, first_id);
        self.outbox.enqueue(
            self.doc(Collection::Planning),
            to_object(&self.planning)?,
            WriteMode::Replace,
        );
        info!(theme = %self.dream.theme, budget = self.dream.budget, "Started planning from dream");
        self.emit(SessionEvent::Notice(Notice::info("Your planning dashboard is ready.")));
        Ok(())
    }

    // ── Dream and proposal reducers ─────────────────────────────

    pub fn apply_dream(&mut self, action: DreamAction) -> Result<(), SessionError> {
        let mut next = self.dream.clone();
        match action {
            DreamAction::SelectTheme(name) => next.select_theme(&name)?,
            DreamAction::SetBaseColor(color) => next.set_base_color(&color)?,
            DreamAction::SetBudget(budget) => next.budget = budget,
            DreamAction::UpdateStyle(update) => next.styles.apply(update),
            DreamAction::SavePalette => {
                let id = self.ids.next(now_millis());
                if !next.save_palette(id) {
                    debug!("Palette already saved");
                    return Ok(());
                }
            }
            DreamAction::ApplySavedPalette(id) => next.apply_saved_palette(id)?,
            DreamAction::DeleteSavedPalette(id) => {
                if !next.delete_saved_palette(id) {
                    return Err(SessionError::UnknownRecord(id));
                }
            }
        }
        self.set_dream(next)
    }

    fn set_dream(&mut self, next: DreamState) -> Result<(), SessionError> {
        let update = to_object(&next)?;
        self.dream = next;
        self.outbox
            .enqueue(self.doc(Collection::Simulator), update, WriteMode::Merge);
        Ok(())
    }

    pub fn apply_proposal(&mut self, action: ProposalAction) -> Result<(), SessionError> {
        let mut next = self.proposal.clone();
        match action {
            ProposalAction::AddTodo(text) => next.todo_list.push(ProposalTodo {
                id: self.ids.next(now_millis()),
                text,
                completed: false,
            }),
            ProposalAction::ToggleTodo(id) => {
                let todo = next
                    .todo_list
                    .iter_mut()
                    .find(|t| t.id == id)
                    .ok_or(SessionError::UnknownRecord(id))?;
                todo.completed = !todo.completed;
            }
            ProposalAction::DeleteTodo(id) => {
                remove_record(&mut next.todo_list, id).ok_or(SessionError::UnknownRecord(id))?;
            }
        }
        let update = to_object(&next)?;
        self.proposal = next;
        self.outbox
            .enqueue(self.doc(Collection::Proposal), update, WriteMode::Merge);
        Ok(())
    }

    // ── Generation results ──────────────────────────────────────

    pub fn begin_request(&self, kind: RequestKind) -> RequestTicket {
        self.sequence.begin(kind)
    }

    fn is_stale(&self, ticket: &RequestTicket) -> bool {
        if self.sequence.is_current(ticket) {
            return false;
        }
        info!(kind = ?ticket.kind, seq = ticket.seq, "Discarding superseded generation result");
        self.emit(SessionEvent::Discarded(ticket.kind));
        true
    }

    pub fn apply_tasks(
        &mut self,
        ticket: RequestTicket,
        result: Result<Vec<TodoItem>, AiError>,
    ) -> Result<GenerationOutcome, SessionError> {
        if self.is_stale(&ticket) {
            return Ok(GenerationOutcome::Discarded);
        }
        match result {
            Ok(tasks) => {
                let count = tasks.len();
                self.apply(PlanningAction::AddTasks(tasks))?;
                self.emit(SessionEvent::TasksAdded(count));
                Ok(GenerationOutcome::Applied {
                    count,
                    fallback: false,
                })
            }
            Err(e) => {
                self.notify_error(e.user_message());
                Ok(GenerationOutcome::Failed(e))
            }
        }
    }

    /// Replace the venue search results. On failure the results are cleared;
    /// the saved venue list is never touched.
    pub fn apply_venues(
        &mut self,
        ticket: RequestTicket,
        result: Result<Vec<GeneratedVenue>, AiError>,
    ) -> GenerationOutcome {
        if self.is_stale(&ticket) {
            return GenerationOutcome::Discarded;
        }
        match result {
            Ok(venues) => {
                let count = venues.len();
                self.venue_results = venues;
                self.emit(SessionEvent::VenuesFound(count));
                GenerationOutcome::Applied {
                    count,
                    fallback: false,
                }
            }
            Err(e) => {
                self.venue_results.clear();
                self.notify_error(e.user_message());
                GenerationOutcome::Failed(e)
            }
        }
    }

    /// Install a generated palette. Dependent styles are derived only from a
    /// real generation; the fallback palette leaves them alone.
    pub fn apply_palette(
        &mut self,
        ticket: RequestTicket,
        outcome: PaletteOutcome,
        explicit_regenerate: bool,
    ) -> Result<GenerationOutcome, SessionError> {
        if self.is_stale(&ticket) {
            return Ok(GenerationOutcome::Discarded);
        }
        let mut next = self.dream.clone();
        let fallback = match outcome {
            PaletteOutcome::Generated(palette) => {
                next.apply_palette(palette, explicit_regenerate);
                false
            }
            PaletteOutcome::Fallback { palette, reason } => {
                next.set_palette(palette);
                self.notify_error(format!("Could not generate a palette ({}). Using a default palette.", reason));
                true
            }
        };
        self.set_dream(next)?;
        self.emit(SessionEvent::PaletteApplied { fallback });
        Ok(GenerationOutcome::Applied { count: 1, fallback })
    }

    /// Ask the backend for planning tasks and add them.
    pub async fn generate_tasks(
        &mut self,
        backend: &impl GenerateBackend,
        options: &GenerateOptions,
    ) -> Result<GenerationOutcome, SessionError> {
        let ticket = self.begin_request(RequestKind::Tasks);
        let result = match self.planning.wedding_date {
            Some(date) => vowplan_llm::generate_tasks(backend, date, now_millis(), options).await,
            None => Err(AiError::InvalidRequest(
                "Please set a wedding date first.".to_string(),
            )),
        };
        self.apply_tasks(ticket, result)
    }

    pub async fn find_venues(
        &mut self,
        backend: &impl GenerateBackend,
        query: &VenueQuery,
        options: &GenerateOptions,
    ) -> GenerationOutcome {
        let ticket = self.begin_request(RequestKind::Venues);
        let result = vowplan_llm::find_venues(backend, query, options).await;
        self.apply_venues(ticket, result)
    }

    pub async fn generate_palette(
        &mut self,
        backend: &impl GenerateBackend,
        explicit_regenerate: bool,
    ) -> Result<GenerationOutcome, SessionError> {
        let ticket = self.begin_request(RequestKind::Palette);
        let base = self.dream.palette.base().to_string();
        let theme = self.dream.theme.clone();
        let outcome = vowplan_llm::generate_palette(backend, &base, &theme).await;
        self.apply_palette(ticket, outcome, explicit_regenerate)
    }

    /// Save the search result at `index` to the venue list.
    pub fn save_venue_result(&mut self, index: usize) -> Result<RecordId, SessionError> {
        let venue = self
            .venue_results
            .get(index)
            .cloned()
            .ok_or(SessionError::UnknownRecord(index as RecordId))?;
        self.apply(PlanningAction::SaveVenue(venue))?;
        Ok(self.planning.venues.last().map(|v| v.id).unwrap_or_default())
    }

    // ── Persistence ─────────────────────────────────────────────

    /// Write whatever is due. Writes that exhaust their retries are
    /// reported as events; local state keeps their values.
    pub async fn flush(&mut self) -> FlushReport {
        let report = self.outbox.flush(&*self.store).await;
        self.report_dead_letters(&report.failed);
        report
    }

    /// Flush until every queued write has landed or been given up on, then
    /// apply the resulting snapshots.
    pub async fn sync(&mut self) -> Result<FlushReport, SessionError> {
        let report = self.outbox.drain(&*self.store).await;
        self.report_dead_letters(&report.failed);
        self.poll_snapshots()?;
        Ok(report)
    }

    /// Give writes that were given up on another full round of attempts.
    pub async fn retry_failed_writes(&mut self) -> Result<FlushReport, SessionError> {
        let requeued = self.outbox.requeue_dead_letters();
        if requeued > 0 {
            info!(count = requeued, "Retrying failed writes");
        }
        self.sync().await
    }

    /// Forget writes that were given up on and reload the affected
    /// documents, dropping the unsaved local values.
    pub async fn discard_failed_writes(&mut self) -> Result<usize, SessionError> {
        let docs = self.outbox.discard_dead_letters();
        for doc in &docs {
            warn!("Discarding unsaved changes to {}", doc);
            let snapshot = self.store.get(doc.collection, &doc.key).await?;
            self.on_snapshot(doc.collection, snapshot)?;
        }
        Ok(docs.len())
    }

    fn report_dead_letters(&self, failed: &[DocKey]) {
        for letter in failed.iter().filter_map(|doc| self.outbox.dead_letter(doc)) {
            error!("Persistence failed for {}: {}", letter.doc, letter.reason);
            self.emit(SessionEvent::PersistenceFailed {
                collection: letter.doc.collection,
                reason: letter.reason.clone(),
            });
        }
    }

    // ── Snapshots ───────────────────────────────────────────────

    /// Apply any snapshots that arrived since the last poll. Returns how
    /// many were applied.
    pub fn poll_snapshots(&mut self) -> Result<usize, SessionError> {
        let arrived: Vec<(Collection, Option<Value>)> = self
            .subscriptions
            .iter_mut()
            .filter_map(|(c, sub)| sub.try_next().map(|snapshot| (*c, snapshot)))
            .collect();
        let count = arrived.len();
        for (collection, snapshot) in arrived {
            self.on_snapshot(collection, snapshot)?;
        }
        Ok(count)
    }

    /// Reconcile a store snapshot with local state. `None` means the
    /// document does not exist yet and is created.
    pub fn on_snapshot(&mut self, collection: Collection, snapshot: Option<Value>) -> Result<(), SessionError> {
        let Some(snapshot) = snapshot else {
            return self.write_initial(collection);
        };

        match collection {
            Collection::Planning => {
                let Some(mut state) = self.reconcile::<PlanningState>(collection, snapshot) else {
                    return Ok(());
                };
                let unseated = repair_seating(&mut state);
                self.ids.observe(state.max_record_id());
                self.planning = state;
                if !unseated.is_empty() {
                    warn!(guests = ?unseated, "Dropped invalid seat assignments from snapshot");
                    self.enqueue_planning(&[PlanningField::SeatingPlan])?;
                }
                if let Err(e) = validate_planning_state(&self.planning) {
                    warn!("Planning document for {} is inconsistent: {}", self.user, e);
                }
            }
            Collection::Simulator => {
                let Some(dream) = self.reconcile::<DreamState>(collection, snapshot) else {
                    return Ok(());
                };
                if let Some(max) = dream.saved_palettes.iter().map(|p| p.id).max() {
                    self.ids.observe(max);
                }
                self.dream = dream;
            }
            Collection::Proposal => {
                let Some(proposal) = self.reconcile::<ProposalPlan>(collection, snapshot) else {
                    return Ok(());
                };
                if let Some(max) = proposal.todo_list.iter().map(|t| t.id).max() {
                    self.ids.observe(max);
                }
                self.proposal = proposal;
            }
        }
        self.emit(SessionEvent::SnapshotApplied(collection));
        Ok(())
    }

    /// The snapshot with any unsaved local keys (queued or given up on) laid
    /// over it, or `None` if local state should be kept as is.
    fn reconcile<T: DeserializeOwned>(&self, collection: Collection, snapshot: Value) -> Option<T> {
        let doc = self.doc(collection);
        let Value::Object(mut remote) = snapshot else {
            warn!("Ignoring non-object snapshot for {}", doc);
            return None;
        };
        if let Some(unsaved) = self.outbox.unsaved(&doc) {
            if unsaved.mode == WriteMode::Replace {
                debug!("Local replace of {} not yet stored, keeping local state", doc);
                return None;
            }
            merge_fields(&mut remote, unsaved.doc, WriteMode::Merge);
        }
        match serde_json::from_value(Value::Object(remote)) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring unreadable snapshot for {}: {}", doc, e);
                None
            }
        }
    }

    fn write_initial(&mut self, collection: Collection) -> Result<(), SessionError> {
        let doc = self.doc(collection);
        if self.outbox.unsaved(&doc).is_some() {
            return Ok(());
        }
        info!("Creating initial document {}", doc);
        let initial = match collection {
            Collection::Planning => {
                self.planning = PlanningState::initial(today());
                to_object(&self.planning)?
            }
            Collection::Simulator => {
                self.dream = DreamState::default();
                to_object(&self.dream)?
            }
            Collection::Proposal => {
                self.proposal = ProposalPlan::initial();
                to_object(&self.proposal)?
            }
        };
        self.outbox.enqueue(doc, initial, WriteMode::Replace);
        Ok(())
    }
}

/// Apply `action` to `state`, returning the top-level fields it changed.
fn reduce_planning(
    state: &mut PlanningState,
    action: PlanningAction,
    ids: &mut IdSource,
) -> Result<Vec<PlanningField>, SessionError> {
    use PlanningField as F;

    let fields = match action {
        PlanningAction::SetWeddingDate(date) => {
            state.wedding_date = Some(date);
            vec![F::WeddingDate]
        }
        PlanningAction::SetEstimatedBudget(amount) => {
            state.budget.estimated = amount;
            vec![F::Budget]
        }
        PlanningAction::UpsertGuest(guest) => {
            ids.observe(guest.id);
            upsert_record(&mut state.guest_list, guest);
            vec![F::GuestList]
        }
        PlanningAction::DeleteGuest(id) => {
            state.delete_guest(id).ok_or(SessionError::UnknownGuest(id))?;
            vec![F::GuestList, F::SeatingPlan]
        }
        PlanningAction::UpsertExpense(expense) => {
            ids.observe(expense.id);
            upsert_record(&mut state.budget.expenses, expense);
            vec![F::Budget]
        }
        PlanningAction::DeleteExpense(id) => {
            remove_record(&mut state.budget.expenses, id).ok_or(SessionError::UnknownRecord(id))?;
            vec![F::Budget]
        }
        PlanningAction::UpsertTodo(todo) => {
            ids.observe(todo.id);
            upsert_record(&mut state.todo_list, todo);
            vec![F::TodoList]
        }
        PlanningAction::DeleteTodo(id) => {
            remove_record(&mut state.todo_list, id).ok_or(SessionError::UnknownRecord(id))?;
            vec![F::TodoList]
        }
        PlanningAction::ToggleTodo(id) => {
            state.toggle_todo(id).ok_or(SessionError::UnknownRecord(id))?;
            vec![F::TodoList]
        }
        PlanningAction::UpsertVenue(venue) => {
            ids.observe(venue.id);
            upsert_record(&mut state.venues, venue);
            vec![F::Venues]
        }
        PlanningAction::DeleteVenue(id) => {
            remove_record(&mut state.venues, id).ok_or(SessionError::UnknownRecord(id))?;
            vec![F::Venues]
        }
        PlanningAction::UpsertVendor(vendor) => {
            ids.observe(vendor.id);
            upsert_record(&mut state.vendors, vendor);
            vec![F::Vendors]
        }
        PlanningAction::DeleteVendor(id) => {
            remove_record(&mut state.vendors, id).ok_or(SessionError::UnknownRecord(id))?;
            vec![F::Vendors]
        }
        PlanningAction::MoveGuest { guest, target } => {
            if state.find_guest(guest).is_none() {
                return Err(SessionError::UnknownGuest(guest));
            }
            state.seating_plan.move_guest(guest, &target)?;
            vec![F::SeatingPlan]
        }
        PlanningAction::AddTasks(tasks) => {
            if tasks.is_empty() {
                return Ok(Vec::new());
            }
            let base = ids.reserve(now_millis(), tasks.len());
            state
                .todo_list
                .extend(tasks.into_iter().enumerate().map(|(i, task)| TodoItem {
                    id: base + i as RecordId,
                    completed: false,
                    ..task
                }));
            vec![F::TodoList]
        }
        PlanningAction::SaveVenue(venue) => {
            let id = ids.next(now_millis());
            state.venues.push(VenueRecord::from_generated(id, &venue));
            vec![F::Venues]
        }
    };
    Ok(fields)
}
