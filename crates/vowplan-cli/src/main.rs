mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vowplan_core::{
    Expense, GuestRecord, GuestStatus, PlanningState, SeatTarget, THEMES, TodoItem, ensure_protocol,
};
use vowplan_engine::{
    DreamAction, FileStore, GenerationOutcome, PlanningAction, PlanningSession, ProposalAction,
};
use vowplan_llm::{GenerationClient, VenueQuery};

use config::{AppConfig, default_data_dir};

// ── CLI ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vowplan", about = "Plan a wedding from the terminal")]
struct Cli {
    /// Directory holding documents, logs and the local identity
    #[arg(long, env = "VOWPLAN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Document key to plan under (defaults to this machine's identity)
    #[arg(long, env = "VOWPLAN_USER")]
    user: Option<String>,

    /// Send unusable AI answers back for correction this many times
    #[arg(long, default_value_t = 0)]
    repair: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dashboard figures
    Status,
    /// Set the wedding date (YYYY-MM-DD)
    Date { date: NaiveDate },
    /// Set the estimated budget
    Budget { amount: f64 },
    #[command(subcommand)]
    Guest(GuestCommand),
    /// Move a guest to a table, or to "unseated"
    Seat { guest: i64, target: SeatTarget },
    /// Show tables and unseated guests
    Seating,
    #[command(subcommand)]
    Expense(ExpenseCommand),
    #[command(subcommand)]
    Todo(TodoCommand),
    /// Generate planning tasks with AI
    Tasks,
    /// Find venues with AI
    Venues {
        #[arg(long)]
        location: String,
        #[arg(long)]
        budget: String,
        /// Save the result at this position (1-based)
        #[arg(long)]
        save: Option<usize>,
    },
    /// List saved venues
    SavedVenues,
    /// Pick a dream theme
    Theme { name: String },
    /// Set the palette's base colour (#rrggbb)
    BaseColor { color: String },
    /// Set the dream budget
    DreamBudget { amount: f64 },
    /// Generate a palette from the current base colour
    Palette {
        /// Overwrite customised bridesmaid and suit colours too
        #[arg(long)]
        restyle: bool,
    },
    /// Save the current palette
    SavePalette,
    /// Show the dream simulator state
    Dream,
    /// Replace the planning dashboard with one seeded from the dream
    StartPlanning,
    #[command(subcommand)]
    Proposal(ProposalCommand),
}

#[derive(Subcommand)]
enum GuestCommand {
    Add {
        name: String,
        #[arg(long, default_value = "")]
        group: String,
        #[arg(long, value_enum, default_value_t = StatusArg::Pending)]
        status: StatusArg,
    },
    Rm { id: i64 },
    List,
}

#[derive(Subcommand)]
enum ExpenseCommand {
    Add {
        item: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value_t = 0.0)]
        estimated: f64,
        #[arg(long, default_value_t = 0.0)]
        actual: f64,
        #[arg(long, default_value = "")]
        vendor: String,
    },
    Rm { id: i64 },
}

#[derive(Subcommand)]
enum TodoCommand {
    Add {
        task: String,
        #[arg(long)]
        due: NaiveDate,
    },
    Toggle { id: i64 },
    List,
}

#[derive(Subcommand)]
enum ProposalCommand {
    Add { text: String },
    Toggle { id: i64 },
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Attending,
    Declined,
}

impl From<StatusArg> for GuestStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Pending => GuestStatus::Pending,
            StatusArg::Attending => GuestStatus::Attending,
            StatusArg::Declined => GuestStatus::Declined,
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────

fn init_logging(log_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("vowplan")
        .filename_suffix("txt")
        .build(log_dir)
        .context("Failed to create log file appender")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_filter = EnvFilter::new("debug");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(file_filter),
        )
        .init();
    Ok(guard)
}

// ── Commands ────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let config = AppConfig::load(data_dir, cli.user, cli.repair)?;
    let _guard = init_logging(&config.log_dir())?;

    info!(user = %config.user, data_dir = %config.data_dir.display(), "vowplan starting");

    let store = Arc::new(FileStore::new(config.store_dir()));
    let mut session = PlanningSession::open(store, config.user.clone(), config.outbox.clone())
        .await
        .context("Failed to open planning session")?;

    run(&mut session, &config, cli.command).await?;

    let mut report = session.sync().await.context("Failed to sync")?;
    if report.dead > 0 {
        report = session
            .retry_failed_writes()
            .await
            .context("Failed to sync")?;
    }
    if report.dead > 0 {
        bail!("{} change(s) could not be saved; see the log for details", report.dead);
    }
    Ok(())
}

async fn run(session: &mut PlanningSession<FileStore>, config: &AppConfig, command: Command) -> Result<()> {
    let today = Local::now().date_naive();

    match command {
        Command::Status => print_status(session, today),
        Command::Date { date } => session.apply(PlanningAction::SetWeddingDate(date))?,
        Command::Budget { amount } => session.apply(PlanningAction::SetEstimatedBudget(amount))?,

        Command::Guest(GuestCommand::Add { name, group, status }) => {
            let id = session.next_id();
            session.apply(PlanningAction::UpsertGuest(GuestRecord {
                group,
                status: status.into(),
                ..GuestRecord::new(id, name)
            }))?;
            println!("Added guest {}", id);
        }
        Command::Guest(GuestCommand::Rm { id }) => session.apply(PlanningAction::DeleteGuest(id))?,
        Command::Guest(GuestCommand::List) => {
            for g in &session.planning().guest_list {
                println!("{:>15}  {:<24} {:<12} {:?}", g.id, g.name, g.group, g.status);
            }
        }

        Command::Seat { guest, target } => {
            session.apply(PlanningAction::MoveGuest { guest, target })?;
        }
        Command::Seating => print_seating(session.planning()),

        Command::Expense(ExpenseCommand::Add {
            item,
            category,
            estimated,
            actual,
            vendor,
        }) => {
            let id = session.next_id();
            session.apply(PlanningAction::UpsertExpense(Expense {
                id,
                item,
                category,
                estimated,
                actual,
                vendor,
            }))?;
        }
        Command::Expense(ExpenseCommand::Rm { id }) => {
            session.apply(PlanningAction::DeleteExpense(id))?;
        }

        Command::Todo(TodoCommand::Add { task, due }) => {
            let id = session.next_id();
            session.apply(PlanningAction::UpsertTodo(TodoItem {
                id,
                task,
                due_date: due,
                completed: false,
            }))?;
        }
        Command::Todo(TodoCommand::Toggle { id }) => session.apply(PlanningAction::ToggleTodo(id))?,
        Command::Todo(TodoCommand::List) => {
            for t in &session.planning().todo_list {
                let mark = if t.completed { "x" } else { " " };
                println!("[{}] {:>15}  {}  {}", mark, t.id, t.due_date, t.task);
            }
        }

        Command::Tasks => {
            let client = GenerationClient::new(config.generation.clone());
            match session.generate_tasks(&client, &config.generate).await? {
                GenerationOutcome::Applied { count, .. } => println!("Added {} tasks", count),
                GenerationOutcome::Failed(e) => bail!(e.user_message()),
                GenerationOutcome::Discarded => {}
            }
        }
        Command::Venues {
            location,
            budget,
            save,
        } => {
            let client = GenerationClient::new(config.generation.clone());
            let query = VenueQuery::new(location, budget);
            if let GenerationOutcome::Failed(e) =
                session.find_venues(&client, &query, &config.generate).await
            {
                bail!(e.user_message());
            }
            for (i, v) in session.venue_results().iter().enumerate() {
                let price = v
                    .estimated_price
                    .map(|p| format!("${:.0}", p))
                    .unwrap_or_else(|| "price n/a".to_string());
                println!("{}. {} ({}) {}", i + 1, v.name, v.location, price);
                println!("   {}", v.aesthetic_description);
                println!("   {}", ensure_protocol(&v.website_url));
            }
            if let Some(position) = save {
                let index = position
                    .checked_sub(1)
                    .context("Venue positions start at 1")?;
                let id = session.save_venue_result(index)?;
                println!("Saved venue {}", id);
            }
        }
        Command::SavedVenues => {
            for v in &session.planning().venues {
                println!("{:>15}  {}  {}  ${:.0}", v.id, v.name, v.location, v.price);
                println!("{:>15}  {}", "", v.notes);
            }
        }

        Command::Theme { name } => session.apply_dream(DreamAction::SelectTheme(name))?,
        Command::BaseColor { color } => session.apply_dream(DreamAction::SetBaseColor(color))?,
        Command::DreamBudget { amount } => session.apply_dream(DreamAction::SetBudget(amount))?,
        Command::Palette { restyle } => {
            let client = GenerationClient::new(config.generation.clone());
            if let GenerationOutcome::Applied { fallback: true, .. } =
                session.generate_palette(&client, restyle).await?
            {
                println!("Could not generate a palette; using a default palette.");
            }
            println!("{}", session.dream().palette.colors().join(" "));
        }
        Command::SavePalette => session.apply_dream(DreamAction::SavePalette)?,
        Command::Dream => print_dream(session),
        Command::StartPlanning => session.start_planning(today)?,

        Command::Proposal(ProposalCommand::Add { text }) => {
            session.apply_proposal(ProposalAction::AddTodo(text))?;
        }
        Command::Proposal(ProposalCommand::Toggle { id }) => {
            session.apply_proposal(ProposalAction::ToggleTodo(id))?;
        }
        Command::Proposal(ProposalCommand::List) => {
            for t in &session.proposal().todo_list {
                let mark = if t.completed { "x" } else { " " };
                println!("[{}] {:>15}  {}", mark, t.id, t.text);
            }
        }
    }
    Ok(())
}

fn print_status(session: &PlanningSession<FileStore>, today: NaiveDate) {
    let stats = session.stats(today);
    match stats.countdown_days {
        Some(days) => println!("Countdown:  {} days", days),
        None => println!("Countdown:  no date set"),
    }
    println!(
        "Guests:     {} attending of {} ({} seated)",
        stats.guests_attending, stats.total_guests, stats.seated_guests
    );
    println!(
        "Budget:     ${:.0} spent of ${:.0}",
        stats.actual_spending, stats.estimated_budget
    );
    println!("Tasks:      {} of {} done", stats.tasks_completed, stats.total_tasks);
    for category in &stats.spending_by_category {
        println!("  {:<20} ${:.0}", category.name, category.value);
    }
}

fn print_seating(planning: &PlanningState) {
    let name = |id: i64| {
        planning
            .find_guest(id)
            .map(|g| g.name.clone())
            .unwrap_or_else(|| id.to_string())
    };
    for (table, ids) in planning.seating_plan.tables() {
        let names: Vec<String> = ids.iter().map(|id| name(*id)).collect();
        println!("{}: {}", table, names.join(", "));
    }
    let unseated: Vec<&str> = planning
        .unseated_guests()
        .iter()
        .map(|g| g.name.as_str())
        .collect();
    println!("Unseated: {}", unseated.join(", "));
}

fn print_dream(session: &PlanningSession<FileStore>) {
    let dream = session.dream();
    println!("Theme:    {}", dream.theme);
    println!("Palette:  {}", dream.palette.colors().join(" "));
    println!("Budget:   ${:.0} (estimated cost ${:.0})", dream.budget, dream.estimated_cost());
    println!("Bridesmaids: {}", dream.styles.bridesmaid_color);
    println!("Groom suit:  {}", dream.styles.groom_suit);
    for (label, color) in dream.suit_color_options() {
        println!("  suit option {:<14} {}", label, color);
    }
    for saved in &dream.saved_palettes {
        println!("Saved {}: {}", saved.id, saved.colors.colors().join(" "));
    }
    let themes: Vec<&str> = THEMES.iter().map(|t| t.name).collect();
    println!("Themes:   {}", themes.join(", "));
}
