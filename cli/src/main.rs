mod commands;
mod config;
mod http;
mod llm;
mod vision;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    PhotoReview, ProfileArgs, cmd_delete, cmd_edit, cmd_estimate, cmd_history, cmd_log_manual,
    cmd_log_photo, cmd_log_text, cmd_mood, cmd_onboard, cmd_profile_set, cmd_profile_show,
    cmd_select, cmd_summary, parse_item_quantity,
};
use crate::config::Config;
use crate::llm::LlmClient;
use crate::vision::VisionClient;
use nutriflow_core::models::{
    ActivityLevel, DEFAULT_UNIT, Gender, MAX_HISTORY_DAYS, ProfileInput,
};
use nutriflow_core::rate_limit::RateLimiter;
use nutriflow_core::service::FoodAnalyzer;
use nutriflow_core::store::StateStore;

#[derive(Parser)]
#[command(
    name = "nutriflow",
    version,
    about = "A local-first diet tracker: log food by photo, text or by hand"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up your profile and derive daily targets
    Onboard {
        /// Your name
        #[arg(long)]
        name: String,
        /// Age in years
        #[arg(long)]
        age: u32,
        /// male or female
        #[arg(long)]
        gender: Gender,
        /// Height in cm
        #[arg(long)]
        height: f64,
        /// Current weight in kg
        #[arg(long)]
        weight: f64,
        /// Target weight in kg
        #[arg(long)]
        target_weight: f64,
        /// sedentary, light, moderate, very, extra
        #[arg(long, default_value = "sedentary")]
        activity: ActivityLevel,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Log food to the selected date
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Delete an item from the selected date
    Delete {
        /// Item number as shown by `summary`
        item: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the quantity of an item on the selected date
    Edit {
        /// Item number as shown by `summary`
        item: usize,
        /// New quantity (must be greater than 0)
        quantity: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record how you felt on a day
    Mood {
        /// happy, sad, angry, bored, or none to clear
        mood: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: selected date)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Select the date that logging and editing apply to
    Select {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the day's items and progress (defaults to the selected date)
    Summary {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the last N days ending at the selected date
    History {
        /// Number of days to show
        #[arg(
            short,
            long,
            default_value = "7",
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_HISTORY_DAYS))
        )]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Estimate nutrition for a food without logging it
    Estimate {
        /// Food name
        name: String,
        /// Quantity
        #[arg(short, long, default_value = "1")]
        quantity: f64,
        /// Unit (e.g. 碗, 个, cup)
        #[arg(short, long, default_value = DEFAULT_UNIT)]
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show profile, BMI and targets
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update profile fields; targets stay unless --recalculate is given
    Set {
        #[arg(long)]
        name: Option<String>,
        /// Avatar image path or URL
        #[arg(long)]
        avatar: Option<String>,
        #[arg(long)]
        age: Option<u32>,
        #[arg(long)]
        gender: Option<Gender>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Target weight in kg
        #[arg(long)]
        target_weight: Option<f64>,
        #[arg(long)]
        activity: Option<ActivityLevel>,
        /// Re-derive daily targets from the body fields
        #[arg(long)]
        recalculate: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Describe what you ate, e.g. "一碗牛肉面"
    Text {
        description: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recognise food in a photo
    Photo {
        /// Path to a JPEG photo
        path: PathBuf,
        /// Drop a recognised item by its number (repeatable)
        #[arg(long, value_name = "ITEM")]
        skip: Vec<usize>,
        /// Change a recognised item's quantity, e.g. --qty 2=1.5 (repeatable)
        #[arg(long = "qty", value_name = "ITEM=QUANTITY", value_parser = parse_item_quantity)]
        quantities: Vec<(usize, f64)>,
        /// Show what was recognised without logging it
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Enter an item by hand
    Manual {
        /// Food name
        name: String,
        /// Calories for the whole amount
        #[arg(long)]
        calories: f64,
        /// Quantity
        #[arg(short, long, default_value = "1")]
        quantity: f64,
        /// Unit
        #[arg(short, long, default_value = DEFAULT_UNIT)]
        unit: String,
        /// Protein in grams
        #[arg(long)]
        protein: Option<f64>,
        /// Carbs in grams
        #[arg(long)]
        carbs: Option<f64>,
        /// Fat in grams
        #[arg(long)]
        fat: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nutriflow=warn,nutriflow_core=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let mut store = StateStore::open_file(&config.data_dir)?;
    let limiter = Arc::new(RateLimiter::default());
    let llm = LlmClient::new(&config.llm, Arc::clone(&limiter))?;
    let analyzer = FoodAnalyzer::new(&llm);

    match cli.command {
        Commands::Onboard {
            name,
            age,
            gender,
            height,
            weight,
            target_weight,
            activity,
            json,
        } => {
            let input = ProfileInput {
                name,
                age,
                gender,
                height,
                weight,
                target_weight,
                activity_level: activity,
            };
            cmd_onboard(&mut store, &input, json)
        }
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(&store, json),
            ProfileCommands::Set {
                name,
                avatar,
                age,
                gender,
                height,
                weight,
                target_weight,
                activity,
                recalculate,
                json,
            } => {
                let args = ProfileArgs {
                    name,
                    avatar,
                    age,
                    gender,
                    height,
                    weight,
                    target_weight,
                    activity,
                    recalculate,
                };
                cmd_profile_set(&mut store, args, json)
            }
        },
        Commands::Log { command } => match command {
            LogCommands::Text { description, json } => {
                cmd_log_text(&mut store, &analyzer, &description, json).await
            }
            LogCommands::Photo {
                path,
                skip,
                quantities,
                dry_run,
                json,
            } => {
                let recognizer = VisionClient::new(&config.vision, Arc::clone(&limiter))?;
                let review = PhotoReview {
                    skip,
                    quantities,
                    dry_run,
                };
                cmd_log_photo(&mut store, &analyzer, &recognizer, &path, &review, json).await
            }
            LogCommands::Manual {
                name,
                calories,
                quantity,
                unit,
                protein,
                carbs,
                fat,
                json,
            } => cmd_log_manual(
                &mut store, &name, calories, quantity, &unit, protein, carbs, fat, json,
            ),
        },
        Commands::Delete { item, json } => cmd_delete(&mut store, item, json),
        Commands::Edit {
            item,
            quantity,
            json,
        } => cmd_edit(&mut store, item, quantity, json),
        Commands::Mood { mood, date, json } => cmd_mood(&mut store, &mood, date.as_deref(), json),
        Commands::Select { date, json } => cmd_select(&mut store, &date, json),
        Commands::Summary { date, json } => cmd_summary(&store, date.as_deref(), json),
        Commands::History { days, json } => cmd_history(&store, days, json),
        Commands::Estimate {
            name,
            quantity,
            unit,
            json,
        } => cmd_estimate(&analyzer, &name, quantity, &unit, json).await,
    }
}
