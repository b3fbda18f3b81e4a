//! Command-line front end of the drill trainer.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prettytable::{format, Table};
use sqldrill::{
    answer::AnswerStore,
    catalog::Catalog,
    config::Config,
    playground::PlaygroundResult,
    sql::engine::KVEngine,
    storage::disk::DiskEngine,
    trainer::Trainer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Daily SQL drills with a built-in playground.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// JSON config file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Drill definitions, overrides the config file
    #[clap(long)]
    drills: Option<PathBuf>,

    /// Answer store, overrides the config file
    #[clap(long)]
    store: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List drills with their status and overall progress
    Overview,
    /// Show one day's drill and the saved answer
    Show { day: u32 },
    /// Save an answer for a day
    Save { day: u32, answer: String },
    /// Show the example answer and mark the day completed
    Reveal { day: u32 },
    /// Run a query against the day's mock tables
    Run { day: u32, sql: String },
    /// Reset every answer to not started
    Seed,
}

fn to_table(columns: &[String], rows: &[Vec<String>]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(columns.iter().collect());
    for row in rows {
        table.add_row(row.iter().collect());
    }
    table
}

fn print_table(columns: &[String], rows: &[Vec<String>]) {
    to_table(columns, rows).printstd();
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("failed to read config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(drills) = args.drills {
        config.drills_path = drills;
    }
    if let Some(store) = args.store {
        config.store_path = store;
    }
    info!(?config, "starting");

    let catalog = Catalog::load_all(&config.drills_path)
        .with_context(|| format!("failed to load drills from {}", config.drills_path.display()))?;
    let engine = KVEngine::new(
        DiskEngine::new(config.store_path.clone())
            .with_context(|| format!("failed to open store {}", config.store_path.display()))?,
    );
    let store = AnswerStore::new(engine)?;
    store.bootstrap(config.total_days)?;
    let trainer = Trainer::new(Arc::new(catalog), store, config.total_days);

    match args.command {
        Command::Overview => {
            let overview = trainer.overview()?;
            println!(
                "Progress: {}% ({} days)",
                overview.progress.percent, overview.total_days
            );
            let rows = overview
                .drills
                .iter()
                .map(|d| {
                    let marker = if d.day == overview.active_day { "*" } else { "" };
                    vec![
                        format!("{}{}", marker, d.day),
                        d.title.clone(),
                        overview.progress.status(d.day).to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            print_table(&["day".to_string(), "title".to_string(), "status".to_string()], &rows);
        }
        Command::Show { day } => {
            let view = trainer.day(day)?;
            println!("Day {}: {}", view.drill.day, view.drill.title);
            if !view.drill.question.is_empty() {
                println!("\n{}", view.drill.question);
            }
            for schema in &view.drill.schema {
                println!("\n[{}]", schema.display_name);
                let columns: Vec<String> = schema
                    .mock_data
                    .first()
                    .map(|row| row.keys().map(String::from).collect())
                    .unwrap_or_default();
                let rows = schema
                    .mock_data
                    .iter()
                    .map(|row| {
                        columns
                            .iter()
                            .map(|c| row.get(c).map(|v| v.to_text()).unwrap_or_default())
                            .collect::<Vec<String>>()
                    })
                    .collect::<Vec<_>>();
                print_table(&columns, &rows);
            }
            if let Some(answer) = view.answer {
                println!("\nStatus: {}", answer.status);
                if !answer.answer_text.is_empty() {
                    println!("Your answer:\n{}", answer.answer_text);
                }
            }
        }
        Command::Save { day, answer } => {
            println!("{}", trainer.save(day, &answer)?);
        }
        Command::Reveal { day } => {
            let reveal = trainer.reveal(day)?;
            println!("{}\n\n{}", reveal.example_answer, reveal.explanation);
        }
        Command::Run { day, sql } => match trainer.run_sql(day, &sql) {
            PlaygroundResult::Rows { columns, rows } => {
                let rows = rows
                    .iter()
                    .map(|row| row.iter().map(|v| v.to_string()).collect::<Vec<String>>())
                    .collect::<Vec<_>>();
                print_table(&columns, &rows);
                println!("({} rows)", rows.len());
            }
            PlaygroundResult::Error { error } => println!("{}", error),
        },
        Command::Seed => {
            trainer.store().reset(config.total_days)?;
            println!("Reset {} days", config.total_days);
        }
    }
    Ok(())
}
