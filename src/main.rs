use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use split_ledger::{ExpenseRecord, ExpenseService, Settings, SplitRequest, SqliteStore};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "split-ledger")]
#[command(about = "Split shared expenses and export the balance sheet")]
#[command(version)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, default_value = split_ledger::settings::DEFAULT_CONFIG_FILE)]
    config: String,

    /// Database path, overrides `database.path`
    #[arg(long, env = "SPLIT_LEDGER_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a participant
    AddParticipant {
        id: String,
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Submit an expense from a JSON file (`-` reads stdin)
    Submit { file: String },
    /// List stored expenses
    List {
        #[arg(long)]
        participant: Option<String>,
    },
    /// Export the balance sheet as CSV
    Export {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show what each participant owes in total
    Summary,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config).context("Failed to load settings")?;

    let db_path = cli
        .database
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.database.path));

    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?,
    );
    let service = ExpenseService::new(store.clone(), store, settings.calculator());

    match cli.command {
        Command::AddParticipant { id, name, email } => {
            let participant = service.register_participant(&id, &name, email.as_deref())?;
            println!("✓ Registered {} ({})", participant.name, participant.participant_id);
        }
        Command::Submit { file } => {
            let payload = read_payload(&file)?;
            let request: SplitRequest =
                serde_json::from_str(&payload).context("Failed to parse expense JSON")?;
            let record = service.submit_expense(request)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::List { participant } => {
            let records = match participant {
                Some(id) => service.list_expenses_for(&id)?,
                None => service.list_all_expenses()?,
            };
            print_records(&records);
        }
        Command::Export { output } => {
            let csv = service.export_balance_sheet()?;
            match output {
                Some(path) => {
                    fs::write(&path, csv)
                        .with_context(|| format!("Failed to write balance sheet: {:?}", path))?;
                    println!("✓ Balance sheet written to {:?}", path);
                }
                None => print!("{}", csv),
            }
        }
        Command::Summary => {
            for balance in service.balance_summary()? {
                println!(
                    "{:<24} {:>4} expenses  {:>12.2}",
                    balance.name, balance.expense_count, balance.total_owed
                );
            }
        }
    }

    Ok(())
}

fn read_payload(file: &str) -> Result<String> {
    if file == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read expense from stdin")?;
        Ok(buf)
    } else {
        fs::read_to_string(file).with_context(|| format!("Failed to read expense file: {}", file))
    }
}

fn print_records(records: &[ExpenseRecord]) {
    if records.is_empty() {
        println!("No expenses found");
        return;
    }

    for record in records {
        println!(
            "{}  {:>10.2}  {}",
            record.id, record.total_amount, record.split_method
        );
        for allocation in &record.participants {
            println!("    {:<20} {:>10.2}", allocation.participant_id, allocation.amount);
        }
    }
}
