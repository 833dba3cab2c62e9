use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use viaje_assistant::{
    DestinationEnricher, EnrichmentConfig, Generator, GeneratorConfig, TripAssistant,
};
use viaje_core::{
    classify_prompt_safety, prepare_question, sanitize_text, validate_date, validate_destination,
    validate_email, validate_name, validate_password_with, validate_question_with, HistoryEntry,
    PlanRequest, TripData, ValidationResult,
};
use viaje_observability::{init_tracing, AppMetrics};
use viaje_storage::Store;

#[derive(Debug, Parser)]
#[command(name = "viaje")]
#[command(about = "ViajeIA travel assistant CLI")]
struct Cli {
    #[arg(long, env = "VIAJE_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify a prompt the way the planner would before sending it.
    Check { prompt: String },
    Validate {
        field: Field,
        value: String,
        #[arg(long)]
        min_length: Option<usize>,
        #[arg(long)]
        max_length: Option<usize>,
    },
    Sanitize { text: String },
    Chat {
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long, default_value = "")]
        destination: String,
        #[arg(long, default_value = "")]
        date: String,
        #[arg(long, default_value = "")]
        budget: String,
        #[arg(long, default_value = "")]
        preference: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Field {
    Email,
    Password,
    Name,
    Destination,
    Date,
    Question,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing("viaje_cli");
    let cli = Cli::parse();

    match cli.command {
        Command::Check { prompt } => {
            let verdict = classify_prompt_safety(&prepare_question(&prompt));
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(exit_code(verdict.is_safe))
        }
        Command::Validate {
            field,
            value,
            min_length,
            max_length,
        } => {
            let result = validate_field(field, &value, min_length, max_length);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(exit_code(result.is_valid))
        }
        Command::Sanitize { text } => {
            let payload = serde_json::json!({
                "sanitized": sanitize_text(&text),
                "prepared": prepare_question(&text)
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Chat {
            user_id,
            destination,
            date,
            budget,
            preference,
        } => {
            let assistant = build_assistant(cli.database_url.as_deref()).await?;
            let trip = TripData {
                destination,
                date,
                budget,
                preference,
            };
            run_chat(assistant, trip, user_id).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn validate_field(
    field: Field,
    value: &str,
    min_length: Option<usize>,
    max_length: Option<usize>,
) -> ValidationResult {
    match field {
        Field::Email => validate_email(value),
        Field::Password => validate_password_with(
            value,
            min_length.unwrap_or(viaje_core::validation::DEFAULT_MIN_PASSWORD_LEN),
        ),
        Field::Name => validate_name(value),
        Field::Destination => validate_destination(value),
        Field::Date => validate_date(value),
        Field::Question => validate_question_with(
            value,
            min_length.unwrap_or(viaje_core::validation::DEFAULT_MIN_QUESTION_LEN),
            max_length.unwrap_or(viaje_core::validation::DEFAULT_MAX_QUESTION_LEN),
        ),
    }
}

async fn run_chat(
    assistant: TripAssistant<Store, Generator>,
    trip: TripData,
    user_id: Option<String>,
) -> Result<()> {
    let mut history: Vec<HistoryEntry> = Vec::new();

    println!("ViajeIA chat mode. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        if question.is_empty() {
            continue;
        }

        let request = PlanRequest {
            question: question.to_string(),
            trip_data: Some(trip.clone()),
            history: history.clone(),
            user_id: user_id.clone(),
        };

        match assistant.plan(request).await {
            Ok(response) => {
                println!("\n{}\n", response.answer);
                history.push(HistoryEntry {
                    question: question.to_string(),
                    answer: response.answer,
                });
            }
            Err(err) => println!("\n[error] {err}\n"),
        }
    }

    Ok(())
}

async fn build_assistant(database_url: Option<&str>) -> Result<TripAssistant<Store, Generator>> {
    let store = match database_url {
        Some(database_url) => Store::sqlite(database_url)
            .await
            .with_context(|| format!("failed opening consultation log at {database_url}"))?,
        None => Store::memory(),
    };
    let generator = Generator::from_config(&GeneratorConfig::from_env())?;
    let enricher = DestinationEnricher::new(EnrichmentConfig::from_env())?;

    Ok(
        TripAssistant::new(Arc::new(store), Arc::new(generator), AppMetrics::shared())
            .with_enricher(enricher),
    )
}
