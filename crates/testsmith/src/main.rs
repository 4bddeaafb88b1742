//! The `testsmith` command line tool.

#[macro_use]
extern crate tracing;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use testsmith::config::{ConfigError, Preferences, Provider, Settings};
use testsmith::core::CancellationToken;
use testsmith::server::{self, AppState};
use testsmith::{
    Component, ComponentName, IterationBudget, SessionEvent, Stopped,
    TestingType,
};

const BAR_CHAR: &str = "▎";

#[derive(Debug, Parser)]
#[command(name = "testsmith", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generates a test for a component file.
    Generate {
        /// The component source file.
        file: PathBuf,
        /// `vue_jest` or `js_mocha`. Inferred from the extension if absent.
        #[arg(short, long)]
        testing_type: Option<TestingType>,
        /// `openai` or `claude`. Defaults to the saved preference.
        #[arg(short, long)]
        provider: Option<Provider>,
        /// Maximum number of test executions.
        #[arg(short, long)]
        iterations: Option<u32>,
        /// Writes the test here instead of printing it.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Serves the HTTP endpoints.
    Serve {
        #[arg(long, default_value = server::DEFAULT_ADDR)]
        addr: SocketAddr,
    },
    /// Shows or changes the saved preferences.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Prints the preferences and the environment settings.
    Show,
    /// Sets the default provider.
    SetProvider { provider: Provider },
    /// Sets the default iteration budget.
    SetIterations { iterations: u32 },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Generate {
            file,
            testing_type,
            provider,
            iterations,
            out,
        } => generate(file, testing_type, provider, iterations, out).await,
        Command::Serve { addr } => {
            let settings = Settings::from_env()?;
            debug!("{settings:?}");
            server::serve(addr, AppState::from_settings(&settings)).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => {
            config(action)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn generate(
    file: PathBuf,
    testing_type: Option<TestingType>,
    provider: Option<Provider>,
    iterations: Option<u32>,
    out: Option<PathBuf>,
) -> Result<ExitCode> {
    let source = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", file.display()))?;
    let name = ComponentName::new(name)?;
    let testing_type = testing_type.unwrap_or_else(|| infer_testing_type(&name));

    let prefs = load_preferences()?;
    let provider = provider.unwrap_or(prefs.provider);
    let budget = match iterations {
        Some(max) => IterationBudget::new(max).ok_or(ConfigError::ZeroBudget)?,
        None => prefs.iterations,
    };
    let max_attempts = testing_type.max_attempts(budget);
    info!(
        "generating a {testing_type} test for {name} with {provider}, \
         at most {max_attempts} runs"
    );

    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(
        ProgressStyle::with_template("{spinner} {wide_msg}")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    progress_bar.set_message("🤔 Drafting a test...");
    progress_bar.enable_steady_tick(Duration::from_millis(100));

    let cancellation = CancellationToken::new();
    tokio::spawn({
        let cancellation = cancellation.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancellation.cancel();
            }
        }
    });

    let settings = Settings::from_env()?;
    let session = settings
        .session_builder(provider)?
        .testing_type(testing_type)
        .budget(budget)
        .cancellation(cancellation)
        .on_event({
            let progress_bar = progress_bar.clone();
            move |event| report_event(&progress_bar, event, max_attempts)
        })
        .build();

    let component = Component::new(name, source);
    let result = session.run(&component).await;
    progress_bar.finish_and_clear();
    let outcome = result?;

    match outcome.status {
        Stopped::Passed => println!(
            "{}✔ The test passed after {} run(s).",
            BAR_CHAR.bright_green(),
            outcome.attempts
        ),
        Stopped::BudgetExhausted => {
            println!(
                "{}✘ The test still fails after {} run(s):",
                BAR_CHAR.bright_yellow(),
                outcome.attempts
            );
            println!("{}", outcome.diagnostics.bright_white());
        }
    }

    match out {
        Some(path) => {
            tokio::fs::write(&path, &outcome.test_code)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display().bold());
        }
        None => println!("\n{}", outcome.test_code),
    }

    Ok(match outcome.status {
        Stopped::Passed => ExitCode::SUCCESS,
        Stopped::BudgetExhausted => ExitCode::FAILURE,
    })
}

fn report_event(progress_bar: &ProgressBar, event: &SessionEvent, max: u32) {
    match event {
        SessionEvent::AttemptStarted(n) => {
            progress_bar.set_message(format!("🧪 Running the test ({n}/{max})..."));
        }
        SessionEvent::TestPassed => {
            progress_bar.println(format!("{}passed", BAR_CHAR.bright_green()));
        }
        SessionEvent::TestFailed { diagnostics } => {
            let first_line = diagnostics.lines().next().unwrap_or_default();
            progress_bar.println(format!(
                "{}failed: {}",
                BAR_CHAR.bright_red(),
                first_line.dimmed()
            ));
        }
        SessionEvent::Regenerating => {
            progress_bar.set_message("🤔 Fixing the test...");
        }
    }
}

/// Vue single-file components get the jest loop, anything else a
/// one-shot mocha test.
fn infer_testing_type(name: &ComponentName) -> TestingType {
    if name.is_vue() {
        TestingType::VueJest
    } else {
        TestingType::JsMocha
    }
}

fn load_preferences() -> Result<Preferences> {
    match Preferences::default_path() {
        Ok(path) => Ok(Preferences::load(&path)?),
        Err(err) => {
            warn!("using default preferences: {err}");
            Ok(Preferences::default())
        }
    }
}

fn config(action: ConfigAction) -> Result<()> {
    let path = Preferences::default_path()?;
    let mut prefs = Preferences::load(&path)?;
    match action {
        ConfigAction::Show => {
            print_preferences(&path, &prefs);
            println!("{:#?}", Settings::from_env()?);
            return Ok(());
        }
        ConfigAction::SetProvider { provider } => prefs.provider = provider,
        ConfigAction::SetIterations { iterations } => {
            prefs.iterations =
                IterationBudget::new(iterations).ok_or(ConfigError::ZeroBudget)?;
        }
    }
    prefs.save(&path)?;
    print_preferences(&path, &prefs);
    Ok(())
}

fn print_preferences(path: &Path, prefs: &Preferences) {
    println!("{}", path.display().dimmed());
    println!("provider   = {}", prefs.provider.bright_white());
    println!("iterations = {}", prefs.iterations.get().bright_white());
}
