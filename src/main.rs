use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use offsetlab::config::Config;
use offsetlab::es_http::EsHttp;
use offsetlab::es_ingest::Scenario;
use offsetlab::es_preflight::PreflightError;
use offsetlab::es_reset::prompt_confirmation;
use offsetlab::es_verify::render_report;
use offsetlab::runner::{
    run_reset, run_setup, run_status, run_verify, ResetReport, SetupReport, StatusReport,
};

#[derive(Parser)]
#[command(name = "offsetlab")]
#[command(about = "Provision, verify and reset a conflicting log.offset data stream")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to the per-user config, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create templates and policy, ingest conflicting documents, verify the conflict
    Setup {
        #[arg(long, value_enum, default_value_t = Scenario::ExplicitMapping)]
        scenario: Scenario,
    },

    /// Re-read the data stream and report the log.offset mapping of its backing indices
    Verify {
        #[arg(long, value_enum, default_value_t = Scenario::ExplicitMapping)]
        scenario: Scenario,
    },

    /// Delete the data stream and operator-created objects, then run setup again
    Reset {
        #[arg(long, value_enum, default_value_t = Scenario::ExplicitMapping)]
        scenario: Scenario,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Check connectivity and show which lab objects exist
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(preflight) = err.downcast_ref::<PreflightError>() {
                eprintln!("ERROR: {preflight}");
                eprintln!("{}", preflight.guidance());
            } else {
                error!("offsetlab failed: {err:?}");
            }
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = Config::load(cli.config)?;
    info!(
        url = %cfg.es_url,
        user = %cfg.es_user,
        data_stream = %cfg.data_stream,
        policy = ?cfg.http_policy(),
        "offsetlab starting"
    );
    let http = EsHttp::from_config(&cfg)?;

    match cli.command.unwrap_or(Commands::Setup {
        scenario: Scenario::default(),
    }) {
        Commands::Setup { scenario } => {
            let report = run_setup(&http, &cfg, scenario).await?;
            print_setup(&report);
        }
        Commands::Verify { scenario } => {
            let report = run_verify(&http, &cfg, scenario).await?;
            print!("{}", render_report(&report));
        }
        Commands::Reset { scenario, yes } => {
            let confirmed = yes
                || prompt_confirmation(
                    io::stdin().lock(),
                    io::stdout(),
                    &format!(
                        "This deletes data stream {} and all logs@custom* component templates. Continue?",
                        cfg.data_stream
                    ),
                )?;
            match run_reset(&http, &cfg, scenario, confirmed).await? {
                ResetReport::Declined => println!("Reset cancelled; nothing was changed."),
                ResetReport::Completed { teardown, setup } => {
                    println!(
                        "Removed {} stray indices and {} custom component templates.",
                        teardown.deleted_indices.len(),
                        teardown.deleted_templates.len()
                    );
                    if !teardown.is_clean() {
                        println!("WARNING: some objects survived the teardown: {teardown:?}");
                    }
                    print_setup(&setup);
                }
            }
        }
        Commands::Status => {
            let report = run_status(&http, &cfg).await?;
            print_status(&report);
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_setup(report: &SetupReport) {
    println!(
        "Connected to cluster {} (Elasticsearch {})",
        report.cluster.cluster_name, report.cluster.version
    );
    if !report.provision.all_applied() {
        println!("WARNING: some provisioning requests were rejected: {:?}", report.provision);
    }
    println!(
        "Ingested {} documents ({} rejected) using scenario {}",
        report.induce.docs_written, report.induce.docs_rejected, report.induce.scenario
    );
    print!("{}", render_report(&report.conflict));
}

fn print_status(report: &StatusReport) {
    let env = &report.environment;
    println!(
        "Connected to cluster {} (Elasticsearch {})",
        report.cluster.cluster_name, report.cluster.version
    );
    match &env.ilm_phases {
        Some(phases) => println!("ILM policy:         present (phases: {})", phases.join(", ")),
        None => println!("ILM policy:         missing"),
    }
    println!(
        "Component template: {}",
        if env.component_template_present { "present" } else { "missing" }
    );
    match env.index_template_priority {
        Some(priority) => println!(
            "Index template:     present (priority {}, composed_of {})",
            priority,
            env.index_template_composed_of.join(", ")
        ),
        None => println!("Index template:     missing"),
    }
    println!(
        "Environment:        {}",
        if env.is_provisioned() { "provisioned" } else { "incomplete" }
    );
}
