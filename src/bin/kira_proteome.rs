use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_proteome::app::{App, FetchOptions, RetrievalItem, RetrievalOutcome, RetrievalResult};
use kira_proteome::assembly::NcbiAssemblyIndex;
use kira_proteome::config::{ConfigLoader, RetrievalConfig};
use kira_proteome::domain::{Database, OrganismQuery};
use kira_proteome::ensembl::EnsemblHttpClient;
use kira_proteome::error::{ErrorKind, KiraError};
use kira_proteome::fetch::HttpTransport;
use kira_proteome::output::{JsonOutput, OutputMode};
use kira_proteome::tui::Tui;
use kira_proteome::uniprot::UniprotHttpClient;

type HttpApp = App<
    NcbiAssemblyIndex<HttpTransport>,
    HttpTransport,
    EnsemblHttpClient,
    UniprotHttpClient,
>;

#[derive(Parser)]
#[command(name = "kira-proteome")]
#[command(about = "Retrieve verified proteomes from RefSeq, GenBank, Ensembl, EnsemblGenomes or UniProt")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Retrieve the proteome of one organism")]
    Fetch(FetchArgs),
    #[command(about = "Retrieve every organism listed in the config file")]
    Batch(BatchArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Scientific name, assembly accession or NCBI Taxonomy ID.
    organism: String,

    #[arg(long, value_enum, default_value_t = Database::Refseq)]
    db: Database,

    /// Only accept reference or representative assemblies.
    #[arg(long)]
    reference: bool,

    /// Ensembl or EnsemblGenomes release; latest when omitted.
    #[arg(long)]
    release: Option<u32>,

    #[arg(long)]
    gunzip: bool,

    #[arg(long)]
    update: bool,

    /// Download directory; overrides the config file.
    #[arg(long)]
    path: Option<Utf8PathBuf>,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct BatchArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    gunzip: bool,

    #[arg(long)]
    update: bool,

    #[arg(long)]
    path: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error.kind() {
        ErrorKind::CallerError | ErrorKind::NotFound => 2,
        ErrorKind::TransportFailure => 3,
        ErrorKind::IntegrityFailure => 4,
        ErrorKind::Internal => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Fetch(args) => {
            let resolved = ConfigLoader::resolve(args.config.as_deref())?;
            let config = with_path(resolved.retrieval, args.path);
            let query = OrganismQuery::new(args.organism, args.db)
                .reference(args.reference)
                .release(args.release);
            let options = FetchOptions {
                gunzip: args.gunzip,
                update: args.update,
            };
            let app = build_app(config)?;
            run_queries(app, vec![query], options, output_mode, "Fetch")
        }
        Commands::Batch(args) => {
            let resolved = ConfigLoader::resolve(args.config.as_deref())?;
            if resolved.organisms.is_empty() {
                return Err(miette::Report::msg(
                    "no organisms listed (add an `organisms` array to kira-proteome.json)",
                ));
            }
            let config = with_path(resolved.retrieval, args.path);
            let options = FetchOptions {
                gunzip: args.gunzip,
                update: args.update,
            };
            let app = build_app(config)?;
            run_queries(app, resolved.organisms, options, output_mode, "Batch")
        }
    }
}

fn with_path(config: RetrievalConfig, path: Option<Utf8PathBuf>) -> RetrievalConfig {
    match path {
        Some(path) => config.with_download_dir(path),
        None => config,
    }
}

fn build_app(config: RetrievalConfig) -> miette::Result<HttpApp> {
    let transport = HttpTransport::new(&config)?;
    let index = NcbiAssemblyIndex::new(transport.clone(), &config)?;
    let ensembl = EnsemblHttpClient::new(&config)?;
    let uniprot = UniprotHttpClient::new(&config)?;
    Ok(App::new(config, index, transport, ensembl, uniprot))
}

fn run_queries(
    app: HttpApp,
    queries: Vec<OrganismQuery>,
    options: FetchOptions,
    output_mode: OutputMode,
    title: &str,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.retrieve_batch(&queries, options, &JsonOutput)?;
            JsonOutput::print_result(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(title);
            let result = tui.run(move |sink| app.retrieve_batch(&queries, options, sink))?;
            tui.show_result(&result)?;
            print_summary(&result);
            Ok(())
        }
    }
}

fn print_summary(result: &RetrievalResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}kira-proteome summary{reset}");
    for RetrievalItem {
        organism,
        db,
        outcome,
    } in &result.items
    {
        match outcome {
            RetrievalOutcome::Success { local_path, .. } => {
                println!("{green}ok{reset}      {organism} ({db}) -> {local_path}")
            }
            RetrievalOutcome::NotAvailable { reason } => {
                println!("{yellow}n/a{reset}     {organism} ({db}): {reason}")
            }
            RetrievalOutcome::Failed { error } => {
                println!("{red}failed{reset}  {organism} ({db}): {error}")
            }
        }
    }
}
