// Operator CLI (SPEC_FULL.md S10.4): local maintenance without a running
// supervisor. Touches only read paths plus a one-shot intake scan; it has no
// bearing on the ingestion pipeline's own behavioral contracts.

use clap::{Parser, Subcommand};

use mediacatalog::catalog;
use mediacatalog::config::Config;

#[derive(Parser)]
#[command(name = "catalogctl", about = "Operator tooling for the media catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog database and run pending migrations.
    Init,
    /// List the most recent job runs.
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show a single media object by id.
    Show {
        id: i64,
    },
    /// Scan the intake directory once and print what would be queued, without starting workers.
    Scan,
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("catalogctl: configuration error: {e}");
            std::process::exit(2);
        }
    };
    mediacatalog::logging::init(&config);

    let result = match cli.command {
        Commands::Init => run_init(&config),
        Commands::Jobs { limit } => run_jobs(&config, limit),
        Commands::Show { id } => run_show(&config, id),
        Commands::Scan => run_scan(&config),
    };

    if let Err(e) = result {
        eprintln!("catalogctl: {e}");
        std::process::exit(1);
    }
}

fn run_init(config: &Config) -> mediacatalog::error::Result<()> {
    catalog::open_connection(&config.catalog_db_path)?;
    println!("catalog initialized at {}", config.catalog_db_path.display());
    Ok(())
}

fn run_jobs(config: &Config, limit: u32) -> mediacatalog::error::Result<()> {
    let conn = catalog::open_connection(&config.catalog_db_path)?;
    for run in catalog::schema::recent_job_runs(&conn, limit)? {
        println!(
            "{:>6}  {:<8}  {:<10}  {:<24}  {}",
            run.id,
            run.media_type,
            run.outcome.unwrap_or_else(|| "pending".into()),
            run.started_at,
            run.file_path
        );
    }
    Ok(())
}

fn run_show(config: &Config, id: i64) -> mediacatalog::error::Result<()> {
    let conn = catalog::open_connection(&config.catalog_db_path)?;
    match catalog::schema::get_media_object(&conn, id)? {
        Some(media) => println!("{media:#?}"),
        None => println!("no media object with id {id}"),
    }
    Ok(())
}

fn run_scan(config: &Config) -> mediacatalog::error::Result<()> {
    let pending = mediacatalog::supervisor::scan_intake(config);
    for file in &pending {
        println!("{:?}  {}", file.media_type, file.path.display());
    }
    println!("{} file(s) would be queued", pending.len());
    Ok(())
}
