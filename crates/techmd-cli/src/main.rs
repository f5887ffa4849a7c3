//! techmd: run technical metadata generation or an audit for a druid,
//! synchronously, against the configured database.
//!
//! Reads the same environment as the service (DATABASE_URL, tool paths, ...).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use techmd_cli::{init_tracing, local_checksums, resolve_files};
use techmd_core::Config;
use techmd_db::{setup_database, FileRecordRepository, FileRecordStore};
use techmd_processing::{ProcessRunner, Toolkit};
use techmd_services::{AuditService, MoabStorage, TechnicalMetadataGenerator, TracingNotifier};

#[derive(Parser)]
#[command(name = "techmd", about = "Technical metadata generation and audit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate technical metadata for a druid's files
    Generate {
        #[arg(long)]
        druid: String,
        /// Directory the stored filenames are relative to
        #[arg(long)]
        basepath: PathBuf,
        /// Regenerate even when the md5 is unchanged
        #[arg(long)]
        force: bool,
        /// Files to characterize; every file under basepath when omitted
        files: Vec<PathBuf>,
    },
    /// Generate technical metadata for the content of a druid's latest Moab version
    Moab {
        #[arg(long)]
        druid: String,
        #[arg(long)]
        force: bool,
    },
    /// Compare local files with the stored records
    Audit {
        #[arg(long)]
        druid: String,
        #[arg(long)]
        basepath: PathBuf,
    },
    /// Print the stored records of a druid
    Show {
        #[arg(long)]
        druid: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

async fn generate(
    config: &Config,
    store: Arc<dyn FileRecordStore>,
    druid: &str,
    filepath_map: &[(PathBuf, String)],
    force: bool,
) -> anyhow::Result<ExitCode> {
    let runner = Arc::new(ProcessRunner::new(config.tool_timeout()));
    let generator = TechnicalMetadataGenerator::new(
        store,
        Toolkit::from_tools(config.tools(), runner),
        Arc::new(TracingNotifier),
    );

    match generator.generate(druid, filepath_map, force).await {
        Ok(report) => {
            print_json(&json!({
                "druid": druid,
                "generated": report.generated,
                "unchanged": report.unchanged,
                "deleted": report.summary.deleted,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            for error in e.errors() {
                eprintln!("{}", error);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let pool = setup_database(&config).await?;
    let store: Arc<dyn FileRecordStore> = Arc::new(FileRecordRepository::new(pool));

    match cli.command {
        Commands::Generate {
            druid,
            basepath,
            force,
            files,
        } => {
            let filepath_map = resolve_files(&basepath, &files)?;
            generate(&config, store, &druid, &filepath_map, force).await
        }
        Commands::Moab { druid, force } => {
            let filepath_map = MoabStorage::from_config(&config)
                .content_files(&druid)
                .with_context(|| format!("Failed to list Moab content for {}", druid))?;
            generate(&config, store, &druid, &filepath_map, force).await
        }
        Commands::Audit { druid, basepath } => {
            let filepath_map = resolve_files(&basepath, &[])?;
            let expected = local_checksums(&filepath_map).await?;

            match AuditService::new(store).audit(&druid, &expected).await? {
                Some(report) => {
                    print_json(&report)?;
                    Ok(if report.is_clean() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
                None => {
                    eprintln!("No technical metadata for {}", druid);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Show { druid } => {
            let records = store.list_by_druid(&druid).await?;
            if records.is_empty() {
                eprintln!("No technical metadata for {}", druid);
                return Ok(ExitCode::FAILURE);
            }
            print_json(&records)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
