//! Thin CLI front end (spec.md §6). Contains no business logic: argument
//! parsing, a human banner for `info`, and exit-code mapping live here;
//! everything else calls into `hls_core`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hls_core::task::{TaskRequest, TaskSource};
use hls_core::{Configuration, HlsDlError, ProcessingError, Services};

#[derive(Parser)]
#[command(name = "hls-dl", about = "Download and remux an HLS playlist to a single file")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a playlist and concatenate its segments.
    Download {
        url: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print static tool metadata.
    Info,
}

#[tokio::main]
async fn main() -> ExitCode {
    // reqwest is built against rustls with no default crypto provider
    // (`rustls-tls-webpki-roots-no-provider`); install one once at startup.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    match cli.command {
        Command::Info => {
            print_info();
            ExitCode::SUCCESS
        }
        Command::Download { url, name, verbose } => {
            init_logging(verbose);
            match run_download(url, name, verbose).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("error: {err}");
                    eprintln!("suggestion: {}", err.recovery_suggestion());
                    exit_code_for(&err)
                }
            }
        }
    }
}

async fn run_download(url: String, name: Option<String>, verbose: bool) -> Result<(), HlsDlError> {
    let config = Configuration::builder()
        .tool_concat_path(default_concat_tool_path())
        .build();
    let services = Services::new(config)?;
    let orchestrator = services.orchestrator()?;

    let request = TaskRequest {
        url,
        base_url: None,
        saved_directory: default_downloads_directory(),
        file_name: name,
        source: TaskSource::Web,
        verbose,
    };

    orchestrator.create_task(request).await?;
    Ok(())
}

fn print_info() {
    println!("hls-dl {}", env!("CARGO_PKG_VERSION"));
    println!("HLS command-line video downloader");
}

fn init_logging(verbose: bool) {
    let directive = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(directive).unwrap())
        .try_init();
}

fn default_downloads_directory() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    home.join("Downloads")
}

fn default_concat_tool_path() -> PathBuf {
    std::env::var_os("HLS_DL_CONCAT_TOOL")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ffmpeg"))
}

fn exit_code_for(err: &HlsDlError) -> ExitCode {
    let code: u8 = match err {
        HlsDlError::Configuration(_) => 2,
        HlsDlError::Network(_) => 3,
        HlsDlError::Parsing(_) => 4,
        HlsDlError::FileSystem(_) => 5,
        HlsDlError::Processing(ProcessingError::OperationCancelled(_)) => 130,
        HlsDlError::Processing(_) => 6,
    };
    ExitCode::from(code)
}
