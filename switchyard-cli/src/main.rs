mod server;
mod transfer;

use clap::{Parser, Subcommand};
use switchyard_lib::event::UNKNOWN_USER;
use tracing_subscriber::EnvFilter;

use self::server::config::{ServerOverrides, StorageBackend, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version)]
#[command(about = "Feature toggle server with admin and client APIs", long_about = None)]
struct Args {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    /// Path to config file
    #[arg(
        short = 'c',
        long = "config",
        global = true,
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,

        /// Address to bind
        #[arg(long = "hostname")]
        hostname: Option<String>,

        /// Storage backend
        #[arg(short = 's', long = "storage", value_enum)]
        storage: Option<StorageBackend>,

        /// Directory for the sled database
        #[arg(short = 'd', long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Load a state document exported from another server
    Import {
        /// Path to the JSON state document
        file: String,

        /// Remove every toggle and tag before importing
        #[arg(long = "drop")]
        drop: bool,

        /// Recorded as the author of the import events
        #[arg(short = 'u', long = "user", default_value = UNKNOWN_USER)]
        user: String,

        /// Directory for the sled database
        #[arg(short = 'd', long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Write all toggles, tags and tag links as a JSON state document
    Export {
        /// Directory for the sled database
        #[arg(short = 'd', long = "data-dir")]
        data_dir: Option<String>,

        /// Output file, stdout when omitted
        #[arg(short = 'o', long = "output")]
        output: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Args::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Command::Serve {
            port,
            hostname,
            storage,
            data_dir,
        } => {
            let overrides = ServerOverrides {
                port,
                hostname,
                data_dir,
                storage,
            };
            server::run_serve(&cli.config, overrides).await
        }
        Command::Import {
            file,
            drop,
            user,
            data_dir,
        } => transfer::run_import(&cli.config, data_dir, &file, drop, &user).await,
        Command::Export { data_dir, output } => {
            transfer::run_export(&cli.config, data_dir, output.as_deref()).await
        }
    }
}
