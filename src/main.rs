use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use peershare::config::{DirectoryConfig, PeerConfig};
use peershare::directory::{api, DirectoryService, FileQuery, LivenessMonitor, SystemClock};
use peershare::peer::{DirectoryClient, PeerSession};
use peershare::registry::{FileEntry, MemoryRegistry, PeerAddress, RegistryStore, SledRegistry};
use peershare::storage::SharedDir;
use peershare::transfer::{TransferClient, TransferState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "peershare")]
#[command(about = "Directory-assisted peer-to-peer file sharing")]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the directory server
    Directory {
        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
        /// Port to bind to
        #[arg(short, long, default_value = "5001")]
        port: u16,
        /// Sled database directory (in-memory when omitted)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Seconds a heartbeat keeps a peer's files visible
        #[arg(long, default_value = "60")]
        liveness_window: u64,
        /// Seconds between stale-peer sweeps
        #[arg(long, default_value = "30")]
        sweep_interval: u64,
    },
    /// Create an account on the directory (needs --listen-port)
    Register {
        #[command(flatten)]
        peer: PeerArgs,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Log in, share the shared folder and serve it until Ctrl-C
    Serve {
        #[command(flatten)]
        peer: PeerArgs,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// List files from live peers
    List {
        #[command(flatten)]
        peer: PeerArgs,
    },
    /// Search files from live peers
    Search {
        #[command(flatten)]
        peer: PeerArgs,
        /// Filename substring
        #[arg(long)]
        filename: Option<String>,
        /// Owner substring
        #[arg(long)]
        username: Option<String>,
    },
    /// Download a file from a peer
    Fetch {
        #[command(flatten)]
        peer: PeerArgs,
        /// Name of the file to fetch
        filename: String,
        /// Fetch from this owner when several peers share the name
        #[arg(long)]
        from: Option<String>,
        /// Connect to this host directly instead of asking the directory
        #[arg(long, requires = "peer_port")]
        peer_host: Option<String>,
        /// Port for --peer-host
        #[arg(long, requires = "peer_host")]
        peer_port: Option<u16>,
        /// Destination path (defaults to the download folder)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy a file into the shared folder, announce it and serve until Ctrl-C
    Share {
        #[command(flatten)]
        peer: PeerArgs,
        #[command(flatten)]
        credentials: Credentials,
        /// File to share
        file: PathBuf,
    },
}

#[derive(Args)]
struct PeerArgs {
    /// Directory server URL
    #[arg(short, long, default_value = "http://127.0.0.1:5001")]
    directory: String,
    /// Folder to share files from
    #[arg(long, default_value = "shared_files")]
    shared_dir: PathBuf,
    /// Folder downloads are written to
    #[arg(long, default_value = "downloads")]
    download_dir: PathBuf,
    /// Address the transfer listener binds to
    #[arg(long, default_value = "0.0.0.0")]
    listen_address: String,
    /// Port the transfer listener binds to (0 for random, register needs a real one)
    #[arg(long, default_value = "0")]
    listen_port: u16,
    /// Host advertised to other peers (detected when omitted)
    #[arg(long)]
    advertise_host: Option<String>,
    /// Seconds between heartbeats
    #[arg(long, default_value = "30")]
    heartbeat_interval: u64,
}

impl PeerArgs {
    fn config(&self) -> Result<PeerConfig> {
        let config = PeerConfig::new()
            .with_directory_url(&self.directory)
            .with_shared_dir(&self.shared_dir)
            .with_download_dir(&self.download_dir)
            .with_listen_address(&self.listen_address)
            .with_listen_port(self.listen_port)
            .with_advertise_host(self.advertise_host.clone())
            .with_heartbeat_interval(self.heartbeat_interval);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
struct Credentials {
    #[arg(short, long)]
    username: String,
    #[arg(short, long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Directory {
            bind,
            port,
            db,
            liveness_window,
            sweep_interval,
        } => {
            let config = DirectoryConfig::new()
                .with_bind_address(&bind)
                .with_bind_port(port)
                .with_db_path(db)
                .with_liveness_window(liveness_window)
                .with_sweep_interval(sweep_interval);
            run_directory(config).await?;
        }
        Commands::Register { peer, credentials } => {
            let config = peer.config()?;
            let address = config.registration_address()?;
            let message = DirectoryClient::new(config.directory_url.clone())
                .register(&credentials.username, &credentials.password, &address)
                .await?;
            println!("{}", message);
        }
        Commands::Serve { peer, credentials } => {
            let session =
                PeerSession::start(peer.config()?, &credentials.username, &credentials.password)
                    .await?;
            println!(
                "Serving {} as {} at {}",
                session.shared_dir().root().display(),
                session.username(),
                session.address()
            );
            serve_until_interrupted(session).await?;
        }
        Commands::List { peer } => {
            let config = peer.config()?;
            let files = DirectoryClient::new(config.directory_url.clone())
                .list_files(&FileQuery::all())
                .await?;
            print_files(&files);
        }
        Commands::Search {
            peer,
            filename,
            username,
        } => {
            let config = peer.config()?;
            let query = FileQuery { filename, username };
            let files = DirectoryClient::new(config.directory_url.clone())
                .search_files(&query)
                .await?;
            print_files(&files);
        }
        Commands::Fetch {
            peer,
            filename,
            from,
            peer_host,
            peer_port,
            output,
        } => {
            let config = peer.config()?;
            let address = match (peer_host, peer_port) {
                (Some(host), Some(port)) => PeerAddress::new(host, port),
                _ => locate(&config, &filename, from.as_deref()).await?.address(),
            };
            let destination = match output {
                Some(path) => path,
                None => {
                    tokio::fs::create_dir_all(&config.download_dir).await?;
                    SharedDir::new(&config.download_dir)
                        .resolve(&filename)
                        .ok_or_else(|| anyhow!("invalid file name: {}", filename))?
                }
            };
            fetch(&config, address, filename, destination).await?;
        }
        Commands::Share {
            peer,
            credentials,
            file,
        } => {
            let session =
                PeerSession::start(peer.config()?, &credentials.username, &credentials.password)
                    .await?;
            let name = session.share(&file).await?;
            println!(
                "Shared {} from {}, serving until Ctrl-C",
                name,
                session.address()
            );
            serve_until_interrupted(session).await?;
        }
    }

    Ok(())
}

/// Serve until Ctrl-C, then withdraw from the directory
async fn serve_until_interrupted(session: PeerSession) -> Result<()> {
    session
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await?;
    Ok(())
}

async fn run_directory(config: DirectoryConfig) -> Result<()> {
    config.validate()?;

    let store: Arc<dyn RegistryStore> = match &config.db_path {
        Some(path) => {
            info!(path = %path.display(), "opening registry database");
            Arc::new(SledRegistry::open(path)?)
        }
        None => {
            warn!("no database configured, registry is in memory only");
            Arc::new(MemoryRegistry::new())
        }
    };

    let service = DirectoryService::new(store)
        .with_clock(Arc::new(SystemClock))
        .with_liveness_window(config.liveness_window());
    let monitor = LivenessMonitor::for_service(&service, config.sweep_interval()).spawn();

    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;

    tokio::select! {
        result = api::serve(listener, service) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    monitor.abort();
    Ok(())
}

/// Find a live owner of `filename` through the directory
async fn locate(config: &PeerConfig, filename: &str, owner: Option<&str>) -> Result<FileEntry> {
    let mut query = FileQuery::all().with_filename(filename);
    if let Some(owner) = owner {
        query = query.with_username(owner);
    }
    let matches = DirectoryClient::new(config.directory_url.clone())
        .search_files(&query)
        .await?;
    matches
        .into_iter()
        .find(|e| e.filename == filename && owner.map_or(true, |o| e.username == o))
        .ok_or_else(|| anyhow!("no live peer is sharing {}", filename))
}

async fn fetch(
    config: &PeerConfig,
    address: PeerAddress,
    filename: String,
    destination: PathBuf,
) -> Result<()> {
    let client = TransferClient::new(config.transfer.clone());
    println!("Fetching {} from {}", filename, address);
    let handle = client.start(address, filename, destination.clone());

    let mut progress = handle.progress();
    let reporter = tokio::spawn(async move {
        let mut last_report = tokio::time::Instant::now();
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow_and_update();
            if snapshot.state != TransferState::Downloading {
                continue;
            }
            if last_report.elapsed() >= Duration::from_secs(1) {
                last_report = tokio::time::Instant::now();
                println!(
                    "  {:5.1}%  {} / {} bytes  {:.1} KB/s",
                    snapshot.percent(),
                    snapshot.bytes_received,
                    snapshot.total_bytes,
                    snapshot.throughput_bytes_per_sec / 1024.0
                );
            }
        }
    });

    let result = handle.join().await;
    reporter.abort();
    match result {
        Ok(bytes) => {
            println!("Downloaded {} bytes to {}", bytes, destination.display());
            Ok(())
        }
        Err(e) => bail!("download failed: {}", e),
    }
}

fn print_files(files: &[FileEntry]) {
    if files.is_empty() {
        println!("No files available");
        return;
    }
    println!("{:<32} {:<16} {:<22} {}", "FILE", "OWNER", "ADDRESS", "SHARED");
    for file in files {
        println!(
            "{:<32} {:<16} {:<22} {}",
            file.filename,
            file.username,
            file.address().to_string(),
            file.shared_time.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
