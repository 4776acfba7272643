//! egads: entropy gathering and distribution daemon, plus a small client.

mod commands;
mod config;
mod datadir;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use config::DaemonConfig;

#[derive(Parser)]
#[command(name = "egads")]
#[command(about = "egads: entropy gathering and distribution system")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the entropy daemon
    Daemon {
        /// JSON configuration file; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seconds between collection passes once the pool is full
        #[arg(short = 'd', long)]
        delay: Option<u64>,

        /// Also serve the EGD protocol on this socket
        #[arg(short = 'e', long)]
        egd_socket: Option<PathBuf>,

        /// Additional log file to tail (repeatable)
        #[arg(short = 'l', long = "logfile")]
        log_files: Vec<PathBuf>,

        /// Data directory for the pid file, seed file and socket
        #[arg(short = 'p', long)]
        data_dir: Option<PathBuf>,

        /// Disable the command-output gatherer
        #[arg(short = 'C', long)]
        no_commands: bool,

        /// Stay in the foreground
        #[arg(short = 'F', long)]
        foreground: bool,

        /// Do not tail the default system logs
        #[arg(short = 'L', long)]
        no_system_logs: bool,

        /// Enable the timer-interrupt counter gatherer
        #[arg(short = 'R', long)]
        truerand: bool,

        /// Disable the scheduler timing gatherer
        #[arg(short = 'S', long)]
        no_scheduler: bool,

        /// Disable the thread timing gatherer
        #[arg(short = 'T', long)]
        no_threads: bool,
    },

    /// Fetch bytes from a running daemon
    Fetch {
        /// Number of bytes
        #[arg(short = 'n', long, default_value = "32")]
        bytes: u32,

        /// Print as hex instead of raw bytes
        #[arg(long)]
        hex: bool,

        /// Daemon socket
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Show the daemon's entropy estimate
    Level {
        /// Speak EGD instead of EGADS (use with an EGD socket)
        #[arg(long)]
        egd: bool,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Submit entropy to an EGD socket
    Add {
        /// Bits of entropy to credit
        #[arg(long, default_value = "0")]
        bits: u16,

        /// Data to submit; reads stdin when absent
        #[arg(long)]
        data: Option<String>,

        /// EGD socket
        #[arg(long)]
        socket: PathBuf,
    },

    /// Print the pid of the daemon behind an EGD socket
    Pid {
        #[arg(long)]
        socket: PathBuf,
    },

    /// Seed a generator from the daemon and print one draw per distribution
    Randtest {
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Device read when the daemon is unreachable
        #[arg(long)]
        fallback: Option<PathBuf>,
    },

    /// List entropy gatherers and whether they work here
    Sources {
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Daemon {
            config,
            delay,
            egd_socket,
            log_files,
            data_dir,
            no_commands,
            foreground,
            no_system_logs,
            truerand,
            no_scheduler,
            no_threads,
        } => {
            let mut cfg = match config {
                Some(path) => DaemonConfig::load(&path).unwrap_or_else(|e| {
                    eprintln!("egads: {e}");
                    std::process::exit(1);
                }),
                None => DaemonConfig::default(),
            };
            if let Some(d) = delay {
                cfg.delay_secs = d;
            }
            if let Some(dir) = data_dir {
                cfg.data_dir = dir;
            }
            if egd_socket.is_some() {
                cfg.egd_socket = egd_socket;
            }
            cfg.log_files.extend(log_files);
            cfg.foreground |= foreground;
            cfg.use_commands &= !no_commands;
            cfg.use_system_logs &= !no_system_logs;
            cfg.use_scheduler &= !no_scheduler;
            cfg.use_threads &= !no_threads;
            cfg.use_truerand |= truerand;
            commands::daemon::run(cfg);
        }
        Commands::Fetch { bytes, hex, socket } => {
            let socket = socket.unwrap_or_else(config::default_socket);
            commands::client::fetch(&socket, bytes, hex);
        }
        Commands::Level { egd, json, socket } => {
            let socket = socket.unwrap_or_else(config::default_socket);
            commands::client::level(&socket, egd, json);
        }
        Commands::Add { bits, data, socket } => {
            commands::client::add(&socket, bits, data.as_deref());
        }
        Commands::Pid { socket } => commands::client::pid(&socket),
        Commands::Randtest { socket, fallback } => {
            let socket = socket.unwrap_or_else(config::default_socket);
            commands::randtest::run(&socket, fallback.as_deref());
        }
        Commands::Sources { json } => commands::sources::run(json),
    }
}
