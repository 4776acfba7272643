use std::sync::Arc;
use std::time::Duration;

use egads_core::sources::build_sources;
use egads_core::{Collector, EntropyPool, SourceKind};
use egads_server::{Dialect, EntropyServer, ServerContext};

use crate::config::DaemonConfig;
use crate::datadir::{self, PidFile};

/// Run the daemon until SIGINT, SIGTERM or SIGHUP.
pub fn run(config: DaemonConfig) {
    if let Err(e) = serve(config) {
        eprintln!("egads: {e}");
        std::process::exit(1);
    }
}

fn serve(config: DaemonConfig) -> Result<(), String> {
    datadir::check_safe_dir(&config.data_dir)
        .map_err(|e| format!("not a secure directory: {e}"))?;

    if !config.foreground {
        datadir::daemonize().map_err(|e| format!("fork failed: {e}"))?;
    }

    let pid_file = PidFile::acquire(&config.pid_path())
        .map_err(|e| format!("{}: {e}", config.pid_path().display()))?;

    let pool = Arc::new(EntropyPool::new());
    let seed_path = config.seed_path();
    match pool.restore_from_path(&seed_path) {
        Ok(()) => log::info!("restored seed from {}", seed_path.display()),
        Err(e) => log::warn!("could not restore seed file {}: {e}", seed_path.display()),
    }

    let mut collector =
        Collector::new(Arc::clone(&pool)).map_err(|e| format!("registering sources: {e}"))?;
    let external = collector
        .table()
        .id(SourceKind::External)
        .ok_or("no slot for external entropy")?;
    let sources = build_sources(&config.selection());
    log::info!(
        "starting {} sources: {}",
        sources.len(),
        sources.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
    );
    collector.start(sources, config.delay());

    let (signal_tx, mut signal_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(());
    })
    .map_err(|e| format!("installing signal handler: {e}"))?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("tokio runtime: {e}"))?;
    let ctx = Arc::new(ServerContext::new(Arc::clone(&pool), external));
    let served = runtime.block_on(async {
        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);

        let mut listeners = vec![(config.socket_path(), Dialect::Egads)];
        if let Some(egd) = &config.egd_socket {
            listeners.push((egd.clone(), Dialect::Egd));
        }

        let mut tasks = Vec::new();
        for (path, dialect) in listeners {
            let server = EntropyServer::bind(&path, dialect, Arc::clone(&ctx))
                .map_err(|e| format!("{}: {e}", path.display()))?;
            let mut stop = stop_rx.clone();
            tasks.push(tokio::spawn(server.run_until(async move {
                let _ = stop.changed().await;
            })));
        }

        let _ = signal_rx.recv().await;
        log::info!("shutting down");
        let _ = stop_tx.send(true);
        for task in tasks {
            match task.await {
                Ok(Err(e)) => log::warn!("server error: {e}"),
                Err(e) => log::warn!("server task failed: {e}"),
                Ok(Ok(())) => {}
            }
        }
        Ok::<(), String>(())
    });
    // Readers blocked on an empty pool hold blocking threads; do not wait on them.
    runtime.shutdown_timeout(Duration::from_millis(500));
    collector.join();

    if let Err(e) = pool.save_to_path(&seed_path) {
        log::warn!("could not save seed file {}: {e}", seed_path.display());
    }
    drop(pid_file);
    served
}
