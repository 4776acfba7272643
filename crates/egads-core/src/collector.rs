//! Background collection: runs gatherers and feeds their samples to the pool.
//!
//! Sources without a poll interval share one main loop. After its first
//! pass the loop keys the pool, and afterwards it only sleeps between passes
//! once the pool is full. Sources with a poll interval (log tails, the
//! random device) each get their own thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::PoolError;
use crate::pool::{EntropyPool, SourceId};
use crate::source::{EntropySource, Sample, SourceKind};

/// Default pause between passes once the pool is full.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Granularity of stop-flag checks while sleeping.
const STOP_CHECK: Duration = Duration::from_millis(50);

/// Pool slots claimed for every [`SourceKind`], in registration order.
#[derive(Debug, Clone)]
pub struct SourceTable {
    ids: Vec<(SourceKind, SourceId)>,
}

impl SourceTable {
    /// Register one slot per kind. Call once, on a fresh pool.
    pub fn register(pool: &EntropyPool) -> Result<Self, PoolError> {
        let ids = SourceKind::ALL
            .iter()
            .map(|&kind| pool.register_source().map(|id| (kind, id)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ids })
    }

    pub fn id(&self, kind: SourceKind) -> Option<SourceId> {
        self.ids.iter().find(|(k, _)| *k == kind).map(|(_, id)| *id)
    }
}

/// Submit samples under `id`. Failures are logged, not propagated.
pub fn feed(pool: &EntropyPool, id: SourceId, samples: Vec<Sample>) {
    for mut sample in samples {
        if let Err(e) = pool.add_entropy(id, &sample.data, sample.estimated_bits) {
            log::warn!("source {id}: {e}");
        }
        zeroize::Zeroize::zeroize(&mut sample.data);
    }
}

/// Sleep for `total`, returning early if `stop` is raised.
fn sleep_unless(stop: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(STOP_CHECK.min(deadline - now));
    }
}

pub struct Collector {
    pool: Arc<EntropyPool>,
    table: SourceTable,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Collector {
    /// Claim source slots on `pool`.
    pub fn new(pool: Arc<EntropyPool>) -> Result<Self, PoolError> {
        let table = SourceTable::register(&pool)?;
        Ok(Self {
            pool,
            table,
            stop: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        })
    }

    pub fn pool(&self) -> &Arc<EntropyPool> {
        &self.pool
    }

    pub fn table(&self) -> &SourceTable {
        &self.table
    }

    /// Collect once from every source and feed the results.
    pub fn run_pass(&self, sources: &mut [Box<dyn EntropySource>]) {
        run_pass(&self.pool, &self.table, sources);
    }

    /// Start background threads. The pool is keyed after the first main
    /// loop pass.
    pub fn start(&mut self, sources: Vec<Box<dyn EntropySource>>, delay: Duration) {
        let (polled, mut looped): (Vec<_>, Vec<_>) = sources
            .into_iter()
            .filter(|s| {
                let ok = s.is_available();
                if !ok {
                    log::info!("source {} unavailable, skipping", s.name());
                }
                ok
            })
            .partition(|s| s.poll_interval().is_some());

        for mut source in polled {
            let Some(id) = self.table.id(source.kind()) else {
                continue;
            };
            let interval = source.poll_interval().unwrap_or(DEFAULT_DELAY);
            let pool = Arc::clone(&self.pool);
            let stop = Arc::clone(&self.stop);
            log::debug!("polling {} every {interval:?}", source.name());
            let handle = std::thread::Builder::new()
                .name(format!("egads-{}", source.name()))
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        sleep_unless(&stop, interval);
                        feed(&pool, id, source.collect());
                    }
                });
            match handle {
                Ok(h) => self.handles.push(h),
                Err(e) => log::error!("cannot start poller: {e}"),
            }
        }

        let pool = Arc::clone(&self.pool);
        let table = self.table.clone();
        let stop = Arc::clone(&self.stop);
        let handle = std::thread::Builder::new()
            .name("egads-collect".into())
            .spawn(move || {
                log::info!("entropy collection started ({} sources)", looped.len());
                let mut first_pass = true;
                while !stop.load(Ordering::Relaxed) {
                    run_pass(&pool, &table, &mut looped);
                    log::debug!("entropy level {:.3}", pool.entropy_level());
                    if first_pass {
                        first_pass = false;
                        match pool.startup_done() {
                            Ok(()) | Err(PoolError::AlreadyKeyed) => {}
                            Err(e) => log::error!("keying pool failed: {e}"),
                        }
                    }
                    if looped.is_empty() || pool.entropy_level() >= 1.0 {
                        sleep_unless(&stop, delay);
                    }
                }
                log::info!("entropy collection ended");
            });
        match handle {
            Ok(h) => self.handles.push(h),
            Err(e) => log::error!("cannot start collector: {e}"),
        }
    }

    /// Ask all threads to finish after their current round.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for every thread.
    pub fn join(mut self) {
        self.stop();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

fn run_pass(pool: &EntropyPool, table: &SourceTable, sources: &mut [Box<dyn EntropySource>]) {
    for source in sources.iter_mut() {
        match table.id(source.kind()) {
            Some(id) => feed(pool, id, source.collect()),
            None => log::warn!("no pool slot for {}", source.kind()),
        }
    }
}
