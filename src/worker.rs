use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::decode::ResourceDecoder;
use crate::ingest::{IngestMessage, IngestProducer, PendingResource, Ticket};
use crate::instance::WorldTransform;

/// One admitted resource, ready to be decoded off the owning thread.
#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub ticket: Ticket,
    pub identity: String,
    pub path: PathBuf,
    pub world: WorldTransform,
}

impl DecodeJob {
    fn run(self, decoder: &dyn ResourceDecoder) -> IngestMessage {
        match decoder.decode(&self.path) {
            Ok(decoded) => IngestMessage::Decoded(PendingResource {
                ticket: self.ticket,
                identity: self.identity,
                pixels: decoded.pixels,
                width: decoded.width,
                height: decoded.height,
                world: self.world,
            }),
            Err(error) => IngestMessage::Failed {
                ticket: self.ticket,
                identity: self.identity,
                path: self.path,
                error,
            },
        }
    }
}

/// Fixed-size decode pool.
///
/// Workers never see the atlas or the device: they decode and enqueue.
/// Outstanding work is abandoned when the pool is dropped.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
    in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl WorkerPool {
    /// Size the pool to the machine, leaving `reserved_threads` free.
    pub fn new(reserved_threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let available = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self::with_workers(available.saturating_sub(reserved_threads))
    }

    pub fn with_workers(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("atlasfeed-decode-{index}"))
            .build()?;
        log::debug!("Started {workers} decode workers");
        Ok(Self {
            pool,
            workers,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs handed out but not yet enqueued.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Split `jobs` into contiguous slices, one task per slice. Each task
    /// decodes its slice in order and enqueues every result.
    pub fn dispatch(
        &self,
        jobs: Vec<DecodeJob>,
        decoder: &Arc<dyn ResourceDecoder>,
        producer: &IngestProducer,
    ) {
        if jobs.is_empty() {
            return;
        }
        self.in_flight.fetch_add(jobs.len(), Ordering::AcqRel);

        let ranges = partition(jobs.len(), self.workers);
        let mut jobs = jobs.into_iter();
        for range in ranges {
            let slice: Vec<DecodeJob> = jobs.by_ref().take(range.len()).collect();
            let decoder = Arc::clone(decoder);
            let producer = producer.clone();
            let in_flight = Arc::clone(&self.in_flight);
            self.pool.spawn(move || {
                for job in slice {
                    producer.enqueue(job.run(decoder.as_ref()));
                    in_flight.fetch_sub(1, Ordering::AcqRel);
                }
            });
        }
    }
}

/// At most `workers` contiguous, near-equal ranges covering `0..len`.
fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    let chunk = len.div_ceil(workers.max(1)).max(1);
    (0..len)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(len))
        .collect()
}
