//! Per-tick driver that turns decoded resources into atlas placements and
//! instance records.
//!
//! The coordinator owns the packer, the instance buffer and the device, so
//! everything that touches GPU state happens on whichever thread calls
//! [`ResourceStreamCoordinator::update`]. Workers only ever see an
//! [`IngestProducer`].

use std::collections::HashMap;
use std::sync::Arc;

use atlasfeed_gpu::UploadDevice;
use parking_lot::RwLock;

use crate::atlas::{AtlasPacker, AtlasPage, ResourcePlacement};
use crate::config::StreamConfig;
use crate::decode::ResourceDecoder;
use crate::discovery::{ResourceRequest, ResourceResolver};
use crate::error::{PackError, ResourceError, StreamError};
use crate::ingest::{IngestMessage, IngestProducer, IngestQueue, Ticket};
use crate::instance::{InstanceRecord, InstanceTransformBuffer};
use crate::worker::{DecodeJob, WorkerPool};

/// Lifecycle of one resource. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceState {
    Discovered,
    Admitted,
    Decoding,
    Queued,
    Packed,
    Rendered,
    Rejected,
    Skipped,
}

impl ResourceState {
    const COUNT: usize = 8;

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rendered | Self::Rejected | Self::Skipped)
    }
}

/// A resource that was dropped, and why.
#[derive(Debug)]
pub struct Diagnostic {
    pub ticket: Ticket,
    pub identity: String,
    pub error: ResourceError,
}

/// Snapshot published at the end of every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub ticks: u64,
    /// Resources the coordinator has heard of, rejected ones excluded.
    pub total: usize,
    pub rendered: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub in_flight: usize,
    pub queued: usize,
    pub pages: usize,
    pub instances: usize,
}

impl StreamStats {
    /// Resources that reached a terminal state after admission.
    pub fn completed(&self) -> usize {
        self.rendered + self.skipped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub drained: usize,
    pub packed: usize,
    pub skipped: usize,
    pub pages_uploaded: usize,
    pub instances_uploaded: bool,
}

/// Bookkeeping that does not touch the device.
#[derive(Debug, Default)]
struct Ledger {
    states: HashMap<Ticket, ResourceState>,
    /// Tickets per state, indexed by discriminant.
    counts: [usize; ResourceState::COUNT],
    placements: Vec<ResourcePlacement>,
    by_ticket: HashMap<Ticket, usize>,
    instances_per_page: Vec<usize>,
    diagnostics: Vec<Diagnostic>,
    /// Packed but not yet uploaded.
    unrendered: Vec<Ticket>,
}

impl Ledger {
    fn transition(&mut self, ticket: Ticket, next: ResourceState) {
        match self.states.get_mut(&ticket) {
            None => {
                self.states.insert(ticket, next);
                self.counts[next as usize] += 1;
            }
            Some(state) if !state.is_terminal() && next > *state => {
                self.counts[*state as usize] -= 1;
                self.counts[next as usize] += 1;
                *state = next;
            }
            Some(_) => {}
        }
    }

    fn place(&mut self, ticket: Ticket, placement: ResourcePlacement) {
        let page = placement.page_index();
        if self.instances_per_page.len() <= page {
            self.instances_per_page.resize(page + 1, 0);
        }
        self.instances_per_page[page] += 1;
        self.by_ticket.insert(ticket, self.placements.len());
        self.placements.push(placement);
        self.unrendered.push(ticket);
        self.transition(ticket, ResourceState::Packed);
    }

    fn skip(&mut self, ticket: Ticket, identity: String, error: ResourceError) {
        log::warn!("Skipping {identity}: {error}");
        self.transition(ticket, ResourceState::Skipped);
        self.diagnostics.push(Diagnostic {
            ticket,
            identity,
            error,
        });
    }

    fn count(&self, state: ResourceState) -> usize {
        self.counts[state as usize]
    }
}

pub struct ResourceStreamCoordinator<D: UploadDevice> {
    config: StreamConfig,
    device: D,
    packer: AtlasPacker<D::Texture>,
    instances: InstanceTransformBuffer<D::Buffer>,
    queue: IngestQueue,
    workers: WorkerPool,
    decoder: Arc<dyn ResourceDecoder>,
    resolver: ResourceResolver,
    admitted: Vec<DecodeJob>,
    ledger: Ledger,
    stats: Arc<RwLock<StreamStats>>,
    ticks: u64,
}

impl<D: UploadDevice> ResourceStreamCoordinator<D> {
    pub fn new(
        config: StreamConfig,
        device: D,
        decoder: Arc<dyn ResourceDecoder>,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        let workers = WorkerPool::new(config.reserved_threads)?;
        Ok(Self {
            packer: AtlasPacker::new(config.page_width, config.page_height, config.max_pages),
            instances: InstanceTransformBuffer::with_capacity(config.initial_instance_capacity),
            queue: IngestQueue::new(),
            resolver: ResourceResolver::new(config.data_root.clone()),
            admitted: Vec::new(),
            ledger: Ledger::default(),
            stats: Arc::new(RwLock::new(StreamStats::default())),
            ticks: 0,
            config,
            device,
            workers,
            decoder,
        })
    }

    /// Queue a resource for decoding on the next tick.
    ///
    /// Requests whose data cannot be found are rejected here and never
    /// reach a worker.
    pub fn admit(&mut self, request: ResourceRequest) -> Result<Ticket, ResourceError> {
        let ticket = self.queue.next_ticket();
        self.ledger.transition(ticket, ResourceState::Discovered);

        match self.resolver.resolve(&request.identity) {
            Ok(path) => {
                self.ledger.transition(ticket, ResourceState::Admitted);
                self.admitted.push(DecodeJob {
                    ticket,
                    identity: request.identity,
                    path,
                    world: request.world,
                });
                Ok(ticket)
            }
            Err(err) => {
                log::debug!("Rejected {}: {err}", request.identity);
                self.ledger.transition(ticket, ResourceState::Rejected);
                Err(err)
            }
        }
    }

    /// Run one tick: dispatch, drain, pack, upload.
    ///
    /// Per-resource failures are recorded as diagnostics. Running out of
    /// atlas space stops the drain: the resource that did not fit is skipped,
    /// everything packed before it is still uploaded, and the error is
    /// returned to the caller. Anything still queued stays queued.
    pub fn update(&mut self) -> Result<TickReport, StreamError> {
        let mut report = TickReport::default();
        self.ticks += 1;

        if !self.admitted.is_empty() {
            let jobs = std::mem::take(&mut self.admitted);
            for job in &jobs {
                self.ledger.transition(job.ticket, ResourceState::Decoding);
            }
            report.dispatched = jobs.len();
            self.workers.dispatch(jobs, &self.decoder, &self.queue.producer());
        }

        let Self {
            config,
            device,
            packer,
            instances,
            queue,
            ledger,
            ..
        } = self;

        let mut exhausted = None;
        for message in queue.drain(config.max_drain_per_tick) {
            report.drained += 1;
            let resource = match message {
                IngestMessage::Decoded(resource) => resource,
                IngestMessage::Failed {
                    ticket,
                    identity,
                    path,
                    error,
                } => {
                    ledger.skip(ticket, identity, ResourceError::Decode { path, source: error });
                    report.skipped += 1;
                    continue;
                }
            };
            ledger.transition(resource.ticket, ResourceState::Queued);

            match packer.insert(&*device, resource.width, resource.height, &resource.pixels) {
                Ok(placement) => {
                    instances.insert_instance(
                        placement.instance_index(),
                        InstanceRecord::new(
                            &resource.world,
                            resource.width,
                            resource.height,
                            &placement,
                        ),
                    );
                    ledger.place(resource.ticket, placement);
                    report.packed += 1;
                }
                Err(PackError::Capacity(err)) => {
                    log::error!("Atlas is full, cannot place {}", resource.identity);
                    let error = ResourceError::Unplaced(err.clone());
                    ledger.skip(resource.ticket, resource.identity, error);
                    report.skipped += 1;
                    exhausted = Some(err);
                    break;
                }
                Err(PackError::TooLarge {
                    width,
                    height,
                    page_width,
                    page_height,
                }) => {
                    let error = ResourceError::Oversized {
                        width,
                        height,
                        page_width,
                        page_height,
                    };
                    ledger.skip(resource.ticket, resource.identity, error);
                    report.skipped += 1;
                }
                Err(err) => {
                    ledger.skip(resource.ticket, resource.identity, ResourceError::Malformed(err));
                    report.skipped += 1;
                }
            }
        }

        // Both are no-ops when nothing changed.
        report.pages_uploaded = packer.flush_uploads(&*device);
        report.instances_uploaded = instances.update_instance_buffer(&*device)?;
        for ticket in std::mem::take(&mut ledger.unrendered) {
            ledger.transition(ticket, ResourceState::Rendered);
        }

        if report.drained > 0 {
            log::debug!(
                "Tick {}: packed {}, skipped {}, uploaded {} pages",
                self.ticks,
                report.packed,
                report.skipped,
                report.pages_uploaded
            );
        }
        self.publish_stats();
        match exhausted {
            Some(err) => Err(StreamError::CapacityExhaustion(err)),
            None => Ok(report),
        }
    }

    fn publish_stats(&self) {
        let rejected = self.ledger.count(ResourceState::Rejected);
        let snapshot = StreamStats {
            ticks: self.ticks,
            total: self.ledger.states.len() - rejected,
            rendered: self.ledger.count(ResourceState::Rendered),
            skipped: self.ledger.count(ResourceState::Skipped),
            rejected,
            in_flight: self.workers.in_flight(),
            queued: self.queue.len(),
            pages: self.packer.page_count(),
            instances: self.instances.len(),
        };
        *self.stats.write() = snapshot;
    }

    /// Nothing admitted, decoding, queued or waiting for upload.
    pub fn is_idle(&self) -> bool {
        // In-flight first: workers enqueue before they stop counting.
        self.admitted.is_empty()
            && self.workers.in_flight() == 0
            && self.queue.is_empty()
            && self.ledger.unrendered.is_empty()
    }

    /// For callers that decode on their own.
    pub fn producer(&self) -> IngestProducer {
        self.queue.producer()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn pages(&self) -> &[AtlasPage<D::Texture>] {
        self.packer.pages()
    }

    pub fn instances(&self) -> &InstanceTransformBuffer<D::Buffer> {
        &self.instances
    }

    pub fn instances_per_page(&self) -> &[usize] {
        &self.ledger.instances_per_page
    }

    /// In instance order.
    pub fn placements(&self) -> &[ResourcePlacement] {
        &self.ledger.placements
    }

    pub fn placement(&self, ticket: Ticket) -> Option<&ResourcePlacement> {
        self.ledger
            .by_ticket
            .get(&ticket)
            .map(|&index| &self.ledger.placements[index])
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.ledger.diagnostics
    }

    pub fn state(&self, ticket: Ticket) -> Option<ResourceState> {
        self.ledger.states.get(&ticket).copied()
    }

    pub fn stats(&self) -> Arc<RwLock<StreamStats>> {
        Arc::clone(&self.stats)
    }
}
