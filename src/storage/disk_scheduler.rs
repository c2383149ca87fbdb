use crate::buffer::PageId;
use crate::config::IOSchedulerConfig;
use crate::error::{BucketDBError, BucketDBResult};
use crate::storage::disk_manager::DiskManager;
use bytes::{Bytes, BytesMut};
use log::{debug, error, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

pub type DiskCommandResultSender<T> = Sender<BucketDBResult<T>>;
pub type DiskCommandResultReceiver<T> = Receiver<BucketDBResult<T>>;

/// One unit of disk work, carrying the channel its reply goes back on.
#[derive(Debug)]
pub enum DiskRequest {
    ReadPage {
        page_id: PageId,
        result_sender: DiskCommandResultSender<BytesMut>,
    },
    WritePage {
        page_id: PageId,
        data: Bytes,
        result_sender: DiskCommandResultSender<()>,
    },
    AllocatePage {
        result_sender: DiskCommandResultSender<PageId>,
    },
    DeallocatePage {
        page_id: PageId,
        result_sender: DiskCommandResultSender<()>,
    },
    Shutdown,
}

type RequestQueue = Arc<Mutex<Receiver<DiskRequest>>>;

/// Hands disk work to a pool of background threads. Every worker pulls from
/// the same shared queue, so requests start in submission order and land on
/// whichever worker is idle.
#[derive(Debug)]
pub struct DiskScheduler {
    request_sender: Sender<DiskRequest>,
    workers: Vec<thread::JoinHandle<()>>,
    pub config: IOSchedulerConfig,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        Self::new_with_config(disk_manager, IOSchedulerConfig::default())
    }

    pub fn new_with_config(disk_manager: Arc<DiskManager>, config: IOSchedulerConfig) -> Self {
        let (request_sender, request_receiver) = mpsc::channel::<DiskRequest>();
        let queue: RequestQueue = Arc::new(Mutex::new(request_receiver));

        let worker_count = config.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = queue.clone();
            let disk_manager = disk_manager.clone();
            let handle = thread::Builder::new()
                .name(format!("bucketdb-io-{}", worker_id))
                .spawn(move || worker_loop(worker_id, queue, disk_manager))
                .expect("failed to spawn disk scheduler worker");
            workers.push(handle);
        }

        DiskScheduler {
            request_sender,
            workers,
            config,
        }
    }

    pub fn schedule_read(
        &self,
        page_id: PageId,
    ) -> BucketDBResult<DiskCommandResultReceiver<BytesMut>> {
        let (tx, rx) = mpsc::channel();
        self.submit(DiskRequest::ReadPage {
            page_id,
            result_sender: tx,
        })?;
        Ok(rx)
    }

    pub fn schedule_write(
        &self,
        page_id: PageId,
        data: Bytes,
    ) -> BucketDBResult<DiskCommandResultReceiver<()>> {
        let (tx, rx) = mpsc::channel();
        self.submit(DiskRequest::WritePage {
            page_id,
            data,
            result_sender: tx,
        })?;
        Ok(rx)
    }

    pub fn schedule_allocate(&self) -> BucketDBResult<DiskCommandResultReceiver<PageId>> {
        let (tx, rx) = mpsc::channel();
        self.submit(DiskRequest::AllocatePage { result_sender: tx })?;
        Ok(rx)
    }

    pub fn schedule_deallocate(
        &self,
        page_id: PageId,
    ) -> BucketDBResult<DiskCommandResultReceiver<()>> {
        let (tx, rx) = mpsc::channel();
        self.submit(DiskRequest::DeallocatePage {
            page_id,
            result_sender: tx,
        })?;
        Ok(rx)
    }

    fn submit(&self, request: DiskRequest) -> BucketDBResult<()> {
        self.request_sender
            .send(request)
            .map_err(|e| BucketDBError::Internal(format!("disk scheduler is shut down: {}", e)))
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // one Shutdown per worker; each consumes exactly one and exits
        for _ in 0..self.workers.len() {
            let _ = self.request_sender.send(DiskRequest::Shutdown);
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("disk scheduler worker panicked during shutdown");
            }
        }
    }
}

fn worker_loop(worker_id: usize, queue: RequestQueue, disk_manager: Arc<DiskManager>) {
    debug!("disk worker {} started", worker_id);
    loop {
        // the queue lock is only held for the dequeue itself
        let received = queue.lock().unwrap().recv();
        let request = match received {
            Ok(request) => request,
            Err(_) => break, // every sender is gone
        };

        match request {
            DiskRequest::ReadPage {
                page_id,
                result_sender,
            } => {
                let reply = disk_manager
                    .read_page(page_id)
                    .map(|data| BytesMut::from(&data[..]));
                send_reply(result_sender, reply, "read");
            }
            DiskRequest::WritePage {
                page_id,
                data,
                result_sender,
            } => {
                send_reply(result_sender, disk_manager.write_page(page_id, &data), "write");
            }
            DiskRequest::AllocatePage { result_sender } => {
                send_reply(result_sender, disk_manager.allocate_page(), "allocate");
            }
            DiskRequest::DeallocatePage {
                page_id,
                result_sender,
            } => {
                send_reply(
                    result_sender,
                    disk_manager.deallocate_page(page_id),
                    "deallocate",
                );
            }
            DiskRequest::Shutdown => break,
        }
    }
    debug!("disk worker {} stopped", worker_id);
}

fn send_reply<T>(result_sender: DiskCommandResultSender<T>, reply: BucketDBResult<T>, op: &str) {
    if result_sender.send(reply).is_err() {
        warn!("dropping {} reply, the requester went away", op);
    }
}
