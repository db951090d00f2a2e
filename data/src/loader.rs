//! Multi-threaded batch production.
//!
//! Records are move deltas against a single shared cursor position, so raw
//! reads are linearised by a reader lock; everything downstream of the codec
//! (sampling, index construction, sorting) runs in parallel per worker.
//! Finished batches queue up behind a bound of four per worker until the
//! trainer drains them.

use std::{
    collections::VecDeque,
    fs::File,
    io::{self, BufReader, Seek},
    path::PathBuf,
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
    time::{SystemTime, UNIX_EPOCH},
};

use chess::types::board::Board;
use utils::Xorshift64;

use crate::{
    GameResult,
    batch::{Batch, Entry},
    codec::{self, CodecError},
    sample::SampleFilter,
};

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub path: PathBuf,
    /// Samples per batch.
    pub batch_size: usize,
    /// Worker threads; values below one are clamped to one.
    pub jobs: usize,
    pub random_skip: f64,
    pub wdl_skip: bool,
    pub require_result: bool,
    /// Base seed for the per-worker skip streams; wall clock when absent.
    pub seed: Option<u64>,
}

impl LoaderConfig {
    pub fn new(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            path: path.into(),
            batch_size,
            jobs: 1,
            random_skip: 0.0,
            wdl_skip: false,
            require_result: false,
            seed: None,
        }
    }
}

struct Queue {
    batches: VecDeque<Box<Batch>>,
    /// Batches queued or currently being filled by a worker. Must be zero
    /// again once the loader closes and the consumer has dropped its
    /// fetches.
    in_flight: usize,
    stop: bool,
    error: bool,
}

struct Reader {
    file: BufReader<File>,
    board: Board,
    result: GameResult,
}

struct Shared {
    queue: Mutex<Queue>,
    /// Signalled when a batch lands in the empty queue or the loader fails.
    ready: Condvar,
    /// Signalled when queue pressure drops or shutdown begins.
    fetch: Condvar,
    /// Serialises file reads; the stream is stateful.
    reader: Mutex<Reader>,

    batch_size: usize,
    scratch_size: usize,
    jobs: usize,
    filter: SampleFilter,
    base_seed: u64,
}

impl Shared {
    fn stopped(&self) -> bool {
        let q = self.queue.lock().unwrap();
        q.stop || q.error
    }

    /// Flag a stream failure and wake everyone.
    fn fail(&self) {
        let mut q = self.queue.lock().unwrap();
        q.stop = true;
        q.error = true;
        self.ready.notify_all();
        self.fetch.notify_all();
    }

    /// Refill a worker's scratch entries from the shared cursor, in global
    /// file order. Returns false once the loader is stopping or the stream
    /// is broken.
    fn fetch_entries(&self, entries: &mut Vec<Entry>) -> bool {
        let mut rd = self.reader.lock().unwrap();
        if self.stopped() {
            return false;
        }

        entries.clear();
        while entries.len() < self.scratch_size {
            let m = match codec::read_move(&mut rd.file) {
                Ok(m) => m,
                Err(CodecError::Eof) => {
                    // The loader streams endlessly by wrapping around.
                    if rd.file.rewind().is_err() {
                        self.fail();
                        return false;
                    }
                    continue;
                }
                Err(_) => {
                    self.fail();
                    return false;
                }
            };

            if m.is_null() {
                let (board, result) = match (codec::read_position(&mut rd.file), codec::read_result(&mut rd.file)) {
                    (Ok(b), Ok(r)) => (b, r),
                    _ => {
                        self.fail();
                        return false;
                    }
                };
                rd.board = board;
                rd.result = result;
            } else if rd.board.can_apply(m) {
                rd.board.apply_move(m);
            } else {
                self.fail();
                return false;
            }

            let (eval, flag) = match (codec::read_eval(&mut rd.file), codec::read_flag(&mut rd.file)) {
                (Ok(e), Ok(f)) => (e, f),
                _ => {
                    self.fail();
                    return false;
                }
            };

            entries.push(Entry::from_board(&rd.board, rd.result, eval, flag));
        }
        true
    }
}

fn worker(shared: &Shared, worker_id: usize) {
    let mut rng = Xorshift64::new(shared.base_seed.wrapping_add(worker_id as u64));
    let mut entries: Vec<Entry> = Vec::new();
    let mut cursor = 0usize;
    let reject_limit = 10 * shared.batch_size;

    loop {
        {
            let mut q = shared.queue.lock().unwrap();
            while q.in_flight >= 4 * shared.jobs && !q.stop && !q.error {
                q = shared.fetch.wait(q).unwrap();
            }
            if q.stop || q.error {
                return;
            }
            q.in_flight += 1;
        }

        let mut batch = Batch::new(shared.batch_size);
        let mut rejected = 0usize;

        while !batch.is_full() {
            if cursor >= entries.len() {
                if !shared.fetch_entries(&mut entries) {
                    break;
                }
                cursor = 0;
            }
            let e = &entries[cursor];
            cursor += 1;

            if !shared.filter.accept(e.eval, e.flag, e.result_stm(), e.fullmove, &mut rng) {
                rejected += 1;
                if rejected >= reject_limit {
                    // A policy that can never fill a batch, e.g. requiring
                    // results from a file that stores none. Fail loudly
                    // instead of spinning forever.
                    log::error!("rejected {rejected} consecutive records; configuration cannot fill a batch");
                    shared.fail();
                    break;
                }
                continue;
            }
            rejected = 0;
            batch.push_sample(e);
        }

        let mut q = shared.queue.lock().unwrap();
        if q.stop || q.error {
            q.in_flight -= 1;
            return;
        }
        if q.batches.is_empty() {
            shared.ready.notify_all();
        }
        q.batches.push_back(batch);
    }
}

/// Handle to the worker pool. Batches fetched from it are owned by the
/// caller; dropping them is the matching release.
pub struct DataLoader {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl DataLoader {
    /// Open an archive and start the workers.
    pub fn open(cfg: LoaderConfig) -> io::Result<Self> {
        let jobs = cfg.jobs.max(1);
        let batch_size = cfg.batch_size.max(1);
        let file = File::open(&cfg.path)?;
        let base_seed = cfg.seed.unwrap_or_else(|| {
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(1)
        });

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue { batches: VecDeque::new(), in_flight: 0, stop: false, error: false }),
            ready: Condvar::new(),
            fetch: Condvar::new(),
            reader: Mutex::new(Reader {
                file: BufReader::new(file),
                board: Board::default(),
                result: GameResult::Unknown,
            }),
            batch_size,
            scratch_size: batch_size,
            jobs,
            filter: SampleFilter {
                random_skip: cfg.random_skip,
                wdl_skip: cfg.wdl_skip,
                require_result: cfg.require_result,
            },
            base_seed,
        });

        let workers = (0..jobs)
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new().name(format!("loader-{id}")).spawn(move || worker(&shared, id))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self { shared, workers })
    }

    /// Block until a batch is ready. Returns None once the loader has
    /// failed; the error was already logged.
    pub fn fetch(&self) -> Option<Box<Batch>> {
        let mut q = self.shared.queue.lock().unwrap();
        while q.batches.is_empty() && !q.error {
            q = self.shared.ready.wait(q).unwrap();
        }
        if q.error {
            log::error!("data loader failed; no further batches");
            return None;
        }

        let batch = q.batches.pop_front();
        q.in_flight -= 1;
        self.shared.fetch.notify_all();
        batch
    }

    /// Stop the workers, join them and free anything still queued.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        {
            let mut q = self.shared.queue.lock().unwrap();
            q.stop = true;
            self.shared.fetch.notify_all();
            self.shared.ready.notify_all();
        }
        for w in self.workers.drain(..) {
            let _ = w.join();
        }

        let mut q = self.shared.queue.lock().unwrap();
        while q.batches.pop_front().is_some() {
            q.in_flight -= 1;
        }
        if q.in_flight != 0 {
            // A leak, not a crash: batches handed to the consumer are its
            // own, but nothing else should still be outstanding.
            log::error!("data loader closed with {} batches unaccounted for", q.in_flight);
        }
    }
}

impl Drop for DataLoader {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}
