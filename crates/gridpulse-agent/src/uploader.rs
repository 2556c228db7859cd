//! Asynchronous delivery: a pool of workers draining the measurement
//! queue into HTTP POSTs.
//!
//! Delivery is at-least-once: a worker retries its payload until the
//! endpoint accepts it, so ordering across workers is not guaranteed.
//! Sustained outages log once per distinct error fingerprint (transport
//! error kind or HTTP status) instead of once per attempt.

use std::io;
use std::mem::Discriminant;
use std::sync::Arc;
use std::sync::atomic::Ordering::{Relaxed, Release};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gridpulse_common::{BoundedQueue, clock};
use tracing::{debug, error, info, trace, warn};

/// Per-request timeout for POSTs.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Statuses the ingest endpoint answers on success.
const ACCEPTED: [u16; 2] = [201, 204];

const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

struct Shared {
    queue: BoundedQueue<String>,
    url: String,
    running: AtomicBool,
    retry_interval_ms: AtomicU64,
}

/// The worker pool. Owns the worker threads; shut down with
/// [`Uploader::shutdown`].
pub struct Uploader {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

/// A cloneable producer-side handle onto the pool.
#[derive(Clone)]
pub struct UploadHandle {
    shared: Arc<Shared>,
}

impl Uploader {
    /// Create the queue and spawn `num_workers` delivery threads. Zero
    /// workers is permitted; the queue then only buffers.
    pub fn new(
        url: &str,
        token: &str,
        queue_capacity: usize,
        num_workers: usize,
    ) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: BoundedQueue::new(queue_capacity),
            url: url.to_string(),
            running: AtomicBool::new(true),
            retry_interval_ms: AtomicU64::new(DEFAULT_RETRY_INTERVAL_MS),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for index in 0..num_workers {
            let shared = Arc::clone(&shared);
            let worker = thread::Builder::new()
                .name(format!("upload-{index}"))
                .spawn(move || worker_task(index, num_workers, shared))?;
            workers.push(worker);
        }

        info!(
            "sending data to {url} with token '{token}' using {num_workers} threads \
             and a queue of capacity {queue_capacity}"
        );

        Ok(Self { shared, workers })
    }

    pub fn handle(&self) -> UploadHandle {
        UploadHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Offer a payload to the queue; a full queue refuses and hands the
    /// payload back.
    pub fn send(&self, payload: String) -> Result<(), String> {
        self.handle().send(payload)
    }

    /// Number of payloads waiting in the queue.
    pub fn buffered(&self) -> usize {
        self.shared.queue.len()
    }

    /// Stop the workers and release anything still queued. Each worker
    /// finishes at most one in-flight request plus one retry sleep.
    pub fn shutdown(mut self) {
        self.shared.running.store(false, Release);

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("upload worker panicked");
            }
        }

        let dropped = self.shared.queue.len();
        if dropped > 0 {
            warn!("dropping {dropped} undelivered measurements");
        }
        self.shared.queue.clear();
    }
}

impl UploadHandle {
    pub fn send(&self, payload: String) -> Result<(), String> {
        self.shared.queue.enqueue(payload).inspect_err(|_| {
            error!("upload queue full");
        })
    }

    pub fn buffered(&self) -> usize {
        self.shared.queue.len()
    }

    /// Adjust the poll/retry interval of the workers.
    pub fn set_retry_interval(&self, millis: u64) {
        self.shared.retry_interval_ms.store(millis, Relaxed);
    }
}

fn worker_task(index: usize, num_workers: usize, shared: Arc<Shared>) {
    // stagger the wake-ups so workers do not poll in lockstep
    let interval = shared.retry_interval_ms.load(Relaxed);
    clock::sleep_millis(interval * index as u64 / num_workers as u64);

    // one agent per worker; handles are never shared across threads
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(SEND_TIMEOUT))
        .http_status_as_error(false)
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let mut last_error = None;

    while shared.running.load(Relaxed) {
        let Some(payload) = shared.queue.dequeue() else {
            clock::sleep_millis(shared.retry_interval_ms.load(Relaxed));
            continue;
        };

        // retry this payload until the endpoint accepts it or the pool
        // shuts down (in which case the payload is abandoned)
        loop {
            if perform_post(&agent, &shared.url, &payload, &mut last_error) {
                debug!("worker {index} delivered measurement");
                break;
            }
            clock::sleep_millis(shared.retry_interval_ms.load(Relaxed));
            if !shared.running.load(Relaxed) {
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fingerprint {
    Transport(Discriminant<ureq::Error>),
    Status(u16),
}

fn perform_post(
    agent: &ureq::Agent,
    url: &str,
    payload: &str,
    last_error: &mut Option<Fingerprint>,
) -> bool {
    let response = match agent
        .post(url)
        .content_type("application/json")
        .send(payload.as_bytes())
    {
        Ok(response) => response,
        Err(e) => {
            let fingerprint = Fingerprint::Transport(std::mem::discriminant(&e));
            if *last_error != Some(fingerprint) {
                warn!("failed to perform POST request: {e}");
            }
            *last_error = Some(fingerprint);
            return false;
        }
    };

    // response body is discarded
    let status = response.status().as_u16();
    if !ACCEPTED.contains(&status) {
        let fingerprint = Fingerprint::Status(status);
        if *last_error != Some(fingerprint) {
            warn!("failed to upload measurement: HTTP status {status}");
        }
        *last_error = Some(fingerprint);
        return false;
    }

    trace!("measurement sent successfully");
    if last_error.take().is_some() {
        info!("measurement finally sent");
    }
    true
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Mutex;

    use super::*;

    /// A minimal one-request-per-connection HTTP endpoint. Each accepted
    /// connection reads one POST, records its body, and answers with the
    /// next status from `statuses` (the last one repeating).
    struct IngestStub {
        port: u16,
        bodies: Arc<Mutex<Vec<String>>>,
        server: Option<JoinHandle<()>>,
        shutdown: Arc<AtomicBool>,
    }

    impl IngestStub {
        fn start(statuses: Vec<u16>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();

            let bodies = Arc::new(Mutex::new(Vec::new()));
            let shutdown = Arc::new(AtomicBool::new(false));

            let server = {
                let bodies = Arc::clone(&bodies);
                let shutdown = Arc::clone(&shutdown);
                thread::spawn(move || {
                    listener.set_nonblocking(true).unwrap();
                    let mut served = 0usize;
                    while !shutdown.load(Relaxed) {
                        match listener.accept() {
                            Ok((stream, _)) => {
                                let status = *statuses
                                    .get(served)
                                    .or(statuses.last())
                                    .unwrap_or(&204);
                                served += 1;
                                if let Some(body) = serve_one(stream, status) {
                                    bodies.lock().unwrap().push(body);
                                }
                            }
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                                thread::sleep(Duration::from_millis(5));
                            }
                            Err(_) => break,
                        }
                    }
                })
            };

            Self {
                port,
                bodies,
                server: Some(server),
                shutdown,
            }
        }

        fn url(&self) -> String {
            format!("http://127.0.0.1:{}/measurements", self.port)
        }

        fn bodies(&self) -> Vec<String> {
            self.bodies.lock().unwrap().clone()
        }

        fn wait_for_bodies(&self, count: usize, timeout: Duration) -> Vec<String> {
            let deadline = std::time::Instant::now() + timeout;
            while std::time::Instant::now() < deadline {
                let bodies = self.bodies();
                if bodies.len() >= count {
                    return bodies;
                }
                thread::sleep(Duration::from_millis(10));
            }
            self.bodies()
        }
    }

    impl Drop for IngestStub {
        fn drop(&mut self) {
            self.shutdown.store(true, Release);
            if let Some(server) = self.server.take() {
                let _ = server.join();
            }
        }
    }

    fn serve_one(mut stream: TcpStream, status: u16) -> Option<String> {
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .ok()?;
        let mut reader = BufReader::new(&mut stream);

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).ok()?;
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some(value) = line
                .to_ascii_lowercase()
                .strip_prefix("content-length:")
                .map(str::trim)
            {
                content_length = value.parse().ok()?;
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).ok()?;

        let reason = match status {
            201 => "Created",
            204 => "No Content",
            500 => "Internal Server Error",
            _ => "OK",
        };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
        );
        stream.write_all(response.as_bytes()).ok()?;

        (status == 201 || status == 204).then(|| String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn delivers_queued_payloads() {
        let stub = IngestStub::start(vec![204]);
        let uploader = Uploader::new(&stub.url(), "tok", 16, 2).unwrap();
        let handle = uploader.handle();
        handle.set_retry_interval(20);

        for i in 0..3 {
            uploader.send(format!("{{\"n\":{i}}}")).unwrap();
        }

        let bodies = stub.wait_for_bodies(3, Duration::from_secs(5));
        assert_eq!(bodies.len(), 3);
        for i in 0..3 {
            assert!(bodies.iter().any(|b| b == &format!("{{\"n\":{i}}}")));
        }

        assert_eq!(uploader.buffered(), 0);
        uploader.shutdown();
    }

    #[test]
    fn retries_the_same_payload_until_accepted() {
        // five failures then success, exercising the fingerprint path
        let stub = IngestStub::start(vec![500, 500, 500, 500, 500, 204]);
        let uploader = Uploader::new(&stub.url(), "tok", 4, 1).unwrap();
        uploader.handle().set_retry_interval(10);

        uploader.send("{\"attempt\":\"same\"}".to_string()).unwrap();

        let bodies = stub.wait_for_bodies(1, Duration::from_secs(5));
        assert_eq!(bodies, vec!["{\"attempt\":\"same\"}".to_string()]);
        uploader.shutdown();
    }

    #[test]
    fn full_queue_hands_the_payload_back() {
        let stub = IngestStub::start(vec![204]);
        // zero workers: nothing drains the queue
        let uploader = Uploader::new(&stub.url(), "tok", 2, 0).unwrap();

        assert!(uploader.send("a".to_string()).is_ok());
        assert!(uploader.send("b".to_string()).is_ok());
        assert_eq!(uploader.send("c".to_string()), Err("c".to_string()));
        assert_eq!(uploader.buffered(), 2);

        // shutdown releases the two buffered payloads
        uploader.shutdown();
    }

    #[test]
    fn shutdown_is_prompt_even_mid_retry() {
        // endpoint that always fails: the worker sits in its retry loop
        let stub = IngestStub::start(vec![500]);
        let uploader = Uploader::new(&stub.url(), "tok", 4, 1).unwrap();
        uploader.handle().set_retry_interval(30);

        uploader.send("{}".to_string()).unwrap();
        // give the worker time to enter its retry loop
        thread::sleep(Duration::from_millis(150));

        let start = std::time::Instant::now();
        uploader.shutdown();
        assert!(
            start.elapsed() < Duration::from_secs(12),
            "one in-flight request plus one retry sleep at most"
        );
    }

    #[test]
    fn fingerprints_compare_by_kind() {
        let status = Fingerprint::Status(500);
        assert_eq!(status, Fingerprint::Status(500));
        assert_ne!(status, Fingerprint::Status(503));
    }
}
