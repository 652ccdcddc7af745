//! Helper functions for integration tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use system_monitor::{
    CpuInformation, DiskInformation, MemoryInformation, NetworkInformation, Snapshot, Timestamp,
    actors::{gateway::Connection, messages::Event},
    config::Config,
    error::{DeliveryError, SamplerError},
    monitors::Sampler,
    pipeline::Pipeline,
    storage::{MemoryStore, StorageSink},
};
use tokio::sync::mpsc;

pub fn snapshot_at(secs: u64, cpu: f64) -> Snapshot {
    Snapshot {
        timestamp: Timestamp::from_secs(secs),
        cpu: CpuInformation {
            percent: cpu,
            count: 8,
        },
        memory: MemoryInformation {
            total: 16_000_000_000,
            available: 8_000_000_000,
            used: 8_000_000_000,
            percent: 50.0,
        },
        disk: DiskInformation {
            total: 500_000_000_000,
            used: 100_000_000_000,
            free: 400_000_000_000,
            percent: 20.0,
        },
        network: NetworkInformation::default(),
        processes: 250,
    }
}

/// One scripted sampler result
#[derive(Debug, Clone)]
pub enum Step {
    Sample(Snapshot),
    Fail,
}

/// Sampler replaying steps pushed by the test
///
/// Once the script is exhausted it returns a quiet snapshot taken at t=0.
#[derive(Clone, Default)]
pub struct ScriptedSampler {
    steps: Arc<Mutex<VecDeque<Step>>>,
}

impl ScriptedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().push_back(step);
    }

    pub fn push_sample(&self, secs: u64, cpu: f64) {
        self.push(Step::Sample(snapshot_at(secs, cpu)));
    }

    pub fn push_failures(&self, count: usize) {
        for _ in 0..count {
            self.push(Step::Fail);
        }
    }
}

impl Sampler for ScriptedSampler {
    fn sample(&mut self) -> Result<Snapshot, SamplerError> {
        match self.steps.lock().pop_front() {
            Some(Step::Sample(snapshot)) => Ok(snapshot),
            Some(Step::Fail) => Err(SamplerError::SourceUnavailable(
                "/proc is not readable".to_string(),
            )),
            None => Ok(snapshot_at(0, 5.0)),
        }
    }
}

/// Pipeline config that never ticks on its own during a test
pub fn test_config() -> Config {
    Config {
        interval: 3600,
        ..Default::default()
    }
}

pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub sampler: ScriptedSampler,
    pub store: Arc<MemoryStore>,
}

/// Spawn a pipeline and wait for the interval's immediate first tick
pub async fn spawn_pipeline(config: Config) -> TestPipeline {
    spawn_pipeline_with_sink(config, None).await
}

pub async fn spawn_pipeline_with_sink(
    config: Config,
    sink: Option<Arc<dyn StorageSink>>,
) -> TestPipeline {
    let sampler = ScriptedSampler::new();
    let store = Arc::new(MemoryStore::default());
    let sink = sink.unwrap_or_else(|| store.clone() as Arc<dyn StorageSink>);

    let pipeline = Pipeline::spawn(&config, Box::new(sampler.clone()), sink);

    let publisher = pipeline.publisher().clone();
    eventually(|| {
        let publisher = publisher.clone();
        async move { publisher.status().ticks >= 1 }
    })
    .await;

    TestPipeline {
        pipeline,
        sampler,
        store,
    }
}

/// Poll a condition until it holds, panics after two seconds
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// In-memory dashboard connection
pub struct FakeConnection {
    peer: String,
    tx: mpsc::UnboundedSender<String>,
    stalled: bool,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for FakeConnection {
    fn peer(&self) -> String {
        self.peer.clone()
    }

    async fn send(&mut self, text: String) -> Result<(), DeliveryError> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        self.tx.send(text).map_err(|_| DeliveryError::Disconnected)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Test side of a [`FakeConnection`]
pub struct FakeClient {
    pub rx: mpsc::UnboundedReceiver<String>,
    pub closed: Arc<AtomicBool>,
}

impl FakeClient {
    pub async fn next(&mut self) -> Event {
        let text = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed");
        serde_json::from_str(&text).expect("event is valid json")
    }

    /// Next event that is not a status event
    pub async fn next_data(&mut self) -> Event {
        loop {
            match self.next().await {
                Event::Status(_) => continue,
                event => return event,
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn fake_connection(peer: &str) -> (Box<dyn Connection>, FakeClient) {
    connection(peer, false)
}

pub fn stalled_connection(peer: &str) -> (Box<dyn Connection>, FakeClient) {
    connection(peer, true)
}

fn connection(peer: &str, stalled: bool) -> (Box<dyn Connection>, FakeClient) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        Box::new(FakeConnection {
            peer: peer.to_string(),
            tx,
            stalled,
            closed: closed.clone(),
        }),
        FakeClient { rx, closed },
    )
}
