use crate::remote::{PipeRequest, RemoteEndpoint, RunRequest, UnpipeNotice};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// How a `MockEndpoint` answers pipe requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockAnswer {
    Accept,
    Refuse,
    /// Fails as if the transport dropped the request.
    Fail,
}

/// In-process stand-in for a transport. Records everything it receives and
/// answers pipe requests with a configurable verdict.
pub struct MockEndpoint {
    answer: Mutex<MockAnswer>,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
    fail_runs: AtomicBool,
    requests: Mutex<Vec<PipeRequest>>,
    runs: Mutex<Vec<RunRequest>>,
    unpipes: Mutex<Vec<UnpipeNotice>>,
}

impl MockEndpoint {
    pub fn new(answer: MockAnswer) -> Self {
        Self {
            answer: Mutex::new(answer),
            delay: None,
            gate: None,
            fail_runs: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
            unpipes: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting() -> Self {
        Self::new(MockAnswer::Accept)
    }

    pub fn refusing() -> Self {
        Self::new(MockAnswer::Refuse)
    }

    pub fn failing() -> Self {
        Self::new(MockAnswer::Fail)
    }

    /// Every call sleeps for `delay` before answering (needs a tokio runtime).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every pipe request waits until `release` hands out a permit.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn set_answer(&self, answer: MockAnswer) {
        *self.answer.lock().unwrap_or_else(|p| p.into_inner()) = answer;
    }

    pub fn fail_runs(&self, fail: bool) {
        self.fail_runs.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<PipeRequest> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn runs(&self) -> Vec<RunRequest> {
        self.runs.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn unpipes(&self) -> Vec<UnpipeNotice> {
        self.unpipes.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn wait(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteEndpoint for MockEndpoint {
    async fn request_pipe(&self, request: PipeRequest) -> Result<bool> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        self.wait().await?;

        let answer = *self.answer.lock().unwrap_or_else(|p| p.into_inner());
        match answer {
            MockAnswer::Accept => Ok(true),
            MockAnswer::Refuse => Ok(false),
            MockAnswer::Fail => Err(anyhow!("mock endpoint dropped the pipe request")),
        }
    }

    async fn notify_unpipe(&self, notice: UnpipeNotice) -> Result<()> {
        self.wait().await?;
        self.unpipes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notice);
        Ok(())
    }

    async fn run(&self, request: RunRequest) -> Result<()> {
        self.wait().await?;
        if self.fail_runs.load(Ordering::SeqCst) {
            return Err(anyhow!("mock endpoint rejected run of node {}", request.node_uid));
        }
        self.runs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request);
        Ok(())
    }
}
