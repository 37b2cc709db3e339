//! Minimal stage machinery for the enumeration pipeline.
//!
//! A pipeline is a chain of stages fed by a pull-based input source and
//! terminated by an output sink. Stages are either FIFO (one task, order
//! preserving) or a worker pool (fixed size, unordered). Items move
//! between stages over bounded channels; a dropped item simply does not
//! reach the next stage. Task errors are logged and never abort the run.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::{EnumError, Result};
use crate::requests::Request;

/// Pull interface the pipeline drives. `has_next` blocks until an item is
/// ready or the source is exhausted; `take` must only be called after
/// `has_next` returned true.
#[async_trait]
pub trait InputSource: Send + Sync {
    async fn has_next(&self, token: &CancellationToken) -> bool;
    async fn take(&self) -> Option<Request>;
}

/// A single stage body. Returning `None` drops the item.
#[async_trait]
pub trait Task: Send + Sync {
    async fn process(&self, req: Request) -> Result<Option<Request>>;
}

/// Terminal consumer of whatever leaves the last stage.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn consume(&self, req: Request) -> Result<()>;
}

enum StageKind {
    Fifo,
    Pool { size: usize },
}

pub struct Stage {
    name: String,
    kind: StageKind,
    task: Arc<dyn Task>,
}

impl Stage {
    /// An order-preserving single-task stage.
    pub fn fifo(name: impl Into<String>, task: Arc<dyn Task>) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Fifo,
            task,
        }
    }

    /// A fixed worker pool; sized once when the pipeline is built.
    pub fn pool(name: impl Into<String>, task: Arc<dyn Task>, size: usize) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Pool { size: size.max(1) },
            task,
        }
    }
}

pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Run with minimal buffering between stages.
    pub async fn execute(
        &self,
        token: CancellationToken,
        source: Arc<dyn InputSource>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<()> {
        self.run(token, source, sink, 1).await
    }

    /// Run with `depth` items of slack between consecutive stages.
    pub async fn execute_buffered(
        &self,
        token: CancellationToken,
        source: Arc<dyn InputSource>,
        sink: Arc<dyn OutputSink>,
        depth: usize,
    ) -> Result<()> {
        self.run(token, source, sink, depth.max(1)).await
    }

    async fn run(
        &self,
        token: CancellationToken,
        source: Arc<dyn InputSource>,
        sink: Arc<dyn OutputSink>,
        depth: usize,
    ) -> Result<()> {
        let (head_tx, mut rx) = mpsc::channel::<Request>(depth);
        let mut handles = Vec::new();

        for stage in &self.stages {
            let (tx, next_rx) = mpsc::channel::<Request>(depth);
            match stage.kind {
                StageKind::Fifo => {
                    handles.push(tokio::spawn(stage_loop(
                        stage.name.clone(),
                        stage.task.clone(),
                        rx,
                        tx,
                        token.clone(),
                    )));
                }
                StageKind::Pool { size } => {
                    let shared = Arc::new(Mutex::new(rx));
                    for _ in 0..size {
                        handles.push(tokio::spawn(pool_worker(
                            stage.name.clone(),
                            stage.task.clone(),
                            shared.clone(),
                            tx.clone(),
                            token.clone(),
                        )));
                    }
                }
            }
            rx = next_rx;
        }

        // Tail: drain the last stage into the sink.
        let sink_token = token.clone();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sink_token.cancelled() => break,
                    item = rx.recv() => match item {
                        Some(req) => {
                            if let Err(e) = sink.consume(req).await {
                                warn!(stage = "sink", category = %e.category(), error = %e, "sink failed");
                            }
                        }
                        None => break,
                    },
                }
            }
        }));

        // Head: pull from the input source until exhaustion.
        while source.has_next(&token).await {
            if let Some(req) = source.take().await {
                if head_tx.send(req).await.is_err() {
                    break;
                }
            }
        }
        drop(head_tx);

        // Every stage drains before the run is considered complete.
        futures::future::join_all(handles).await;

        if token.is_cancelled() {
            return Err(EnumError::Cancelled);
        }
        Ok(())
    }
}

async fn stage_loop(
    name: String,
    task: Arc<dyn Task>,
    mut rx: mpsc::Receiver<Request>,
    tx: mpsc::Sender<Request>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            item = rx.recv() => match item {
                Some(req) => forward(&name, &task, req, &tx).await,
                None => break,
            },
        }
    }
}

async fn pool_worker(
    name: String,
    task: Arc<dyn Task>,
    rx: Arc<Mutex<mpsc::Receiver<Request>>>,
    tx: mpsc::Sender<Request>,
    token: CancellationToken,
) {
    loop {
        let item = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = token.cancelled() => None,
                item = rx.recv() => item,
            }
        };
        match item {
            Some(req) => forward(&name, &task, req, &tx).await,
            None => break,
        }
    }
}

async fn forward(name: &str, task: &Arc<dyn Task>, req: Request, tx: &mpsc::Sender<Request>) {
    match task.process(req).await {
        Ok(Some(out)) => {
            let _ = tx.send(out).await;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(stage = name, category = %e.category(), error = %e, "stage task failed");
        }
    }
}
