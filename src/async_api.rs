use crate::control::Connector;
use crate::manifest::Manifest;
use crate::pipeline::{CaptureOutcome, CapturePipeline, CaptureRequest};
use crate::sink::PersistenceSink;
use crate::{CaptureConfig, Error, Result, SessionConfig};
use log::debug;
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Capture(String, CaptureRequest, oneshot::Sender<Result<CaptureOutcome>>),
    Manifest(oneshot::Sender<Manifest>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly capture handle backed by a dedicated worker thread.
///
/// The worker owns the connector, the pipeline and the sink, and runs
/// requests one at a time in arrival order, so two captures never drive the
/// same page concurrently. Clones share the same worker.
#[derive(Clone)]
pub struct Capturer {
    cmd_tx: Sender<Command>,
}

impl Capturer {
    /// Spawn the worker. `connect` runs on the worker thread, so the
    /// connector itself does not need to be `Send`.
    pub async fn new<C, S, F>(connect: F, config: CaptureConfig, session: SessionConfig, sink: S) -> Result<Self>
    where
        C: Connector,
        S: PersistenceSink + Send + 'static,
        F: FnOnce() -> Result<C> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let mut sink = sink;
            let setup = connect().and_then(|connector| {
                let mut pipeline = CapturePipeline::new(config, session)?;
                pipeline.load_manifest(&sink)?;
                Ok((connector, pipeline))
            });
            let (mut connector, mut pipeline) = match setup {
                Ok(parts) => parts,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Capture(target, request, resp) => {
                        debug!("worker capturing {}", target);
                        let res = pipeline.run(&mut connector, &target, &request, &mut sink);
                        let _ = resp.send(res);
                    }
                    Command::Manifest(resp) => {
                        let _ = resp.send(pipeline.manifest().clone());
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(Ok(()));
                        break;
                    }
                }
            }
        });

        init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))??;

        Ok(Self { cmd_tx })
    }

    /// Capture `target` and persist its artifacts
    pub async fn capture(&self, target: &str, request: CaptureRequest) -> Result<CaptureOutcome> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Capture(target.to_string(), request, tx))
            .map_err(|_| Error::Other("Capture worker has shut down".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Capture canceled: {}", e)))?
    }

    /// Snapshot of the session ledger
    pub async fn manifest(&self) -> Result<Manifest> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Manifest(tx))
            .map_err(|_| Error::Other("Capture worker has shut down".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Manifest canceled: {}", e)))
    }

    /// Stop the worker. Pending requests queued before this one still run.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}
