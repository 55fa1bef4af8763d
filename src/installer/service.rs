// src/installer/service.rs

//! Single-consumer request queue
//!
//! The [`InstallerContext`] is moved onto one worker thread which handles
//! requests strictly one at a time, in arrival order. Clients talk to it
//! through a cloneable [`InstallerHandle`]; every call blocks until the
//! worker has answered.

use super::progress::ProgressSink;
use super::InstallerContext;
use crate::error::{Error, Result};
use crate::registry::models::BundleInfo;
use crate::registry::scan::ScanReport;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

type Reply<T> = Sender<T>;

/// A unit of work for the installer task
pub enum Request {
    Install {
        path: PathBuf,
        progress: Box<dyn ProgressSink + Send>,
        reply: Reply<Result<BundleInfo>>,
    },
    Uninstall {
        bundle_name: String,
        progress: Box<dyn ProgressSink + Send>,
        reply: Reply<Result<()>>,
    },
    Scan {
        reply: Reply<Result<ScanReport>>,
    },
    Query {
        bundle_name: String,
        reply: Reply<Option<BundleInfo>>,
    },
    List {
        reply: Reply<Vec<BundleInfo>>,
    },
    Shutdown,
}

/// The running installer task
pub struct InstallerService {
    handle: InstallerHandle,
    worker: JoinHandle<InstallerContext>,
}

impl InstallerService {
    /// Move `ctx` onto a new worker thread
    pub fn spawn(ctx: InstallerContext) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("installer".to_string())
            .spawn(move || run(ctx, rx))
            .map_err(|e| Error::InternalError(format!("Failed to start installer task: {}", e)))?;

        info!("Installer task started");
        Ok(Self {
            handle: InstallerHandle { tx },
            worker,
        })
    }

    pub fn handle(&self) -> InstallerHandle {
        self.handle.clone()
    }

    /// Stop the worker once queued requests are done and take the context back
    pub fn shutdown(self) -> Result<InstallerContext> {
        // a worker that already stopped has nothing left to drain
        let _ = self.handle.tx.send(Request::Shutdown);
        self.worker
            .join()
            .map_err(|_| Error::InternalError("installer task panicked".to_string()))
    }
}

fn run(mut ctx: InstallerContext, rx: Receiver<Request>) -> InstallerContext {
    // replies are dropped silently when the caller stopped waiting
    for request in rx {
        match request {
            Request::Install {
                path,
                mut progress,
                reply,
            } => {
                let _ = reply.send(ctx.install(&path, progress.as_mut()));
            }
            Request::Uninstall {
                bundle_name,
                mut progress,
                reply,
            } => {
                let _ = reply.send(ctx.uninstall(&bundle_name, progress.as_mut()));
            }
            Request::Scan { reply } => {
                let _ = reply.send(ctx.scan());
            }
            Request::Query { bundle_name, reply } => {
                let _ = reply.send(ctx.query(&bundle_name));
            }
            Request::List { reply } => {
                let _ = reply.send(ctx.list());
            }
            Request::Shutdown => break,
        }
    }

    debug!("Installer task stopped");
    ctx
}

/// Client side of the installer task
#[derive(Clone)]
pub struct InstallerHandle {
    tx: Sender<Request>,
}

impl InstallerHandle {
    fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (reply, answer) = mpsc::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| Error::InternalError("installer task is not running".to_string()))?;
        answer
            .recv()
            .map_err(|_| Error::InternalError("installer task dropped the request".to_string()))
    }

    pub fn install(
        &self,
        path: impl Into<PathBuf>,
        progress: impl ProgressSink + Send + 'static,
    ) -> Result<BundleInfo> {
        let path = path.into();
        self.call(|reply| Request::Install {
            path,
            progress: Box::new(progress),
            reply,
        })?
    }

    pub fn uninstall(
        &self,
        bundle_name: impl Into<String>,
        progress: impl ProgressSink + Send + 'static,
    ) -> Result<()> {
        let bundle_name = bundle_name.into();
        self.call(|reply| Request::Uninstall {
            bundle_name,
            progress: Box::new(progress),
            reply,
        })?
    }

    pub fn scan(&self) -> Result<ScanReport> {
        self.call(|reply| Request::Scan { reply })?
    }

    pub fn query(&self, bundle_name: impl Into<String>) -> Result<Option<BundleInfo>> {
        let bundle_name = bundle_name.into();
        self.call(|reply| Request::Query { bundle_name, reply })
    }

    pub fn list(&self) -> Result<Vec<BundleInfo>> {
        self.call(|reply| Request::List { reply })
    }
}
