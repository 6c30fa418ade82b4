//! Scriptable build processes for tests.

use super::{BuildProcess, ProcessLauncher, Spawned};
use crate::domain::{BuildRequest, OutputLine, OutputStream};
use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// Test-side controls of one fake process
#[derive(Clone)]
pub struct FakeHandle {
    exit: Arc<watch::Sender<Option<i32>>>,
    output: Arc<Mutex<Option<mpsc::UnboundedSender<OutputLine>>>>,
    terminated: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
}

impl FakeHandle {
    /// Emit a stdout line
    pub fn line(&self, text: &str) {
        self.emit(text, OutputStream::Stdout);
    }

    pub fn emit(&self, text: &str, stream: OutputStream) {
        if let Some(tx) = self.output.lock().unwrap().as_ref() {
            let _ = tx.send(OutputLine::new(text, stream));
        }
    }

    /// Close the output pipes and exit with `code`
    pub fn exit(&self, code: i32) {
        self.close_output();
        self.exit.send_replace(Some(code));
    }

    pub fn close_output(&self) {
        self.output.lock().unwrap().take();
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

/// Process that exits when the test says so
pub struct FakeProcess {
    handle: FakeHandle,
    exit_rx: watch::Receiver<Option<i32>>,
    ignore_terminate: bool,
}

#[async_trait]
impl BuildProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.handle.terminated.store(true, Ordering::SeqCst);
        if !self.ignore_terminate {
            self.handle.exit(128 + 15);
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.handle.killed.store(true, Ordering::SeqCst);
        self.handle.exit(128 + 9);
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<i32> {
        let code = self
            .exit_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "fake process dropped"))?;
        Ok((*code).unwrap_or(-1))
    }
}

/// Launcher handing out fake processes and recording requests
#[derive(Default)]
pub struct FakeLauncher {
    ignore_terminate: bool,
    fail_spawn: bool,
    handles: Mutex<Vec<FakeHandle>>,
    requests: Mutex<Vec<(BuildRequest, PathBuf)>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes that only die on kill
    pub fn stubborn() -> Self {
        Self {
            ignore_terminate: true,
            ..Self::default()
        }
    }

    /// Launcher whose spawns always fail
    pub fn broken() -> Self {
        Self {
            fail_spawn: true,
            ..Self::default()
        }
    }

    /// Controls of the `n`th launched process
    pub fn handle(&self, n: usize) -> FakeHandle {
        self.handles.lock().unwrap()[n].clone()
    }

    pub fn launches(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    pub fn request(&self, n: usize) -> (BuildRequest, PathBuf) {
        self.requests.lock().unwrap()[n].clone()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, request: &BuildRequest, cwd: &Path) -> BuildResult<Spawned> {
        if self.fail_spawn {
            return Err(BuildError::Spawn("fake: no such program".into()));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let handle = FakeHandle {
            exit: Arc::new(exit_tx),
            output: Arc::new(Mutex::new(Some(out_tx))),
            terminated: Arc::new(AtomicBool::new(false)),
            killed: Arc::new(AtomicBool::new(false)),
        };

        self.handles.lock().unwrap().push(handle.clone());
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), cwd.to_path_buf()));

        Ok(Spawned {
            process: Box::new(FakeProcess {
                handle,
                exit_rx,
                ignore_terminate: self.ignore_terminate,
            }),
            output: out_rx,
            command: format!("fake-build {}", request.packages.join(" ")),
        })
    }
}
