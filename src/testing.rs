//! Fixtures shared by unit tests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::AppError;
use crate::events::NoopEmitter;
use crate::registry::handlers::project::Launcher;
use crate::registry::handlers::space::MemorySpaceStore;
use crate::resolution::StaticResolver;
use crate::settings::AppSettings;
use crate::state::{ClientContext, ServerContext};
use crate::transport::memory::MemoryConnector;
use crate::transport::{ClientTransport, ServerTransport, TransportConfig};

/// Records invocations instead of starting processes. `run` reports a
/// fixed exit code.
#[derive(Clone)]
pub struct FakeLauncher {
    exit_code: i32,
    runs: Arc<Mutex<Vec<Vec<String>>>>,
    spawns: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeLauncher {
    pub fn exiting_with(exit_code: i32) -> Self {
        Self {
            exit_code,
            runs: Arc::default(),
            spawns: Arc::default(),
        }
    }

    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.lock().clone()
    }

    pub fn spawns(&self) -> Vec<Vec<String>> {
        self.spawns.lock().clone()
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn run(&self, _program: &Path, args: &[String]) -> Result<i32, AppError> {
        self.runs.lock().push(args.to_vec());
        Ok(self.exit_code)
    }

    async fn spawn(&self, _program: &Path, args: &[String]) -> Result<(), AppError> {
        self.spawns.lock().push(args.to_vec());
        Ok(())
    }
}

pub fn client_context(dir: &Path, connector: MemoryConnector) -> ClientContext {
    client_context_with(dir, connector, FakeLauncher::exiting_with(0))
}

pub fn client_context_with(
    dir: &Path,
    connector: MemoryConnector,
    launcher: FakeLauncher,
) -> ClientContext {
    let transport = ClientTransport::new(
        Arc::new(connector),
        Arc::new(NoopEmitter),
        TransportConfig::default(),
    );
    ClientContext::new(
        dir.to_path_buf(),
        AppSettings::default(),
        Arc::new(transport),
        Arc::new(launcher),
        Arc::new(StaticResolver::new()),
    )
}

pub fn server_context(store: Arc<MemorySpaceStore>) -> ServerContext {
    let transport = ServerTransport::new(Arc::new(NoopEmitter), &TransportConfig::default());
    ServerContext::new(Arc::new(transport), store)
}
