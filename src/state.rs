use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::project::{ProjectBook, ProjectRecord};
use crate::protocol::{self, PeerSettings};
use crate::registry::handlers::project::Launcher;
use crate::registry::handlers::space::SpaceStore;
use crate::resolution::Resolver;
use crate::settings::AppSettings;
use crate::transport::{ClientTransport, ServerTransport};
use crate::util::CancelToken;

// ── Client context ─────────────────────────────────────────────────

/// Everything the assistant side needs: the link to the peer, settings and
/// the collaborators local executors call out to. Built once at startup and
/// shared by reference.
pub struct ClientContext {
    pub config_dir: PathBuf,
    pub settings: Mutex<AppSettings>,
    pub transport: Arc<ClientTransport>,
    pub projects: ProjectBook,
    pub launcher: Arc<dyn Launcher>,
    pub resolver: Arc<dyn Resolver>,
    /// Fires on shutdown; bounds connect waits.
    pub cancel: CancelToken,
    pub current_project: Mutex<Option<ProjectRecord>>,
    next_request_id: AtomicU64,
}

impl ClientContext {
    pub fn new(
        config_dir: PathBuf,
        settings: AppSettings,
        transport: Arc<ClientTransport>,
        launcher: Arc<dyn Launcher>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        let ctx = Self {
            projects: ProjectBook::new(config_dir.clone()),
            config_dir,
            settings: Mutex::new(settings),
            transport,
            launcher,
            resolver,
            cancel: CancelToken::new(),
            current_project: Mutex::new(None),
            next_request_id: AtomicU64::new(1),
        };
        ctx.refresh_greeting();
        ctx
    }

    /// Re-arm the settings frame queued after every connect. Call after
    /// changing settings the peer cares about.
    pub fn refresh_greeting(&self) {
        match protocol::settings_frame(&self.peer_settings()) {
            Ok(frame) => self.transport.set_greeting(Some(frame)),
            Err(e) => tracing::warn!(error = %e, "peer settings do not fit in a frame"),
        }
    }

    /// Read-only access to the settings. Locks for the duration of `f`.
    pub fn with_settings<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppSettings) -> R,
    {
        let guard = self.settings.lock();
        f(&guard)
    }

    /// Mutating access to the settings. Locks for the duration of `f`.
    pub fn with_settings_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut AppSettings) -> R,
    {
        let mut guard = self.settings.lock();
        f(&mut guard)
    }

    /// Fresh id for an outgoing instruction.
    pub fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn current_project(&self) -> Option<ProjectRecord> {
        self.current_project.lock().clone()
    }

    pub fn set_current_project(&self, record: ProjectRecord) {
        *self.current_project.lock() = Some(record);
    }

    /// Settings pushed to the peer after every connect.
    pub fn peer_settings(&self) -> PeerSettings {
        self.with_settings(|s| PeerSettings {
            asset_library_root_path: s.asset_library_root.clone(),
        })
    }
}

// ── Server context ─────────────────────────────────────────────────

/// Editor-peer side: the server transport, the space store and the settings
/// the assistant last pushed.
pub struct ServerContext {
    pub transport: Arc<ServerTransport>,
    pub spaces: Arc<dyn SpaceStore>,
    pub peer_settings: Mutex<PeerSettings>,
}

impl ServerContext {
    pub fn new(transport: Arc<ServerTransport>, spaces: Arc<dyn SpaceStore>) -> Self {
        Self {
            transport,
            spaces,
            peer_settings: Mutex::new(PeerSettings::default()),
        }
    }

    pub fn with_peer_settings<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&PeerSettings) -> R,
    {
        let guard = self.peer_settings.lock();
        f(&guard)
    }

    pub fn set_peer_settings(&self, settings: PeerSettings) {
        *self.peer_settings.lock() = settings;
    }
}
