//! Space executors that run on the editor peer. Spaces are kept by a
//! [`SpaceStore`]; the editor's own scene store sits behind it.

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::AppError;
use crate::instruction::Instruction;
use crate::registry::params::SpaceParams;
use crate::registry::ExecutionOutcome;
use crate::state::ServerContext;

/// Space created when none is named.
pub const DEFAULT_SPACE: &str = "MetaSpace";
/// Name an unnamed active space is saved under.
pub const UNTITLED_SPACE: &str = "UntitledSpace";

pub trait SpaceStore: Send + Sync {
    fn exists(&self, name: &str) -> bool;
    /// Save the active space, naming it [`UNTITLED_SPACE`] if it has no name.
    fn save_active(&self) -> Result<(), AppError>;
    /// Create a new empty space and make it active.
    fn create(&self, name: &str) -> Result<(), AppError>;
    /// Make an existing space active.
    fn open(&self, name: &str) -> Result<(), AppError>;
    fn active(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceRecord {
    pub saves: u32,
}

#[derive(Default)]
struct SpacesInner {
    spaces: IndexMap<String, SpaceRecord>,
    active: Option<String>,
}

/// Keeps spaces in memory. Used by `serve` and `demo` and in tests.
#[derive(Default)]
pub struct MemorySpaceStore {
    inner: Mutex<SpacesInner>,
}

impl MemorySpaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.lock().spaces.keys().cloned().collect()
    }

    pub fn record(&self, name: &str) -> Option<SpaceRecord> {
        self.inner.lock().spaces.get(name).cloned()
    }
}

impl SpaceStore for MemorySpaceStore {
    fn exists(&self, name: &str) -> bool {
        self.inner.lock().spaces.contains_key(name)
    }

    fn save_active(&self) -> Result<(), AppError> {
        let mut inner = self.inner.lock();
        let name = inner
            .active
            .get_or_insert_with(|| UNTITLED_SPACE.to_string())
            .clone();
        inner.spaces.entry(name).or_default().saves += 1;
        Ok(())
    }

    fn create(&self, name: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock();
        inner.spaces.insert(name.to_string(), SpaceRecord::default());
        inner.active = Some(name.to_string());
        Ok(())
    }

    fn open(&self, name: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock();
        if !inner.spaces.contains_key(name) {
            return Err(AppError::NotFound {
                what: format!("Space '{name}'"),
            });
        }
        inner.active = Some(name.to_string());
        Ok(())
    }

    fn active(&self) -> Option<String> {
        self.inner.lock().active.clone()
    }
}

// ── Executors ───────────────────────────────────────────────────

pub async fn create_space(
    ctx: &ServerContext,
    instruction: &Instruction,
) -> Result<ExecutionOutcome, AppError> {
    let mut name = SpaceParams::from_instruction(instruction).space_name;
    if name.is_empty() {
        name = DEFAULT_SPACE.to_string();
    }
    ctx.spaces.save_active()?;
    if ctx.spaces.exists(&name) {
        ctx.spaces.open(&name)?;
    } else {
        ctx.spaces.create(&name)?;
    }
    Ok(ExecutionOutcome::succeeded(format!("Entered {name} space.")))
}

pub async fn goto_space(
    ctx: &ServerContext,
    instruction: &Instruction,
) -> Result<ExecutionOutcome, AppError> {
    let name = SpaceParams::from_instruction(instruction).space_name;
    if name.is_empty() || !ctx.spaces.exists(&name) {
        return Ok(ExecutionOutcome::failed("Space doesn't exist!"));
    }
    ctx.spaces.save_active()?;
    ctx.spaces.open(&name)?;
    Ok(ExecutionOutcome::succeeded(format!("Entered {name} space.")))
}

pub async fn save_space(
    ctx: &ServerContext,
    _instruction: &Instruction,
) -> Result<ExecutionOutcome, AppError> {
    ctx.spaces.save_active()?;
    Ok(ExecutionOutcome::succeeded("Space was saved!"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing;

    fn context() -> (ServerContext, Arc<MemorySpaceStore>) {
        let store = Arc::new(MemorySpaceStore::new());
        (testing::server_context(store.clone()), store)
    }

    #[tokio::test]
    async fn create_defaults_to_meta_space() {
        let (ctx, store) = context();
        let out = create_space(&ctx, &Instruction::resolved("create_space"))
            .await
            .unwrap();
        assert_eq!(out, ExecutionOutcome::succeeded("Entered MetaSpace space."));
        assert_eq!(store.active().as_deref(), Some(DEFAULT_SPACE));
        assert_eq!(store.names(), vec![UNTITLED_SPACE, DEFAULT_SPACE]);
    }

    #[tokio::test]
    async fn goto_requires_existing_space() {
        let (ctx, store) = context();
        let goto = Instruction::resolved("goto_space").with_param("spaceName", "Lobby");
        let out = goto_space(&ctx, &goto).await.unwrap();
        assert_eq!(out, ExecutionOutcome::failed("Space doesn't exist!"));

        store.create("Lobby").unwrap();
        store.create("Arena").unwrap();
        let out = goto_space(&ctx, &goto).await.unwrap();
        assert_eq!(out.message.as_deref(), Some("Entered Lobby space."));
        assert_eq!(store.active().as_deref(), Some("Lobby"));
        assert_eq!(store.record("Arena").unwrap().saves, 1);
    }

    #[tokio::test]
    async fn save_counts_saves_on_active_space() {
        let (ctx, store) = context();
        store.create("Lobby").unwrap();
        let out = save_space(&ctx, &Instruction::resolved("save_space"))
            .await
            .unwrap();
        assert_eq!(out, ExecutionOutcome::succeeded("Space was saved!"));
        assert_eq!(store.record("Lobby").unwrap().saves, 1);
        assert!(store.open("Nowhere").is_err());
    }
}
