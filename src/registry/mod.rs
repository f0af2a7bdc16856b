pub mod catalog;
pub mod handlers;
pub mod params;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::AppError;
use crate::instruction::Instruction;

use handlers::{connection, project, space};

// ── Outcome ─────────────────────────────────────────────────────

/// What one executor run produced: a success flag, an optional message for
/// the transcript and follow-up instructions to splice after the current one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub message: Option<String>,
    pub additional: Vec<Instruction>,
}

impl ExecutionOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: Some(message.into()),
            additional: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: Some(message.into()),
            additional: Vec::new(),
        }
    }

    /// No executor is registered for the action. Carries no message.
    pub fn unhandled() -> Self {
        Self::default()
    }

    pub fn with_follow_up(mut self, instruction: Instruction) -> Self {
        self.additional.push(instruction);
        self
    }
}

// ── Executor capability ─────────────────────────────────────────

/// Runs one instruction against a context `C`.
#[async_trait]
pub trait Executor<C: ?Sized + Sync>: Send + Sync {
    async fn execute(&self, ctx: &C, instruction: &Instruction) -> ExecutionOutcome;
}

/// Action key → executor. Keys compare case-insensitively.
pub struct ExecutorRegistry<C: ?Sized> {
    entries: IndexMap<String, Arc<dyn Executor<C>>>,
}

impl<C: ?Sized + Sync> ExecutorRegistry<C> {
    pub fn builder() -> RegistryBuilder<C> {
        RegistryBuilder {
            entries: Vec::new(),
        }
    }

    pub fn contains(&self, action: &str) -> bool {
        self.entries.contains_key(&action.trim().to_ascii_lowercase())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the executor registered for `instruction.action`. Unknown actions
    /// yield [`ExecutionOutcome::unhandled`] without calling anything.
    pub async fn dispatch(&self, ctx: &C, instruction: &Instruction) -> ExecutionOutcome {
        let key = instruction.action.trim().to_ascii_lowercase();
        let Some(executor) = self.entries.get(&key) else {
            tracing::debug!(action = %instruction.action, "no executor registered");
            return ExecutionOutcome::unhandled();
        };
        let outcome = executor.execute(ctx, instruction).await;
        tracing::debug!(
            action = %key,
            succeeded = outcome.succeeded,
            follow_ups = outcome.additional.len(),
            "executed"
        );
        outcome
    }
}

/// Collects `(key, executor)` pairs; [`RegistryBuilder::build`] rejects
/// duplicate keys.
pub struct RegistryBuilder<C: ?Sized> {
    entries: Vec<(String, Arc<dyn Executor<C>>)>,
}

impl<C: ?Sized + Sync> RegistryBuilder<C> {
    pub fn register(mut self, action: &str, executor: Arc<dyn Executor<C>>) -> Self {
        self.entries.push((action.trim().to_string(), executor));
        self
    }

    pub fn build(self) -> Result<ExecutorRegistry<C>, AppError> {
        let mut entries = IndexMap::with_capacity(self.entries.len());
        for (action, executor) in self.entries {
            let key = action.to_ascii_lowercase();
            if entries.contains_key(&key) {
                return Err(AppError::DuplicateAction { action });
            }
            entries.insert(key, executor);
        }
        Ok(ExecutorRegistry { entries })
    }
}

/// Compile-time check used by [`define_executors!`]: no two keys may be
/// equal ignoring ASCII case.
#[allow(clippy::indexing_slicing)]
pub const fn keys_unique(keys: &[&str]) -> bool {
    let mut i = 0;
    while i < keys.len() {
        let mut j = i + 1;
        while j < keys.len() {
            if eq_ignore_ascii_case(keys[i].as_bytes(), keys[j].as_bytes()) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

#[allow(clippy::indexing_slicing)]
const fn eq_ignore_ascii_case(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i].to_ascii_lowercase() != b[i].to_ascii_lowercase() {
            return false;
        }
        i += 1;
    }
    true
}

// ── Registration table macro ────────────────────────────────────

/// Generates a tagged executor enum from a table of
/// `Variant => handler, "key": "description";` rows.
///
/// Each handler is `async fn(&Ctx, &Instruction) -> Result<ExecutionOutcome, AppError>`;
/// an `Err` becomes a failed outcome carrying the error text. A repeated key
/// fails to compile.
macro_rules! define_executors {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $ctx:ty {
            $( $variant:ident => $handler:path, $key:literal : $desc:literal ; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $variant, )*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )* ];
            pub const KEYS: &'static [&'static str] = &[ $( $key, )* ];

            pub fn key(self) -> &'static str {
                match self {
                    $( $name::$variant => $key, )*
                }
            }

            pub fn description(self) -> &'static str {
                match self {
                    $( $name::$variant => $desc, )*
                }
            }

            pub fn from_key(key: &str) -> Option<Self> {
                let key = key.trim();
                Self::ALL.iter().copied().find(|v| v.key().eq_ignore_ascii_case(key))
            }

            /// Registry holding every variant under its key.
            pub fn registry() -> Result<ExecutorRegistry<$ctx>, AppError> {
                Self::ALL
                    .iter()
                    .fold(ExecutorRegistry::builder(), |builder, variant| {
                        builder.register(variant.key(), Arc::new(*variant))
                    })
                    .build()
            }
        }

        const _: () = assert!(
            keys_unique($name::KEYS),
            concat!("duplicate action key in ", stringify!($name))
        );

        #[async_trait]
        impl Executor<$ctx> for $name {
            async fn execute(&self, ctx: &$ctx, instruction: &Instruction) -> ExecutionOutcome {
                let result = match self {
                    $( $name::$variant => $handler(ctx, instruction).await, )*
                };
                result.unwrap_or_else(|e| {
                    tracing::warn!(action = self.key(), error = %e, "executor failed");
                    ExecutionOutcome::failed(e.to_string())
                })
            }
        }
    };
}

// ── Executor tables ─────────────────────────────────────────────

define_executors! {
    /// Executors that run in the assistant process.
    pub enum LocalExecutor for crate::state::ClientContext {
        Connect => connection::connect, "connect": "Connect to the editor peer.";
        Disconnect => connection::disconnect, "disconnect": "Close the connection to the editor peer.";
        CreateProject => project::create_project, "create_project": "Create a new editor project, then initialize it.";
        InitProject => project::init_project, "init_project": "Register the required packages in a project's manifest.";
        OpenProject => project::open_project, "open_project": "Launch the editor on a project and wait for it to connect.";
    }
}

define_executors! {
    /// Executors that run in the editor peer.
    pub enum RemoteExecutor for crate::state::ServerContext {
        CreateSpace => space::create_space, "create_space": "Create (or open) a space and enter it.";
        GotoSpace => space::goto_space, "goto_space": "Save the active space and enter an existing one.";
        SaveSpace => space::save_space, "save_space": "Save the active space.";
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Fixed(bool);

    #[async_trait]
    impl Executor<()> for Fixed {
        async fn execute(&self, _ctx: &(), instruction: &Instruction) -> ExecutionOutcome {
            let outcome = if self.0 {
                ExecutionOutcome::succeeded(format!("ran {}", instruction.action))
            } else {
                ExecutionOutcome::failed("nope")
            };
            outcome.with_follow_up(Instruction::local("after"))
        }
    }

    #[test]
    fn builder_rejects_duplicate_keys_ignoring_case() {
        let err = ExecutorRegistry::<()>::builder()
            .register("connect", Arc::new(Fixed(true)))
            .register("Connect", Arc::new(Fixed(false)))
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            AppError::DuplicateAction {
                action: "Connect".into()
            }
        );
    }

    #[tokio::test]
    async fn dispatch_routes_by_key() {
        let registry = ExecutorRegistry::<()>::builder()
            .register("ok", Arc::new(Fixed(true)))
            .register("bad", Arc::new(Fixed(false)))
            .build()
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(" OK "));

        let outcome = registry.dispatch(&(), &Instruction::local("OK")).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.message.as_deref(), Some("ran OK"));
        assert_eq!(outcome.additional.len(), 1);

        let outcome = registry.dispatch(&(), &Instruction::local("bad")).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.message.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn unknown_action_is_unhandled() {
        let registry = ExecutorRegistry::<()>::builder().build().unwrap();
        assert!(registry.is_empty());
        let outcome = registry.dispatch(&(), &Instruction::local("drop_table")).await;
        assert_eq!(outcome, ExecutionOutcome::unhandled());
        assert!(!outcome.succeeded);
        assert!(outcome.message.is_none());
        assert!(outcome.additional.is_empty());
    }

    #[test]
    fn key_uniqueness_check() {
        assert!(keys_unique(&["a", "b", "ab"]));
        assert!(!keys_unique(&["save_space", "x", "SAVE_SPACE"]));
        assert!(keys_unique(&[]));
    }

    #[test]
    fn generated_tables_build() {
        let local = LocalExecutor::registry().unwrap();
        assert_eq!(
            local.keys().collect::<Vec<_>>(),
            vec!["connect", "disconnect", "create_project", "init_project", "open_project"]
        );
        assert_eq!(LocalExecutor::from_key("Open_Project"), Some(LocalExecutor::OpenProject));
        assert_eq!(LocalExecutor::from_key("save_space"), None);

        let remote = RemoteExecutor::registry().unwrap();
        assert_eq!(remote.len(), 3);
        assert!(remote.contains("goto_space"));
        assert!(!RemoteExecutor::SaveSpace.description().is_empty());
    }
}
