use super::envelope::PersistenceEnvelope;
use crate::error::StateError;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

type Step = Box<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// Schema upgrades, one step per version: `v -> v + 1`.
#[derive(Default)]
pub struct Migrations {
    steps: BTreeMap<u32, Step>,
}

impl Migrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the upgrade from `from` to `from + 1`.
    pub fn step<F>(mut self, from: u32, f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.steps.insert(from, Box::new(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Bring `envelope` up to `target`. Newer envelopes and gaps in the
    /// chain are refused rather than applied as-is.
    pub fn migrate(
        &self,
        mut envelope: PersistenceEnvelope,
        target: u32,
    ) -> Result<PersistenceEnvelope, StateError> {
        if envelope.schema_version > target {
            return Err(StateError::Migration(format!(
                "stored schema v{} is newer than v{target}",
                envelope.schema_version
            )));
        }

        while envelope.schema_version < target {
            let from = envelope.schema_version;
            let step = self
                .steps
                .get(&from)
                .ok_or_else(|| StateError::Migration(format!("no migration from v{from}")))?;
            envelope.state = step(envelope.state)
                .map_err(|e| StateError::Migration(format!("v{from} -> v{}: {e}", from + 1)))?;
            envelope.schema_version = from + 1;
            debug!(from, to = from + 1, "state migrated");
        }
        Ok(envelope)
    }
}

impl std::fmt::Debug for Migrations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrations")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}
