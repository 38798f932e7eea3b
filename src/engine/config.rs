//! Runtime options of the engine itself, apart from the strategy parameters.

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Audit events kept in memory. Past this the oldest are drained.
    pub max_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_events: 100_000 }
    }
}
