use mycelian_executor::ExecutorConfig;

/// Top-level construction knobs for a [`crate::MycelianCore`] handle.
/// Everything here flows straight into the shard executor;
/// the core crate itself has no additional configuration surface.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub executor: ExecutorConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
        }
    }
}
