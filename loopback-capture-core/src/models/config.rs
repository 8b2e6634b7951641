/// Configuration for a capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Depth of the bounded dispatch queue between the backend's delivery
    /// thread and the consumer callback. When full, incoming buffers are
    /// rejected (dropped and counted), never reordered.
    pub queue_depth: usize,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_depth == 0 {
            return Err("queue depth must be positive".into());
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { queue_depth: 32 }
    }
}
