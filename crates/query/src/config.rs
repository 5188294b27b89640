//! Engine limits.

/// Per-engine execution limits.
///
/// Every limit is enforced at the point the resource is consumed, so a query
/// that crosses one fails with an error instead of returning a truncated
/// result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of rows a single join may produce.
    pub max_join_rows: u64,
    /// Iteration bound for recursive common table expressions.
    pub max_recursive_iterations: usize,
    /// Upper bound on bump scratch memory per operator.
    pub scratch_limit_bytes: usize,
    /// Upper bound on the length of any arena pool.
    pub max_arena_nodes: u32,
    /// Capacity of the engine result cache (0 disables it).
    pub result_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_join_rows: 10_000_000,
            max_recursive_iterations: 1000,
            scratch_limit_bytes: 256 * 1024 * 1024,
            max_arena_nodes: u32::MAX - 1,
            result_cache_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_join_rows(mut self, rows: u64) -> Self {
        self.max_join_rows = rows;
        self
    }

    pub fn with_max_recursive_iterations(mut self, iterations: usize) -> Self {
        self.max_recursive_iterations = iterations;
        self
    }

    pub fn with_scratch_limit_bytes(mut self, bytes: usize) -> Self {
        self.scratch_limit_bytes = bytes;
        self
    }

    /// Caps every arena pool. Values above `u32::MAX - 1` are clamped so the
    /// sentinel index can never be handed out.
    pub fn with_max_arena_nodes(mut self, nodes: u32) -> Self {
        self.max_arena_nodes = nodes.min(u32::MAX - 1);
        self
    }

    pub fn with_result_cache_capacity(mut self, capacity: usize) -> Self {
        self.result_cache_capacity = capacity;
        self
    }
}
