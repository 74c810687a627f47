use crate::invoke::ResultMode;

/// Consecutive unreachable cycles a handle survives before eviction.
pub const DEFAULT_HYSTERESIS: u32 = 3;

/// Where the first handle value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleSeed {
    /// Host identifier XOR coarse wall-clock seconds, random if the host
    /// cannot be identified. Makes handles left in a saved document by an
    /// earlier process unlikely to alias live ones.
    HostAndClock,
    /// Start from exactly this value. Deterministic; meant for tests.
    Fixed(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// A handle is evicted once its miss count exceeds this.
    pub hysteresis: u32,
    pub seed: HandleSeed,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            hysteresis: DEFAULT_HYSTERESIS,
            seed: HandleSeed::HostAndClock,
        }
    }
}

impl HeapConfig {
    pub fn with_hysteresis(mut self, cycles: u32) -> Self {
        self.hysteresis = cycles;
        self
    }

    pub fn with_seed(mut self, seed: HandleSeed) -> Self {
        self.seed = seed;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub heap: HeapConfig,
    /// Mode used by [`crate::Bridge::call`].
    pub default_result_mode: ResultMode,
    /// Memoise candidate lists per (type, member, argument shapes).
    pub cache_candidates: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            heap: HeapConfig::default(),
            default_result_mode: ResultMode::Simplest,
            cache_candidates: true,
        }
    }
}

impl BridgeConfig {
    pub fn with_heap(mut self, heap: HeapConfig) -> Self {
        self.heap = heap;
        self
    }

    pub fn with_result_mode(mut self, mode: ResultMode) -> Self {
        self.default_result_mode = mode;
        self
    }

    pub fn with_candidate_cache(mut self, enabled: bool) -> Self {
        self.cache_candidates = enabled;
        self
    }
}
