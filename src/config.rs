//! Configuration for the fan-out operators.

/// Tuning knobs for [`map`](crate::ConcurrentStreamExt::map) and the other
/// fan-out operators.
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Maximum number of workers in flight at once. `None` spawns one worker
    /// per upstream element with no admission control.
    pub max_concurrency: Option<usize>,
    /// Capacity of the internal result channel. Workers that finish while the
    /// consumer lags park on the channel once it fills, which bounds memory
    /// at roughly `channel_capacity + in-flight workers` buffered results.
    pub channel_capacity: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            channel_capacity: 64,
        }
    }
}

impl MapConfig {
    /// Bound in-flight workers to `n` (a zero is treated as 1).
    pub fn max_concurrency(n: usize) -> Self {
        Self {
            max_concurrency: Some(n.max(1)),
            ..Self::default()
        }
    }

    /// One worker per CPU core. The right preset for compute-heavy
    /// transforms; I/O-bound transforms usually want a higher bound or none.
    pub fn cpu_bound() -> Self {
        Self::max_concurrency(num_cpus::get())
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.max_concurrency = self.max_concurrency.map(|n| n.max(1));
        self.channel_capacity = self.channel_capacity.max(1);
        self
    }
}
