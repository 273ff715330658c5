use crate::{
    BufferMetricsSnapshot, CarrierError, ChannelsConfig, OverflowStrategy, Partitioner,
    RoundRobin, SlotBuffer,
};

/// A fixed set of independent [`SlotBuffer`] lanes behind one `offer` call.
///
/// Sharding spreads producer threads over several cursors instead of one.
/// Ordering only means something within a single lane.
pub struct Channels<T> {
    lanes: Box<[SlotBuffer<T>]>,
    partitioner: Box<dyn Partitioner<T>>,
}

impl<T: Send> Channels<T> {
    /// Builds lanes from `config` with round-robin lane selection.
    pub fn new(config: ChannelsConfig) -> Result<Self, CarrierError> {
        Self::with_partitioner(config, RoundRobin::new())
    }

    pub fn with_partitioner<P>(config: ChannelsConfig, partitioner: P) -> Result<Self, CarrierError>
    where
        P: Partitioner<T> + 'static,
    {
        config.validate()?;

        let lanes = (0..config.lanes)
            .map(|_| {
                if config.enable_metrics {
                    SlotBuffer::with_metrics(config.lane_capacity, config.strategy)
                } else {
                    SlotBuffer::new(config.lane_capacity, config.strategy)
                }
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            lanes,
            partitioner: Box::new(partitioner),
        })
    }

    /// Writes `item` into the lane chosen by the partitioner.
    ///
    /// Never blocks. Returns `false` when that lane refused the write.
    #[inline]
    pub fn offer(&self, item: T) -> bool {
        self.try_offer(item).is_ok()
    }

    /// Like [`offer`](Self::offer) but hands a refused item back.
    pub fn try_offer(&self, item: T) -> Result<(), T> {
        let lane = self.partitioner.partition(self.lanes.len(), &item) % self.lanes.len();
        self.lanes[lane].try_save(item)
    }

    /// Moves everything buffered in every lane into `out`, lane by lane.
    pub fn drain_into(&self, out: &mut Vec<T>) -> usize {
        self.lanes.iter().map(|lane| lane.drain_all(out)).sum()
    }
}

impl<T> Channels<T> {
    #[inline]
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Returns the lane at `index`, or `None` past the last lane.
    #[inline]
    pub fn lane(&self, index: usize) -> Option<&SlotBuffer<T>> {
        self.lanes.get(index)
    }

    pub fn lanes(&self) -> impl Iterator<Item = &SlotBuffer<T>> {
        self.lanes.iter()
    }

    /// Sum of lane capacities.
    pub fn total_capacity(&self) -> usize {
        self.lanes.iter().map(SlotBuffer::capacity).sum()
    }

    /// Switches every lane to `strategy` for subsequent writes.
    pub fn set_strategy(&self, strategy: OverflowStrategy) {
        for lane in self.lanes.iter() {
            lane.set_strategy(strategy);
        }
    }

    /// Aggregated counters across lanes (zeros unless metrics are enabled).
    pub fn metrics(&self) -> BufferMetricsSnapshot {
        let mut total = BufferMetricsSnapshot::default();
        for lane in self.lanes.iter() {
            total += lane.metrics();
        }
        total
    }
}

impl<T> std::fmt::Debug for Channels<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channels")
            .field("lanes", &self.lanes.len())
            .field("total_capacity", &self.total_capacity())
            .finish_non_exhaustive()
    }
}
