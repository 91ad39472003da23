//! Per-island bookkeeping.

/// One island: dynamic bodies connected through dynamic-to-dynamic
/// contacts, plus the static and kinematic bodies they touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IslandData {
    /// Dynamic members, sorted.
    pub dynamic: Vec<usize>,
    /// Non-dynamic bodies touched by the island, sorted. A static body may
    /// be attached to several islands.
    pub attached: Vec<usize>,
    /// Graph edges inside the island.
    pub edges: Vec<usize>,
    /// Number of colors used, zero without edges.
    pub color_count: usize,
    pub level_count: usize,
    /// Same membership as in the previous step.
    pub is_persistent: bool,
    pub is_sleeping: bool,
    /// Consecutive steps in which every member was resting.
    pub sleep_counter: usize,
    /// Edge indices bucketed `[level][color]`.
    pub(crate) batches: Vec<Vec<Vec<usize>>>,
}

impl IslandData {
    /// Edge indices bucketed by level, then color. Levels must be solved in
    /// order, colors in order within a level; edges within one bucket
    /// never share a dynamic body.
    pub fn batches(&self) -> &[Vec<Vec<usize>>] {
        &self.batches
    }

    /// All bodies an island solve reads: dynamic members then attached.
    pub fn bodies(&self) -> impl Iterator<Item = usize> + '_ {
        self.dynamic.iter().chain(&self.attached).copied()
    }

    /// Whether the island needs solving this step.
    pub fn is_active(&self) -> bool {
        !self.is_sleeping && !self.dynamic.is_empty()
    }
}
