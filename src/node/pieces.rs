use std::collections::HashSet;

/// Bookkeeping for which pieces the node holds, still needs, and has
/// requested.
///
/// The sets partition the piece range: `have` and `missing` are disjoint
/// and together cover `0..num_pieces`, and `pending` (requested but not yet
/// received) is always a subset of `missing`.
#[derive(Debug)]
pub struct PieceTracker {
    num_pieces: u32,
    have: HashSet<u32>,
    missing: HashSet<u32>,
    pending: HashSet<u32>,
}

impl PieceTracker {
    /// A tracker for a node that holds the complete file.
    pub fn seed(num_pieces: u32) -> Self {
        Self {
            num_pieces,
            have: (0..num_pieces).collect(),
            missing: HashSet::new(),
            pending: HashSet::new(),
        }
    }

    /// A tracker for a node that holds nothing yet.
    pub fn leecher(num_pieces: u32) -> Self {
        Self {
            num_pieces,
            have: HashSet::new(),
            missing: (0..num_pieces).collect(),
            pending: HashSet::new(),
        }
    }

    pub fn num_pieces(&self) -> u32 {
        self.num_pieces
    }

    pub fn holds(&self, index: u32) -> bool {
        self.have.contains(&index)
    }

    /// True when `index` is still missing and not already requested.
    pub fn needs(&self, index: u32) -> bool {
        self.missing.contains(&index) && !self.pending.contains(&index)
    }

    pub fn is_seed(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn have_is_empty(&self) -> bool {
        self.have.is_empty()
    }

    pub fn have_indices(&self) -> Vec<u32> {
        self.have.iter().copied().collect()
    }

    pub fn have_count(&self) -> usize {
        self.have.len()
    }

    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    /// Marks a missing piece as requested.
    pub fn mark_pending(&mut self, index: u32) {
        if self.missing.contains(&index) {
            self.pending.insert(index);
        }
    }

    /// Returns one piece to the schedulable pool without receiving it.
    pub fn release_pending(&mut self, index: u32) {
        self.pending.remove(&index);
    }

    /// Returns every outstanding request to the schedulable pool.
    pub fn release_all_pending(&mut self) {
        self.pending.clear();
    }

    /// Records a received piece, moving it from `missing` (and `pending`)
    /// into `have`. Returns false if the piece was already held.
    pub fn record_received(&mut self, index: u32) -> bool {
        if !self.missing.remove(&index) {
            return false;
        }
        self.pending.remove(&index);
        self.have.insert(index);
        true
    }
}
