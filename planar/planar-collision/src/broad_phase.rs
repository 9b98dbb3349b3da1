//! Broad-phase pair management over the dynamic AABB tree.
//!
//! The broad phase tracks which proxies moved since the last step in a
//! move buffer. [`BroadPhase::update_pairs`] replays that buffer against
//! the tree, producing each overlapping `(moved, other)` proxy pair
//! exactly once per step. The narrow phase then decides whether the pair
//! actually touches.
//!
//! Pair generation is the classic sort-and-sweep dedup: candidate pairs
//! are buffered as `(min, max)` index tuples, sorted, and equal
//! consecutive entries skipped.

use nalgebra::Vector2;
use planar_types::{Aabb, RayCastInput};

use crate::dynamic_tree::{DynamicTree, NULL_NODE};

/// Broad-phase collision detection: a dynamic tree plus a buffer of moved
/// proxies awaiting pair regeneration.
#[derive(Debug, Clone)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    move_buffer: Vec<i32>,
    /// Scratch pair buffer reused across steps.
    pairs: Vec<(i32, i32)>,
    proxy_count: usize,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> BroadPhase<T> {
    /// Create an empty broad phase.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            move_buffer: Vec::new(),
            pairs: Vec::new(),
            proxy_count: 0,
        }
    }

    /// Create a proxy and schedule it for pair generation.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> i32 {
        let proxy_id = self.tree.create_proxy(aabb, user_data);
        self.proxy_count += 1;
        self.buffer_move(proxy_id);
        proxy_id
    }

    /// Destroy a proxy, dropping any pending move.
    pub fn destroy_proxy(&mut self, proxy_id: i32) {
        self.unbuffer_move(proxy_id);
        self.proxy_count -= 1;
        self.tree.destroy_proxy(proxy_id);
    }

    /// Move a proxy; if the tree actually reinserted it, the proxy is
    /// scheduled for pair generation.
    pub fn move_proxy(&mut self, proxy_id: i32, aabb: &Aabb, displacement: Vector2<f64>) {
        if self.tree.move_proxy(proxy_id, aabb, displacement) {
            self.buffer_move(proxy_id);
        }
    }

    /// Force pair regeneration for a proxy that did not move, e.g. after
    /// its collision filter changed.
    pub fn touch_proxy(&mut self, proxy_id: i32) {
        self.buffer_move(proxy_id);
    }

    /// Get a proxy's user data.
    #[must_use]
    pub fn user_data(&self, proxy_id: i32) -> T {
        self.tree.user_data(proxy_id)
    }

    /// Get a proxy's fat AABB.
    #[must_use]
    pub fn fat_aabb(&self, proxy_id: i32) -> &Aabb {
        self.tree.fat_aabb(proxy_id)
    }

    /// Whether the fat AABBs of two proxies overlap.
    #[must_use]
    pub fn test_overlap(&self, proxy_a: i32, proxy_b: i32) -> bool {
        self.tree
            .fat_aabb(proxy_a)
            .overlaps(self.tree.fat_aabb(proxy_b))
    }

    /// Number of live proxies.
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Access the underlying tree (diagnostics, queries).
    #[must_use]
    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    /// Shift the origin of every stored bound; see
    /// [`DynamicTree::shift_origin`].
    pub fn shift_origin(&mut self, new_origin: Vector2<f64>) {
        self.tree.shift_origin(new_origin);
    }

    /// Query the tree for leaves overlapping `aabb`.
    pub fn query(&self, aabb: &Aabb, callback: impl FnMut(i32) -> bool) {
        self.tree.query(aabb, callback);
    }

    /// Cast a ray through the tree; see
    /// [`DynamicTree::ray_cast`] for the callback protocol.
    pub fn ray_cast(&self, input: &RayCastInput, callback: impl FnMut(&RayCastInput, i32) -> f64) {
        self.tree.ray_cast(input, callback);
    }

    /// Generate overlap pairs for every moved proxy and hand them to the
    /// callback as `(user_data_a, user_data_b)`, each unordered pair at
    /// most once.
    pub fn update_pairs(&mut self, mut callback: impl FnMut(T, T)) {
        self.pairs.clear();

        let tree = &self.tree;
        let pairs = &mut self.pairs;
        for &query_proxy in &self.move_buffer {
            if query_proxy == NULL_NODE {
                // Destroyed while buffered.
                continue;
            }

            // The query AABB is the moved proxy's fat bound; anything
            // overlapping it is a candidate pair.
            let fat_aabb = *tree.fat_aabb(query_proxy);
            tree.query(&fat_aabb, |proxy| {
                // A proxy cannot form a pair with itself.
                if proxy == query_proxy {
                    return true;
                }

                // Both moved: only generate the pair once, from the
                // lower-indexed side.
                if tree.was_moved(proxy) && proxy > query_proxy {
                    return true;
                }

                pairs.push((proxy.min(query_proxy), proxy.max(query_proxy)));
                true
            });
        }

        for &proxy in &self.move_buffer {
            if proxy != NULL_NODE {
                self.tree.clear_moved(proxy);
            }
        }
        self.move_buffer.clear();

        self.pairs.sort_unstable();
        let mut i = 0;
        while i < self.pairs.len() {
            let (a, b) = self.pairs[i];
            callback(self.tree.user_data(a), self.tree.user_data(b));

            // Skip duplicates of the current pair.
            i += 1;
            while i < self.pairs.len() && self.pairs[i] == (a, b) {
                i += 1;
            }
        }
    }

    fn buffer_move(&mut self, proxy_id: i32) {
        self.move_buffer.push(proxy_id);
    }

    fn unbuffer_move(&mut self, proxy_id: i32) {
        for entry in &mut self.move_buffer {
            if *entry == proxy_id {
                *entry = NULL_NODE;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn unit_aabb(x: f64, y: f64) -> Aabb {
        Aabb::from_center(Point2::new(x, y), Vector2::new(0.5, 0.5))
    }

    fn collect_pairs(bp: &mut BroadPhase<usize>) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        bp.update_pairs(|a, b| out.push((a.min(b), a.max(b))));
        out.sort_unstable();
        out
    }

    #[test]
    fn test_overlapping_pair_found_once() {
        let mut bp: BroadPhase<usize> = BroadPhase::new();
        bp.create_proxy(&unit_aabb(0.0, 0.0), 1);
        bp.create_proxy(&unit_aabb(0.4, 0.0), 2);

        assert_eq!(collect_pairs(&mut bp), vec![(1, 2)]);
    }

    #[test]
    fn test_no_pairs_when_separated() {
        let mut bp: BroadPhase<usize> = BroadPhase::new();
        bp.create_proxy(&unit_aabb(0.0, 0.0), 1);
        bp.create_proxy(&unit_aabb(10.0, 0.0), 2);

        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn test_pairs_only_regenerate_on_move() {
        let mut bp: BroadPhase<usize> = BroadPhase::new();
        let a = bp.create_proxy(&unit_aabb(0.0, 0.0), 1);
        bp.create_proxy(&unit_aabb(0.4, 0.0), 2);

        assert_eq!(collect_pairs(&mut bp).len(), 1);
        // Nothing moved: no pairs reported.
        assert!(collect_pairs(&mut bp).is_empty());

        // Move far away and back: pair reported again.
        bp.move_proxy(a, &unit_aabb(20.0, 0.0), Vector2::zeros());
        assert!(collect_pairs(&mut bp).is_empty());
        bp.move_proxy(a, &unit_aabb(0.0, 0.0), Vector2::zeros());
        assert_eq!(collect_pairs(&mut bp).len(), 1);
    }

    #[test]
    fn test_touch_proxy_regenerates() {
        let mut bp: BroadPhase<usize> = BroadPhase::new();
        let a = bp.create_proxy(&unit_aabb(0.0, 0.0), 1);
        bp.create_proxy(&unit_aabb(0.4, 0.0), 2);
        let _ = collect_pairs(&mut bp);

        bp.touch_proxy(a);
        assert_eq!(collect_pairs(&mut bp), vec![(1, 2)]);
    }

    #[test]
    fn test_destroyed_proxy_dropped_from_buffer() {
        let mut bp: BroadPhase<usize> = BroadPhase::new();
        let a = bp.create_proxy(&unit_aabb(0.0, 0.0), 1);
        bp.create_proxy(&unit_aabb(0.4, 0.0), 2);
        bp.destroy_proxy(a);

        assert!(collect_pairs(&mut bp).is_empty());
        assert_eq!(bp.proxy_count(), 1);
    }

    #[test]
    fn test_three_way_cluster() {
        let mut bp: BroadPhase<usize> = BroadPhase::new();
        bp.create_proxy(&unit_aabb(0.0, 0.0), 1);
        bp.create_proxy(&unit_aabb(0.4, 0.0), 2);
        bp.create_proxy(&unit_aabb(0.8, 0.0), 3);

        // All three fat AABBs overlap pairwise.
        assert_eq!(collect_pairs(&mut bp), vec![(1, 2), (1, 3), (2, 3)]);
    }
}
