//! Dynamic AABB tree for broad-phase queries.
//!
//! A binary tree of fattened AABBs with leaves owned by proxies. Nodes
//! are pooled in a contiguous array with a free list threaded through the
//! unused slots, so creating and destroying proxies does not allocate
//! once the pool has grown.
//!
//! # Algorithm
//!
//! Insertion descends from the root picking the child that minimizes the
//! surface-area-heuristic cost of the combined box, then walks back up
//! refitting ancestor bounds. Every ancestor is rebalanced with an
//! AVL-style single rotation whenever its children's heights differ by
//! more than one, which keeps queries O(log n) under adversarial
//! insertion orders.
//!
//! Leaf AABBs are fattened by [`AABB_EXTENSION`] and moved leaves are
//! predicted forward along their displacement, so slowly moving proxies
//! stay put in the tree for many steps.
//!
//! # Example
//!
//! ```
//! use planar_collision::DynamicTree;
//! use planar_types::Aabb;
//! use nalgebra::{Point2, Vector2};
//!
//! let mut tree: DynamicTree<u32> = DynamicTree::new();
//! let aabb = Aabb::from_center(Point2::origin(), Vector2::new(1.0, 1.0));
//! let id = tree.create_proxy(&aabb, 7);
//!
//! let mut hits = Vec::new();
//! tree.query(&aabb, |proxy| {
//!     hits.push(tree.user_data(proxy));
//!     true
//! });
//! assert_eq!(hits, vec![7]);
//! # let _ = id;
//! ```

use nalgebra::Vector2;
use planar_types::settings::{AABB_EXTENSION, AABB_MULTIPLIER};
use planar_types::{Aabb, RayCastInput};

/// Sentinel index for "no node".
pub const NULL_NODE: i32 = -1;

#[derive(Debug, Clone)]
struct TreeNode<T> {
    aabb: Aabb,
    user_data: Option<T>,
    /// Parent index, or the next free slot while pooled.
    parent_or_next: i32,
    child1: i32,
    child2: i32,
    /// Leaf = 0, free node = -1.
    height: i32,
    moved: bool,
}

impl<T> TreeNode<T> {
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// A dynamic AABB tree indexed by stable proxy ids.
///
/// `T` is the per-proxy user data; the broad phase stores a
/// `(fixture, child index)` handle there.
#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: i32,
    free_list: i32,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicTree<T> {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
        }
    }

    /// Create a proxy for the given AABB. The stored bound is fattened by
    /// [`AABB_EXTENSION`]. Returns a stable id valid until
    /// [`destroy_proxy`](Self::destroy_proxy).
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> i32 {
        let proxy_id = self.allocate_node();

        let node = &mut self.nodes[proxy_id as usize];
        node.aabb = aabb.expanded(AABB_EXTENSION);
        node.user_data = Some(user_data);
        node.height = 0;
        node.moved = true;

        self.insert_leaf(proxy_id);
        proxy_id
    }

    /// Destroy a proxy. The id becomes invalid.
    pub fn destroy_proxy(&mut self, proxy_id: i32) {
        debug_assert!(self.is_valid_leaf(proxy_id));

        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
    }

    /// Move a proxy to a new AABB.
    ///
    /// Returns `false` and leaves the tree untouched when the proxy's
    /// current fat AABB still contains `aabb` and has not drifted far from
    /// it (a huge envelope four fattenings wide still contains the stored
    /// bound). Otherwise the leaf is reinserted with a fresh fat AABB,
    /// predicted forward along `displacement * `[`AABB_MULTIPLIER`], the
    /// moved flag is set, and `true` is returned.
    pub fn move_proxy(&mut self, proxy_id: i32, aabb: &Aabb, displacement: Vector2<f64>) -> bool {
        debug_assert!(self.is_valid_leaf(proxy_id));

        // Extend the fat AABB along the predicted displacement.
        let mut fat_aabb = aabb.expanded(AABB_EXTENSION);
        let d = AABB_MULTIPLIER * displacement;
        if d.x < 0.0 {
            fat_aabb.min.x += d.x;
        } else {
            fat_aabb.max.x += d.x;
        }
        if d.y < 0.0 {
            fat_aabb.min.y += d.y;
        } else {
            fat_aabb.max.y += d.y;
        }

        let tree_aabb = self.nodes[proxy_id as usize].aabb;
        if tree_aabb.contains(aabb) {
            // The proxy is still inside its stored bound. Only reinsert if
            // the stored bound has become much larger than needed.
            let huge_aabb = fat_aabb.expanded(4.0 * AABB_EXTENSION);
            if huge_aabb.contains(&tree_aabb) {
                return false;
            }
        }

        self.remove_leaf(proxy_id);
        self.nodes[proxy_id as usize].aabb = fat_aabb;
        self.insert_leaf(proxy_id);
        self.nodes[proxy_id as usize].moved = true;
        true
    }

    /// Get the user data of a proxy.
    #[must_use]
    pub fn user_data(&self, proxy_id: i32) -> T {
        debug_assert!(self.is_valid_leaf(proxy_id));
        match self.nodes[proxy_id as usize].user_data {
            Some(data) => data,
            None => unreachable!("leaf nodes always carry user data"),
        }
    }

    /// Get the fat AABB of a proxy.
    #[must_use]
    pub fn fat_aabb(&self, proxy_id: i32) -> &Aabb {
        debug_assert!(self.is_valid_leaf(proxy_id));
        &self.nodes[proxy_id as usize].aabb
    }

    /// Whether the proxy moved since the flag was last cleared.
    #[must_use]
    pub fn was_moved(&self, proxy_id: i32) -> bool {
        debug_assert!(self.is_valid_leaf(proxy_id));
        self.nodes[proxy_id as usize].moved
    }

    /// Clear a proxy's moved flag.
    pub fn clear_moved(&mut self, proxy_id: i32) {
        debug_assert!(self.is_valid_leaf(proxy_id));
        self.nodes[proxy_id as usize].moved = false;
    }

    /// Visit every leaf whose fat AABB overlaps `aabb`. The callback
    /// returns `false` to terminate the query early.
    pub fn query(&self, aabb: &Aabb, mut callback: impl FnMut(i32) -> bool) {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }

            let node = &self.nodes[node_id as usize];
            if !node.aabb.overlaps(aabb) {
                continue;
            }

            if node.is_leaf() {
                if !callback(node_id) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Cast a ray through the tree.
    ///
    /// The callback receives the current clipped input and a leaf proxy;
    /// its return value controls the walk: `0.0` terminates, a positive
    /// value tightens the maximum fraction, and a negative value skips the
    /// leaf without tightening.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        mut callback: impl FnMut(&RayCastInput, i32) -> f64,
    ) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = p2 - p1;
        debug_assert!(r.norm_squared() > 0.0);
        let r = r.normalize();

        // Separating axis perpendicular to the segment.
        let v = planar_types::cross_sv(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;

        let segment_aabb = |max_fraction: f64| {
            let t = p1 + max_fraction * (p2 - p1);
            Aabb::new(
                nalgebra::Point2::new(p1.x.min(t.x), p1.y.min(t.y)),
                nalgebra::Point2::new(p1.x.max(t.x), p1.y.max(t.y)),
            )
        };
        let mut seg_aabb = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }

            let node = &self.nodes[node_id as usize];
            if !node.aabb.overlaps(&seg_aabb) {
                continue;
            }

            // Separating-axis test: |dot(v, p1 - c)| > dot(|v|, h) means the
            // segment's line misses the box entirely.
            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(&(p1 - c)).abs() - abs_v.dot(&h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, node_id);
                if value == 0.0 {
                    // The client has terminated the ray cast.
                    return;
                }
                if value > 0.0 {
                    max_fraction = value;
                    seg_aabb = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Shift the origin of the whole tree, e.g. to re-center a long-lived
    /// world around its action.
    pub fn shift_origin(&mut self, new_origin: Vector2<f64>) {
        for node in &mut self.nodes {
            if node.height >= 0 {
                node.aabb.min -= new_origin;
                node.aabb.max -= new_origin;
            }
        }
    }

    /// Height of the tree (0 for an empty tree).
    #[must_use]
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            return 0;
        }
        self.nodes[self.root as usize].height
    }

    /// Maximum height difference between the two children of any node.
    #[must_use]
    pub fn max_balance(&self) -> i32 {
        let mut max_balance = 0;
        for node in &self.nodes {
            if node.height <= 1 {
                continue;
            }
            debug_assert!(!node.is_leaf());
            let balance =
                (self.nodes[node.child2 as usize].height - self.nodes[node.child1 as usize].height)
                    .abs();
            max_balance = max_balance.max(balance);
        }
        max_balance
    }

    /// Ratio of the summed internal-node perimeter to the root perimeter.
    /// A measure of tree quality; lower is better.
    #[must_use]
    pub fn area_ratio(&self) -> f64 {
        if self.root == NULL_NODE {
            return 0.0;
        }

        let root_area = self.nodes[self.root as usize].aabb.perimeter();
        let mut total_area = 0.0;
        for node in &self.nodes {
            if node.height < 0 {
                continue;
            }
            total_area += node.aabb.perimeter();
        }
        total_area / root_area
    }

    /// Number of pooled node slots (allocated capacity).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of slots currently on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        let mut count = 0;
        let mut index = self.free_list;
        while index != NULL_NODE {
            count += 1;
            index = self.nodes[index as usize].parent_or_next;
        }
        count
    }

    /// Check structural invariants: parent links, heights, leaf/interior
    /// shape, and containment of children in their parents. Used by tests
    /// and debug assertions; panics on violation in debug builds.
    pub fn validate(&self) {
        self.validate_structure(self.root);

        let mut free_count = 0;
        let mut free_index = self.free_list;
        while free_index != NULL_NODE {
            free_index = self.nodes[free_index as usize].parent_or_next;
            free_count += 1;
        }

        debug_assert_eq!(self.height(), self.compute_height(self.root));
        debug_assert_eq!(
            self.node_count() + free_count,
            self.nodes.len(),
            "every slot is either live or free"
        );
    }

    fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.height >= 0).count()
    }

    fn compute_height(&self, node_id: i32) -> i32 {
        if node_id == NULL_NODE {
            return 0;
        }
        let node = &self.nodes[node_id as usize];
        if node.is_leaf() {
            return 0;
        }
        1 + self
            .compute_height(node.child1)
            .max(self.compute_height(node.child2))
    }

    fn validate_structure(&self, node_id: i32) {
        if node_id == NULL_NODE {
            return;
        }

        let node = &self.nodes[node_id as usize];
        if node_id == self.root {
            debug_assert_eq!(node.parent_or_next, NULL_NODE);
        }

        if node.is_leaf() {
            debug_assert_eq!(node.child2, NULL_NODE);
            debug_assert_eq!(node.height, 0);
            return;
        }

        let child1 = node.child1;
        let child2 = node.child2;
        debug_assert_eq!(self.nodes[child1 as usize].parent_or_next, node_id);
        debug_assert_eq!(self.nodes[child2 as usize].parent_or_next, node_id);
        debug_assert_eq!(
            node.height,
            1 + self.nodes[child1 as usize]
                .height
                .max(self.nodes[child2 as usize].height)
        );
        debug_assert!(node
            .aabb
            .contains(&self.nodes[child1 as usize].aabb));
        debug_assert!(node
            .aabb
            .contains(&self.nodes[child2 as usize].aabb));

        self.validate_structure(child1);
        self.validate_structure(child2);
    }

    fn is_valid_leaf(&self, proxy_id: i32) -> bool {
        (0..self.nodes.len() as i32).contains(&proxy_id)
            && self.nodes[proxy_id as usize].is_leaf()
            && self.nodes[proxy_id as usize].height == 0
    }

    fn allocate_node(&mut self) -> i32 {
        if self.free_list == NULL_NODE {
            // Grow the pool by one; Vec amortizes the allocation.
            self.nodes.push(TreeNode {
                aabb: Aabb::default(),
                user_data: None,
                parent_or_next: NULL_NODE,
                child1: NULL_NODE,
                child2: NULL_NODE,
                height: -1,
                moved: false,
            });
            return self.nodes.len() as i32 - 1;
        }

        let node_id = self.free_list;
        let node = &mut self.nodes[node_id as usize];
        self.free_list = node.parent_or_next;
        node.parent_or_next = NULL_NODE;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        node.height = 0;
        node.moved = false;
        node_id
    }

    fn free_node(&mut self, node_id: i32) {
        let node = &mut self.nodes[node_id as usize];
        node.parent_or_next = self.free_list;
        node.height = -1;
        node.user_data = None;
        self.free_list = node_id;
    }

    fn insert_leaf(&mut self, leaf: i32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent_or_next = NULL_NODE;
            return;
        }

        // Find the best sibling by descending along the cheaper child.
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut index = self.root;
        while !self.nodes[index as usize].is_leaf() {
            let node = &self.nodes[index as usize];
            let child1 = node.child1;
            let child2 = node.child2;

            let area = node.aabb.perimeter();
            let combined_area = Aabb::combined(&node.aabb, &leaf_aabb).perimeter();

            // Cost of making this node the leaf's sibling.
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down the tree.
            let inheritance_cost = 2.0 * (combined_area - area);

            let child_cost = |child: i32| {
                let child_aabb = &self.nodes[child as usize].aabb;
                let combined = Aabb::combined(child_aabb, &leaf_aabb).perimeter();
                if self.nodes[child as usize].is_leaf() {
                    combined + inheritance_cost
                } else {
                    combined - child_aabb.perimeter() + inheritance_cost
                }
            };
            let cost1 = child_cost(child1);
            let cost2 = child_cost(child2);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;

        // Create a new parent spanning the sibling and the leaf.
        let old_parent = self.nodes[sibling as usize].parent_or_next;
        let new_parent = self.allocate_node();
        {
            let sibling_aabb = self.nodes[sibling as usize].aabb;
            let sibling_height = self.nodes[sibling as usize].height;
            let node = &mut self.nodes[new_parent as usize];
            node.parent_or_next = old_parent;
            node.user_data = None;
            node.aabb = Aabb::combined(&leaf_aabb, &sibling_aabb);
            node.height = sibling_height + 1;
        }

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent as usize].child1 == sibling {
            self.nodes[old_parent as usize].child1 = new_parent;
        } else {
            self.nodes[old_parent as usize].child2 = new_parent;
        }
        self.nodes[new_parent as usize].child1 = sibling;
        self.nodes[new_parent as usize].child2 = leaf;
        self.nodes[sibling as usize].parent_or_next = new_parent;
        self.nodes[leaf as usize].parent_or_next = new_parent;

        // Walk back up refitting bounds and rebalancing.
        let mut index = self.nodes[leaf as usize].parent_or_next;
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index as usize].child1;
            let child2 = self.nodes[index as usize].child2;
            debug_assert!(child1 != NULL_NODE && child2 != NULL_NODE);

            self.nodes[index as usize].height = 1 + self.nodes[child1 as usize]
                .height
                .max(self.nodes[child2 as usize].height);
            self.nodes[index as usize].aabb = Aabb::combined(
                &self.nodes[child1 as usize].aabb,
                &self.nodes[child2 as usize].aabb,
            );

            index = self.nodes[index as usize].parent_or_next;
        }
    }

    fn remove_leaf(&mut self, leaf: i32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent_or_next;
        let grand_parent = self.nodes[parent as usize].parent_or_next;
        let sibling = if self.nodes[parent as usize].child1 == leaf {
            self.nodes[parent as usize].child2
        } else {
            self.nodes[parent as usize].child1
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling as usize].parent_or_next = NULL_NODE;
            self.free_node(parent);
            return;
        }

        // Splice out the parent and reconnect the sibling.
        if self.nodes[grand_parent as usize].child1 == parent {
            self.nodes[grand_parent as usize].child1 = sibling;
        } else {
            self.nodes[grand_parent as usize].child2 = sibling;
        }
        self.nodes[sibling as usize].parent_or_next = grand_parent;
        self.free_node(parent);

        let mut index = grand_parent;
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index as usize].child1;
            let child2 = self.nodes[index as usize].child2;
            self.nodes[index as usize].aabb = Aabb::combined(
                &self.nodes[child1 as usize].aabb,
                &self.nodes[child2 as usize].aabb,
            );
            self.nodes[index as usize].height = 1 + self.nodes[child1 as usize]
                .height
                .max(self.nodes[child2 as usize].height);

            index = self.nodes[index as usize].parent_or_next;
        }
    }

    /// Perform a single left or right rotation if node `a` is imbalanced.
    /// Returns the root of the rotated subtree.
    fn balance(&mut self, a: i32) -> i32 {
        debug_assert!(a != NULL_NODE);

        if self.nodes[a as usize].is_leaf() || self.nodes[a as usize].height < 2 {
            return a;
        }

        let b = self.nodes[a as usize].child1;
        let c = self.nodes[a as usize].child2;

        let balance = self.nodes[c as usize].height - self.nodes[b as usize].height;

        // Rotate C up.
        if balance > 1 {
            return self.rotate_up(a, c, b, true);
        }
        // Rotate B up.
        if balance < -1 {
            return self.rotate_up(a, b, c, false);
        }

        a
    }

    /// Promote `up` (one child of `a`) above `a`, re-parenting `up`'s
    /// taller grandchild onto `a`. `up_is_child2` tells which side `up`
    /// came from.
    fn rotate_up(&mut self, a: i32, up: i32, _other: i32, up_is_child2: bool) -> i32 {
        let f = self.nodes[up as usize].child1;
        let g = self.nodes[up as usize].child2;

        // Swap a and up.
        self.nodes[up as usize].child1 = a;
        self.nodes[up as usize].parent_or_next = self.nodes[a as usize].parent_or_next;
        self.nodes[a as usize].parent_or_next = up;

        let up_parent = self.nodes[up as usize].parent_or_next;
        if up_parent != NULL_NODE {
            if self.nodes[up_parent as usize].child1 == a {
                self.nodes[up_parent as usize].child1 = up;
            } else {
                debug_assert_eq!(self.nodes[up_parent as usize].child2, a);
                self.nodes[up_parent as usize].child2 = up;
            }
        } else {
            self.root = up;
        }

        // Attach the shorter grandchild back under a.
        let (keep, give) = if self.nodes[f as usize].height > self.nodes[g as usize].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[up as usize].child2 = keep;
        if up_is_child2 {
            self.nodes[a as usize].child2 = give;
        } else {
            self.nodes[a as usize].child1 = give;
        }
        self.nodes[give as usize].parent_or_next = a;

        let (b, c) = (
            self.nodes[a as usize].child1,
            self.nodes[a as usize].child2,
        );
        self.nodes[a as usize].aabb = Aabb::combined(
            &self.nodes[b as usize].aabb,
            &self.nodes[c as usize].aabb,
        );
        self.nodes[a as usize].height = 1 + self.nodes[b as usize]
            .height
            .max(self.nodes[c as usize].height);

        self.nodes[up as usize].aabb = Aabb::combined(
            &self.nodes[a as usize].aabb,
            &self.nodes[keep as usize].aabb,
        );
        self.nodes[up as usize].height = 1 + self.nodes[a as usize]
            .height
            .max(self.nodes[keep as usize].height);

        up
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn unit_aabb(x: f64, y: f64) -> Aabb {
        Aabb::from_center(Point2::new(x, y), Vector2::new(0.5, 0.5))
    }

    #[test]
    fn test_create_query_destroy() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let id = tree.create_proxy(&unit_aabb(0.0, 0.0), 42);

        assert!(tree.was_moved(id));
        assert_eq!(tree.user_data(id), 42);
        assert!(tree.fat_aabb(id).contains(&unit_aabb(0.0, 0.0)));

        let mut hits = 0;
        tree.query(&unit_aabb(0.0, 0.0), |_| {
            hits += 1;
            true
        });
        assert_eq!(hits, 1);

        tree.destroy_proxy(id);
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.free_count(), tree.capacity());
    }

    #[test]
    fn test_fat_aabb_contains_inserted() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let aabb = unit_aabb(3.0, -2.0);
        let id = tree.create_proxy(&aabb, 0);
        assert!(tree.fat_aabb(id).contains(&aabb));
    }

    #[test]
    fn test_move_proxy_small_motion_is_lazy() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let id = tree.create_proxy(&unit_aabb(0.0, 0.0), 0);
        tree.clear_moved(id);

        // Moving within the fat margin does nothing.
        let nudged = unit_aabb(0.01, 0.0);
        assert!(!tree.move_proxy(id, &nudged, Vector2::new(0.01, 0.0)));
        assert!(!tree.was_moved(id));

        // A large move reinserts.
        let far = unit_aabb(5.0, 0.0);
        assert!(tree.move_proxy(id, &far, Vector2::new(5.0, 0.0)));
        assert!(tree.was_moved(id));
        assert!(tree.fat_aabb(id).contains(&far));
    }

    #[test]
    fn test_balance_after_sorted_insertion() {
        // Inserting a sorted line of proxies is the worst case for an
        // unbalanced tree; rotations must keep the height logarithmic.
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let n = 128;
        for i in 0..n {
            tree.create_proxy(&unit_aabb(i as f64 * 1.5, 0.0), i);
        }
        tree.validate();
        assert!(tree.max_balance() <= 1);
        assert!(
            tree.height() <= 2 * 8,
            "height {} too large for {} leaves",
            tree.height(),
            n
        );
    }

    #[test]
    fn test_churn_returns_all_slots() {
        // Create, randomly move, destroy: the pool must drain completely.
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let extent = 15.0;
        let count = 100;

        // Deterministic pseudo-random placement.
        let mut seed = 0x12345678_u32;
        let mut rand = move || {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            f64::from(seed >> 8) / f64::from(1u32 << 24)
        };

        let mut ids = Vec::new();
        for i in 0..count {
            let x = extent * (2.0 * rand() - 1.0);
            let y = extent * (2.0 * rand() - 1.0);
            ids.push(tree.create_proxy(&unit_aabb(x, y), i));
        }
        tree.validate();

        for &id in &ids {
            let x = extent * (2.0 * rand() - 1.0);
            let y = extent * (2.0 * rand() - 1.0);
            tree.move_proxy(id, &unit_aabb(x, y), Vector2::new(x, y) * 0.1);
        }
        tree.validate();

        for &id in &ids {
            tree.destroy_proxy(id);
        }
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.free_count(), tree.capacity());
    }

    #[test]
    fn test_query_terminates_early() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        for i in 0..10 {
            tree.create_proxy(&unit_aabb(0.0, 0.0), i);
        }

        let mut visits = 0;
        tree.query(&unit_aabb(0.0, 0.0), |_| {
            visits += 1;
            false
        });
        assert_eq!(visits, 1, "returning false should stop the query");
    }

    #[test]
    fn test_ray_cast_finds_closest() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let near = tree.create_proxy(&unit_aabb(2.0, 0.0), 0);
        let far = tree.create_proxy(&unit_aabb(6.0, 0.0), 1);

        let input = RayCastInput {
            p1: Point2::new(-1.0, 0.0),
            p2: Point2::new(10.0, 0.0),
            max_fraction: 1.0,
        };

        let mut hit_proxies = Vec::new();
        tree.ray_cast(&input, |sub_input, proxy| {
            hit_proxies.push(proxy);
            // Clip to the proxy's near face like the world ray cast does.
            let aabb = tree.fat_aabb(proxy);
            aabb.ray_cast(sub_input)
                .map_or(-1.0, |out| out.fraction)
        });

        assert!(hit_proxies.contains(&near));
        // With clipping, the far proxy may or may not be visited depending
        // on traversal order, but the near one always is.
        let _ = far;
    }

    #[test]
    fn test_ray_cast_early_termination() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        for i in 0..5 {
            tree.create_proxy(&unit_aabb(2.0 + i as f64, 0.0), i);
        }

        let input = RayCastInput {
            p1: Point2::new(-1.0, 0.0),
            p2: Point2::new(10.0, 0.0),
            max_fraction: 1.0,
        };

        let mut visits = 0;
        tree.ray_cast(&input, |_, _| {
            visits += 1;
            0.0
        });
        assert_eq!(visits, 1, "returning 0 should terminate the cast");
    }

    #[test]
    fn test_shift_origin() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let id = tree.create_proxy(&unit_aabb(10.0, 10.0), 0);
        tree.shift_origin(Vector2::new(10.0, 10.0));
        assert!(tree.fat_aabb(id).contains(&unit_aabb(0.0, 0.0)));
    }
}
