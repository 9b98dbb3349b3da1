//! Collision filtering with category/mask bitmasks and groups.
//!
//! Filtering decides which fixture pairs may ever form a contact. Two
//! fixtures collide iff:
//!
//! - they share a positive group index (always collide), or
//! - they share a negative group index (never collide), or
//! - otherwise, `(a.category & b.mask) != 0 && (b.category & a.mask) != 0`.
//!
//! # Example
//!
//! ```
//! use planar_types::Filter;
//!
//! // Category 1 = terrain, category 2 = debris that ignores other debris.
//! let terrain = Filter::new(1 << 0, u16::MAX);
//! let debris = Filter::new(1 << 1, !(1 << 1));
//!
//! assert!(terrain.should_collide(&debris));
//! assert!(!debris.should_collide(&debris));
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Collision filter attached to each fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Filter {
    /// Which category bits this fixture belongs to.
    pub category_bits: u16,
    /// Which categories this fixture collides with.
    pub mask_bits: u16,
    /// Collision group. Fixtures with the same positive group always
    /// collide; the same negative group never collide; zero defers to the
    /// category/mask test.
    pub group_index: i16,
}

impl Filter {
    /// Default filter: category 1, collides with everything, no group.
    pub const DEFAULT: Self = Self {
        category_bits: 0x0001,
        mask_bits: u16::MAX,
        group_index: 0,
    };

    /// Create a filter with the given category and mask, no group.
    #[must_use]
    pub const fn new(category_bits: u16, mask_bits: u16) -> Self {
        Self {
            category_bits,
            mask_bits,
            group_index: 0,
        }
    }

    /// Set the group index.
    #[must_use]
    pub const fn with_group(mut self, group_index: i16) -> Self {
        self.group_index = group_index;
        self
    }

    /// Check whether two filters allow a contact between their fixtures.
    #[must_use]
    pub fn should_collide(&self, other: &Self) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }

        (self.category_bits & other.mask_bits) != 0
            && (other.category_bits & self.mask_bits) != 0
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collides() {
        let a = Filter::default();
        let b = Filter::default();
        assert!(a.should_collide(&b));
    }

    #[test]
    fn test_category_mask() {
        let a = Filter::new(0x0002, 0x0004);
        let b = Filter::new(0x0004, 0x0002);
        assert!(a.should_collide(&b));
        assert!(b.should_collide(&a), "filtering should be symmetric");

        let c = Filter::new(0x0008, u16::MAX);
        assert!(!a.should_collide(&c), "a's mask does not include c");
    }

    #[test]
    fn test_positive_group_overrides_mask() {
        let a = Filter::new(0x0002, 0x0000).with_group(3);
        let b = Filter::new(0x0004, 0x0000).with_group(3);
        assert!(a.should_collide(&b));
    }

    #[test]
    fn test_negative_group_overrides_mask() {
        let a = Filter::default().with_group(-2);
        let b = Filter::default().with_group(-2);
        assert!(!a.should_collide(&b));
    }

    #[test]
    fn test_different_groups_fall_through() {
        let a = Filter::default().with_group(-1);
        let b = Filter::default().with_group(2);
        assert!(a.should_collide(&b), "mismatched groups use category/mask");
    }
}
