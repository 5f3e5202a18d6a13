#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use super::DEFAULT_BLOCK_SIZE;

/// A position inside a [`Deque`](super::Deque).
///
/// A cursor stores the block offset relative to the deque's origin plus the
/// slot inside that block, never an address. Reallocating the block table
/// moves every live block to a new table slot but keeps its offset from the
/// origin, so outstanding cursors stay meaningful across growth. A cursor is
/// resolved against the deque each time it is dereferenced.
///
/// Arithmetic is O(1) in both directions and crosses block boundaries without
/// stepping one element at a time.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor<const BLOCK: usize = DEFAULT_BLOCK_SIZE> {
    pub(crate) block: isize,
    pub(crate) slot: usize,
}

impl<const BLOCK: usize> Cursor<BLOCK> {
    pub(crate) const fn new(block: isize, slot: usize) -> Self {
        Self { block, slot }
    }

    /// Block offset relative to the origin of the block table.
    #[must_use]
    pub fn block(&self) -> isize {
        self.block
    }

    /// Slot inside the block, in `0..BLOCK`.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Returns the cursor `n` elements away, `n` may be negative.
    #[must_use]
    pub fn offset(self, n: isize) -> Self {
        // Position within the current block after the move, then the number of
        // block boundaries crossed to get there.
        let helper = self.slot as isize + n;
        let crossings = helper.div_euclid(BLOCK as isize);
        Self {
            block: self.block + crossings,
            slot: helper.rem_euclid(BLOCK as isize) as usize,
        }
    }

    /// Signed number of elements from `origin` to `self`.
    #[must_use]
    pub fn distance_from(self, origin: Self) -> isize {
        (self.block - origin.block) * BLOCK as isize + self.slot as isize - origin.slot as isize
    }
}

impl<const BLOCK: usize> Default for Cursor<BLOCK> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl<const BLOCK: usize> fmt::Debug for Cursor<BLOCK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("block", &self.block)
            .field("slot", &self.slot)
            .finish()
    }
}

impl<const BLOCK: usize> Ord for Cursor<BLOCK> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.block
            .cmp(&other.block)
            .then(self.slot.cmp(&other.slot))
    }
}

impl<const BLOCK: usize> PartialOrd for Cursor<BLOCK> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const BLOCK: usize> Add<isize> for Cursor<BLOCK> {
    type Output = Self;

    fn add(self, n: isize) -> Self {
        self.offset(n)
    }
}

impl<const BLOCK: usize> Sub<isize> for Cursor<BLOCK> {
    type Output = Self;

    fn sub(self, n: isize) -> Self {
        self.offset(-n)
    }
}

impl<const BLOCK: usize> AddAssign<isize> for Cursor<BLOCK> {
    fn add_assign(&mut self, n: isize) {
        *self = self.offset(n);
    }
}

impl<const BLOCK: usize> SubAssign<isize> for Cursor<BLOCK> {
    fn sub_assign(&mut self, n: isize) {
        *self = self.offset(-n);
    }
}

impl<const BLOCK: usize> Sub for Cursor<BLOCK> {
    type Output = isize;

    fn sub(self, other: Self) -> isize {
        self.distance_from(other)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::pedantic)]

    use super::*;

    type C = Cursor<4>;

    #[test]
    fn forward_within_block() {
        let c = C::new(0, 1) + 2;
        assert_eq!((c.block(), c.slot()), (0, 3));
    }

    #[test]
    fn forward_across_blocks() {
        let c = C::new(0, 3) + 1;
        assert_eq!((c.block(), c.slot()), (1, 0));
        let c = C::new(-2, 2) + 11;
        assert_eq!((c.block(), c.slot()), (1, 1));
    }

    #[test]
    fn backward_across_blocks() {
        let c = C::new(0, 0) - 1;
        assert_eq!((c.block(), c.slot()), (-1, 3));
        let c = C::new(2, 1) - 9;
        assert_eq!((c.block(), c.slot()), (0, 0));
        let c = C::new(2, 1) - 10;
        assert_eq!((c.block(), c.slot()), (-1, 3));
    }

    #[test]
    fn assign_operators() {
        let mut c = C::new(0, 0);
        c += 5;
        assert_eq!(c, C::new(1, 1));
        c -= 6;
        assert_eq!(c, C::new(-1, 3));
    }

    #[test]
    fn difference() {
        assert_eq!(C::new(1, 1) - C::new(0, 0), 5);
        assert_eq!(C::new(-1, 3) - C::new(1, 1), -6);
        assert_eq!(C::new(2, 2) - C::new(2, 2), 0);
    }

    #[test]
    fn ordering_is_linear() {
        assert!(C::new(-1, 3) < C::new(0, 0));
        assert!(C::new(0, 2) > C::new(0, 1));
        assert!(C::new(1, 0) >= C::new(0, 3));
    }

    #[test]
    fn zero_offset_is_identity() {
        let c = C::new(3, 2);
        assert_eq!(c + 0, c);
        assert_eq!(c - 0, c);
    }

    #[test]
    fn difference_inverts_offset() {
        let origin = C::new(-3, 1);
        for k in -40..40 {
            assert_eq!((origin + k) - origin, k);
        }
    }

    #[test]
    fn cursor_debug() {
        assert_eq!(
            format!("{:?}", C::new(-1, 2)),
            "Cursor { block: -1, slot: 2 }"
        );
    }
}
