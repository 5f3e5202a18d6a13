//! Double-ended queue stored in fixed-size blocks.
//!
//! ```text
//! table:   [ None | blk | blk | blk | None | None ]
//!                    ^origin-1   ^origin+1
//!                  begin──────────────►end
//! ```
//!
//! The deque keeps a table of pointers to blocks of `BLOCK` slots each. Block
//! offsets are measured from an origin in the middle of the table, so the
//! deque grows in both directions without moving elements: when either side
//! of the table runs out, the table triples and the existing block pointers
//! are moved to the same offsets around the new middle. Only blocks spanned
//! by `[begin, end)` stay allocated; a block is released as soon as the last
//! element in it is popped.
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::ptr::{self, NonNull};

use crate::alloc::{allocate_array_or_abort, Allocator, Global};
use crate::Error;

mod cursor;
pub use cursor::Cursor;

mod iter;
pub use iter::{IntoIter, Iter, IterMut};

/// Number of element slots per block unless a deque is given another size.
pub const DEFAULT_BLOCK_SIZE: usize = 32;

/// Address of the slot `cursor` points at.
///
/// # Safety
///
/// The block holding `cursor` must be allocated in `table`.
pub(crate) unsafe fn slot_ptr<T, const BLOCK: usize>(
    table: &[Option<NonNull<T>>],
    origin: usize,
    cursor: Cursor<BLOCK>,
) -> NonNull<T> {
    let index = (origin as isize + cursor.block) as usize;
    debug_assert!(
        matches!(table.get(index), Some(Some(_))),
        "cursor {cursor:?} outside of allocated blocks"
    );
    match table.get_unchecked(index) {
        Some(block) => NonNull::new_unchecked(block.as_ptr().add(cursor.slot)),
        None => std::hint::unreachable_unchecked(),
    }
}

/// A double-ended queue with stable random access.
///
/// Push and pop at either end are O(1) (amortized when the block table has to
/// grow), indexing is O(1), and positional [`insert`](Deque::insert) /
/// [`erase`](Deque::erase) are O(len).
pub struct Deque<T, A: Allocator = Global, const BLOCK: usize = DEFAULT_BLOCK_SIZE> {
    table: Vec<Option<NonNull<T>>>,
    origin: usize,
    begin: Cursor<BLOCK>,
    end: Cursor<BLOCK>,
    len: usize,
    alloc: A,
    marker: PhantomData<T>,
}

unsafe impl<T: Send, A: Allocator + Send, const BLOCK: usize> Send for Deque<T, A, BLOCK> {}
unsafe impl<T: Sync, A: Allocator + Sync, const BLOCK: usize> Sync for Deque<T, A, BLOCK> {}

impl<T> Deque<T> {
    /// Creates an empty deque. Nothing is allocated until the first push.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates a deque of `len` default values.
    #[must_use]
    pub fn with_len(len: usize) -> Self
    where
        T: Default,
    {
        Self::from_fn_in(len, |_| T::default(), Global)
    }

    /// Creates a deque of `len` clones of `value`.
    #[must_use]
    pub fn from_elem(len: usize, value: T) -> Self
    where
        T: Clone,
    {
        Self::from_fn_in(len, |_| value.clone(), Global)
    }
}

impl<T, A: Allocator, const BLOCK: usize> Deque<T, A, BLOCK> {
    const NON_EMPTY_BLOCK: () = assert!(BLOCK > 0, "block size must be non-zero");

    /// Creates an empty deque drawing blocks from `alloc`.
    pub fn new_in(alloc: A) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY_BLOCK;
        Self {
            table: Vec::new(),
            origin: 0,
            begin: Cursor::default(),
            end: Cursor::default(),
            len: 0,
            alloc,
            marker: PhantomData,
        }
    }

    /// Creates a deque of `len` elements where element `i` is `f(i)`.
    ///
    /// If `f` panics, the elements built so far are dropped and every block
    /// is released before the panic continues.
    pub fn from_fn_in(len: usize, mut f: impl FnMut(usize) -> T, alloc: A) -> Self {
        match Self::try_from_fn_in(len, |i| Ok::<T, Infallible>(f(i)), alloc) {
            Ok(deque) => deque,
            Err(never) => match never {},
        }
    }

    /// Fallible version of [`Deque::from_fn_in`].
    ///
    /// # Errors
    ///
    /// The first error returned by `f`; the elements built so far are dropped
    /// and every block is released before it is returned.
    pub fn try_from_fn_in<E>(
        len: usize,
        mut f: impl FnMut(usize) -> Result<T, E>,
        alloc: A,
    ) -> Result<Self, E> {
        let mut deque = Self::new_in(alloc);
        let blocks = len.div_ceil(BLOCK);
        if blocks > 0 {
            #[cfg(feature = "log")]
            log::trace!("Deque::try_from_fn_in {len} elements in {blocks} blocks");

            deque.table = vec![None; blocks];
            deque.origin = blocks / 2;
            deque.begin = Cursor::new(-(deque.origin as isize), 0);
            deque.end = deque.begin;
            for entry in &mut deque.table {
                *entry = Some(allocate_array_or_abort::<T, A>(&deque.alloc, BLOCK));
            }
        }
        // Dropping `deque` on the way out releases the pre-allocated blocks,
        // including those not reached yet.
        for i in 0..len {
            let value = f(i)?;
            unsafe {
                let slot = slot_ptr(&deque.table, deque.origin, deque.end);
                deque.alloc.construct(slot, value);
            }
            deque.end += 1;
            deque.len += 1;
        }
        Ok(deque)
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The allocator blocks are drawn from.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Number of blocks currently allocated.
    #[must_use]
    pub fn allocated_blocks(&self) -> usize {
        self.table.iter().filter(|block| block.is_some()).count()
    }

    /// Cursor at the first element.
    #[must_use]
    pub fn begin(&self) -> Cursor<BLOCK> {
        self.begin
    }

    /// Cursor one past the last element.
    #[must_use]
    pub fn end(&self) -> Cursor<BLOCK> {
        self.end
    }

    /// Cursor at `index` elements from the front.
    #[must_use]
    pub fn cursor(&self, index: usize) -> Cursor<BLOCK> {
        self.begin + index as isize
    }

    /// Index of the element under `cursor`, counted from the front.
    #[must_use]
    pub fn index_of(&self, cursor: Cursor<BLOCK>) -> isize {
        cursor - self.begin
    }

    /// Element under `cursor`, or `None` outside `[begin, end)`.
    #[must_use]
    pub fn at_cursor(&self, cursor: Cursor<BLOCK>) -> Option<&T> {
        if self.begin <= cursor && cursor < self.end {
            Some(unsafe { &*self.slot(cursor).as_ptr() })
        } else {
            None
        }
    }

    /// Mutable element under `cursor`, or `None` outside `[begin, end)`.
    pub fn at_cursor_mut(&mut self, cursor: Cursor<BLOCK>) -> Option<&mut T> {
        if self.begin <= cursor && cursor < self.end {
            Some(unsafe { &mut *self.slot(cursor).as_ptr() })
        } else {
            None
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len {
            Some(unsafe { self.get_unchecked(index) })
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.len {
            Some(unsafe { self.get_unchecked_mut(index) })
        } else {
            None
        }
    }

    /// Bounds-checked access.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] when `index >= len`.
    pub fn at(&self, index: usize) -> Result<&T, Error> {
        self.get(index).ok_or(Error::OutOfRange {
            index,
            len: self.len,
        })
    }

    /// Bounds-checked mutable access.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfRange`] when `index >= len`.
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T, Error> {
        let len = self.len;
        self.get_mut(index)
            .ok_or(Error::OutOfRange { index, len })
    }

    /// Access without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    #[must_use]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        &*self.slot(self.cursor(index)).as_ptr()
    }

    /// Mutable access without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    pub unsafe fn get_unchecked_mut(&mut self, index: usize) -> &mut T {
        &mut *self.slot(self.cursor(index)).as_ptr()
    }

    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|last| self.get(last))
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.get_mut(0)
    }

    pub fn back_mut(&mut self) -> Option<&mut T> {
        self.len.checked_sub(1).and_then(|last| self.get_mut(last))
    }

    pub fn push_back(&mut self, value: T) {
        self.emplace_back(|| value);
    }

    pub fn push_front(&mut self, value: T) {
        self.emplace_front(|| value);
    }

    /// Appends the value built by `f`.
    ///
    /// The slot is made ready before `f` runs; if `f` panics a block allocated
    /// for it is released again and the deque is unchanged.
    pub fn emplace_back(&mut self, f: impl FnOnce() -> T) {
        match self.try_emplace_back(|| Ok::<T, Infallible>(f())) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Prepends the value built by `f`, see [`Deque::emplace_back`].
    pub fn emplace_front(&mut self, f: impl FnOnce() -> T) {
        match self.try_emplace_front(|| Ok::<T, Infallible>(f())) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Appends the value built by `f` if it succeeds.
    ///
    /// # Errors
    ///
    /// The error returned by `f`; the deque is left unchanged.
    pub fn try_emplace_back<E>(&mut self, f: impl FnOnce() -> Result<T, E>) -> Result<(), E> {
        let target = self.end;
        self.construct_at(target, f)?;
        self.end += 1;
        self.len += 1;
        Ok(())
    }

    /// Prepends the value built by `f` if it succeeds.
    ///
    /// # Errors
    ///
    /// The error returned by `f`; the deque is left unchanged.
    pub fn try_emplace_front<E>(&mut self, f: impl FnOnce() -> Result<T, E>) -> Result<(), E> {
        let target = self.begin - 1;
        self.construct_at(target, f)?;
        self.begin = target;
        self.len += 1;
        Ok(())
    }

    pub fn pop_back(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.end -= 1;
        let value = unsafe { ptr::read(self.slot(self.end).as_ptr()) };
        self.len -= 1;
        self.retire_back_slot();
        Some(value)
    }

    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let old = self.begin;
        let value = unsafe { ptr::read(self.slot(old).as_ptr()) };
        self.begin += 1;
        self.len -= 1;
        if self.begin.block != old.block || self.len == 0 {
            self.release_block(old.block);
        }
        Some(value)
    }

    /// Inserts `value` before the element at `index`.
    ///
    /// Every element from `index` to the back moves one slot toward the back,
    /// regardless of which end is closer.
    ///
    /// # Panics
    ///
    /// When `index > len`.
    pub fn insert(&mut self, index: usize, value: T) {
        self.emplace(index, || value);
    }

    /// Inserts the value built by `f` before the element at `index`, see
    /// [`Deque::insert`].
    ///
    /// # Panics
    ///
    /// When `index > len`, or when `f` panics (the deque is then unchanged).
    pub fn emplace(&mut self, index: usize, f: impl FnOnce() -> T) {
        assert!(
            index <= self.len,
            "insertion index (is {index}) should be <= len (is {})",
            self.len
        );
        let value = f();
        self.reserve_block(self.end.block);
        let at = self.cursor(index);
        let mut hole = self.end;
        while hole > at {
            let prev = hole - 1;
            unsafe { ptr::copy_nonoverlapping(self.slot(prev).as_ptr(), self.slot(hole).as_ptr(), 1) };
            hole = prev;
        }
        unsafe { self.alloc.construct(self.slot(at), value) };
        self.end += 1;
        self.len += 1;
    }

    /// Removes and returns the element at `index`.
    ///
    /// Every element after `index` moves one slot toward the front.
    ///
    /// # Panics
    ///
    /// When `index >= len`.
    pub fn erase(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "removal index (is {index}) should be < len (is {})",
            self.len
        );
        let mut hole = self.cursor(index);
        let value = unsafe { ptr::read(self.slot(hole).as_ptr()) };
        let last = self.end - 1;
        while hole < last {
            let next = hole + 1;
            unsafe { ptr::copy_nonoverlapping(self.slot(next).as_ptr(), self.slot(hole).as_ptr(), 1) };
            hole = next;
        }
        self.end = last;
        self.len -= 1;
        self.retire_back_slot();
        value
    }

    /// Drops every element and releases every block.
    pub fn clear(&mut self) {
        while self.pop_back().is_some() {}
    }

    pub fn iter(&self) -> Iter<'_, T, BLOCK> {
        Iter::new(&self.table, self.origin, self.begin, self.end)
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T, BLOCK> {
        IterMut::new(&self.table, self.origin, self.begin, self.end)
    }

    fn table_index(&self, block: isize) -> Option<usize> {
        let index = self.origin as isize + block;
        (0..self.table.len() as isize)
            .contains(&index)
            .then_some(index as usize)
    }

    /// # Safety
    ///
    /// The block holding `cursor` must be allocated.
    unsafe fn slot(&self, cursor: Cursor<BLOCK>) -> NonNull<T> {
        slot_ptr(&self.table, self.origin, cursor)
    }

    /// Builds a value with `f` straight into the slot at `target`, allocating
    /// its block first if needed. On failure a freshly allocated block is
    /// released again.
    fn construct_at<E>(
        &mut self,
        target: Cursor<BLOCK>,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<(), E> {
        let fresh = self.reserve_block(target.block);
        let mut rollback = BlockRollback {
            deque: self,
            block: target.block,
            armed: fresh,
        };
        let value = f()?;
        rollback.armed = false;
        let deque = &mut *rollback.deque;
        unsafe { deque.alloc.construct(deque.slot(target), value) };
        Ok(())
    }

    /// Makes sure `block` is allocated, growing the table when it falls
    /// outside. Returns whether a new block was allocated.
    fn reserve_block(&mut self, block: isize) -> bool {
        let index = loop {
            match self.table_index(block) {
                Some(index) => break index,
                None => self.grow(),
            }
        };
        if self.table[index].is_some() {
            return false;
        }
        #[cfg(feature = "log")]
        log::trace!("Deque::reserve_block {block}");

        self.table[index] = Some(allocate_array_or_abort::<T, A>(&self.alloc, BLOCK));
        true
    }

    fn release_block(&mut self, block: isize) {
        if let Some(index) = self.table_index(block) {
            if let Some(ptr) = self.table[index].take() {
                #[cfg(feature = "log")]
                log::trace!("Deque::release_block {block}");

                unsafe { self.alloc.deallocate_array(ptr, BLOCK) };
            }
        }
    }

    /// The slot at `end` was just vacated; its block is empty when `end`
    /// starts a block or nothing is left.
    fn retire_back_slot(&mut self) {
        if self.end.slot == 0 || self.len == 0 {
            self.release_block(self.end.block);
        }
    }

    /// Triples the block table and recentres it. Block pointers, not
    /// contents, move; every block keeps its offset from the origin.
    fn grow(&mut self) {
        let new_len = (self.table.len() * 3).max(1);
        let new_origin = new_len / 2;
        #[cfg(feature = "log")]
        log::trace!("Deque::grow {} -> {new_len} blocks", self.table.len());

        let mut table = vec![None; new_len];
        for (index, block) in self.table.drain(..).enumerate() {
            if block.is_some() {
                table[index + new_origin - self.origin] = block;
            }
        }
        self.table = table;
        self.origin = new_origin;
    }
}

struct BlockRollback<'a, T, A: Allocator, const BLOCK: usize> {
    deque: &'a mut Deque<T, A, BLOCK>,
    block: isize,
    armed: bool,
}

impl<T, A: Allocator, const BLOCK: usize> Drop for BlockRollback<'_, T, A, BLOCK> {
    fn drop(&mut self) {
        if self.armed {
            self.deque.release_block(self.block);
        }
    }
}

impl<T, A: Allocator, const BLOCK: usize> Drop for Deque<T, A, BLOCK> {
    fn drop(&mut self) {
        while self.len > 0 {
            self.len -= 1;
            unsafe { self.alloc.destroy(slot_ptr(&self.table, self.origin, self.begin)) };
            self.begin += 1;
        }
        for block in self.table.drain(..).flatten() {
            unsafe { self.alloc.deallocate_array(block, BLOCK) };
        }
    }
}

impl<T, A: Allocator + Default, const BLOCK: usize> Default for Deque<T, A, BLOCK> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<T: Clone, A: Allocator + Clone, const BLOCK: usize> Clone for Deque<T, A, BLOCK> {
    fn clone(&self) -> Self {
        Self::from_fn_in(self.len, |i| self[i].clone(), self.alloc.clone())
    }
}

impl<T: fmt::Debug, A: Allocator, const BLOCK: usize> fmt::Debug for Deque<T, A, BLOCK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator, const BLOCK: usize, const OTHER: usize>
    PartialEq<Deque<T, B, OTHER>> for Deque<T, A, BLOCK>
{
    fn eq(&self, other: &Deque<T, B, OTHER>) -> bool {
        self.len == other.len() && self.iter().eq(other.iter())
    }
}

impl<T: Eq, A: Allocator, const BLOCK: usize> Eq for Deque<T, A, BLOCK> {}

impl<T, A: Allocator, const BLOCK: usize> Index<usize> for Deque<T, A, BLOCK> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!("index out of bounds: the len is {} but the index is {index}", self.len),
        }
    }
}

impl<T, A: Allocator, const BLOCK: usize> IndexMut<usize> for Deque<T, A, BLOCK> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        let len = self.len;
        match self.get_mut(index) {
            Some(value) => value,
            None => panic!("index out of bounds: the len is {len} but the index is {index}"),
        }
    }
}

impl<T, A: Allocator, const BLOCK: usize> Index<Cursor<BLOCK>> for Deque<T, A, BLOCK> {
    type Output = T;

    fn index(&self, cursor: Cursor<BLOCK>) -> &T {
        match self.at_cursor(cursor) {
            Some(value) => value,
            None => panic!("cursor {cursor:?} outside of [{:?}, {:?})", self.begin, self.end),
        }
    }
}

impl<T, A: Allocator, const BLOCK: usize> IndexMut<Cursor<BLOCK>> for Deque<T, A, BLOCK> {
    fn index_mut(&mut self, cursor: Cursor<BLOCK>) -> &mut T {
        let (begin, end) = (self.begin, self.end);
        match self.at_cursor_mut(cursor) {
            Some(value) => value,
            None => panic!("cursor {cursor:?} outside of [{begin:?}, {end:?})"),
        }
    }
}

impl<T, A: Allocator, const BLOCK: usize> Extend<T> for Deque<T, A, BLOCK> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T, A: Allocator + Default, const BLOCK: usize> FromIterator<T> for Deque<T, A, BLOCK> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut deque = Self::default();
        deque.extend(iter);
        deque
    }
}

impl<T, const N: usize> From<[T; N]> for Deque<T> {
    fn from(values: [T; N]) -> Self {
        let mut values = values.into_iter();
        // The array yields exactly `N` items, so the error arm is unreachable.
        Self::try_from_fn_in(N, |_| values.next().ok_or(()), Global).unwrap_or_default()
    }
}

impl<T, A: Allocator, const BLOCK: usize> IntoIterator for Deque<T, A, BLOCK> {
    type Item = T;
    type IntoIter = IntoIter<T, A, BLOCK>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { deque: self }
    }
}

impl<'a, T, A: Allocator, const BLOCK: usize> IntoIterator for &'a Deque<T, A, BLOCK> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, BLOCK>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, A: Allocator, const BLOCK: usize> IntoIterator for &'a mut Deque<T, A, BLOCK> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T, BLOCK>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::pedantic)]

    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::rc::Rc;

    use rand::Rng;

    use super::*;
    use crate::testing::{CountingAllocator, DropCounter, FragileClone};

    type Small<T> = Deque<T, CountingAllocator, 4>;

    fn small<T>() -> (Small<T>, CountingAllocator) {
        let alloc = CountingAllocator::new();
        (Deque::new_in(alloc.clone()), alloc)
    }

    #[test]
    fn new_is_empty() {
        let deque = Deque::<u8>::new();
        assert!(deque.is_empty());
        assert_eq!(deque.len(), 0);
        assert_eq!(deque.begin(), deque.end());
        assert_eq!(deque.allocated_blocks(), 0);
        assert_eq!(deque.front(), None);
        assert_eq!(deque.back(), None);
    }

    #[test]
    fn push_back_keeps_order() {
        let (mut deque, _) = small();
        for i in 0..10 {
            deque.push_back(i);
        }
        assert_eq!(deque.iter().copied().collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
        assert_eq!(deque.front(), Some(&0));
        assert_eq!(deque.back(), Some(&9));
    }

    #[test]
    fn push_front_keeps_order() {
        let (mut deque, _) = small();
        for i in 0..10 {
            deque.push_front(i);
        }
        assert_eq!(deque.iter().copied().collect::<Vec<_>>(), (0..10).rev().collect::<Vec<_>>());
    }

    #[test]
    fn len_after_pushes_and_pops() {
        let mut deque = Deque::new();
        for i in 0..100 {
            deque.push_back(i);
        }
        for _ in 0..37 {
            deque.pop_front();
        }
        assert_eq!(deque.len(), 63);
        for i in 0..deque.len() {
            assert_eq!(deque[i], i + 37);
        }
    }

    #[test]
    fn pop_on_empty_is_none() {
        let mut deque = Deque::<u8>::new();
        assert_eq!(deque.pop_back(), None);
        assert_eq!(deque.pop_front(), None);
    }

    #[test]
    fn at_reports_out_of_range() {
        let deque = Deque::from([1, 2, 3]);
        assert_eq!(deque.at(2), Ok(&3));
        assert_eq!(deque.at(3), Err(Error::OutOfRange { index: 3, len: 3 }));
        assert_eq!(deque.len(), 3);
    }

    #[test]
    fn at_mut_writes() {
        let mut deque = Deque::from([1, 2, 3]);
        *deque.at_mut(1).unwrap() = 20;
        assert_eq!(deque[1], 20);
        assert!(deque.at_mut(9).is_err());
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn index_out_of_range_panics() {
        let deque = Deque::from([1]);
        let _ = deque[1];
    }

    #[test]
    fn get_unchecked_reads() {
        let deque = Deque::from([4, 5, 6]);
        assert_eq!(unsafe { *deque.get_unchecked(1) }, 5);
    }

    #[test]
    fn initializer_round_trip() {
        let deque = Deque::from([1, 2, 3, 4, 5]);
        assert_eq!(deque.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(deque.iter().rev().copied().collect::<Vec<_>>(), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn cursor_arithmetic_matches_indexing() {
        let alloc = CountingAllocator::new();
        let deque = Deque::<usize, _, 4>::from_fn_in(37, |i| i * 10, alloc);
        let begin = deque.begin();
        for k in 0..37 {
            let it = begin + k as isize;
            assert_eq!(it - begin, k as isize);
            assert_eq!(deque[it], k * 10);
            assert_eq!(deque.index_of(it), k as isize);
        }
        let end = deque.end();
        for k in 1..=37 {
            assert_eq!(deque[end - k], (37 - k as usize) * 10);
        }
        assert_eq!(end - begin, 37);
        assert!(deque.at_cursor(end).is_none());
        assert!(deque.at_cursor(begin - 1).is_none());
    }

    #[test]
    fn cursor_survives_growth() {
        let (mut deque, _) = small();
        for i in 0..6 {
            deque.push_back(i);
        }
        let third = deque.cursor(3);
        for i in 0..200 {
            deque.push_back(100 + i);
            deque.push_front(-i);
        }
        assert_eq!(deque[third], 3);
        deque[third] = 33;
        assert_eq!(deque.iter().filter(|&&v| v == 33).count(), 1);
    }

    #[test]
    fn one_sided_growth_back() {
        let (mut deque, _) = small();
        for i in 0..40 {
            deque.push_back(i);
        }
        assert!(deque.iter().copied().eq(0..40));
    }

    #[test]
    fn one_sided_growth_front() {
        let mut deque = Deque::new();
        for i in 0..10 * DEFAULT_BLOCK_SIZE {
            deque.push_front(i);
        }
        assert!(deque.iter().copied().eq((0..10 * DEFAULT_BLOCK_SIZE).rev()));
    }

    #[test]
    fn blocks_follow_live_range() {
        let (mut deque, alloc) = small();
        for i in 0..9 {
            deque.push_back(i);
        }
        assert_eq!(deque.allocated_blocks(), 3);
        assert_eq!(alloc.live(), 3);
        for _ in 0..4 {
            deque.pop_front();
        }
        assert_eq!(alloc.live(), 2);
        deque.pop_back();
        assert_eq!(alloc.live(), 1);
        while deque.pop_back().is_some() {}
        assert_eq!(alloc.live(), 0);
        deque.push_front(1);
        assert_eq!(alloc.live(), 1);
        drop(deque);
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn alternating_ends_through_empty() {
        let (mut deque, alloc) = small();
        for round in 0..20 {
            deque.push_front(round);
            deque.push_back(round + 1);
            assert_eq!(deque.pop_back(), Some(round + 1));
            assert_eq!(deque.pop_back(), Some(round));
            assert!(deque.is_empty());
            assert_eq!(alloc.live(), 0);
        }
    }

    #[test]
    fn insert_shifts_toward_back() {
        let (mut deque, _) = small();
        deque.extend(0..10);
        deque.insert(3, 100);
        deque.insert(0, 200);
        let len = deque.len();
        deque.insert(len, 300);
        assert_eq!(
            deque.iter().copied().collect::<Vec<_>>(),
            vec![200, 0, 1, 2, 100, 3, 4, 5, 6, 7, 8, 9, 300]
        );
    }

    #[test]
    fn insert_into_empty() {
        let (mut deque, alloc) = small();
        deque.insert(0, 7);
        assert_eq!(deque.len(), 1);
        assert_eq!(deque[0], 7);
        assert_eq!(alloc.live(), 1);
    }

    #[test]
    #[should_panic(expected = "insertion index")]
    fn insert_past_end_panics() {
        let mut deque = Deque::from([1]);
        deque.insert(2, 0);
    }

    #[test]
    fn erase_shifts_toward_front() {
        let (mut deque, alloc) = small();
        deque.extend(0..9);
        assert_eq!(deque.erase(2), 2);
        assert_eq!(deque.erase(0), 0);
        assert_eq!(deque.erase(6), 8);
        assert_eq!(deque.iter().copied().collect::<Vec<_>>(), vec![1, 3, 4, 5, 6, 7]);
        // 6 elements starting at slot 0 of a block fit in 2 blocks.
        assert_eq!(alloc.live(), 2);
        while !deque.is_empty() {
            deque.erase(0);
        }
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    #[should_panic(expected = "removal index")]
    fn erase_past_end_panics() {
        let mut deque = Deque::from([1]);
        deque.erase(1);
    }

    #[test]
    fn emplace_builds_in_place() {
        let mut deque = Deque::new();
        deque.emplace_back(|| String::from("b"));
        deque.emplace_front(|| String::from("a"));
        deque.emplace(1, || String::from("ab"));
        assert_eq!(deque.iter().map(String::as_str).collect::<Vec<_>>(), vec!["a", "ab", "b"]);
    }

    #[test]
    fn try_emplace_error_rolls_back_block() {
        let (mut deque, alloc) = small();
        deque.extend(0..4);
        assert_eq!(alloc.live(), 1);
        assert_eq!(deque.try_emplace_back(|| Err::<i32, _>("nope")), Err("nope"));
        assert_eq!(alloc.live(), 1);
        assert_eq!(deque.try_emplace_front(|| Err::<i32, _>("nope")), Err("nope"));
        assert_eq!(alloc.live(), 1);
        assert_eq!(deque.len(), 4);
        assert!(deque.iter().copied().eq(0..4));
        deque.try_emplace_back(|| Ok::<_, ()>(4)).unwrap();
        assert_eq!(deque.back(), Some(&4));
    }

    #[test]
    fn emplace_panic_rolls_back_block() {
        let (mut deque, alloc) = small();
        let result = catch_unwind(AssertUnwindSafe(|| {
            deque.emplace_front(|| -> i32 { panic!("boom") });
        }));
        assert!(result.is_err());
        assert_eq!(alloc.live(), 0);
        assert!(deque.is_empty());
        deque.push_back(1);
        assert_eq!(deque.front(), Some(&1));
    }

    #[test]
    fn positional_emplace_panic_leaves_deque_unchanged() {
        let (mut deque, alloc) = small();
        deque.extend(0..8);
        assert_eq!(alloc.live(), 2);
        let result = catch_unwind(AssertUnwindSafe(|| {
            deque.emplace(3, || -> i32 { panic!("boom") });
        }));
        assert!(result.is_err());
        assert_eq!(alloc.live(), 2);
        assert_eq!(deque.len(), 8);
        assert!(deque.iter().copied().eq(0..8));
        deque.emplace(3, || 30);
        assert_eq!(deque.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 30, 3, 4, 5, 6, 7]);
        assert_eq!(alloc.live(), 3);
    }

    #[test]
    fn with_len_fills_defaults() {
        let deque = Deque::<u32>::with_len(70);
        assert_eq!(deque.len(), 70);
        assert!(deque.iter().all(|&v| v == 0));
    }

    #[test]
    fn from_elem_clones() {
        let deque = Deque::from_elem(5, String::from("x"));
        assert_eq!(deque.len(), 5);
        assert!(deque.iter().all(|v| v == "x"));
    }

    #[test]
    fn bulk_fill_panic_leaves_nothing_behind() {
        let alloc = CountingAllocator::new();
        let drops = Rc::new(Cell::new(0));
        let result = catch_unwind(AssertUnwindSafe(|| {
            Deque::<DropCounter, _, 4>::from_fn_in(
                20,
                |i| {
                    if i == 13 {
                        panic!("construction failed");
                    }
                    DropCounter::new(i as i32, &drops)
                },
                alloc.clone(),
            )
        }));
        assert!(result.is_err());
        assert_eq!(drops.get(), 13);
        assert_eq!(alloc.live(), 0);
        assert_eq!(alloc.total(), 5);
    }

    #[test]
    fn bulk_fill_error_leaves_nothing_behind() {
        let alloc = CountingAllocator::new();
        let drops = Rc::new(Cell::new(0));
        let result = Deque::<DropCounter, _, 4>::try_from_fn_in(
            10,
            |i| {
                if i == 6 {
                    Err(i)
                } else {
                    Ok(DropCounter::new(i as i32, &drops))
                }
            },
            alloc.clone(),
        );
        assert_eq!(result.err(), Some(6));
        assert_eq!(drops.get(), 6);
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn clone_is_deep() {
        let (mut deque, alloc) = small();
        deque.extend(0..11);
        let mut copy = deque.clone();
        copy[0] = 100;
        assert_eq!(deque[0], 0);
        assert_eq!(copy.len(), 11);
        assert!(copy.iter().skip(1).copied().eq(1..11));
        assert_eq!(alloc.live(), 6);
    }

    #[test]
    fn clone_panic_leaves_source_and_memory_intact() {
        let alloc = CountingAllocator::new();
        let deque = Deque::<FragileClone, _, 4>::from_fn_in(9, |i| FragileClone(i as i32), alloc.clone());
        FragileClone::arm(5);
        let result = catch_unwind(AssertUnwindSafe(|| deque.clone()));
        FragileClone::disarm();
        assert!(result.is_err());
        assert_eq!(alloc.live(), 3);
        assert!(deque.iter().map(|v| v.0).eq(0..9));
    }

    #[test]
    fn take_leaves_source_empty() {
        let mut deque = Deque::from([1, 2, 3]);
        let moved = std::mem::take(&mut deque);
        assert!(deque.is_empty());
        assert_eq!(moved, Deque::from([1, 2, 3]));
        deque.push_back(4);
        assert_eq!(deque[0], 4);
    }

    #[test]
    fn drop_destroys_every_element() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut deque = Deque::<_, Global, 4>::new_in(Global);
            for i in 0..10 {
                deque.push_front(DropCounter::new(i, &drops));
            }
            drop(deque.pop_back());
            assert_eq!(drops.get(), 1);
        }
        assert_eq!(drops.get(), 10);
    }

    #[test]
    fn clear_releases_blocks() {
        let (mut deque, alloc) = small();
        deque.extend(0..17);
        deque.clear();
        assert!(deque.is_empty());
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn into_iter_both_ends() {
        let (mut deque, alloc) = small();
        deque.extend(0..10);
        let mut iter = deque.into_iter();
        assert_eq!(iter.len(), 10);
        assert_eq!(iter.next(), Some(0));
        assert_eq!(iter.next_back(), Some(9));
        assert_eq!(iter.len(), 8);
        drop(iter);
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn iter_mut_updates() {
        let mut deque: Deque<i32> = (0..50).collect();
        for value in &mut deque {
            *value *= 2;
        }
        assert!(deque.iter().copied().eq((0..50).map(|v| v * 2)));
    }

    #[test]
    fn iter_nth_and_len() {
        let deque: Deque<i32> = (0..100).collect();
        let mut iter = deque.iter();
        assert_eq!(iter.nth(40), Some(&40));
        assert_eq!(iter.len(), 59);
        assert_eq!(iter.nth(100), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn zero_sized_elements() {
        let mut deque = Deque::new();
        for _ in 0..100 {
            deque.push_back(());
        }
        assert_eq!(deque.len(), 100);
        assert_eq!(deque.pop_front(), Some(()));
        assert_eq!(deque.iter().count(), 99);
    }

    #[test]
    fn deque_debug() {
        assert_eq!(format!("{:?}", Deque::from([1, 2])), "[1, 2]");
    }

    #[test]
    fn equality_across_block_sizes() {
        let a: Deque<i32> = (0..20).collect();
        let b: Deque<i32, Global, 3> = (0..20).collect();
        assert!(a == b);
    }

    #[test]
    fn random_churn_matches_vec_deque() {
        const OPS: usize = 20_000;

        let (mut deque, alloc) = small();
        let mut model = VecDeque::new();
        let mut rng = rand::thread_rng();
        for i in 0..OPS {
            match rng.gen_range(0..6) {
                0 => {
                    deque.push_back(i);
                    model.push_back(i);
                }
                1 => {
                    deque.push_front(i);
                    model.push_front(i);
                }
                2 => assert_eq!(deque.pop_back(), model.pop_back()),
                3 => assert_eq!(deque.pop_front(), model.pop_front()),
                4 => {
                    let at = rng.gen_range(0..=model.len());
                    deque.insert(at, i);
                    model.insert(at, i);
                }
                _ => {
                    if !model.is_empty() {
                        let at = rng.gen_range(0..model.len());
                        assert_eq!(Some(deque.erase(at)), model.remove(at));
                    }
                }
            }
            assert_eq!(deque.len(), model.len());
        }
        assert!(deque.iter().eq(model.iter()));
        assert_eq!(alloc.live(), deque.allocated_blocks());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            PushBack(i32),
            PushFront(i32),
            PopBack,
            PopFront,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                any::<i32>().prop_map(Op::PushBack),
                any::<i32>().prop_map(Op::PushFront),
                Just(Op::PopBack),
                Just(Op::PopFront),
            ]
        }

        proptest! {
            #[test]
            fn matches_reference_sequence(ops in proptest::collection::vec(op(), 0..300)) {
                let (mut deque, alloc) = small();
                let mut model = VecDeque::new();
                for op in ops {
                    match op {
                        Op::PushBack(v) => {
                            deque.push_back(v);
                            model.push_back(v);
                        }
                        Op::PushFront(v) => {
                            deque.push_front(v);
                            model.push_front(v);
                        }
                        Op::PopBack => prop_assert_eq!(deque.pop_back(), model.pop_back()),
                        Op::PopFront => prop_assert_eq!(deque.pop_front(), model.pop_front()),
                    }
                }
                prop_assert!(deque.iter().eq(model.iter()));
                prop_assert!(deque.iter().rev().eq(model.iter().rev()));
                // Only blocks spanned by the live range stay allocated.
                let spanned = if deque.is_empty() {
                    0
                } else {
                    ((deque.end() - 1).block() - deque.begin().block() + 1) as usize
                };
                prop_assert_eq!(alloc.live(), spanned);
            }

            #[test]
            fn offset_then_difference(len in 1usize..200, from in 0usize..200, to in 0usize..200) {
                let from = from % len;
                let to = to % len;
                let deque = Deque::<usize, Global, 4>::from_fn_in(len, |i| i, Global);
                let it = deque.cursor(from);
                let k = to as isize - from as isize;
                prop_assert_eq!((it + k) - it, k);
                prop_assert_eq!(deque[it + k], to);
            }
        }
    }
}
