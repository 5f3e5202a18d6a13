#![allow(clippy::cast_sign_loss)]

use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;

use super::{slot_ptr, Cursor, Deque, DEFAULT_BLOCK_SIZE};
use crate::alloc::{Allocator, Global};

/// Borrowing iterator over a [`Deque`], front to back.
pub struct Iter<'a, T, const BLOCK: usize = DEFAULT_BLOCK_SIZE> {
    table: &'a [Option<NonNull<T>>],
    origin: usize,
    front: Cursor<BLOCK>,
    back: Cursor<BLOCK>,
    marker: PhantomData<&'a T>,
}

impl<'a, T, const BLOCK: usize> Iter<'a, T, BLOCK> {
    pub(super) fn new(
        table: &'a [Option<NonNull<T>>],
        origin: usize,
        front: Cursor<BLOCK>,
        back: Cursor<BLOCK>,
    ) -> Self {
        Self {
            table,
            origin,
            front,
            back,
            marker: PhantomData,
        }
    }
}

impl<'a, T, const BLOCK: usize> Iterator for Iter<'a, T, BLOCK> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.front == self.back {
            return None;
        }
        let item = unsafe { &*slot_ptr(self.table, self.origin, self.front).as_ptr() };
        self.front += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = (self.back - self.front) as usize;
        (len, Some(len))
    }

    fn nth(&mut self, n: usize) -> Option<&'a T> {
        if n >= self.len() {
            self.front = self.back;
            return None;
        }
        self.front += n.try_into().unwrap_or(isize::MAX);
        self.next()
    }
}

impl<'a, T, const BLOCK: usize> DoubleEndedIterator for Iter<'a, T, BLOCK> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        Some(unsafe { &*slot_ptr(self.table, self.origin, self.back).as_ptr() })
    }
}

impl<T, const BLOCK: usize> ExactSizeIterator for Iter<'_, T, BLOCK> {}
impl<T, const BLOCK: usize> FusedIterator for Iter<'_, T, BLOCK> {}

impl<T, const BLOCK: usize> Clone for Iter<'_, T, BLOCK> {
    fn clone(&self) -> Self {
        Self { ..*self }
    }
}

impl<T: fmt::Debug, const BLOCK: usize> fmt::Debug for Iter<'_, T, BLOCK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

unsafe impl<T: Sync, const BLOCK: usize> Send for Iter<'_, T, BLOCK> {}
unsafe impl<T: Sync, const BLOCK: usize> Sync for Iter<'_, T, BLOCK> {}

/// Mutably borrowing iterator over a [`Deque`], front to back.
pub struct IterMut<'a, T, const BLOCK: usize = DEFAULT_BLOCK_SIZE> {
    table: &'a [Option<NonNull<T>>],
    origin: usize,
    front: Cursor<BLOCK>,
    back: Cursor<BLOCK>,
    marker: PhantomData<&'a mut T>,
}

impl<'a, T, const BLOCK: usize> IterMut<'a, T, BLOCK> {
    pub(super) fn new(
        table: &'a [Option<NonNull<T>>],
        origin: usize,
        front: Cursor<BLOCK>,
        back: Cursor<BLOCK>,
    ) -> Self {
        Self {
            table,
            origin,
            front,
            back,
            marker: PhantomData,
        }
    }
}

impl<'a, T, const BLOCK: usize> Iterator for IterMut<'a, T, BLOCK> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<&'a mut T> {
        if self.front == self.back {
            return None;
        }
        let item = unsafe { &mut *slot_ptr(self.table, self.origin, self.front).as_ptr() };
        self.front += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = (self.back - self.front) as usize;
        (len, Some(len))
    }
}

impl<'a, T, const BLOCK: usize> DoubleEndedIterator for IterMut<'a, T, BLOCK> {
    fn next_back(&mut self) -> Option<&'a mut T> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        Some(unsafe { &mut *slot_ptr(self.table, self.origin, self.back).as_ptr() })
    }
}

impl<T, const BLOCK: usize> ExactSizeIterator for IterMut<'_, T, BLOCK> {}
impl<T, const BLOCK: usize> FusedIterator for IterMut<'_, T, BLOCK> {}

impl<T: fmt::Debug, const BLOCK: usize> fmt::Debug for IterMut<'_, T, BLOCK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(Iter::new(self.table, self.origin, self.front, self.back))
            .finish()
    }
}

unsafe impl<T: Send, const BLOCK: usize> Send for IterMut<'_, T, BLOCK> {}
unsafe impl<T: Sync, const BLOCK: usize> Sync for IterMut<'_, T, BLOCK> {}

/// Owning iterator over a [`Deque`], created by `into_iter`.
pub struct IntoIter<T, A: Allocator = Global, const BLOCK: usize = DEFAULT_BLOCK_SIZE> {
    pub(super) deque: Deque<T, A, BLOCK>,
}

impl<T, A: Allocator, const BLOCK: usize> Iterator for IntoIter<T, A, BLOCK> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.deque.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.deque.len(), Some(self.deque.len()))
    }
}

impl<T, A: Allocator, const BLOCK: usize> DoubleEndedIterator for IntoIter<T, A, BLOCK> {
    fn next_back(&mut self) -> Option<T> {
        self.deque.pop_back()
    }
}

impl<T, A: Allocator, const BLOCK: usize> ExactSizeIterator for IntoIter<T, A, BLOCK> {}
impl<T, A: Allocator, const BLOCK: usize> FusedIterator for IntoIter<T, A, BLOCK> {}

impl<T: fmt::Debug, A: Allocator, const BLOCK: usize> fmt::Debug for IntoIter<T, A, BLOCK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntoIter").field(&self.deque).finish()
    }
}
