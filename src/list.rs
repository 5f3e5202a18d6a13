//! Doubly linked list closed into a ring by a sentinel.
//!
//! ```text
//!  ┌──────────────────────────────────────────┐
//!  └─► sentinel ◄──► node ◄──► node ◄──► node ◄┘
//! ```
//!
//! The sentinel carries links but no value. It is the predecessor of the
//! first node and the successor of the last, so an empty list is simply a
//! sentinel linked to itself and every insertion is the same four link
//! writes no matter where it happens.
//!
//! The sentinel's links are a plain field of the list. Nodes refer to it as
//! `None` rather than by address, and every link access goes through
//! [`List::links`], which resolves `None` to those fields. A list can thus be
//! moved or swapped freely and an empty list allocates nothing.

use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::alloc::{allocate_array_or_abort, Allocator, Global};

/// A neighbour in the ring; `None` is the sentinel.
type Link<T> = Option<NonNull<Node<T>>>;

struct Links<T> {
    prev: Link<T>,
    next: Link<T>,
}

impl<T> Clone for Links<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Links<T> {}

struct Node<T> {
    links: Links<T>,
    value: T,
}

/// A doubly linked list drawing its nodes from an allocator.
pub struct List<T, A: Allocator = Global> {
    sentinel: Links<T>,
    len: usize,
    alloc: A,
    marker: PhantomData<Box<Node<T>>>,
}

unsafe impl<T: Send, A: Allocator + Send> Send for List<T, A> {}
unsafe impl<T: Sync, A: Allocator + Sync> Sync for List<T, A> {}

impl<T> List<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates a list of `len` default values.
    #[must_use]
    pub fn with_len(len: usize) -> Self
    where
        T: Default,
    {
        (0..len).map(|_| T::default()).collect()
    }

    /// Creates a list of `len` clones of `value`.
    #[must_use]
    pub fn from_elem(len: usize, value: T) -> Self
    where
        T: Clone,
    {
        (0..len).map(|_| value.clone()).collect()
    }
}

impl<T, A: Allocator> List<T, A> {
    /// Creates an empty list whose nodes come from `alloc`.
    pub fn new_in(alloc: A) -> Self {
        Self {
            sentinel: Links {
                prev: None,
                next: None,
            },
            len: 0,
            alloc,
            marker: PhantomData,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.sentinel.next.map(|node| unsafe { &(*node.as_ptr()).value })
    }

    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.sentinel.prev.map(|node| unsafe { &(*node.as_ptr()).value })
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.sentinel.next.map(|node| unsafe { &mut (*node.as_ptr()).value })
    }

    pub fn back_mut(&mut self) -> Option<&mut T> {
        self.sentinel.prev.map(|node| unsafe { &mut (*node.as_ptr()).value })
    }

    pub fn push_back(&mut self, value: T) {
        let node = self.allocate_node(value);
        unsafe { self.link_before(None, node) };
        self.len += 1;
    }

    pub fn push_front(&mut self, value: T) {
        let node = self.allocate_node(value);
        unsafe { self.link_before(self.sentinel.next, node) };
        self.len += 1;
    }

    pub fn pop_back(&mut self) -> Option<T> {
        let last = self.sentinel.prev?;
        Some(unsafe { self.remove_node(last) })
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let first = self.sentinel.next?;
        Some(unsafe { self.remove_node(first) })
    }

    /// Drops every element.
    pub fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }

    /// Exchanges the contents of two lists.
    ///
    /// Swapping the sentinel links hands each ring to the other list. The
    /// boundary nodes name the sentinel by role, so they now lead back to
    /// their new owner without further relinking.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            head: self.sentinel.next,
            tail: self.sentinel.prev,
            len: self.len,
            marker: PhantomData,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            head: self.sentinel.next,
            tail: self.sentinel.prev,
            len: self.len,
            marker: PhantomData,
        }
    }

    /// Cursor at the first element, or at the sentinel when empty.
    #[must_use]
    pub fn cursor_front(&self) -> Cursor<'_, T> {
        self.cursor_end().next_node()
    }

    /// Cursor at the last element, or at the sentinel when empty.
    #[must_use]
    pub fn cursor_back(&self) -> Cursor<'_, T> {
        self.cursor_end().prev_node()
    }

    /// Cursor at the sentinel, one past the last element.
    #[must_use]
    pub fn cursor_end(&self) -> Cursor<'_, T> {
        Cursor {
            current: None,
            sentinel: &self.sentinel,
        }
    }

    /// Links of the sentinel or of a node.
    ///
    /// # Safety
    ///
    /// A `Some` link must be a node of this list.
    unsafe fn links(&mut self, at: Link<T>) -> &mut Links<T> {
        match at {
            None => &mut self.sentinel,
            Some(node) => &mut (*node.as_ptr()).links,
        }
    }

    /// Links `node` in between `next.prev` and `next`.
    ///
    /// # Safety
    ///
    /// `next` must be part of this list's ring and `node` must not be.
    unsafe fn link_before(&mut self, next: Link<T>, node: NonNull<Node<T>>) {
        let prev = self.links(next).prev;
        (*node.as_ptr()).links = Links { prev, next };
        self.links(prev).next = Some(node);
        self.links(next).prev = Some(node);
    }

    /// # Safety
    ///
    /// `node` must be part of this list's ring.
    unsafe fn unlink(&mut self, node: NonNull<Node<T>>) {
        let Links { prev, next } = (*node.as_ptr()).links;
        self.links(prev).next = next;
        self.links(next).prev = prev;
    }

    fn allocate_node(&self, value: T) -> NonNull<Node<T>> {
        let node = allocate_array_or_abort::<Node<T>, A>(&self.alloc, 1);
        unsafe {
            self.alloc.construct(
                node,
                Node {
                    links: Links {
                        prev: None,
                        next: None,
                    },
                    value,
                },
            );
        }
        node
    }

    /// # Safety
    ///
    /// `node` must be a node of this list.
    unsafe fn remove_node(&mut self, node: NonNull<Node<T>>) -> T {
        self.unlink(node);
        self.len -= 1;
        let value = ptr::read(ptr::addr_of!((*node.as_ptr()).value));
        self.alloc.deallocate_array(node, 1);
        value
    }
}

impl<T, A: Allocator> Drop for List<T, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, A: Allocator + Default> Default for List<T, A> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<T: Clone, A: Allocator + Clone> Clone for List<T, A> {
    /// Copies value by value, in order.
    fn clone(&self) -> Self {
        let mut copy = Self::new_in(self.alloc.clone());
        for value in self {
            copy.push_back(value.clone());
        }
        copy
    }

    /// Copies `source` into a temporary list first and only then exchanges
    /// state with it. If a clone panics, `self` keeps its old contents; the
    /// previous nodes are dropped together with the temporary.
    fn clone_from(&mut self, source: &Self) {
        #[cfg(feature = "log")]
        log::trace!("List::clone_from {} -> {} elements", self.len, source.len);

        let mut copy = source.clone();
        self.swap(&mut copy);
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for List<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator> PartialEq<List<T, B>> for List<T, A> {
    fn eq(&self, other: &List<T, B>) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq, A: Allocator> Eq for List<T, A> {}

impl<T, A: Allocator> Extend<T> for List<T, A> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T, A: Allocator + Default> FromIterator<T> for List<T, A> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::default();
        list.extend(iter);
        list
    }
}

impl<T, const N: usize> From<[T; N]> for List<T> {
    fn from(values: [T; N]) -> Self {
        values.into_iter().collect()
    }
}

impl<T, A: Allocator> IntoIterator for List<T, A> {
    type Item = T;
    type IntoIter = IntoIter<T, A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { list: self }
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a List<T, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a mut List<T, A> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A position in a [`List`]: either a node or the sentinel.
///
/// Moving past either end lands on the sentinel; moving again wraps around.
/// Two cursors are equal when they sit on the same node of the same list.
pub struct Cursor<'a, T> {
    current: Link<T>,
    sentinel: &'a Links<T>,
}

impl<'a, T> Cursor<'a, T> {
    /// The element under the cursor, `None` on the sentinel.
    #[must_use]
    pub fn current(&self) -> Option<&'a T> {
        self.current.map(|node| unsafe { &(*node.as_ptr()).value })
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.current.is_none()
    }

    pub fn move_next(&mut self) {
        self.current = match self.current {
            None => self.sentinel.next,
            Some(node) => unsafe { (*node.as_ptr()).links.next },
        };
    }

    pub fn move_prev(&mut self) {
        self.current = match self.current {
            None => self.sentinel.prev,
            Some(node) => unsafe { (*node.as_ptr()).links.prev },
        };
    }

    /// The cursor one node further along the ring.
    #[must_use]
    pub fn next_node(mut self) -> Self {
        self.move_next();
        self
    }

    /// The cursor one node back along the ring.
    #[must_use]
    pub fn prev_node(mut self) -> Self {
        self.move_prev();
        self
    }
}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<'_, T> {}

impl<T> PartialEq for Cursor<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.sentinel, other.sentinel) && self.current == other.current
    }
}

impl<T> Eq for Cursor<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cursor").field(&self.current()).finish()
    }
}

/// Borrowing iterator over a [`List`].
pub struct Iter<'a, T> {
    head: Link<T>,
    tail: Link<T>,
    len: usize,
    marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.len == 0 {
            return None;
        }
        let node = self.head?;
        self.len -= 1;
        unsafe {
            self.head = (*node.as_ptr()).links.next;
            Some(&(*node.as_ptr()).value)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.len == 0 {
            return None;
        }
        let node = self.tail?;
        self.len -= 1;
        unsafe {
            self.tail = (*node.as_ptr()).links.prev;
            Some(&(*node.as_ptr()).value)
        }
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head,
            tail: self.tail,
            len: self.len,
            marker: PhantomData,
        }
    }
}

/// Mutably borrowing iterator over a [`List`].
pub struct IterMut<'a, T> {
    head: Link<T>,
    tail: Link<T>,
    len: usize,
    marker: PhantomData<&'a mut T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<&'a mut T> {
        if self.len == 0 {
            return None;
        }
        let node = self.head?;
        self.len -= 1;
        unsafe {
            self.head = (*node.as_ptr()).links.next;
            Some(&mut (*node.as_ptr()).value)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'a, T> DoubleEndedIterator for IterMut<'a, T> {
    fn next_back(&mut self) -> Option<&'a mut T> {
        if self.len == 0 {
            return None;
        }
        let node = self.tail?;
        self.len -= 1;
        unsafe {
            self.tail = (*node.as_ptr()).links.prev;
            Some(&mut (*node.as_ptr()).value)
        }
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}

/// Owning iterator over a [`List`].
pub struct IntoIter<T, A: Allocator = Global> {
    list: List<T, A>,
}

impl<T, A: Allocator> Iterator for IntoIter<T, A> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.list.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.list.len, Some(self.list.len))
    }
}

impl<T, A: Allocator> DoubleEndedIterator for IntoIter<T, A> {
    fn next_back(&mut self) -> Option<T> {
        self.list.pop_back()
    }
}

impl<T, A: Allocator> ExactSizeIterator for IntoIter<T, A> {}
impl<T, A: Allocator> FusedIterator for IntoIter<T, A> {}
