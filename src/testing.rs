//! Instrumented allocator and payloads shared by the unit tests.
#![allow(clippy::pedantic)]

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::{AllocError, Allocator, Global};

#[derive(Debug, Default)]
struct Stats {
    live: Cell<usize>,
    total: Cell<usize>,
    budget: Cell<Option<usize>>,
}

/// Forwards to [`Global`] while counting outstanding allocations.
///
/// Clones share their counters.
#[derive(Debug, Clone, Default)]
pub struct CountingAllocator {
    stats: Rc<Stats>,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every request once `n` more allocations have succeeded.
    pub fn fail_after(&self, n: usize) {
        self.stats.budget.set(Some(n));
    }

    /// Allocations not yet released.
    pub fn live(&self) -> usize {
        self.stats.live.get()
    }

    /// Allocations ever made.
    pub fn total(&self) -> usize {
        self.stats.total.get()
    }
}

unsafe impl Allocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if let Some(budget) = self.stats.budget.get() {
            if budget == 0 {
                return Err(AllocError);
            }
            self.stats.budget.set(Some(budget - 1));
        }
        let ptr = Global.allocate(layout)?;
        self.stats.live.set(self.stats.live.get() + 1);
        self.stats.total.set(self.stats.total.get() + 1);
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        assert!(self.stats.live.get() > 0, "deallocate without allocate");
        self.stats.live.set(self.stats.live.get() - 1);
        Global.deallocate(ptr, layout);
    }
}

/// Payload that bumps a shared counter when dropped.
#[derive(Debug)]
pub struct DropCounter {
    pub value: i32,
    drops: Rc<Cell<usize>>,
}

impl DropCounter {
    pub fn new(value: i32, drops: &Rc<Cell<usize>>) -> Self {
        Self {
            value,
            drops: Rc::clone(drops),
        }
    }
}

impl Clone for DropCounter {
    fn clone(&self) -> Self {
        Self::new(self.value, &self.drops)
    }
}

impl PartialEq for DropCounter {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

thread_local! {
    static CLONES_LEFT: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Value whose `Clone` panics once an armed budget runs out.
#[derive(Debug, PartialEq, Eq)]
pub struct FragileClone(pub i32);

impl FragileClone {
    /// Lets `n` more clones succeed on this thread, then panics.
    pub fn arm(n: usize) {
        CLONES_LEFT.with(|c| c.set(Some(n)));
    }

    pub fn disarm() {
        CLONES_LEFT.with(|c| c.set(None));
    }
}

impl Clone for FragileClone {
    fn clone(&self) -> Self {
        CLONES_LEFT.with(|c| match c.get() {
            Some(0) => panic!("clone budget exhausted"),
            Some(n) => c.set(Some(n - 1)),
            None => {}
        });
        Self(self.0)
    }
}
