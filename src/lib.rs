//! Allocator-aware containers and shared ownership.
//!
//! - [`Deque`]: a double-ended queue stored in fixed-size blocks, with O(1)
//!   random access and stable cursors.
//! - [`List`]: a doubly linked list closed into a ring by a sentinel.
//! - [`SharedHandle`] and [`WeakHandle`]: reference-counted ownership with
//!   weak observers, type-erased disposal and checked conversions.
//!
//! Every container draws its memory from an [`Allocator`], [`Global`] unless
//! another is supplied.
//!
//! With the `log` feature enabled, block, node and control block lifecycle
//! events are traced through the [`log`](https://docs.rs/log) facade.
#![warn(clippy::pedantic)]

mod alloc;
pub use alloc::*;

mod error;
pub use error::*;

pub mod deque;
pub use deque::{Deque, DEFAULT_BLOCK_SIZE};

pub mod list;
pub use list::List;

mod shared;
pub use shared::*;

#[cfg(test)]
mod testing;
