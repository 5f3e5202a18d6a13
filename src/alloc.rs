use std::alloc::Layout;
use std::ptr::NonNull;

/// The allocator could not satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("memory allocation failed")]
pub struct AllocError;

/// Raw storage capability consumed by every container in this crate.
///
/// Containers never assume anything about where memory comes from: blocks,
/// nodes and control blocks are all requested through this trait and handed
/// back to the same allocator (or a clone of it) when released.
///
/// # Safety
///
/// Storage returned by [`Allocator::allocate`] must stay valid for `layout`
/// until it is passed to [`Allocator::deallocate`] on this allocator or on a
/// clone of it.
pub unsafe trait Allocator {
    /// Allocates storage fitting `layout`.
    ///
    /// # Errors
    ///
    /// When the request cannot be satisfied.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases storage previously returned by [`Allocator::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with exactly `layout`
    /// and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Allocates uninitialised storage for `n` values of `T`.
    ///
    /// # Errors
    ///
    /// When the layout overflows or the request cannot be satisfied.
    fn allocate_array<T>(&self, n: usize) -> Result<NonNull<T>, AllocError> {
        let layout = Layout::array::<T>(n).map_err(|_| AllocError)?;
        self.allocate(layout).map(NonNull::cast)
    }

    /// Releases storage returned by [`Allocator::allocate_array`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate_array::<T>(n)` on this allocator.
    unsafe fn deallocate_array<T>(&self, ptr: NonNull<T>, n: usize) {
        if let Ok(layout) = Layout::array::<T>(n) {
            self.deallocate(ptr.cast(), layout);
        }
    }

    /// Moves `value` into uninitialised storage.
    ///
    /// # Safety
    ///
    /// `slot` must be valid for writes and properly aligned.
    unsafe fn construct<T>(&self, slot: NonNull<T>, value: T) {
        slot.as_ptr().write(value);
    }

    /// Runs the destructor of the value at `slot` without releasing storage.
    ///
    /// # Safety
    ///
    /// `slot` must point at a live value that is not used afterwards.
    unsafe fn destroy<T: ?Sized>(&self, slot: NonNull<T>) {
        std::ptr::drop_in_place(slot.as_ptr());
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout);
    }
}

/// The system allocator.
///
/// Zero-sized requests never reach the system allocator; they are served with
/// a dangling pointer aligned for the layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

unsafe impl Allocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            // `align` is a non-zero power of two.
            return NonNull::new(layout.align() as *mut u8).ok_or(AllocError);
        }
        NonNull::new(unsafe { std::alloc::alloc(layout) }).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            std::alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

/// Allocates `n` slots of `T`, diverting to [`std::alloc::handle_alloc_error`]
/// on failure like the standard collections do.
pub(crate) fn allocate_array_or_abort<T, A: Allocator + ?Sized>(alloc: &A, n: usize) -> NonNull<T> {
    match alloc.allocate_array::<T>(n) {
        Ok(ptr) => ptr,
        Err(AllocError) => match Layout::array::<T>(n) {
            Ok(layout) => std::alloc::handle_alloc_error(layout),
            Err(_) => panic!("capacity overflow"),
        },
    }
}
