//! Reference-counted ownership with weak observers.
//!
//! Every group of [`SharedHandle`]s shares one control block holding the
//! shared and weak counts plus two type-erased entry points:
//!
//! - `dispose` drops the payload and runs when the last shared handle goes,
//! - `destroy` releases the control block itself and runs once no shared or
//!   weak handle is left.
//!
//! Two kinds of control block exist. [`SharedHandle::new_in`] places the
//! payload inside the block (one allocation); [`SharedHandle::from_raw_in`]
//! adopts an existing pointer together with the deleter that disposes of it.
//!
//! Counts are plain [`Cell`]s: handles are neither `Send` nor `Sync`.

use std::alloc::Layout;
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop, MaybeUninit};
use std::ops::Deref;
use std::ptr::{self, NonNull};

use crate::alloc::{allocate_array_or_abort, AllocError, Allocator, Global};
use crate::Error;

/// Counts and type-erased entry points shared by every control block kind.
///
/// Shared handles collectively own one weak reference, so `weak` only reaches
/// zero after the payload has been disposed.
struct Header {
    shared: Cell<usize>,
    weak: Cell<usize>,
    dispose: unsafe fn(NonNull<Header>),
    destroy: unsafe fn(NonNull<Header>),
}

impl Header {
    fn new<V: ControlBlock>() -> Self {
        Self {
            shared: Cell::new(1),
            weak: Cell::new(1),
            dispose: dispose_erased::<V>,
            destroy: destroy_erased::<V>,
        }
    }

    /// # Safety
    ///
    /// `this` must be a live control block and the caller must give up one
    /// shared reference.
    unsafe fn release_shared(this: NonNull<Header>) {
        let header = this.as_ref();
        let shared = header.shared.get() - 1;
        header.shared.set(shared);
        if shared == 0 {
            #[cfg(feature = "log")]
            log::trace!("ControlBlock::dispose {this:p}");

            (header.dispose)(this);
            Self::release_weak(this);
        }
    }

    /// # Safety
    ///
    /// `this` must be a live control block and the caller must give up one
    /// weak reference.
    unsafe fn release_weak(this: NonNull<Header>) {
        let weak = (*this.as_ptr()).weak.get() - 1;
        (*this.as_ptr()).weak.set(weak);
        if weak == 0 {
            #[cfg(feature = "log")]
            log::trace!("ControlBlock::destroy {this:p}");

            let destroy = (*this.as_ptr()).destroy;
            destroy(this);
        }
    }
}

/// A control block layout starting with a [`Header`].
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with the header as first field.
unsafe trait ControlBlock: Sized {
    /// Drops the payload, leaving the block allocated.
    unsafe fn dispose(this: NonNull<Self>);

    /// Releases the block's own memory.
    unsafe fn destroy(this: NonNull<Self>);
}

unsafe fn dispose_erased<V: ControlBlock>(header: NonNull<Header>) {
    V::dispose(header.cast());
}

unsafe fn destroy_erased<V: ControlBlock>(header: NonNull<Header>) {
    V::destroy(header.cast());
}

/// Control block with the payload stored inline.
#[repr(C)]
struct Inline<T, A: Allocator> {
    // Only ever read through the erased header pointer.
    #[allow(dead_code)]
    header: Header,
    alloc: ManuallyDrop<A>,
    value: MaybeUninit<T>,
}

unsafe impl<T, A: Allocator> ControlBlock for Inline<T, A> {
    unsafe fn dispose(this: NonNull<Self>) {
        let block = this.as_ptr();
        let value = NonNull::new_unchecked((*block).value.as_mut_ptr());
        (*block).alloc.destroy(value);
    }

    unsafe fn destroy(this: NonNull<Self>) {
        let alloc = ManuallyDrop::take(&mut (*this.as_ptr()).alloc);
        alloc.deallocate_array(this, 1);
    }
}

/// Control block owning an external pointer and the deleter for it.
#[repr(C)]
struct External<T: ?Sized, D, A: Allocator> {
    #[allow(dead_code)]
    header: Header,
    ptr: NonNull<T>,
    deleter: ManuallyDrop<D>,
    alloc: ManuallyDrop<A>,
}

unsafe impl<T: ?Sized, D: FnOnce(NonNull<T>), A: Allocator> ControlBlock for External<T, D, A> {
    unsafe fn dispose(this: NonNull<Self>) {
        let block = this.as_ptr();
        let deleter = ManuallyDrop::take(&mut (*block).deleter);
        deleter((*block).ptr);
    }

    unsafe fn destroy(this: NonNull<Self>) {
        let alloc = ManuallyDrop::take(&mut (*this.as_ptr()).alloc);
        alloc.deallocate_array(this, 1);
    }
}

/// Releases a control block allocation if construction unwinds.
struct DeallocOnUnwind<'a, V, A: Allocator> {
    alloc: &'a A,
    block: NonNull<V>,
}

impl<V, A: Allocator> Drop for DeallocOnUnwind<'_, V, A> {
    fn drop(&mut self) {
        unsafe { self.alloc.deallocate_array(self.block, 1) };
    }
}

struct Inner<T: ?Sized> {
    ptr: NonNull<T>,
    block: NonNull<Header>,
}

impl<T: ?Sized> Clone for Inner<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Inner<T> {}

/// Declares that a `SharedHandle<Self>` may be viewed as a `SharedHandle<U>`.
///
/// Every type converts to itself. Other pairs, usually a concrete type and a
/// trait object it implements, are declared with [`impl_upcast!`]; converting
/// between undeclared pairs does not compile.
///
/// # Safety
///
/// `upcast` must return a pointer to the same object it was given.
pub unsafe trait Upcast<U: ?Sized> {
    fn upcast(ptr: NonNull<Self>) -> NonNull<U>;
}

unsafe impl<T: ?Sized> Upcast<T> for T {
    fn upcast(ptr: NonNull<T>) -> NonNull<T> {
        ptr
    }
}

/// Implements [`Upcast`] for `Derived => Base` pairs where `Derived`
/// unsize-coerces to `Base`, typically `Type => dyn Trait`.
///
/// ```
/// use alloc_containers::{impl_upcast, SharedHandle};
///
/// trait Shape {
///     fn area(&self) -> f64;
/// }
/// struct Square(f64);
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
/// impl_upcast!(Square => dyn Shape);
///
/// let shape: SharedHandle<dyn Shape> = SharedHandle::new(Square(2.0)).upcast();
/// assert_eq!(shape.area(), 4.0);
/// ```
#[macro_export]
macro_rules! impl_upcast {
    ($($derived:ty => $base:ty),+ $(,)?) => {
        $(
            unsafe impl $crate::Upcast<$base> for $derived {
                fn upcast(ptr: ::core::ptr::NonNull<Self>) -> ::core::ptr::NonNull<$base> {
                    ptr
                }
            }
        )+
    };
}

/// A shared owner of a value.
///
/// The value is dropped when the last `SharedHandle` pointing at it goes
/// away; [`WeakHandle`]s may keep the control block (but never the value)
/// alive beyond that. A handle may also be empty, see [`SharedHandle::take`].
pub struct SharedHandle<T: ?Sized> {
    inner: Option<Inner<T>>,
    marker: PhantomData<T>,
}

impl<T> SharedHandle<T> {
    /// Places `value` in a new control block from the global allocator.
    pub fn new(value: T) -> Self {
        Self::new_in(value, Global)
    }

    /// Places `value` in a new control block drawn from `alloc`.
    pub fn new_in<A: Allocator + 'static>(value: T, alloc: A) -> Self {
        Self::new_with_in(|| value, alloc)
    }

    /// Allocates the control block, then builds the value with `f` directly
    /// into it. If `f` panics the block is released again.
    pub fn new_with_in<A: Allocator + 'static>(f: impl FnOnce() -> T, alloc: A) -> Self {
        let block = allocate_array_or_abort::<Inline<T, A>, A>(&alloc, 1);
        let rollback = DeallocOnUnwind {
            alloc: &alloc,
            block,
        };
        let value = f();
        mem::forget(rollback);
        unsafe {
            block.as_ptr().write(Inline {
                header: Header::new::<Inline<T, A>>(),
                alloc: ManuallyDrop::new(alloc),
                value: MaybeUninit::new(value),
            });
            let ptr = NonNull::new_unchecked(ptr::addr_of_mut!((*block.as_ptr()).value).cast::<T>());
            Self::from_inner(Inner {
                ptr,
                block: block.cast(),
            })
        }
    }

    /// Erases the payload type; see [`SharedHandle::<dyn Any>::downcast`].
    #[must_use]
    pub fn into_any(self) -> SharedHandle<dyn Any>
    where
        T: Any,
    {
        let this = ManuallyDrop::new(self);
        SharedHandle {
            inner: this.inner.map(|inner| {
                let ptr: NonNull<dyn Any> = inner.ptr;
                Inner {
                    ptr,
                    block: inner.block,
                }
            }),
            marker: PhantomData,
        }
    }
}

impl<T: ?Sized + 'static> SharedHandle<T> {
    /// Takes shared ownership of a boxed value.
    pub fn from_box(value: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(value));
        unsafe {
            Self::from_raw(ptr, |ptr: NonNull<T>| {
                drop(Box::from_raw(ptr.as_ptr()));
            })
        }
    }
}

impl<T: ?Sized> SharedHandle<T> {
    /// Takes shared ownership of `ptr`, calling `deleter` on it when the last
    /// shared handle is dropped. The control block comes from the global
    /// allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid until `deleter` runs and must not be owned by
    /// anything else.
    pub unsafe fn from_raw<D>(ptr: NonNull<T>, deleter: D) -> Self
    where
        D: FnOnce(NonNull<T>) + 'static,
    {
        Self::from_raw_in(ptr, deleter, Global)
    }

    /// Like [`SharedHandle::from_raw`] with the control block drawn from
    /// `alloc`. If the block cannot be allocated, `deleter` runs before the
    /// allocation error is reported.
    ///
    /// # Safety
    ///
    /// See [`SharedHandle::from_raw`].
    pub unsafe fn from_raw_in<D, A>(ptr: NonNull<T>, deleter: D, alloc: A) -> Self
    where
        D: FnOnce(NonNull<T>) + 'static,
        A: Allocator + 'static,
    {
        match Self::try_from_raw_in(ptr, deleter, alloc) {
            Ok(handle) => handle,
            Err(AllocError) => std::alloc::handle_alloc_error(Layout::new::<External<T, D, A>>()),
        }
    }

    /// Fallible version of [`SharedHandle::from_raw_in`].
    ///
    /// # Errors
    ///
    /// [`AllocError`] when the control block cannot be allocated. `ptr` has
    /// already been passed to `deleter` by then.
    ///
    /// # Safety
    ///
    /// See [`SharedHandle::from_raw`].
    pub unsafe fn try_from_raw_in<D, A>(
        ptr: NonNull<T>,
        deleter: D,
        alloc: A,
    ) -> Result<Self, AllocError>
    where
        D: FnOnce(NonNull<T>) + 'static,
        A: Allocator + 'static,
    {
        let Ok(block) = alloc.allocate_array::<External<T, D, A>>(1) else {
            deleter(ptr);
            return Err(AllocError);
        };
        block.as_ptr().write(External {
            header: Header::new::<External<T, D, A>>(),
            ptr,
            deleter: ManuallyDrop::new(deleter),
            alloc: ManuallyDrop::new(alloc),
        });
        Ok(Self::from_inner(Inner {
            ptr,
            block: block.cast(),
        }))
    }

    fn from_inner(inner: Inner<T>) -> Self {
        Self {
            inner: Some(inner),
            marker: PhantomData,
        }
    }

    fn header(&self) -> Option<&Header> {
        self.inner.map(|inner| unsafe { &*inner.block.as_ptr() })
    }

    /// An empty handle.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            inner: None,
            marker: PhantomData,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Number of shared handles to the value, 0 for an empty handle.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.header().map_or(0, |header| header.shared.get())
    }

    /// Number of weak handles to the value.
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.header().map_or(0, |header| header.weak.get() - 1)
    }

    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.inner.map(|inner| unsafe { &*inner.ptr.as_ptr() })
    }

    /// Moves ownership out, leaving this handle empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::empty())
    }

    /// Gives up this handle's share, leaving it empty.
    pub fn reset(&mut self) {
        drop(self.take());
    }

    /// Whether both handles share one control block. Two empty handles are
    /// equal.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.map(|inner| inner.block) == other.inner.map(|inner| inner.block)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle::from(self)
    }

    /// Views the value as a `U`, sharing the same control block.
    #[must_use]
    pub fn upcast<U: ?Sized>(self) -> SharedHandle<U>
    where
        T: Upcast<U>,
    {
        let this = ManuallyDrop::new(self);
        SharedHandle {
            inner: this.inner.map(|inner| Inner {
                ptr: T::upcast(inner.ptr),
                block: inner.block,
            }),
            marker: PhantomData,
        }
    }
}

impl SharedHandle<dyn Any> {
    /// Another handle to the value as a `U`, if that is its concrete type.
    /// An empty handle converts to an empty handle.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConversion`] when the value is not a `U`; `self` is
    /// left as it was.
    pub fn downcast<U: Any>(&self) -> Result<SharedHandle<U>, Error> {
        let Some(inner) = self.inner else {
            return Ok(SharedHandle::empty());
        };
        let value: &dyn Any = unsafe { inner.ptr.as_ref() };
        if !value.is::<U>() {
            return Err(Error::InvalidConversion {
                target: std::any::type_name::<U>(),
            });
        }
        let header = unsafe { inner.block.as_ref() };
        header.shared.set(header.shared.get() + 1);
        Ok(SharedHandle::from_inner(Inner {
            ptr: inner.ptr.cast(),
            block: inner.block,
        }))
    }
}

impl<T: ?Sized> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        if let Some(header) = self.header() {
            header.shared.set(header.shared.get() + 1);
        }
        Self {
            inner: self.inner,
            marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for SharedHandle<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            unsafe { Header::release_shared(inner.block) };
        }
    }
}

impl<T: ?Sized> Default for SharedHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Deref for SharedHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty SharedHandle"),
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("SharedHandle").field(&value).finish(),
            None => f.write_str("SharedHandle(<empty>)"),
        }
    }
}

/// A non-owning observer of a value held by [`SharedHandle`]s.
///
/// A weak handle never keeps the value alive, only the control block. A
/// default-constructed weak handle is empty and behaves like an expired one.
pub struct WeakHandle<T: ?Sized> {
    inner: Option<Inner<T>>,
    marker: PhantomData<T>,
}

impl<T: ?Sized> WeakHandle<T> {
    /// An empty weak handle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: None,
            marker: PhantomData,
        }
    }

    fn header(&self) -> Option<&Header> {
        self.inner.map(|inner| unsafe { &*inner.block.as_ptr() })
    }

    /// Whether the value has been dropped (or there never was one).
    #[must_use]
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Number of shared handles to the value.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.header().map_or(0, |header| header.shared.get())
    }

    /// Number of weak handles to the value, including this one.
    #[must_use]
    pub fn weak_count(&self) -> usize {
        self.header().map_or(0, |header| {
            header.weak.get() - usize::from(header.shared.get() > 0)
        })
    }

    /// A new shared handle to the value, or an empty one once it expired.
    #[must_use]
    pub fn lock(&self) -> SharedHandle<T> {
        match (self.inner, self.header()) {
            (Some(inner), Some(header)) if header.shared.get() > 0 => {
                header.shared.set(header.shared.get() + 1);
                SharedHandle::from_inner(inner)
            }
            _ => SharedHandle::empty(),
        }
    }
}

impl<T: ?Sized> From<&SharedHandle<T>> for WeakHandle<T> {
    fn from(shared: &SharedHandle<T>) -> Self {
        if let Some(header) = shared.header() {
            header.weak.set(header.weak.get() + 1);
        }
        Self {
            inner: shared.inner,
            marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        if let Some(header) = self.header() {
            header.weak.set(header.weak.get() + 1);
        }
        Self {
            inner: self.inner,
            marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for WeakHandle<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            unsafe { Header::release_weak(inner.block) };
        }
    }
}

impl<T: ?Sized> Default for WeakHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakHandle")
    }
}
