use std::{
    alloc::Layout,
    ops::{Bound, Range, RangeBounds},
    ptr::NonNull,
};

use gpu_staging_traits::memory_owner::{MemoryAllocation, MemoryOwner};

use crate::{
    align::try_align_up,
    error::{Error, Result},
};

/// Staging buffer whose storage starts on a 16-byte boundary.
pub type AlignedBuffer16 = AlignedBuffer<16>;

/// Staging buffer whose storage starts on a 4096-byte (page) boundary.
pub type AlignedBuffer4K = AlignedBuffer<4096>;

/// A growable byte buffer whose storage is aligned to `A` bytes.
///
/// The buffer is meant for staging data on the host before it is copied into, or
/// mapped by, a GPU API. It keeps two sizes:
///
/// - the *capacity*, the number of bytes reserved in the allocation, which is
///   always a non-zero multiple of `A`;
/// - the *length*, the number of bytes logically in use.
///
/// Sizes passed to [`resize`](Self::resize) and [`reserve`](Self::reserve) are
/// rounded up to the next multiple of `A`, so `resize(1)` on a 4K buffer yields a
/// length of 4096. Appends ([`append`](Self::append),
/// [`extend_from_slice`](Self::extend_from_slice),
/// [`append_raw`](Self::append_raw)) grow the length by the exact number of
/// bytes appended instead.
///
/// `A` must be a non-zero power of two; this is checked at compile time when a
/// buffer type is instantiated.
///
/// # Allocation failure
///
/// The plain mutating methods abort the process through
/// [`std::alloc::handle_alloc_error`] when the allocator fails, and panic if a
/// size computation overflows. Every one of them has a `try_` counterpart that
/// reports [`Error::AllocationFailure`] and leaves the buffer untouched.
///
/// # Initialization
///
/// Bytes in `0..len()` are always initialized. Growing the length through
/// `resize` zero-fills the newly exposed bytes; bytes between the length and the
/// capacity are never observable through the safe API.
pub struct AlignedBuffer<const A: usize> {
    /// Start of the allocation, aligned to `A`.
    ptr: NonNull<u8>,
    /// Bytes logically in use.
    len: usize,
    /// Bytes reserved, a non-zero multiple of `A`.
    capacity: usize,
}

// The buffer exclusively owns its allocation, shared access is read-only.
unsafe impl<const A: usize> Send for AlignedBuffer<A> {}

unsafe impl<const A: usize> Sync for AlignedBuffer<A> {}

impl<const A: usize> AlignedBuffer<A> {
    /// Alignment of the storage, in bytes.
    pub const ALIGNMENT: usize = A;

    /// Largest capacity a single allocation with this alignment can describe.
    const MAX_CAPACITY: usize = (isize::MAX as usize) & !(A - 1);

    const VALID_ALIGNMENT: () = assert!(
        A.is_power_of_two(),
        "buffer alignment must be a non-zero power of two"
    );

    /// Creates an empty buffer with exactly one alignment unit (`A` bytes) reserved.
    pub fn new() -> AlignedBuffer<A> {
        Self::with_capacity(A)
    }

    /// Creates an empty buffer able to hold at least `capacity` bytes.
    ///
    /// The reservation is rounded up to a multiple of `A` and is never smaller
    /// than one alignment unit.
    pub fn with_capacity(capacity: usize) -> AlignedBuffer<A> {
        Self::try_with_capacity(capacity).unwrap_or_else(|e| alloc_failed(e))
    }

    /// Fallible version of [`with_capacity`](Self::with_capacity).
    pub fn try_with_capacity(capacity: usize) -> Result<AlignedBuffer<A>> {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_ALIGNMENT;

        let capacity = Self::round_size(capacity.max(1))?;
        let layout = Self::layout(capacity)?;
        let ptr = unsafe { std::alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            return Err(Self::failure(capacity, "allocator returned null"));
        };
        Ok(AlignedBuffer {
            ptr,
            len: 0,
            capacity,
        })
    }

    /// Creates a buffer containing a copy of `data`, with the exact length of `data`.
    pub fn copy_from_slice(data: &[u8]) -> AlignedBuffer<A> {
        let mut buf = Self::with_capacity(data.len());
        buf.extend_from_slice(data);
        buf
    }

    /// Returns the alignment of the storage, in bytes.
    #[inline]
    pub const fn alignment(&self) -> usize {
        A
    }

    /// Returns the number of bytes logically in use.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bytes are in use.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of bytes reserved. Always a non-zero multiple of `A`.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a raw pointer to the start of the storage, aligned to `A`.
    ///
    /// The pointer is invalidated by any operation that may grow the buffer.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Returns a mutable raw pointer to the start of the storage, aligned to `A`.
    ///
    /// The caller may write anywhere in `0..capacity()`, but only bytes in
    /// `0..len()` are considered part of the buffer. The pointer is invalidated by
    /// any operation that may grow the buffer.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Returns the bytes in use.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the bytes in use, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Ensures the capacity is at least `bytes`, rounded up to a multiple of `A`.
    ///
    /// Unlike `Vec::reserve`, `bytes` is the total size requested, not an amount
    /// beyond the current length. The length and the contents are left unchanged,
    /// and the capacity never shrinks.
    pub fn reserve(&mut self, bytes: usize) {
        self.try_reserve(bytes).unwrap_or_else(|e| alloc_failed(e))
    }

    /// Fallible version of [`reserve`](Self::reserve).
    pub fn try_reserve(&mut self, bytes: usize) -> Result<()> {
        let capacity = Self::round_size(bytes)?;
        if capacity <= self.capacity {
            return Ok(());
        }
        self.reallocate(capacity)
    }

    /// Sets the length to `bytes` rounded up to a multiple of `A`.
    ///
    /// Shrinking keeps the capacity. Growing reserves more storage if needed and
    /// zero-fills the bytes between the previous and the new length. Calling
    /// `resize` with a size that rounds to the current length does nothing.
    pub fn resize(&mut self, bytes: usize) {
        self.try_resize(bytes).unwrap_or_else(|e| alloc_failed(e))
    }

    /// Fallible version of [`resize`](Self::resize).
    pub fn try_resize(&mut self, bytes: usize) -> Result<()> {
        let new_len = Self::round_size(bytes)?;
        if new_len == self.len {
            return Ok(());
        }
        if new_len > self.len {
            self.grow_for(new_len)?;
            unsafe {
                self.ptr
                    .as_ptr()
                    .add(self.len)
                    .write_bytes(0, new_len - self.len);
            }
        }
        self.len = new_len;
        Ok(())
    }

    /// Shortens the length to exactly `len` bytes, keeping the reservation.
    ///
    /// Like the appends, and unlike [`resize`](Self::resize), this does not round
    /// to the alignment unit. Has no effect if `len` is not below the current length.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Sets the length to zero, keeping the reservation.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Appends the bytes in use by `other` to the end of this buffer.
    ///
    /// The length grows by exactly `other.len()`. `other` may use a different
    /// alignment.
    pub fn append<const B: usize>(&mut self, other: &AlignedBuffer<B>) {
        self.extend_from_slice(other.as_slice())
    }

    /// Fallible version of [`append`](Self::append).
    pub fn try_append<const B: usize>(&mut self, other: &AlignedBuffer<B>) -> Result<()> {
        self.try_extend_from_slice(other.as_slice())
    }

    /// Appends a copy of `data`, growing the length by exactly `data.len()`.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.try_extend_from_slice(data)
            .unwrap_or_else(|e| alloc_failed(e))
    }

    /// Fallible version of [`extend_from_slice`](Self::extend_from_slice).
    pub fn try_extend_from_slice(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let new_len = self
            .len
            .checked_add(data.len())
            .ok_or_else(|| Self::failure(usize::MAX, "length overflow"))?;
        self.grow_for(new_len)?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.as_ptr().add(self.len),
                data.len(),
            );
        }
        self.len = new_len;
        Ok(())
    }

    /// Appends `count` bytes read from `src`, growing the length by exactly `count`.
    ///
    /// # Safety
    ///
    /// - `src` must be valid for reads of `count` bytes (it may be null or dangling
    ///   only when `count` is zero).
    /// - The source range must not overlap this buffer's storage; use
    ///   [`extend_from_within`](Self::extend_from_within) to duplicate bytes
    ///   already in the buffer.
    pub unsafe fn append_raw(&mut self, src: *const u8, count: usize) {
        unsafe { self.try_append_raw(src, count) }.unwrap_or_else(|e| alloc_failed(e))
    }

    /// Fallible version of [`append_raw`](Self::append_raw).
    ///
    /// # Safety
    ///
    /// Same contract as [`append_raw`](Self::append_raw).
    pub unsafe fn try_append_raw(&mut self, src: *const u8, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let data = unsafe { std::slice::from_raw_parts(src, count) };
        self.try_extend_from_slice(data)
    }

    /// Appends a copy of the bytes in `range` of this buffer to its end.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn extend_from_within(&mut self, range: impl RangeBounds<usize>) {
        self.try_extend_from_within(range)
            .unwrap_or_else(|e| alloc_failed(e))
    }

    /// Fallible version of [`extend_from_within`](Self::extend_from_within).
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn try_extend_from_within(&mut self, range: impl RangeBounds<usize>) -> Result<()> {
        let range = self.verify_range(range);
        let count = range.end - range.start;
        if count == 0 {
            return Ok(());
        }
        let new_len = self.len + count;
        self.grow_for(new_len)?;
        unsafe {
            let base = self.ptr.as_ptr();
            std::ptr::copy_nonoverlapping(base.add(range.start), base.add(self.len), count);
        }
        self.len = new_len;
        Ok(())
    }

    /// Checks if the storage is aligned to `alignment` at the given byte offset.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is greater than the capacity.
    pub fn is_aligned_at(&self, offset: usize, alignment: usize) -> bool {
        assert!(offset <= self.capacity);
        crate::align::is_ptr_aligned(unsafe { self.as_ptr().add(offset) }, alignment)
    }
}

impl<const A: usize> AlignedBuffer<A> {
    /// Appends the bytes of `value`.
    #[inline]
    pub fn push_typed<T>(&mut self, value: T)
    where
        T: bytemuck::NoUninit,
    {
        self.extend_from_slice(bytemuck::bytes_of(&value));
    }

    /// Appends the bytes of all `values`.
    #[inline]
    pub fn extend_from_typed_slice<T>(&mut self, values: &[T])
    where
        T: bytemuck::NoUninit,
    {
        self.extend_from_slice(bytemuck::cast_slice(values));
    }

    /// Fallible version of [`extend_from_typed_slice`](Self::extend_from_typed_slice).
    #[inline]
    pub fn try_extend_from_typed_slice<T>(&mut self, values: &[T]) -> Result<()>
    where
        T: bytemuck::NoUninit,
    {
        self.try_extend_from_slice(bytemuck::cast_slice(values))
    }
}

impl<const A: usize> AlignedBuffer<A> {
    /// Rounds a requested size to the alignment unit.
    #[inline]
    fn round_size(bytes: usize) -> Result<usize> {
        match try_align_up(bytes, A) {
            Some(size) if size <= Self::MAX_CAPACITY => Ok(size),
            _ => Err(Self::failure(bytes, "size overflow")),
        }
    }

    #[inline]
    fn layout(capacity: usize) -> Result<Layout> {
        Layout::from_size_align(capacity, A).map_err(|_| Self::failure(capacity, "invalid layout"))
    }

    /// Builds the error returned by every failing `try_*` operation.
    #[cold]
    fn failure(requested: usize, reason: &str) -> Error {
        log::debug!(
            "staging buffer allocation of {requested} bytes aligned to {} failed: {reason}",
            A
        );
        Error::allocation_failure(requested, A)
    }

    /// Makes room for `required` bytes in total, at least doubling the capacity
    /// when it has to grow.
    #[inline]
    fn grow_for(&mut self, required: usize) -> Result<()> {
        if required <= self.capacity {
            return Ok(());
        }
        self.grow(required)
    }

    #[cold]
    fn grow(&mut self, required: usize) -> Result<()> {
        let required = Self::round_size(required)?;
        let doubled = self.capacity.saturating_mul(2);
        let capacity = if doubled <= Self::MAX_CAPACITY {
            doubled.max(required)
        } else {
            required
        };
        self.reallocate(capacity)
    }

    /// Moves the storage into an allocation of exactly `capacity` bytes.
    ///
    /// The new allocation keeps alignment `A`. On failure the buffer is unchanged.
    fn reallocate(&mut self, capacity: usize) -> Result<()> {
        debug_assert!(capacity > self.capacity);
        debug_assert_eq!(capacity % A, 0);
        let old_layout = Self::layout(self.capacity)?;
        // Validates the new size against `A`, `realloc` keeps the old alignment.
        Self::layout(capacity)?;
        let ptr = unsafe { std::alloc::realloc(self.ptr.as_ptr(), old_layout, capacity) };
        let Some(ptr) = NonNull::new(ptr) else {
            return Err(Self::failure(capacity, "allocator returned null"));
        };
        log::trace!(
            "staging buffer reallocated: {} -> {capacity} bytes, alignment {}, moved: {}",
            self.capacity,
            A,
            ptr != self.ptr
        );
        self.ptr = ptr;
        self.capacity = capacity;
        Ok(())
    }

    fn verify_range(&self, range: impl RangeBounds<usize>) -> Range<usize> {
        let len = self.len;

        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.checked_add(1).expect("out of range"),
            Bound::Unbounded => 0,
        };

        let end = match range.end_bound() {
            Bound::Included(&n) => n.checked_add(1).expect("out of range"),
            Bound::Excluded(&n) => n,
            Bound::Unbounded => len,
        };

        assert!(
            start <= end,
            "range start must not be greater than end: {start:?} <= {end:?}",
        );
        assert!(end <= len, "range end out of bounds: {end:?} <= {len:?}");

        start..end
    }
}

/// Reports an allocation failure the way the standard collections do.
#[cold]
fn alloc_failed(err: Error) -> ! {
    let Error::AllocationFailure {
        requested,
        alignment,
    } = err;
    match Layout::from_size_align(requested, alignment) {
        Ok(layout) => std::alloc::handle_alloc_error(layout),
        Err(_) => panic!("capacity overflow: {err}"),
    }
}

impl<const A: usize> Drop for AlignedBuffer<A> {
    fn drop(&mut self) {
        // `capacity` was validated against `A` when it was allocated.
        if let Ok(layout) = Self::layout(self.capacity) {
            unsafe { std::alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

impl<const A: usize> std::ops::Deref for AlignedBuffer<A> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<const A: usize> std::ops::DerefMut for AlignedBuffer<A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<const A: usize> AsRef<[u8]> for AlignedBuffer<A> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<const A: usize> AsMut<[u8]> for AlignedBuffer<A> {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl<const A: usize> Clone for AlignedBuffer<A> {
    fn clone(&self) -> AlignedBuffer<A> {
        AlignedBuffer::copy_from_slice(self.as_slice())
    }
}

impl<const A: usize> std::fmt::Debug for AlignedBuffer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("alignment", &A)
            .field("len", &self.len)
            .field("cap", &self.capacity)
            .field("ptr", &self.ptr)
            .finish_non_exhaustive()
    }
}

impl<const A: usize> Default for AlignedBuffer<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const A: usize> std::io::Write for AlignedBuffer<A> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.try_extend_from_slice(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::OutOfMemory, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

unsafe impl<const A: usize> MemoryOwner for AlignedBuffer<A> {
    fn memory(&self) -> MemoryAllocation {
        MemoryAllocation {
            ptr: self.as_ptr(),
            len: self.len,
            capacity: self.capacity,
            alignment: A,
        }
    }
}
