//! Typed element pool on top of [`AlignedBuffer`], used to stage arrays of
//! vertices, uniforms or pixels.

use std::marker::PhantomData;

use crate::buffer::AlignedBuffer;

/// Element pool with 16-byte aligned storage.
pub type AlignedMemory16<T> = AlignedMemory<T, 16>;

/// Element pool with page-aligned storage.
pub type AlignedMemory4K<T> = AlignedMemory<T, 4096>;

/// A growable array of `T` stored in an [`AlignedBuffer`].
///
/// The pool tracks the exact number of elements (`count`) and their byte size
/// (`length = count * span`), while the underlying buffer keeps its own,
/// alignment-rounded view of the same storage. [`allocated_length`] is the size
/// to hand to a GPU API; [`length`] is the size of the meaningful data.
///
/// [`allocated_length`]: Self::allocated_length
/// [`length`]: Self::length
pub struct AlignedMemory<T, const A: usize> {
    buffer: AlignedBuffer<A>,
    count: usize,
    _marker: PhantomData<T>,
}

impl<T, const A: usize> AlignedMemory<T, A>
where
    T: bytemuck::Pod,
{
    const VALID_ELEMENT: () = {
        assert!(size_of::<T>() != 0, "element type must not be zero-sized");
        assert!(
            align_of::<T>() <= A,
            "element alignment must not exceed the buffer alignment"
        );
    };

    /// Creates an empty pool.
    pub fn new() -> AlignedMemory<T, A> {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_ELEMENT;
        AlignedMemory {
            buffer: AlignedBuffer::new(),
            count: 0,
            _marker: PhantomData,
        }
    }

    /// Creates a pool holding `count` zeroed elements.
    pub fn with_count(count: usize) -> AlignedMemory<T, A> {
        let mut memory = Self::new();
        memory.resize(count);
        memory
    }

    /// Size of one element in bytes.
    #[inline]
    pub fn span(&self) -> usize {
        size_of::<T>()
    }

    /// Number of elements.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns `true` if the pool holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Exact byte size of the elements, `count * span`.
    #[inline]
    pub fn length(&self) -> usize {
        self.count * self.span()
    }

    /// Bytes in use by the underlying buffer, including alignment rounding.
    #[inline]
    pub fn allocated_length(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes reserved by the underlying buffer.
    #[inline]
    pub fn allocated_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// The underlying byte buffer.
    #[inline]
    pub fn buffer(&self) -> &AlignedBuffer<A> {
        &self.buffer
    }

    /// Pointer to the first element, aligned to `A`. Invalidated by any growth.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.buffer.as_ptr().cast()
    }

    /// Mutable pointer to the first element, aligned to `A`. Invalidated by any growth.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.buffer.as_mut_ptr().cast()
    }

    /// The elements as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        let length = self.length();
        bytemuck::cast_slice(&self.buffer[..length])
    }

    /// The elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let length = self.length();
        bytemuck::cast_slice_mut(&mut self.buffer[..length])
    }

    /// Sets the number of elements to `count`.
    ///
    /// New elements are zeroed. The buffer length is rounded up to the alignment
    /// unit and at least that much storage is reserved.
    pub fn resize(&mut self, count: usize) {
        let length = count
            .checked_mul(self.span())
            .expect("element count overflow");
        self.buffer.truncate(self.length());
        self.buffer.resize(length);
        self.buffer.reserve(length);
        self.count = count;
    }

    /// Removes all elements, keeping the reservation.
    pub fn clear(&mut self) {
        self.resize(0);
    }

    /// Appends one element.
    pub fn push(&mut self, value: T) {
        self.trim_to_length();
        self.buffer.push_typed(value);
        self.count += 1;
    }

    /// Appends copies of all `values`.
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.trim_to_length();
        self.buffer.extend_from_typed_slice(values);
        self.count += values.len();
    }

    /// Appends the elements of `other`.
    pub fn append<const B: usize>(&mut self, other: &AlignedMemory<T, B>) {
        self.extend_from_slice(other.as_slice());
    }

    /// Drops the alignment padding after the last element so appended elements
    /// land right behind it.
    #[inline]
    fn trim_to_length(&mut self) {
        self.buffer.truncate(self.length());
    }
}

impl<T, const A: usize> Default for AlignedMemory<T, A>
where
    T: bytemuck::Pod,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const A: usize> Clone for AlignedMemory<T, A> {
    fn clone(&self) -> Self {
        AlignedMemory {
            buffer: self.buffer.clone(),
            count: self.count,
            _marker: PhantomData,
        }
    }
}

impl<T, const A: usize> std::ops::Deref for AlignedMemory<T, A>
where
    T: bytemuck::Pod,
{
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, const A: usize> std::ops::DerefMut for AlignedMemory<T, A>
where
    T: bytemuck::Pod,
{
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T, const A: usize> std::fmt::Debug for AlignedMemory<T, A>
where
    T: bytemuck::Pod + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedMemory")
            .field("values", &self.as_slice())
            .field("count", &self.count)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<T, const A: usize> FromIterator<T> for AlignedMemory<T, A>
where
    T: bytemuck::Pod,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut memory = Self::new();
        for value in iter {
            memory.push(value);
        }
        memory
    }
}
