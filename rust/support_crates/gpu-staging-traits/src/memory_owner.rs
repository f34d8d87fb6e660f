//! `MemoryOwner`: A trait for types that own aligned staging memory.

/// A trait for types that own aligned host memory which can be handed to a GPU
/// API by pointer and length (for example to create a "no-copy" device buffer
/// over page-aligned memory).
///
/// # Safety
///
/// Implementors must guarantee that:
/// - The memory returned by `memory()` stays valid, and is not moved, for as long
///   as the owner is borrowed immutably.
/// - Memory is exclusively owned by the `MemoryOwner` instance.
/// - `ptr` is aligned to `alignment`, and `alignment` is a power of two.
/// - The first `len` bytes are initialized.
/// - `capacity >= len`, and `capacity` is a multiple of `alignment`.
pub unsafe trait MemoryOwner {
    /// Returns information about the owned memory block.
    fn memory(&self) -> MemoryAllocation;
}

/// Represents a block of allocated memory with its size information.
#[derive(Debug, Clone, Copy)]
pub struct MemoryAllocation {
    /// Pointer to the start of the allocated memory.
    pub ptr: *const u8,
    /// Bytes logically in use.
    pub len: usize,
    /// Bytes reserved in the allocation.
    pub capacity: usize,
    /// Guaranteed alignment of `ptr`.
    pub alignment: usize,
}

impl MemoryAllocation {
    /// Returns `true` if `ptr` is aligned to `alignment`, which must be a power of two.
    #[inline]
    pub fn is_aligned_to(&self, alignment: usize) -> bool {
        alignment.is_power_of_two() && (self.ptr as usize) & (alignment - 1) == 0
    }

    /// Returns the number of bytes a GPU API may map in place: the logical
    /// length rounded up to the allocation's alignment, clamped to `capacity`.
    ///
    /// Page-granular "no-copy" mappings require a length that is a whole number
    /// of pages, and the rounded tail is always inside the reservation. If
    /// `alignment` is not a power of two no rounding is applied.
    #[inline]
    pub fn mappable_len(&self) -> usize {
        if !self.alignment.is_power_of_two() {
            return self.len.min(self.capacity);
        }
        let mask = self.alignment - 1;
        let rounded = self.len.checked_add(mask).map_or(usize::MAX, |n| n & !mask);
        rounded.min(self.capacity)
    }
}
