//! Power-of-two rounding helpers used to quantize buffer sizes and check addresses.

/// Rounds `n` up to the next multiple of `alignment`, returning `None` if the
/// result does not fit in `usize`.
///
/// If `n` is already aligned it is returned unchanged.
///
/// ```
/// use gpu_staging::align::try_align_up;
///
/// assert_eq!(try_align_up(0, 16), Some(0));
/// assert_eq!(try_align_up(17, 16), Some(32));
/// assert_eq!(try_align_up(4097, 4096), Some(8192));
/// assert_eq!(try_align_up(usize::MAX, 16), None);
/// ```
///
/// # Panics
///
/// In debug builds, panics if `alignment` is zero or not a power of two.
#[inline]
pub fn try_align_up(n: usize, alignment: usize) -> Option<usize> {
    debug_assert_ne!(alignment, 0);
    debug_assert!(alignment.is_power_of_two());
    n.checked_add(alignment - 1).map(|n| n & !(alignment - 1))
}

/// Checks whether `ptr` is aligned to `alignment`.
///
/// Returns `false` for an alignment that is not a power of two.
#[inline]
pub fn is_ptr_aligned(ptr: *const u8, alignment: usize) -> bool {
    alignment.is_power_of_two() && ((ptr as usize) & (alignment - 1)) == 0
}
