//! C-callable interface over [`AlignedBuffer16`] and [`AlignedBuffer4K`].
//!
//! Every buffer is exposed as an opaque handle created by `*_new` and released
//! by `*_delete`. Sizes cross the boundary as C `long`; negative sizes are
//! treated as zero. Allocation failure aborts the process, nothing unwinds into
//! the caller. The declarations live in `include/gpu_staging.h`.
//!
//! Handles are not synchronized: concurrent calls on one handle must be
//! serialized by the caller.

use libc::{c_long, c_void};

use crate::buffer::{AlignedBuffer, AlignedBuffer4K, AlignedBuffer16};

#[inline]
fn size_from_c(n: c_long) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[inline]
fn size_to_c(n: usize) -> c_long {
    c_long::try_from(n).unwrap_or(c_long::MAX)
}

fn new_handle<const A: usize>() -> *mut AlignedBuffer<A> {
    Box::into_raw(Box::new(AlignedBuffer::<A>::new()))
}

/// # Safety
///
/// `buf` and `src` must be live handles of the same buffer type. They may be
/// the same handle.
unsafe fn append_handle<const A: usize>(buf: *mut AlignedBuffer<A>, src: *const AlignedBuffer<A>) {
    if std::ptr::eq(buf, src) {
        unsafe { (*buf).extend_from_within(..) };
    } else {
        unsafe { (*buf).append(&*src) };
    }
}

macro_rules! export_aligned_buffer {
    ($buffer:ty, $prefix:ident) => {
        paste::paste! {
            /// Creates an empty buffer with one alignment unit reserved.
            #[unsafe(no_mangle)]
            pub extern "C" fn [<$prefix _new>]() -> *mut $buffer {
                new_handle()
            }

            /// Releases a buffer. A null handle is ignored.
            ///
            /// # Safety
            ///
            /// `buf` must be null or a live handle; it is invalid afterwards.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn [<$prefix _delete>](buf: *mut $buffer) {
                if !buf.is_null() {
                    drop(unsafe { Box::from_raw(buf) });
                }
            }

            /// Returns the aligned start of the storage, valid until the next
            /// mutating call.
            ///
            /// # Safety
            ///
            /// `buf` must be a live handle.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn [<$prefix _pointer>](buf: *mut $buffer) -> *mut c_void {
                unsafe { (*buf).as_mut_ptr().cast() }
            }

            /// Returns the number of reserved bytes.
            ///
            /// # Safety
            ///
            /// `buf` must be a live handle.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn [<$prefix _capacity>](buf: *const $buffer) -> c_long {
                size_to_c(unsafe { (*buf).capacity() })
            }

            /// Returns the number of bytes in use.
            ///
            /// # Safety
            ///
            /// `buf` must be a live handle.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn [<$prefix _length>](buf: *const $buffer) -> c_long {
                size_to_c(unsafe { (*buf).len() })
            }

            /// Sets the length to `length` rounded up to the alignment unit.
            ///
            /// # Safety
            ///
            /// `buf` must be a live handle.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn [<$prefix _resize>](buf: *mut $buffer, length: c_long) {
                unsafe { (*buf).resize(size_from_c(length)) }
            }

            /// Reserves at least `length` bytes, rounded up to the alignment unit.
            ///
            /// # Safety
            ///
            /// `buf` must be a live handle.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn [<$prefix _reserve>](buf: *mut $buffer, length: c_long) {
                unsafe { (*buf).reserve(size_from_c(length)) }
            }

            /// Appends the bytes in use by `src`.
            ///
            /// # Safety
            ///
            /// `buf` and `src` must be live handles; they may be the same handle.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn [<$prefix _append>](buf: *mut $buffer, src: *const $buffer) {
                unsafe { append_handle(buf, src) }
            }

            /// Appends exactly `length` bytes read from `bin`.
            ///
            /// # Safety
            ///
            /// `buf` must be a live handle. `bin` must be readable for `length`
            /// bytes and must not point into the storage of `buf`.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn [<$prefix _append_raw>](
                buf: *mut $buffer,
                bin: *const c_void,
                length: c_long,
            ) {
                unsafe { (*buf).append_raw(bin.cast(), size_from_c(length)) }
            }
        }
    };
}

export_aligned_buffer!(AlignedBuffer4K, gpu_staging_buffer4k);
export_aligned_buffer!(AlignedBuffer16, gpu_staging_buffer16);

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes<'a>(ptr: *mut c_void, len: c_long) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(ptr as *const u8, len as usize) }
    }

    #[test]
    fn test_page_buffer_scenario() {
        let buf = gpu_staging_buffer4k_new();
        unsafe {
            assert_eq!(gpu_staging_buffer4k_capacity(buf), 4096);
            assert_eq!(gpu_staging_buffer4k_length(buf), 0);
            assert_eq!(gpu_staging_buffer4k_pointer(buf) as usize % 4096, 0);

            gpu_staging_buffer4k_resize(buf, 1);
            assert_eq!(gpu_staging_buffer4k_length(buf), 4096);

            gpu_staging_buffer4k_resize(buf, 4097);
            assert_eq!(gpu_staging_buffer4k_length(buf), 8192);
            assert_eq!(gpu_staging_buffer4k_pointer(buf) as usize % 4096, 0);

            gpu_staging_buffer4k_reserve(buf, 40000);
            assert_eq!(gpu_staging_buffer4k_capacity(buf), 40960);
            assert_eq!(gpu_staging_buffer4k_length(buf), 8192);

            gpu_staging_buffer4k_delete(buf);
        }
    }

    #[test]
    fn test_append_raw_exact() {
        let buf = gpu_staging_buffer16_new();
        let first = *b"abcde";
        let second = *b"fghij";
        unsafe {
            gpu_staging_buffer16_append_raw(buf, first.as_ptr().cast(), 5);
            gpu_staging_buffer16_append_raw(buf, second.as_ptr().cast(), 5);
            assert_eq!(gpu_staging_buffer16_length(buf), 10);
            let ptr = gpu_staging_buffer16_pointer(buf);
            assert_eq!(ptr as usize % 16, 0);
            assert_eq!(bytes(ptr, 10), b"abcdefghij");
            gpu_staging_buffer16_delete(buf);
        }
    }

    #[test]
    fn test_append_handles() {
        let dst = gpu_staging_buffer16_new();
        let src = gpu_staging_buffer16_new();
        unsafe {
            gpu_staging_buffer16_resize(src, 20);
            let src_ptr = gpu_staging_buffer16_pointer(src) as *mut u8;
            for i in 0..32 {
                *src_ptr.add(i) = i as u8;
            }
            gpu_staging_buffer16_append_raw(dst, b"x".as_ptr().cast(), 1);
            gpu_staging_buffer16_append(dst, src);
            assert_eq!(gpu_staging_buffer16_length(dst), 33);

            let out = bytes(gpu_staging_buffer16_pointer(dst), 33);
            assert_eq!(out[0], b'x');
            assert!(out[1..].iter().enumerate().all(|(i, &b)| b == i as u8));

            gpu_staging_buffer16_delete(src);
            gpu_staging_buffer16_delete(dst);
        }
    }

    #[test]
    fn test_append_to_itself() {
        let buf = gpu_staging_buffer4k_new();
        unsafe {
            gpu_staging_buffer4k_append_raw(buf, b"ab".as_ptr().cast(), 2);
            gpu_staging_buffer4k_append(buf, buf);
            gpu_staging_buffer4k_append(buf, buf);
            assert_eq!(gpu_staging_buffer4k_length(buf), 8);
            assert_eq!(bytes(gpu_staging_buffer4k_pointer(buf), 8), b"abababab");
            gpu_staging_buffer4k_delete(buf);
        }
    }

    #[test]
    fn test_negative_and_zero_sizes() {
        let buf = gpu_staging_buffer16_new();
        unsafe {
            gpu_staging_buffer16_resize(buf, -5);
            assert_eq!(gpu_staging_buffer16_length(buf), 0);
            gpu_staging_buffer16_reserve(buf, -1);
            assert_eq!(gpu_staging_buffer16_capacity(buf), 16);
            gpu_staging_buffer16_append_raw(buf, std::ptr::null(), 0);
            gpu_staging_buffer16_append_raw(buf, std::ptr::null(), -3);
            assert_eq!(gpu_staging_buffer16_length(buf), 0);
            gpu_staging_buffer16_delete(buf);
        }
    }

    #[test]
    fn test_delete_null() {
        unsafe {
            gpu_staging_buffer16_delete(std::ptr::null_mut());
            gpu_staging_buffer4k_delete(std::ptr::null_mut());
        }
    }
}
