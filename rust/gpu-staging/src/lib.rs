//! Host-side staging buffers for GPU uploads.
//!
//! The central type is [`AlignedBuffer`], a growable byte buffer whose storage
//! starts on a fixed power-of-two boundary (16 bytes for vertex and uniform data,
//! 4096 bytes for page-granular "no-copy" GPU buffers). Sizes requested through
//! `resize`/`reserve` are quantized to that boundary, while appends grow the
//! buffer by exact byte counts.
//!
//! [`AlignedMemory`] layers a typed element pool over the byte buffer, and
//! [`ffi`] exports both alignments to C through opaque handles.
//!
//! None of the types synchronize internally; a buffer shared between threads
//! must be protected by the caller.

pub mod align;
pub mod buffer;
pub mod error;
pub mod ffi;
pub mod memory;

#[cfg(test)]
mod testing;

#[cfg(test)]
#[global_allocator]
static GLOBAL: testing::LimitedAlloc = testing::LimitedAlloc;

pub use buffer::{AlignedBuffer, AlignedBuffer4K, AlignedBuffer16};
pub use error::{Error, Result};
pub use gpu_staging_traits::memory_owner::{MemoryAllocation, MemoryOwner};
pub use memory::{AlignedMemory, AlignedMemory4K, AlignedMemory16};
