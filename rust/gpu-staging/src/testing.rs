//! Test-only allocator and logger hooks, scoped to the calling thread so that
//! tests running in parallel do not observe each other.

use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::{Cell, RefCell},
};

thread_local! {
    static ALLOC_LIMIT: Cell<usize> = const { Cell::new(usize::MAX) };
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// System allocator that refuses requests above the current thread's limit.
pub struct LimitedAlloc;

impl LimitedAlloc {
    #[inline]
    fn allows(size: usize) -> bool {
        size <= ALLOC_LIMIT.try_with(Cell::get).unwrap_or(usize::MAX)
    }
}

unsafe impl GlobalAlloc for LimitedAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !Self::allows(layout.size()) {
            return std::ptr::null_mut();
        }
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if !Self::allows(layout.size()) {
            return std::ptr::null_mut();
        }
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if !Self::allows(new_size) {
            return std::ptr::null_mut();
        }
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

/// Runs `f` with allocations larger than `limit` bytes failing on this thread.
pub fn with_alloc_limit<R>(limit: usize, f: impl FnOnce() -> R) -> R {
    let prev = ALLOC_LIMIT.with(|l| l.replace(limit));
    let res = f();
    ALLOC_LIMIT.with(|l| l.set(prev));
    res
}

struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        CAPTURING.try_with(Cell::get).unwrap_or(false)
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let message = record.args().to_string();
            CAPTURED.with(|c| c.borrow_mut().push((record.level(), message)));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Runs `f` and returns the log records it emitted on this thread.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<(log::Level, String)>) {
    // Another test may have installed the logger already.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Trace);

    CAPTURED.with(|c| c.borrow_mut().clear());
    CAPTURING.with(|c| c.set(true));
    let res = f();
    CAPTURING.with(|c| c.set(false));
    let records = CAPTURED.with(|c| std::mem::take(&mut *c.borrow_mut()));
    (res, records)
}
