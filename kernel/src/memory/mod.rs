//! Kernel memory management.
//!
//! One static byte arena, carved into two regions that grow toward each
//! other: a heap bumping up from offset 0 and a stack region walking down
//! from the top. See [`arena`] for the allocator itself.
//!
//! The kernel-wide instance lives behind a `spin::Mutex`; these module
//! functions are the public face the rest of the kernel calls.

mod arena;

pub use arena::{MemStats, MemoryManager, HEAP_SIZE, MAX_ALLOCS, STACK_SIZE};

use spin::Mutex;

/// The kernel's memory manager singleton.
static MEMORY: Mutex<MemoryManager> = Mutex::new(MemoryManager::new());

/// Reset the arena and all statistics.
pub fn init() {
    MEMORY.lock().init();
}

/// Allocate `size` bytes from the kernel heap. Null on failure.
pub fn kmalloc(size: usize) -> *mut u8 {
    MEMORY.lock().kmalloc(size)
}

/// Release a heap allocation. Null is a no-op.
pub fn kfree(ptr: *mut u8) {
    MEMORY.lock().kfree(ptr);
}

/// Allocate one process stack ([`STACK_SIZE`] bytes). Returns the low
/// address of the region, or null on failure.
pub fn alloc_stack() -> *mut u8 {
    MEMORY.lock().alloc_stack()
}

/// Release a process stack by its low address.
pub fn free_stack(ptr: *mut u8) {
    MEMORY.lock().free_stack(ptr);
}

/// Snapshot of the allocation counters.
pub fn stats() -> MemStats {
    MEMORY.lock().stats()
}

/// Emit the statistics block on the byte sink.
pub fn print_stats() {
    MEMORY.lock().print_stats();
}

/// Run `f` with the memory manager locked. Used by the process table,
/// whose operations allocate and free stacks.
///
/// Lock order: the memory lock is always taken before the process table
/// lock, never after it.
pub(crate) fn with<R>(f: impl FnOnce(&mut MemoryManager) -> R) -> R {
    f(&mut MEMORY.lock())
}
