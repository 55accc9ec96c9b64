//! Collaborator seams: the operations this subsystem requires from the
//! virtual-memory manager, the file/inode layer, and trapframe argument
//! decoding, none of which this subsystem owns. None of these are
//! implemented here -- they are declared `extern "C"`, to be linked
//! against the rest of the kernel. A `#[cfg(test)]` module binds the same
//! symbol names to small in-memory fakes so the scheduler and thread
//! logic can be exercised by `cargo test` in isolation.

/// Opaque handle to a process's page table, owned by the VM collaborator.
/// `0` is the sentinel "no pagetable" value, matching a null `Pagetable`
/// pointer used for the same purpose elsewhere in the kernel.
pub type PagetableHandle = u64;
/// Opaque handle to an open file, owned by the file-layer collaborator.
pub type FileHandle = u32;
/// Opaque handle to an inode, owned by the file-layer collaborator.
pub type InodeHandle = u32;

extern "C" {
    /// Create an empty page table with trampoline/trapframe mappings only.
    /// Returns 0 on allocation failure.
    pub fn proc_pagetable_new() -> PagetableHandle;
    /// Duplicate `parent`'s mapped memory of size `size` into a fresh
    /// page table. Returns 0 on failure.
    pub fn proc_pagetable_copy(parent: PagetableHandle, size: u64) -> PagetableHandle;
    /// Free a page table and the physical memory it maps.
    pub fn proc_pagetable_free(pagetable: PagetableHandle, size: u64);
    /// Grow `pagetable`'s mapped region from `old_size` to `new_size`.
    /// Returns the new size, or 0 on failure.
    pub fn uvmalloc(pagetable: PagetableHandle, old_size: u64, new_size: u64) -> u64;
    /// Shrink `pagetable`'s mapped region from `old_size` to `new_size`.
    /// Returns the new size.
    pub fn uvmdealloc(pagetable: PagetableHandle, old_size: u64, new_size: u64) -> u64;
    /// Reload this CPU's MMU to use `pagetable` (growproc's "reload the
    /// MMU for this CPU" step).
    pub fn switch_pagetable(pagetable: PagetableHandle);

    /// Increment a file's reference count, returning the same handle.
    pub fn filedup(file: FileHandle) -> FileHandle;
    /// Close (decrement the reference count of) a file.
    pub fn fileclose(file: FileHandle);
    /// Increment an inode's reference count, returning the same handle.
    pub fn idup(inode: InodeHandle) -> InodeHandle;
    /// Drop a reference to an inode.
    pub fn iput(inode: InodeHandle);

    /// Harvest up to 10 caller program counters for a sleeping process's
    /// saved frame, for `procdump`. Writes into `out` and returns the
    /// count written.
    pub fn walk_stack(context_sp: u64, out: *mut [u64; 10]) -> usize;
}

#[cfg(test)]
pub mod fake {
    //! In-crate fakes bound to the collaborator symbol names above, so
    //! the process/scheduler/thread logic can run under `cargo test`
    //! without a real VM or file system.
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};

    static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

    #[no_mangle]
    pub extern "C" fn proc_pagetable_new() -> PagetableHandle {
        NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
    }
    #[no_mangle]
    pub extern "C" fn proc_pagetable_copy(_parent: PagetableHandle, _size: u64) -> PagetableHandle {
        NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
    }
    #[no_mangle]
    pub extern "C" fn proc_pagetable_free(_pagetable: PagetableHandle, _size: u64) {}
    #[no_mangle]
    pub extern "C" fn uvmalloc(_pagetable: PagetableHandle, _old_size: u64, new_size: u64) -> u64 {
        new_size
    }
    #[no_mangle]
    pub extern "C" fn uvmdealloc(
        _pagetable: PagetableHandle,
        _old_size: u64,
        new_size: u64,
    ) -> u64 {
        new_size
    }
    #[no_mangle]
    pub extern "C" fn switch_pagetable(_pagetable: PagetableHandle) {}
    #[no_mangle]
    pub extern "C" fn filedup(file: FileHandle) -> FileHandle {
        file
    }
    #[no_mangle]
    pub extern "C" fn fileclose(_file: FileHandle) {}
    #[no_mangle]
    pub extern "C" fn idup(inode: InodeHandle) -> InodeHandle {
        inode
    }
    #[no_mangle]
    pub extern "C" fn iput(_inode: InodeHandle) {}
    #[no_mangle]
    pub extern "C" fn walk_stack(_context_sp: u64, _out: *mut [u64; 10]) -> usize {
        0
    }
}
