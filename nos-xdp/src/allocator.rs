//! Allocator provider interfaces
//!
//! The registry never allocates buffer memory itself. It only routes a
//! returned buffer to whoever owns it: a page-pool, a zero-copy allocator,
//! or the platform's generic page helpers.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::mem::MemType;

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;
/// Page shift (log2 of PAGE_SIZE)
pub const PAGE_SHIFT: usize = 12;

/// A page frame, identified by its frame number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Page(pub usize);

impl Page {
    /// Page containing the virtual address `addr`
    #[inline]
    pub const fn containing(addr: usize) -> Self {
        Self(addr >> PAGE_SHIFT)
    }

    /// Page frame number
    #[inline]
    pub const fn pfn(self) -> usize {
        self.0
    }

    /// First address of the page
    #[inline]
    pub const fn start_addr(self) -> usize {
        self.0 << PAGE_SHIFT
    }
}

/// A page-pool allocator.
///
/// `allow_direct` is set when the caller runs inside the queue's own
/// packet-processing context, where the page may be recycled in place.
pub trait PagePool: Send + Sync {
    /// Take a page back
    fn put_page(&self, page: Page, allow_direct: bool);
}

/// A zero-copy allocator, returning buffers to a user-space ring.
pub trait ZeroCopyAllocator: Send + Sync {
    /// Release the buffer identified by `handle`
    fn free(&self, handle: u64);
}

/// Generic page helpers of the platform.
pub trait PageBackend: Send + Sync {
    /// Page containing `addr`
    fn virt_to_page(&self, addr: usize) -> Page {
        Page::containing(addr)
    }

    /// Head page of the (possibly compound) page containing `addr`
    fn virt_to_head_page(&self, addr: usize) -> Page {
        self.virt_to_page(addr)
    }

    /// Drop a page reference
    fn put_page(&self, page: Page);

    /// Free a page fragment
    fn page_frag_free(&self, addr: usize);
}

/// Allocator handle bound to a memory model.
///
/// Only the types that need indirection carry one.
#[derive(Clone)]
pub enum AllocatorHandle {
    /// Page-pool backing a [`MemType::PagePool`] queue
    PagePool(Arc<dyn PagePool>),
    /// Zero-copy allocator backing a [`MemType::ZeroCopy`] queue
    ZeroCopy(Arc<dyn ZeroCopyAllocator>),
}

impl AllocatorHandle {
    /// Memory type this handle serves
    pub fn mem_type(&self) -> MemType {
        match self {
            AllocatorHandle::PagePool(_) => MemType::PagePool,
            AllocatorHandle::ZeroCopy(_) => MemType::ZeroCopy,
        }
    }

    /// Whether both handles refer to the same allocator
    pub fn same_allocator(&self, other: &AllocatorHandle) -> bool {
        match (self, other) {
            (AllocatorHandle::PagePool(a), AllocatorHandle::PagePool(b)) => {
                Arc::ptr_eq(a, b)
            }
            (AllocatorHandle::ZeroCopy(a), AllocatorHandle::ZeroCopy(b)) => {
                Arc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for AllocatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocatorHandle::PagePool(pool) => {
                write!(f, "PagePool({:p})", Arc::as_ptr(pool))
            }
            AllocatorHandle::ZeroCopy(zc) => {
                write!(f, "ZeroCopy({:p})", Arc::as_ptr(zc))
            }
        }
    }
}

impl PartialEq for AllocatorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_allocator(other)
    }
}

/// Page backend statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Pages released through `put_page`
    pub pages_put: u64,
    /// Fragments released through `page_frag_free`
    pub frags_freed: u64,
}

/// Default page backend.
///
/// Resolves pages by address arithmetic and counts what it is asked to
/// release. Platforms with a real page allocator install their own backend
/// through [`crate::config::RegistryConfig::page_backend`].
#[derive(Debug, Default)]
pub struct PageAccounting {
    pages_put: AtomicU64,
    frags_freed: AtomicU64,
}

impl PageAccounting {
    /// Create a backend with zeroed counters
    pub const fn new() -> Self {
        Self {
            pages_put: AtomicU64::new(0),
            frags_freed: AtomicU64::new(0),
        }
    }

    /// Counters so far
    pub fn stats(&self) -> PageStats {
        PageStats {
            pages_put: self.pages_put.load(Ordering::Relaxed),
            frags_freed: self.frags_freed.load(Ordering::Relaxed),
        }
    }
}

impl PageBackend for PageAccounting {
    fn put_page(&self, _page: Page) {
        self.pages_put.fetch_add(1, Ordering::Relaxed);
    }

    fn page_frag_free(&self, _addr: usize) {
        self.frags_freed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPool;

    impl PagePool for NullPool {
        fn put_page(&self, _page: Page, _allow_direct: bool) {}
    }

    #[test]
    fn test_page_arithmetic() {
        let page = Page::containing(0x5123);
        assert_eq!(page.pfn(), 5);
        assert_eq!(page.start_addr(), 0x5000);
        assert_eq!(PageAccounting::new().virt_to_head_page(0x5fff), page);
    }

    #[test]
    fn test_handle_identity() {
        let pool: Arc<dyn PagePool> = Arc::new(NullPool);
        let a = AllocatorHandle::PagePool(pool.clone());
        let b = AllocatorHandle::PagePool(pool);
        let c = AllocatorHandle::PagePool(Arc::new(NullPool));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.mem_type(), MemType::PagePool);
    }

    #[test]
    fn test_accounting_counts() {
        let backend = PageAccounting::new();
        backend.put_page(Page(1));
        backend.put_page(Page(2));
        backend.page_frag_free(0x1000);
        assert_eq!(backend.stats(), PageStats { pages_put: 2, frags_freed: 1 });
    }
}
