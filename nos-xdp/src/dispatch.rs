//! Buffer return
//!
//! A consumer done with a buffer hands back its memory descriptor and the
//! registry routes the buffer to the allocator that owns it. Page-pool and
//! zero-copy buffers are resolved through a lookup inside a read-side
//! critical section; shared and order-0 pages go straight to the page
//! backend.

use core::sync::atomic::Ordering;

use crate::allocator::AllocatorHandle;
use crate::frame::{XdpBuff, XdpFrame};
use crate::mem::{MemInfo, MemType};
use crate::registry::{registry, MemModelRegistry};

impl MemModelRegistry {
    /// Return the buffer at `data`, described by `mem`.
    ///
    /// `napi_direct` is set by callers running inside the producing queue's
    /// packet-processing context; page-pools may then recycle in place.
    /// `handle` is only meaningful for zero-copy buffers.
    pub fn return_mem(&self, data: usize, mem: &MemInfo, napi_direct: bool, handle: u64) {
        match mem.mem_type {
            Some(MemType::PagePool) => {
                let guard = self.read_lock();
                let page = self.page_backend().virt_to_head_page(data);
                match self.lookup(&guard, mem.id).map(|entry| entry.handle()) {
                    Some(AllocatorHandle::PagePool(pool)) => pool.put_page(page, napi_direct),
                    Some(other) => {
                        contract_violation!(
                            "mem id {} is a page-pool buffer but maps to {:?}",
                            mem.id,
                            other
                        );
                    }
                    None => {
                        // Pool already gone; release the page the slow way.
                        xdp_debug!("mem id {} not found, generic page release", mem.id);
                        self.fallback_releases.fetch_add(1, Ordering::Relaxed);
                        self.page_backend().put_page(page);
                    }
                }
            }
            Some(MemType::PageShared) => self.page_backend().page_frag_free(data),
            Some(MemType::PageOrder0) => {
                let backend = self.page_backend();
                backend.put_page(backend.virt_to_page(data));
            }
            Some(MemType::ZeroCopy) => {
                let guard = self.read_lock();
                match self.lookup(&guard, mem.id).map(|entry| entry.handle()) {
                    Some(AllocatorHandle::ZeroCopy(zc)) => zc.free(handle),
                    Some(other) => {
                        contract_violation!(
                            "mem id {} is a zero-copy buffer but maps to {:?}",
                            mem.id,
                            other
                        );
                    }
                    None => {
                        contract_violation!(
                            "zero-copy buffer returned with no allocator for mem id {}",
                            mem.id
                        );
                    }
                }
            }
            None => {
                contract_violation!("buffer returned without a memory model (id {})", mem.id);
            }
        }
    }

    /// Return a frame from a generic context
    pub fn return_frame(&self, frame: XdpFrame) {
        self.return_mem(frame.data, &frame.mem, false, 0);
    }

    /// Return a frame from the producing queue's packet-processing context
    pub fn return_frame_rx_napi(&self, frame: XdpFrame) {
        self.return_mem(frame.data, &frame.mem, true, 0);
    }

    /// Return a receive buffer; always runs in its queue's context
    pub fn return_buff(&self, buff: XdpBuff<'_, '_>) {
        self.return_mem(buff.data, &buff.mem(), true, buff.handle);
    }
}

/// Return a frame to the process-wide registry
pub fn xdp_return_frame(frame: XdpFrame) {
    registry().return_frame(frame);
}

/// Return a frame to the process-wide registry from packet-processing context
pub fn xdp_return_frame_rx_napi(frame: XdpFrame) {
    registry().return_frame_rx_napi(frame);
}

/// Return a receive buffer to the registry of its queue
pub fn xdp_return_buff(buff: XdpBuff<'_, '_>) {
    buff.rxq.registry().return_buff(buff);
}
