//! XDP buffers
//!
//! [`XdpBuff`] is the receive-time view of a packet and still borrows its
//! queue. [`XdpFrame`] is the detached form that can be queued, redirected
//! or handed to another context; it carries a copy of the queue's memory
//! descriptor instead.

use crate::mem::MemInfo;
use crate::rxq::RxQueueInfo;

/// Packet buffer on the receive path
#[derive(Debug)]
pub struct XdpBuff<'q, 'r> {
    /// Address of the packet data
    pub data: usize,
    /// Packet length in bytes
    pub len: usize,
    /// Queue the buffer was received on
    pub rxq: &'q RxQueueInfo<'r>,
    /// Zero-copy allocator handle, `0` for other memory types
    pub handle: u64,
}

impl<'q, 'r> XdpBuff<'q, 'r> {
    /// Buffer received on `rxq`
    pub fn new(rxq: &'q RxQueueInfo<'r>, data: usize, len: usize) -> Self {
        Self {
            data,
            len,
            rxq,
            handle: 0,
        }
    }

    /// Buffer owned by a zero-copy allocator
    pub fn with_handle(mut self, handle: u64) -> Self {
        self.handle = handle;
        self
    }

    /// Descriptor of the queue's current memory model
    pub fn mem(&self) -> MemInfo {
        self.rxq.mem()
    }

    /// Detach the buffer from its queue.
    ///
    /// The frame gets a copy of the queue's descriptor, taken now.
    pub fn into_frame(self) -> XdpFrame {
        XdpFrame {
            data: self.data,
            len: self.len,
            mem: self.rxq.mem(),
        }
    }
}

/// Packet buffer detached from its receive queue
#[derive(Debug, PartialEq, Eq)]
pub struct XdpFrame {
    /// Address of the packet data
    pub data: usize,
    /// Packet length in bytes
    pub len: usize,
    /// Memory model the buffer came from
    pub mem: MemInfo,
}

impl XdpFrame {
    /// Frame with an explicit descriptor
    pub fn new(data: usize, len: usize, mem: MemInfo) -> Self {
        Self { data, len, mem }
    }
}
