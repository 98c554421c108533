//! NOS XDP - Receive queue memory models
//!
//! This crate lets a network receive queue declare how its packet buffers
//! are backed, and lets any consumer of such a buffer give it back to the
//! right allocator without knowing which queue produced it.
//!
//! # Architecture
//!
//! - **Mem**: the `{type, id}` descriptor stamped into every buffer
//! - **Registry**: id to allocator index with lock-free lookup and
//!   grace-period reclamation
//! - **RxQueue**: per-queue registration state machine
//! - **Dispatch**: buffer return paths per memory type
//! - **Attachment**: which XDP program a device runs, and in which mode
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use nos_xdp::{AllocatorHandle, MemModelRegistry, MemType, NetDevice, Page, PagePool, RxQueueInfo, XdpBuff};
//!
//! struct Pool;
//!
//! impl PagePool for Pool {
//!     fn put_page(&self, _page: Page, _allow_direct: bool) {}
//! }
//!
//! let registry = MemModelRegistry::default();
//! let dev = Arc::new(NetDevice::new("eth0", 2));
//!
//! let mut rxq = RxQueueInfo::new_in(&registry);
//! rxq.register(&dev, 0);
//! rxq.register_mem_model(MemType::PagePool, Some(AllocatorHandle::PagePool(Arc::new(Pool))))?;
//!
//! let frame = XdpBuff::new(&rxq, 0x10_0000, 64).into_frame();
//! registry.return_frame(frame);
//!
//! rxq.unregister();
//! # Ok::<(), nos_xdp::Error>(())
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

#[macro_use]
mod logging;

pub mod allocator;
pub mod attachment;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod id_alloc;
pub mod mem;
pub mod rcu;
pub mod registry;
pub mod rxq;

// Re-export commonly used types and functions
pub use allocator::{AllocatorHandle, Page, PageAccounting, PageBackend, PagePool, ZeroCopyAllocator, PAGE_SIZE};
pub use attachment::{BpfProg, NetdevBpf, XdpAttachment, XdpFlags};
pub use config::{is_page_pool_compiled_in, RegistryConfig};
pub use dispatch::{xdp_return_buff, xdp_return_frame, xdp_return_frame_rx_napi};
pub use error::{Error, Result};
pub use frame::{XdpBuff, XdpFrame};
pub use mem::{MemId, MemInfo, MemType, MEM_ID_MAX, MEM_ID_MIN};
pub use registry::{init_registry, registry, AllocatorEntry, MemModelRegistry, RegistryStats};
pub use rxq::{NetDevice, RegState, RxQueueInfo};
