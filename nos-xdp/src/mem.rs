//! Memory model descriptors
//!
//! A [`MemInfo`] is stamped by value into every buffer a receive queue hands
//! out. It names the backing allocator only indirectly, through a small id
//! that the registry resolves, so buffers can travel to other contexts
//! without holding a reference to the allocator itself.

use static_assertions::const_assert;

use crate::error::Error;

/// Memory model identifier. `0` means "no registry entry".
pub type MemId = u32;

/// Smallest id handed out by the registry
pub const MEM_ID_MIN: MemId = 1;
/// Largest id handed out by the registry
pub const MEM_ID_MAX: MemId = 0xFFFE;

const_assert!(MEM_ID_MIN > 0);
const_assert!(MEM_ID_MIN <= MEM_ID_MAX);
const_assert!(MEM_ID_MAX < u16::MAX as u32);
const_assert!(core::mem::size_of::<MemId>() == 4);

/// Backing allocator category of a buffer.
///
/// Discriminants follow the kernel `enum xdp_mem_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MemType {
    /// Page fragment from the generic fragment allocator
    PageShared = 0,
    /// Single order-0 page
    PageOrder0 = 1,
    /// Page owned by a page-pool
    PagePool = 2,
    /// Buffer owned by a zero-copy allocator
    ZeroCopy = 3,
}

/// Number of memory types known to this build
pub const MEM_TYPE_MAX: u32 = 4;

impl MemType {
    /// Whether buffers of this type need a registry entry to be returned.
    pub const fn requires_allocator(self) -> bool {
        matches!(self, MemType::PagePool | MemType::ZeroCopy)
    }

    /// Raw kernel value
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for MemType {
    type Error = Error;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(MemType::PageShared),
            1 => Ok(MemType::PageOrder0),
            2 => Ok(MemType::PagePool),
            3 => Ok(MemType::ZeroCopy),
            _ => Err(Error::UnsupportedType(raw)),
        }
    }
}

/// Memory descriptor carried by every buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemInfo {
    /// Registry id, `0` when the type needs no indirection
    pub id: MemId,
    /// Memory type, `None` until a model is bound
    pub mem_type: Option<MemType>,
}

impl MemInfo {
    /// Descriptor of a queue with no memory model bound
    pub const UNBOUND: MemInfo = MemInfo { id: 0, mem_type: None };

    /// Creates a descriptor
    pub const fn new(id: MemId, mem_type: MemType) -> Self {
        Self { id, mem_type: Some(mem_type) }
    }

    /// Whether the descriptor points at a registry entry
    pub const fn has_id(&self) -> bool {
        self.id != 0
    }
}
