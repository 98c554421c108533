//! XDP program attachment bookkeeping
//!
//! Drivers keep one [`XdpAttachment`] per device to remember which program
//! is attached and in which mode. Running the program is not handled here.

use alloc::sync::Arc;
use bitflags::bitflags;

use crate::error::{Error, Result};

bitflags! {
    /// XDP attach flags (`XDP_FLAGS_*`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct XdpFlags: u32 {
        /// Fail if a program is already attached
        const UPDATE_IF_NOEXIST = 1 << 0;
        /// Generic (skb) mode
        const SKB_MODE = 1 << 1;
        /// Native driver mode
        const DRV_MODE = 1 << 2;
        /// Offloaded to hardware
        const HW_MODE = 1 << 3;
        /// All mode bits
        const MODES = Self::SKB_MODE.bits() | Self::DRV_MODE.bits() | Self::HW_MODE.bits();
    }
}

/// Loaded XDP program, referenced by id
#[derive(Debug, PartialEq, Eq)]
pub struct BpfProg {
    /// Program id
    pub id: u32,
}

/// Attach request from the control path
#[derive(Debug, Clone, Default)]
pub struct NetdevBpf {
    /// Program to attach, `None` to detach
    pub prog: Option<Arc<BpfProg>>,
    /// Requested flags
    pub flags: XdpFlags,
}

/// Result of [`XdpAttachment::query`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentQuery {
    /// Attached program id, `0` when none
    pub prog_id: u32,
    /// Flags of the attached program
    pub prog_flags: XdpFlags,
}

/// Program currently attached to a device
#[derive(Debug, Default)]
pub struct XdpAttachment {
    prog: Option<Arc<BpfProg>>,
    flags: XdpFlags,
}

impl XdpAttachment {
    /// Nothing attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the attached program
    pub fn query(&self) -> AttachmentQuery {
        match &self.prog {
            Some(prog) => AttachmentQuery {
                prog_id: prog.id,
                prog_flags: self.flags,
            },
            None => AttachmentQuery {
                prog_id: 0,
                prog_flags: XdpFlags::empty(),
            },
        }
    }

    /// Check that `bpf` does not switch modes under an attached program
    pub fn flags_ok(&self, bpf: &NetdevBpf) -> Result<()> {
        if self.prog.is_some() && !(bpf.flags ^ self.flags).intersection(XdpFlags::MODES).is_empty() {
            xdp_debug!("xdp attach rejected: {:?} vs {:?}", bpf.flags, self.flags);
            return Err(Error::FlagsMismatch("program loaded with different flags"));
        }
        Ok(())
    }

    /// Replace the attached program; the old reference is released
    pub fn setup(&mut self, bpf: NetdevBpf) {
        self.prog = bpf.prog;
        self.flags = bpf.flags;
    }

    /// Attached program
    pub fn prog(&self) -> Option<&Arc<BpfProg>> {
        self.prog.as_ref()
    }
}
