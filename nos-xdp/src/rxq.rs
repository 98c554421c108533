//! Receive queue registration
//!
//! Each receive queue owns one [`RxQueueInfo`]. The driver registers it at
//! queue setup, optionally binds a memory model, and unregisters it at
//! teardown. The binding only remembers the id of its registry entry; the
//! entry itself belongs to the registry.
//!
//! ```text
//! New ──register──> Registered ──unregister──> Unregistered
//!  │                    ^                           │
//!  │                    └─────────register──────────┘
//!  └──mark_unused──> Unused (unregister is a no-op)
//! ```

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::fmt;

use crate::allocator::AllocatorHandle;
use crate::error::{Error, Result};
use crate::mem::{MemInfo, MemType};
use crate::registry::{registry, MemModelRegistry};

/// Network device owning receive queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetDevice {
    /// Interface name
    pub name: String,
    /// Interface index
    pub ifindex: u32,
}

impl NetDevice {
    /// Create a device description
    pub fn new(name: &str, ifindex: u32) -> Self {
        Self {
            name: name.into(),
            ifindex,
        }
    }
}

/// Registration state of a receive queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegState {
    /// Never registered
    New,
    /// Registered with a device
    Registered,
    /// Registered once, now torn down
    Unregistered,
    /// Driver promised never to register this queue
    Unused,
}

/// Memory model binding of one receive queue.
pub struct RxQueueInfo<'r> {
    registry: &'r MemModelRegistry,
    state: RegState,
    dev: Weak<NetDevice>,
    queue_index: u32,
    mem: MemInfo,
}

impl RxQueueInfo<'static> {
    /// Binding that uses the process-wide registry
    pub fn new() -> Self {
        Self::new_in(registry())
    }
}

impl Default for RxQueueInfo<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> RxQueueInfo<'r> {
    /// Binding that uses `registry`
    pub fn new_in(registry: &'r MemModelRegistry) -> Self {
        Self {
            registry,
            state: RegState::New,
            dev: Weak::new(),
            queue_index: 0,
            mem: MemInfo::UNBOUND,
        }
    }

    /// Register the queue as queue `queue_index` of `dev`.
    ///
    /// Registering an already registered queue is tolerated: it is
    /// unregistered first, with a warning.
    pub fn register(&mut self, dev: &Arc<NetDevice>, queue_index: u32) {
        match self.state {
            RegState::Unused => {
                contract_violation!(
                    "rxq {}: driver promised not to register this queue",
                    queue_index
                );
            }
            RegState::Registered => {
                xdp_warn!(
                    "rxq {}: missing unregister, handled but fix driver",
                    self.queue_index
                );
                self.unregister();
            }
            RegState::New | RegState::Unregistered => {}
        }

        self.dev = Arc::downgrade(dev);
        self.queue_index = queue_index;
        self.mem = MemInfo::UNBOUND;
        self.state = RegState::Registered;
        xdp_debug!("rxq {} registered on {}", queue_index, dev.name);
    }

    /// Bind a memory model to the registered queue.
    ///
    /// `PageShared` and `PageOrder0` need no allocator. `PagePool` and
    /// `ZeroCopy` require one of the matching kind; it is entered into the
    /// registry and the queue's descriptor gets the new id. A rejected
    /// request leaves the current binding alone; if no id is free the old
    /// model is already gone and the queue is left unbound.
    pub fn register_mem_model(
        &mut self,
        mem_type: MemType,
        allocator: Option<AllocatorHandle>,
    ) -> Result<()> {
        if self.state != RegState::Registered {
            xdp_warn!("rxq {}: missing register, driver bug", self.queue_index);
            return Err(Error::NotRegistered);
        }

        if !self.registry.is_supported(mem_type) {
            return Err(Error::UnsupportedType(mem_type.as_raw()));
        }

        match &allocator {
            None if mem_type.requires_allocator() => {
                return Err(Error::InvalidArgument("memory type requires an allocator"));
            }
            Some(handle) if handle.mem_type() != mem_type => {
                return Err(Error::InvalidArgument(
                    "allocator handle does not match memory type",
                ));
            }
            _ => {}
        }

        // Rebinding must not leak the previous entry.
        if self.mem.has_id() {
            self.registry.remove_and_reclaim(self.mem.id);
        }
        self.mem = MemInfo::UNBOUND;

        let Some(allocator) = allocator else {
            self.mem.mem_type = Some(mem_type);
            return Ok(());
        };

        let id = self.registry.insert(mem_type, allocator)?;
        self.mem = MemInfo::new(id, mem_type);
        Ok(())
    }

    /// Tear the queue down.
    ///
    /// A no-op on queues marked unused. Any bound memory model is removed
    /// from the registry.
    pub fn unregister(&mut self) {
        match self.state {
            RegState::Unused => return,
            RegState::New => {
                contract_violation!("rxq: unregister of a queue that was never registered");
            }
            RegState::Unregistered => {
                xdp_warn!("rxq {}: already unregistered", self.queue_index);
                return;
            }
            RegState::Registered => {}
        }

        if self.mem.has_id() {
            self.registry.remove_and_reclaim(self.mem.id);
        }

        self.state = RegState::Unregistered;
        self.dev = Weak::new();
        self.mem = MemInfo::UNBOUND;
        xdp_debug!("rxq {} unregistered", self.queue_index);
    }

    /// Promise that this queue will never be registered
    pub fn mark_unused(&mut self) {
        if self.state != RegState::New {
            contract_violation!(
                "rxq {}: mark_unused in state {:?}",
                self.queue_index,
                self.state
            );
        }
        self.state = RegState::Unused;
    }

    /// Whether the queue is registered
    pub fn is_registered(&self) -> bool {
        self.state == RegState::Registered
    }

    /// Registration state
    pub fn state(&self) -> RegState {
        self.state
    }

    /// Descriptor to stamp into buffers received on this queue
    pub fn mem(&self) -> MemInfo {
        self.mem
    }

    /// Queue index within the device
    pub fn queue_index(&self) -> u32 {
        self.queue_index
    }

    /// Owning device, if registered and still alive
    pub fn dev(&self) -> Option<Arc<NetDevice>> {
        self.dev.upgrade()
    }

    /// Registry this queue binds into
    pub fn registry(&self) -> &'r MemModelRegistry {
        self.registry
    }
}

impl Drop for RxQueueInfo<'_> {
    fn drop(&mut self) {
        if self.state == RegState::Registered {
            xdp_warn!("rxq {}: dropped while registered", self.queue_index);
            self.unregister();
        }
    }
}

impl fmt::Debug for RxQueueInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxQueueInfo")
            .field("state", &self.state)
            .field("queue_index", &self.queue_index)
            .field("mem", &self.mem)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{Page, PagePool};

    struct TestPool;

    impl PagePool for TestPool {
        fn put_page(&self, _page: Page, _allow_direct: bool) {}
    }

    fn eth0() -> Arc<NetDevice> {
        Arc::new(NetDevice::new("eth0", 2))
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = MemModelRegistry::default();
        let dev = eth0();
        let mut rxq = RxQueueInfo::new_in(&registry);
        assert_eq!(rxq.state(), RegState::New);

        rxq.register(&dev, 3);
        assert!(rxq.is_registered());
        assert_eq!(rxq.queue_index(), 3);
        assert_eq!(rxq.dev().as_deref(), Some(&*dev));
        assert_eq!(rxq.mem(), MemInfo::UNBOUND);

        rxq.unregister();
        assert_eq!(rxq.state(), RegState::Unregistered);
        assert!(rxq.dev().is_none());
    }

    #[test]
    fn test_reregister_drops_mem_model() {
        let registry = MemModelRegistry::default();
        let dev = eth0();
        let mut rxq = RxQueueInfo::new_in(&registry);
        rxq.register(&dev, 0);
        rxq.register_mem_model(
            MemType::PagePool,
            Some(AllocatorHandle::PagePool(Arc::new(TestPool))),
        )
        .unwrap();
        assert_eq!(rxq.mem().id, 1);

        rxq.register(&dev, 1);
        assert!(rxq.is_registered());
        assert_eq!(rxq.mem(), MemInfo::UNBOUND);
        assert_eq!(registry.stats().live_entries, 0);
    }

    #[test]
    fn test_unused_queue() {
        let registry = MemModelRegistry::default();
        let mut rxq = RxQueueInfo::new_in(&registry);
        rxq.mark_unused();
        rxq.unregister();
        rxq.unregister();
        assert_eq!(rxq.state(), RegState::Unused);
    }

    #[test]
    #[should_panic(expected = "promised not to register")]
    fn test_register_after_mark_unused() {
        let registry = MemModelRegistry::default();
        let mut rxq = RxQueueInfo::new_in(&registry);
        rxq.mark_unused();
        rxq.register(&eth0(), 0);
    }

    #[test]
    #[should_panic(expected = "never registered")]
    fn test_unregister_before_register() {
        let registry = MemModelRegistry::default();
        let mut rxq = RxQueueInfo::new_in(&registry);
        rxq.unregister();
    }

    #[test]
    #[should_panic(expected = "mark_unused in state Registered")]
    fn test_mark_unused_while_registered() {
        let registry = MemModelRegistry::default();
        let mut rxq = RxQueueInfo::new_in(&registry);
        rxq.register(&eth0(), 0);
        rxq.mark_unused();
    }

    #[test]
    #[should_panic(expected = "mark_unused in state Unregistered")]
    fn test_mark_unused_after_unregister() {
        let registry = MemModelRegistry::default();
        let mut rxq = RxQueueInfo::new_in(&registry);
        rxq.register(&eth0(), 0);
        rxq.unregister();
        rxq.mark_unused();
    }

    #[test]
    fn test_mem_model_requires_registration() {
        let registry = MemModelRegistry::default();
        let mut rxq = RxQueueInfo::new_in(&registry);
        assert_eq!(
            rxq.register_mem_model(MemType::PageOrder0, None),
            Err(Error::NotRegistered)
        );
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = MemModelRegistry::default();
        let dev = eth0();
        {
            let mut rxq = RxQueueInfo::new_in(&registry);
            rxq.register(&dev, 0);
            rxq.register_mem_model(
                MemType::PagePool,
                Some(AllocatorHandle::PagePool(Arc::new(TestPool))),
            )
            .unwrap();
        }
        registry.synchronize();
        assert_eq!(registry.stats().ids_in_use, 0);
    }
}
