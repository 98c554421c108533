//! Memory model registry
//!
//! Maps memory model ids to the allocator that backs them. Mutations
//! (id issue, insert, remove) are serialized by one lock around the id
//! pool. Lookups take no lock: the index is an RCU-published snapshot and
//! a removed entry, together with its id, is only reclaimed after every
//! reader that might have found it has left its critical section.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::hash::{BuildHasherDefault, Hasher};
use core::sync::atomic::{AtomicU64, Ordering};
use hashbrown::HashMap;
use spin::{Mutex, Once};

use crate::allocator::{AllocatorHandle, PageBackend};
use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::id_alloc::MemIdAllocator;
use crate::mem::{MemId, MemInfo, MemType};
use crate::rcu::{GracePeriod, RcuCell, RcuReadGuard};

/// Hasher for memory model ids.
///
/// Ids are small and issued cyclically, so the id itself is a good bucket
/// index. It is multiplied out so the high bits hashbrown uses for its
/// control tags are populated too.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemIdHasher(u64);

impl Hasher for MemIdHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 = (self.0 << 8) | u64::from(byte);
        }
        self.0 = self.0.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    }

    fn write_u32(&mut self, id: u32) {
        self.0 = u64::from(id).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    }
}

type MemIdTable = HashMap<MemId, Arc<AllocatorEntry>, BuildHasherDefault<MemIdHasher>>;

/// Registry entry for one bound memory model
#[derive(Debug)]
pub struct AllocatorEntry {
    mem: MemInfo,
    handle: AllocatorHandle,
}

impl AllocatorEntry {
    /// Descriptor the entry was registered with
    pub fn mem(&self) -> MemInfo {
        self.mem
    }

    /// Allocator behind the id
    pub fn handle(&self) -> &AllocatorHandle {
        &self.handle
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Entries reachable through lookup
    pub live_entries: usize,
    /// Ids issued and not yet reclaimed
    pub ids_in_use: usize,
    /// Deferred callbacks (entries and index snapshots) not yet run
    pub pending_callbacks: usize,
    /// Page-pool returns that found no entry and used the generic path
    pub fallback_releases: u64,
}

/// Registry of memory models, keyed by id.
///
/// Every insert and remove publishes a full copy of the index, so a
/// mutation costs O(live entries) and filling the whole id range is
/// quadratic. Lookups stay O(1) and lock-free.
pub struct MemModelRegistry {
    /// Mutation lock; also guards the id pool it wraps
    ids: Arc<Mutex<MemIdAllocator>>,
    /// Built on first use
    table: Once<RcuCell<MemIdTable>>,
    grace: GracePeriod,
    nelem_hint: usize,
    page_pool_support: bool,
    page_backend: Arc<dyn PageBackend>,
    pub(crate) fallback_releases: AtomicU64,
}

impl Default for MemModelRegistry {
    fn default() -> Self {
        Self::from_validated(RegistryConfig::default())
    }
}

impl MemModelRegistry {
    /// Create a registry from `config`
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: RegistryConfig) -> Self {
        Self {
            ids: Arc::new(Mutex::new(MemIdAllocator::new(config.id_min, config.id_max))),
            table: Once::new(),
            grace: GracePeriod::new(),
            nelem_hint: config.nelem_hint,
            page_pool_support: config.page_pool_support,
            page_backend: config.page_backend,
            fallback_releases: AtomicU64::new(0),
        }
    }

    /// Build the id index if it does not exist yet
    pub fn ensure_initialized(&self) {
        self.table();
    }

    /// Whether the id index has been built
    pub fn is_initialized(&self) -> bool {
        self.table.is_completed()
    }

    fn table(&self) -> &RcuCell<MemIdTable> {
        self.table.call_once(|| {
            xdp_debug!("mem id table initialized, capacity {}", self.nelem_hint);
            RcuCell::new(MemIdTable::with_capacity_and_hasher(
                self.nelem_hint,
                Default::default(),
            ))
        })
    }

    /// Whether models of `mem_type` can be bound in this registry
    pub fn is_supported(&self, mem_type: MemType) -> bool {
        match mem_type {
            MemType::PagePool => self.page_pool_support,
            MemType::PageShared | MemType::PageOrder0 | MemType::ZeroCopy => true,
        }
    }

    /// Generic page helpers used by the return paths
    pub fn page_backend(&self) -> &dyn PageBackend {
        &*self.page_backend
    }

    /// Enter a read-side critical section
    #[inline]
    pub fn read_lock(&self) -> RcuReadGuard<'_> {
        self.grace.read_lock()
    }

    /// Register `handle` under a fresh id.
    ///
    /// Fails with [`Error::AllocationFailed`] when no id is free.
    pub fn insert(&self, mem_type: MemType, handle: AllocatorHandle) -> Result<MemId> {
        if !self.is_supported(mem_type) {
            return Err(Error::UnsupportedType(mem_type.as_raw()));
        }
        if handle.mem_type() != mem_type {
            return Err(Error::InvalidArgument(
                "allocator handle does not match memory type",
            ));
        }

        // Finished reclaims return their ids before we pick a new one.
        self.grace.poll();
        let table = self.table();

        let mut ids = self.ids.lock();
        let id = ids.acquire().map_err(|err| {
            xdp_warn!("cannot register mem model: {}", err);
            Error::AllocationFailed("memory model id space exhausted")
        })?;

        let entry = Arc::new(AllocatorEntry {
            mem: MemInfo::new(id, mem_type),
            handle,
        });
        // SAFETY: `ids` is locked, which serializes every table update.
        unsafe {
            table.update(&self.grace, |current| {
                let mut next = current.clone();
                if next.insert(id, entry).is_some() {
                    contract_violation!("mem id {} is already in the table", id);
                }
                next
            });
        }
        drop(ids);

        xdp_debug!("mem model {:?} registered with id {}", mem_type, id);
        Ok(id)
    }

    /// Look up `id` for the lifetime of `guard`.
    ///
    /// `guard` must come from [`MemModelRegistry::read_lock`] on this
    /// registry; a guard of any other domain does not hold off reclamation
    /// here and is a fatal error.
    pub fn lookup<'g>(
        &'g self,
        guard: &'g RcuReadGuard<'_>,
        id: MemId,
    ) -> Option<&'g AllocatorEntry> {
        if !guard.belongs_to(&self.grace) {
            contract_violation!("mem id {} looked up with a guard of another registry", id);
        }
        if id == 0 {
            return None;
        }
        let table = self.table.get()?;
        table.read(guard).get(&id).map(|entry| &**entry)
    }

    /// Unlink `id` and reclaim it after a grace period.
    ///
    /// The entry disappears from lookups immediately. Its id goes back to
    /// the pool, and the entry is dropped, only once every reader that was
    /// active at unlink time has left. Returns whether an entry was found.
    pub fn remove_and_reclaim(&self, id: MemId) -> bool {
        if id == 0 {
            return false;
        }
        let Some(table) = self.table.get() else {
            return false;
        };

        let ids = self.ids.lock();
        // SAFETY: `ids` is locked, see `insert`.
        let Some(entry) = unsafe { table.current() }.get(&id).cloned() else {
            return false;
        };
        // SAFETY: as above.
        unsafe {
            table.update(&self.grace, |current| {
                let mut next = current.clone();
                next.remove(&id);
                next
            });
        }

        let pool = Arc::clone(&self.ids);
        self.grace.call(Box::new(move || {
            pool.lock().release(entry.mem.id);
            xdp_trace!("mem id {} reclaimed", entry.mem.id);
        }));
        drop(ids);

        xdp_debug!("mem model id {} unlinked", id);
        // Callbacks take the mutation lock, so only poll once it is released.
        self.grace.poll();
        true
    }

    /// Run reclamation that is due, without waiting
    pub fn reclaim(&self) -> usize {
        self.grace.poll()
    }

    /// Wait until every removed entry has been reclaimed.
    ///
    /// Must not be called while holding a read guard of this registry.
    pub fn synchronize(&self) {
        self.grace.synchronize();
    }

    /// Current statistics
    pub fn stats(&self) -> RegistryStats {
        let live_entries = match self.table.get() {
            Some(table) => {
                let guard = self.read_lock();
                table.read(&guard).len()
            }
            None => 0,
        };
        RegistryStats {
            live_entries,
            ids_in_use: self.ids.lock().in_use(),
            pending_callbacks: self.grace.pending(),
            fallback_releases: self.fallback_releases.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for MemModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemModelRegistry")
            .field("initialized", &self.is_initialized())
            .field("page_pool_support", &self.page_pool_support)
            .finish_non_exhaustive()
    }
}

/// Process-wide registry
static GLOBAL_REGISTRY: Once<MemModelRegistry> = Once::new();

/// Install the process-wide registry with `config`.
///
/// Fails if the registry already exists, either from an earlier call or
/// because [`registry`] created it with defaults.
pub fn init_registry(config: RegistryConfig) -> Result<&'static MemModelRegistry> {
    config.validate()?;
    let mut installed = false;
    let registry = GLOBAL_REGISTRY.call_once(|| {
        installed = true;
        MemModelRegistry::from_validated(config)
    });
    if !installed {
        xdp_warn!("memory model registry already initialized");
        return Err(Error::InvalidConfig("registry already initialized"));
    }
    Ok(registry)
}

/// The process-wide registry, created with defaults on first use
pub fn registry() -> &'static MemModelRegistry {
    GLOBAL_REGISTRY.call_once(MemModelRegistry::default)
}
