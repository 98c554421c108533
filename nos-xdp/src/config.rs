//! Registry configuration

use alloc::sync::Arc;
use core::fmt;

use crate::allocator::{PageAccounting, PageBackend};
use crate::error::{Error, Result};
use crate::mem::{MemId, MEM_ID_MAX, MEM_ID_MIN};

/// Initial capacity of the id index
pub const DEFAULT_NELEM_HINT: usize = 64;

/// Whether page-pool support is compiled in
#[inline]
pub const fn is_page_pool_compiled_in() -> bool {
    cfg!(feature = "page-pool")
}

/// Configuration of a [`crate::MemModelRegistry`].
#[derive(Clone)]
pub struct RegistryConfig {
    /// Smallest id to issue
    pub id_min: MemId,
    /// Largest id to issue
    pub id_max: MemId,
    /// Initial capacity of the id index
    pub nelem_hint: usize,
    /// Accept [`crate::MemType::PagePool`] models
    pub page_pool_support: bool,
    /// Generic page helpers used by the return paths
    pub page_backend: Arc<dyn PageBackend>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            id_min: MEM_ID_MIN,
            id_max: MEM_ID_MAX,
            nelem_hint: DEFAULT_NELEM_HINT,
            page_pool_support: is_page_pool_compiled_in(),
            page_backend: Arc::new(PageAccounting::new()),
        }
    }
}

impl RegistryConfig {
    /// Restrict the id range to `[min, max]`
    pub fn id_range(mut self, min: MemId, max: MemId) -> Self {
        self.id_min = min;
        self.id_max = max;
        self
    }

    /// Set the initial index capacity
    pub fn nelem_hint(mut self, hint: usize) -> Self {
        self.nelem_hint = hint;
        self
    }

    /// Enable or disable page-pool models
    pub fn page_pool_support(mut self, enabled: bool) -> Self {
        self.page_pool_support = enabled;
        self
    }

    /// Use `backend` for generic page release
    pub fn page_backend(mut self, backend: Arc<dyn PageBackend>) -> Self {
        self.page_backend = backend;
        self
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<()> {
        if self.id_min < MEM_ID_MIN {
            return Err(Error::InvalidConfig("id_min must be at least 1"));
        }
        if self.id_max > MEM_ID_MAX {
            return Err(Error::InvalidConfig("id_max above MEM_ID_MAX"));
        }
        if self.id_min > self.id_max {
            return Err(Error::InvalidConfig("empty id range"));
        }
        Ok(())
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("id_min", &self.id_min)
            .field("id_max", &self.id_max)
            .field("nelem_hint", &self.nelem_hint)
            .field("page_pool_support", &self.page_pool_support)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RegistryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.id_min, 1);
        assert_eq!(config.id_max, 0xFFFE);
        assert_eq!(config.page_pool_support, is_page_pool_compiled_in());
    }

    #[test]
    fn test_rejects_bad_ranges() {
        assert!(RegistryConfig::default().id_range(0, 10).validate().is_err());
        assert!(RegistryConfig::default().id_range(1, 0xFFFF).validate().is_err());
        assert_eq!(
            RegistryConfig::default().id_range(9, 3).validate(),
            Err(Error::InvalidConfig("empty id range"))
        );
        assert!(RegistryConfig::default().id_range(4, 4).validate().is_ok());
    }
}
