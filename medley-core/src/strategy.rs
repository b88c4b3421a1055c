//! Memory copy strategy
//!
//! The strategy is resolved once per instance from the module bank and kept
//! for the instance lifetime. Without a matching module the portable copy is
//! used.

use crate::cpu::CpuCapabilities;
use crate::error::EngineError;
use crate::modules::{ModuleRegistry, StrategyHandle, CAP_MEMCPY};
use tracing::{debug, info};

/// Name reported for the portable fallback
pub const PORTABLE: &str = "portable";

/// Copy routine selected for an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyStrategy {
    handle: Option<StrategyHandle>,
}

impl CopyStrategy {
    /// Ask the bank for the best copy module usable with `cpu`
    ///
    /// `preferred` (the `memcpy` option) restricts the choice to one module.
    pub fn resolve(
        registry: &dyn ModuleRegistry,
        preferred: Option<&str>,
        cpu: CpuCapabilities,
    ) -> Self {
        let handle = registry.need(CAP_MEMCPY, preferred, cpu);

        match &handle {
            Some(h) => debug!("Copy strategy: {}", h.module),
            None => info!(
                "{}, using the {} copy",
                EngineError::NotSupported(format!(
                    "no {} module for CPU [{}]",
                    CAP_MEMCPY,
                    cpu.describe()
                )),
                PORTABLE
            ),
        }

        Self { handle }
    }

    /// Portable strategy, not backed by a module
    pub fn portable() -> Self {
        Self { handle: None }
    }

    pub fn name(&self) -> &str {
        self.handle.as_ref().map_or(PORTABLE, |h| h.module.as_str())
    }

    /// Module handle to give back to the bank on destroy
    pub fn handle(&self) -> Option<&StrategyHandle> {
        self.handle.as_ref()
    }

    /// Copy `src` into the front of `dst`
    ///
    /// Returns the number of bytes copied.
    pub fn copy(&self, dst: &mut [u8], src: &[u8]) -> usize {
        let len = dst.len().min(src.len());
        dst[..len].copy_from_slice(&src[..len]);
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portable_copy() {
        let strategy = CopyStrategy::portable();
        assert_eq!(strategy.name(), PORTABLE);
        assert!(strategy.handle().is_none());

        let mut dst = [0u8; 3];
        assert_eq!(strategy.copy(&mut dst, &[1, 2, 3, 4]), 3);
        assert_eq!(dst, [1, 2, 3]);
    }
}
