//! CPU capability detection

use bitflags::bitflags;

bitflags! {
    /// CPU capabilities relevant to strategy selection
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CpuCapabilities: u32 {
        const I486 = 1 << 0;
        const I586 = 1 << 1;
        const PPRO = 1 << 2;
        const MMX = 1 << 3;
        const THREE_DNOW = 1 << 4;
        const MMXEXT = 1 << 5;
        const SSE = 1 << 6;
        const SSE2 = 1 << 7;
        const ALTIVEC = 1 << 8;
        const FPU = 1 << 9;
    }
}

/// Display names, in report order
const NAMES: &[(CpuCapabilities, &str)] = &[
    (CpuCapabilities::I486, "486"),
    (CpuCapabilities::I586, "586"),
    (CpuCapabilities::PPRO, "Pentium Pro"),
    (CpuCapabilities::MMX, "MMX"),
    (CpuCapabilities::THREE_DNOW, "3DNow!"),
    (CpuCapabilities::MMXEXT, "MMXEXT"),
    (CpuCapabilities::SSE, "SSE"),
    (CpuCapabilities::SSE2, "SSE2"),
    (CpuCapabilities::ALTIVEC, "AltiVec"),
    (CpuCapabilities::FPU, "FPU"),
];

impl CpuCapabilities {
    /// Probe the running CPU
    pub fn detect() -> Self {
        let mut caps = CpuCapabilities::FPU;

        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            caps |= CpuCapabilities::I486 | CpuCapabilities::I586 | CpuCapabilities::PPRO;
            if std::arch::is_x86_feature_detected!("mmx") {
                caps |= CpuCapabilities::MMX;
            }
            if std::arch::is_x86_feature_detected!("sse") {
                // SSE implies the MMX extensions
                caps |= CpuCapabilities::SSE | CpuCapabilities::MMXEXT;
            }
            if std::arch::is_x86_feature_detected!("sse2") {
                caps |= CpuCapabilities::SSE2;
            }
        }

        #[cfg(all(
            any(target_arch = "powerpc", target_arch = "powerpc64"),
            target_feature = "altivec"
        ))]
        {
            caps |= CpuCapabilities::ALTIVEC;
        }

        caps
    }

    /// Capability controlled by a user toggle option (`sse2`, `3dn`, ...)
    pub fn from_toggle(name: &str) -> Option<Self> {
        match name {
            "fpu" => Some(CpuCapabilities::FPU),
            "mmx" => Some(CpuCapabilities::MMX),
            "3dn" => Some(CpuCapabilities::THREE_DNOW),
            "mmxext" => Some(CpuCapabilities::MMXEXT),
            "sse" => Some(CpuCapabilities::SSE),
            "sse2" => Some(CpuCapabilities::SSE2),
            "altivec" => Some(CpuCapabilities::ALTIVEC),
            _ => None,
        }
    }

    /// Space separated capability names, e.g. `"MMX SSE SSE2 FPU"`
    pub fn describe(self) -> String {
        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
