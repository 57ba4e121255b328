//! Runtime configuration surfaced by the host's option dispatcher (spec §6).

use crate::consts::DEFAULT_GC_THRESHOLD;

/// Which operand-merging policy the IR instrumentation pass applies to
/// "interaction" opcodes (spec §4.4, modal overrides).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InteractionMode {
    /// Policies (1)-(4) as listed; the default.
    All,
    /// Only add/sub (scalar and vector) keep their merges; multiply,
    /// divide, bitwise and saturation ops are downgraded to policy 5.
    Units,
    /// Arithmetic merges are downgraded to policy 5; comparisons still
    /// merge for their side effect.
    DataflowComparisons,
    /// No interactions are recorded at all; tags only flow through
    /// dataflow (pass-through policies).
    DataflowOnly,
}

impl Default for InteractionMode {
    fn default() -> Self {
        Self::All
    }
}

/// Assembled from `--dyncomp-*` flags (spec §6). Constructed once by the
/// host before any instrumented block runs and threaded through every
/// component.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DynCompConfig {
    /// `--dyncomp-interactions`.
    pub interactions: InteractionMode,
    /// `--dyncomp-approximate-literals`: IR constants get `weak-fresh`
    /// instead of a fresh-per-dynamic-instance tag.
    pub approximate_literals: bool,
    /// `--dyncomp-detailed-mode`: replaces the per-ppt union-find
    /// correction loop with the O(n^2) bitmatrix.
    pub detailed_mode: bool,
    /// `--dyncomp-separate-entry-exit`: emit distinct comparability
    /// numbers for the entry and exit instance of the same variable.
    pub separate_entry_exit: bool,
    /// `--dyncomp-gc-num-tags`; `0` disables the collector.
    pub gc_threshold: u32,
    /// Recursion cap on struct/class base-type field expansion (spec
    /// §4.7).
    pub max_struct_depth: u32,
    /// Recursion cap on nested pointer/array/struct traversal depth.
    pub max_nesting_depth: u32,
    /// Bound on how many levels of pointer indirection the traversal will
    /// dereference for a single variable.
    pub max_ptr_derefs: u32,
}

impl Default for DynCompConfig {
    fn default() -> Self {
        Self {
            interactions: InteractionMode::default(),
            approximate_literals: false,
            detailed_mode: false,
            separate_entry_exit: false,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            max_struct_depth: 10,
            max_nesting_depth: 4,
            max_ptr_derefs: 2,
        }
    }
}

impl DynCompConfig {
    /// Whether GC is enabled at all.
    pub const fn gc_enabled(&self) -> bool {
        self.gc_threshold != 0
    }
}
