//! Crate-wide constants: tag space layout, memory shadow geometry, defaults.

/// Default tag-creation count at which the garbage collector triggers, per
/// `--dyncomp-gc-num-tags`. `0` disables GC entirely.
pub const DEFAULT_GC_THRESHOLD: u32 = 10_000_000;

/// Size, in bytes, of a secondary page in the two-level tag shadow memory.
pub const SHADOW_PAGE_BITS: u32 = 16;

/// Number of bytes covered by one secondary page.
pub const SHADOW_PAGE_SIZE: usize = 1 << SHADOW_PAGE_BITS;

/// Number of entries in the primary shadow-memory table (covers a 32-bit
/// guest address space split into `SHADOW_PAGE_SIZE`-byte pages).
pub const SHADOW_PRIMARY_ENTRIES: usize = 1 << (32 - SHADOW_PAGE_BITS);

/// The largest guest address the shadow memory will track. Writes beyond
/// this are a fatal address-space overflow (spec §7).
pub const MAX_GUEST_ADDR: u64 = (1u64 << 32) - 1;

/// Number of bytes in one guest machine word, used by the guest-register
/// shadow offset formula (spec §4.4): `4 * guest_offset + 3 *
/// guest_state_bytes`.
pub const REGISTER_SHADOW_MULTIPLIER: u64 = 4;

/// Multiplier applied to the host's total guest-state size to locate the
/// tag-shadow region past the host's own allocated/initialized shadows.
pub const REGISTER_SHADOW_BASE_MULTIPLIER: u64 = 3;

/// Upper bound on how many bytes the emitter scans looking for a `char*`
/// NUL terminator. A string whose allocation is shorter than this renders
/// as empty rather than reading past its allocation (spec §6).
pub const MAX_STRING_SCAN_BYTES: usize = 256;
