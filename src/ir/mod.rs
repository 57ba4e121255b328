//! Component D — the IR instrumentation pass (spec §4.4).
//!
//! This module is the tag-side half of "for every IR expression produces a
//! parallel tag-expression": given the policy an opcode classifies to
//! (see [`policy`]) and the operand tags already computed by a prior
//! instrumentation step, it performs the merge (or not) and returns the
//! result tag the caller should thread onward as if it were the value's
//! own tag-expression node.

pub mod policy;

pub use policy::{InteractionPolicy, IrOp};

use crate::config::DynCompConfig;
use crate::consts::{REGISTER_SHADOW_BASE_MULTIPLIER, REGISTER_SHADOW_MULTIPLIER};
use crate::error::DynCompError;
use crate::tag::algebra::TagAlgebra;
use crate::tag::{Tag, NO_TAG, WEAK_FRESH};

const WORD_SIZE: u64 = 8;

/// Apply a binary [`InteractionPolicy`] to two already-tagged operands.
pub fn instrument_binary(alg: &mut TagAlgebra, policy: InteractionPolicy, t1: Tag, t2: Tag) -> Tag {
    match policy {
        InteractionPolicy::MergeBothPassThrough => alg.merge_tags(t1, t2),
        InteractionPolicy::MergeBothReturnZero => alg.merge_tags_return_0(t1, t2),
        InteractionPolicy::PassThroughFirst => t1,
        InteractionPolicy::PassThroughSecond => t2,
        InteractionPolicy::ResultZero => NO_TAG,
    }
}

/// `fma(mode, x, y)`: the rounding-mode operand's tag is discarded; `x`
/// and `y`'s tags are merged and that leader returned (spec §4.4 policy
/// 4).
pub fn instrument_fma(alg: &mut TagAlgebra, _rounding_mode_tag: Tag, t2: Tag, t3: Tag) -> Tag {
    alg.merge_tags(t2, t3)
}

/// `Const` literal handling (spec §4.4 policy 6): a fresh tag per dynamic
/// instance by default, or `WEAK_FRESH` under `--dyncomp-approximate-literals`.
pub fn instrument_const(alg: &mut TagAlgebra, config: &DynCompConfig, static_id: u32) -> Result<Tag, DynCompError> {
    if config.approximate_literals {
        Ok(WEAK_FRESH)
    } else {
        alg.create_tag(static_id)
    }
}

/// A memory load's result tag is purely a function of the stored-byte
/// tags, never of the address: `addr_tag` is run through `tag_nop` only
/// so the compiler that lowers the generated IR keeps the address
/// expression's side-effecting merges alive, and is otherwise discarded
/// (spec §4.4, "Address tags do not flow into loaded values").
pub fn instrument_load(alg: &mut TagAlgebra, addr_tag: Tag, addr: u64, width: u64) -> Result<Tag, DynCompError> {
    let _anchor = TagAlgebra::tag_nop(addr_tag);
    alg.load_tag_n(addr, width)
}

/// Guest-state register shadow offset: `4 * guest_offset + 3 *
/// guest_state_bytes` (spec §4.4). The caller adds the host's guest-state
/// base address to locate the actual shadow byte.
pub const fn register_shadow_offset(guest_offset: u64, guest_state_bytes: u64) -> u64 {
    REGISTER_SHADOW_MULTIPLIER * guest_offset + REGISTER_SHADOW_BASE_MULTIPLIER * guest_state_bytes
}

/// Read a guest register's tag. `is_sp_or_fp` must be true for exactly the
/// stack-pointer and frame-pointer registers, which always read as
/// `WEAK_FRESH` regardless of what was last stored (spec §4.4).
pub fn load_register_tag(
    alg: &mut TagAlgebra,
    guest_state_base: u64,
    guest_offset: u64,
    guest_state_bytes: u64,
    is_sp_or_fp: bool,
) -> Result<Tag, DynCompError> {
    if is_sp_or_fp {
        return Ok(WEAK_FRESH);
    }
    let addr = guest_state_base + register_shadow_offset(guest_offset, guest_state_bytes);
    alg.load_tag_n(addr, WORD_SIZE)
}

/// Write a guest register's tag. A put into `$sp` or `$fp` is silently
/// suppressed: addresses computed from those registers would otherwise
/// merge every stack variable into one giant class (spec §4.4).
pub fn store_register_tag(
    alg: &mut TagAlgebra,
    guest_state_base: u64,
    guest_offset: u64,
    guest_state_bytes: u64,
    is_sp_or_fp: bool,
    t: Tag,
) -> Result<(), DynCompError> {
    if is_sp_or_fp {
        return Ok(());
    }
    let addr = guest_state_base + register_shadow_offset(guest_offset, guest_state_bytes);
    alg.store_tag_n(addr, WORD_SIZE, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InteractionMode;

    #[test]
    fn shift_preserves_left_isolates_right() {
        let mut alg = TagAlgebra::new();
        let x = alg.create_tag(0).unwrap();
        let k = alg.create_tag(0).unwrap();
        let policy = IrOp::ShiftRotate.classify(InteractionMode::All);
        let z = instrument_binary(&mut alg, policy, x, k);
        assert_eq!(alg.find(z), alg.find(x));
        assert_ne!(alg.find(z), alg.find(k));
    }

    #[test]
    fn comparison_isolates_result_but_merges_operands() {
        let mut alg = TagAlgebra::new();
        let x = alg.create_tag(0).unwrap();
        let y = alg.create_tag(0).unwrap();
        let policy = IrOp::Compare.classify(InteractionMode::All);
        let z = instrument_binary(&mut alg, policy, x, y);
        assert_eq!(z, NO_TAG);
        assert_eq!(alg.find(x), alg.find(y));
    }

    #[test]
    fn fma_merges_value_operands_not_rounding_mode() {
        let mut alg = TagAlgebra::new();
        let mode = alg.create_tag(0).unwrap();
        let x = alg.create_tag(0).unwrap();
        let y = alg.create_tag(0).unwrap();
        let z = instrument_fma(&mut alg, mode, x, y);
        assert_eq!(alg.find(z), alg.find(x));
        assert_eq!(alg.find(x), alg.find(y));
        assert_ne!(alg.find(z), alg.find(mode));
    }

    #[test]
    fn sp_register_always_weak_fresh_and_puts_are_dropped() {
        let mut alg = TagAlgebra::new();
        let real = alg.create_tag(0).unwrap();
        store_register_tag(&mut alg, 0, 5, 4096, true, real).unwrap();
        let read = load_register_tag(&mut alg, 0, 5, 4096, true).unwrap();
        assert_eq!(read, WEAK_FRESH);
    }

    #[test]
    fn ordinary_register_roundtrips() {
        let mut alg = TagAlgebra::new();
        let real = alg.create_tag(0).unwrap();
        store_register_tag(&mut alg, 0, 9, 4096, false, real).unwrap();
        let read = load_register_tag(&mut alg, 0, 9, 4096, false).unwrap();
        assert_eq!(alg.find(read), alg.find(real));
    }

    #[test]
    fn load_ignores_address_tag() {
        let mut alg = TagAlgebra::new();
        let addr_tag = alg.create_tag(0).unwrap();
        let byte_tag = alg.create_tag(0).unwrap();
        alg.store_tag_n(64, 4, byte_tag).unwrap();
        let loaded = instrument_load(&mut alg, addr_tag, 64, 4).unwrap();
        assert_eq!(alg.find(loaded), alg.find(byte_tag));
        assert_ne!(alg.find(loaded), alg.find(addr_tag));
    }
}
