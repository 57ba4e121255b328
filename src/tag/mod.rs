//! The tag type and its three reserved values (spec §3, "Tag").

pub mod algebra;
pub mod arena;
pub mod shadow;

pub use algebra::TagAlgebra;
pub use arena::UfArena;
pub use shadow::TagShadow;

/// A 32-bit value identity. Two values are comparable iff their tags share
/// a union-find root.
pub type Tag = u32;

/// No tag: propagates as identity under merge, and is never passed to
/// [`UfArena::union`].
pub const NO_TAG: Tag = 0;

/// The largest tag value a real (non-reserved) allocation may take.
pub const MAX_REAL_TAG: Tag = Tag::MAX - 1;

/// Weak-fresh: used for `$sp`, `$fp`, GOT contents, and (under
/// `approximate_literals`) IR constants. Absorbs into the other operand
/// under merge; materializes into a freshly allocated real tag on store.
pub const WEAK_FRESH: Tag = Tag::MAX;

/// True if `t` is one of the two reserved sentinels (`NO_TAG` excluded,
/// since callers usually special-case it separately).
pub const fn is_weak_fresh(t: Tag) -> bool {
    t == WEAK_FRESH
}
