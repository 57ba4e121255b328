//! Component C — tag algebra and the instrumentation helper vocabulary
//! (spec §4.3).

use crate::error::DynCompError;
use crate::tag::arena::UfArena;
use crate::tag::shadow::TagShadow;
use crate::tag::{Tag, NO_TAG, WEAK_FRESH};

/// Bundles the union-find arena and the byte-granularity tag shadow and
/// exposes the small, closed vocabulary of helpers the IR instrumentation
/// pass (component D) emits calls to.
///
/// Tag creation itself never triggers GC from within this type -- the
/// owning engine checks [`TagAlgebra::tags_created`] against its
/// configured threshold after each [`TagAlgebra::create_tag`] and invokes
/// [`crate::gc::collect`] out of band, since GC also needs access to every
/// live per-program-point structure and the guest register shadow, which
/// this module deliberately has no knowledge of.
#[derive(Debug, Default)]
pub struct TagAlgebra {
    arena: UfArena,
    shadow: TagShadow,
    tags_created: u64,
}

impl TagAlgebra {
    /// A fresh algebra over empty arena and shadow.
    pub fn new() -> Self {
        Self {
            arena: UfArena::new(),
            shadow: TagShadow::new(),
            tags_created: 0,
        }
    }

    /// Read-only access to the arena, e.g. for `find` in the observation
    /// loop.
    pub fn arena(&self) -> &UfArena {
        &self.arena
    }

    /// Mutable access to the arena.
    pub fn arena_mut(&mut self) -> &mut UfArena {
        &mut self.arena
    }

    /// Read-only access to the shadow memory.
    pub fn shadow(&self) -> &TagShadow {
        &self.shadow
    }

    /// Mutable access to the shadow memory.
    pub fn shadow_mut(&mut self) -> &mut TagShadow {
        &mut self.shadow
    }

    /// Split borrow of the arena (mutable, for `find`) and the shadow
    /// (read-only) together, for callers like the observation loop that
    /// need both at once and would otherwise trip the borrow checker
    /// going through `&mut self` twice.
    pub fn arena_and_shadow_mut(&mut self) -> (&mut UfArena, &TagShadow) {
        (&mut self.arena, &self.shadow)
    }

    /// Split borrow of both the arena and the shadow, mutably, for
    /// callers like the garbage collector that need to mutate both at
    /// once and would otherwise trip the borrow checker going through
    /// `&mut self` twice.
    pub fn arena_and_shadow_both_mut(&mut self) -> (&mut UfArena, &mut TagShadow) {
        (&mut self.arena, &mut self.shadow)
    }

    /// Total tags ever allocated through [`Self::create_tag`]; the engine
    /// compares this against the configured GC threshold.
    pub const fn tags_created(&self) -> u64 {
        self.tags_created
    }

    /// `find(t)`, delegated to the arena.
    pub fn find(&mut self, t: Tag) -> Tag {
        self.arena.find(t)
    }

    /// Allocate a fresh real tag. `static_id` is carried for debug-stats
    /// attribution only and has no effect on the result.
    pub fn create_tag(&mut self, _static_id: u32) -> Result<Tag, DynCompError> {
        self.tags_created += 1;
        self.arena.fresh()
    }

    /// `load_tag_N(addr)`: the merged leader of the N bytes' tags,
    /// rewriting those bytes to the leader.
    pub fn load_tag_n(&mut self, addr: u64, n: u64) -> Result<Tag, DynCompError> {
        self.shadow.merge_range(addr, n, &mut self.arena)
    }

    /// `store_tag_N(addr, t)`: writes `t` (or a freshly allocated tag if
    /// `t` is weak-fresh) across N bytes.
    pub fn store_tag_n(&mut self, addr: u64, n: u64, t: Tag) -> Result<(), DynCompError> {
        if t == WEAK_FRESH {
            self.tags_created += 1;
        }
        self.shadow.set_tag_range(addr, n, t, &mut self.arena)?;
        Ok(())
    }

    /// `merge_tags(t1, t2)`: `union(t1, t2)` with zero short-circuits and
    /// weak-fresh absorption applied uniformly (spec §4.3).
    pub fn merge_tags(&mut self, t1: Tag, t2: Tag) -> Tag {
        if t1 == NO_TAG {
            return t2;
        }
        if t2 == NO_TAG {
            return t1;
        }
        if t1 == WEAK_FRESH {
            return t2;
        }
        if t2 == WEAK_FRESH {
            return t1;
        }
        self.arena.union(t1, t2)
    }

    /// `merge_tags_return_0`: performs the union for its side effect only;
    /// the result tag is always `0`. A zero operand skips the union
    /// entirely, matching `merge(0, x)` never reaching [`UfArena::union`].
    pub fn merge_tags_return_0(&mut self, t1: Tag, t2: Tag) -> Tag {
        if t1 != NO_TAG && t2 != NO_TAG {
            let _ = self.merge_tags(t1, t2);
        }
        NO_TAG
    }

    /// Pairwise-composed merge of three tags, returning the final leader.
    pub fn merge_3_tags(&mut self, t1: Tag, t2: Tag, t3: Tag) -> Tag {
        let m = self.merge_tags(t1, t2);
        self.merge_tags(m, t3)
    }

    /// Pairwise-composed merge of four tags, returning the final leader.
    pub fn merge_4_tags(&mut self, t1: Tag, t2: Tag, t3: Tag, t4: Tag) -> Tag {
        let m = self.merge_3_tags(t1, t2, t3);
        self.merge_tags(m, t4)
    }

    /// No-op that exists only so the caller's address-tag expression tree
    /// is anchored against dead-code elimination by the optimizer that
    /// lowers the generated IR; the result equals the input unchanged.
    pub const fn tag_nop(t: Tag) -> Tag {
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_zero_absorption() {
        let mut alg = TagAlgebra::new();
        let t = alg.create_tag(0).unwrap();
        assert_eq!(alg.merge_tags(NO_TAG, t), t);
        assert_eq!(alg.merge_tags(t, NO_TAG), t);
    }

    #[test]
    fn merge_weak_fresh_absorption() {
        let mut alg = TagAlgebra::new();
        let t = alg.create_tag(0).unwrap();
        assert_eq!(alg.merge_tags(WEAK_FRESH, t), t);
        assert_eq!(alg.merge_tags(t, WEAK_FRESH), t);
    }

    #[test]
    fn merge_return_0_skips_union_on_zero_operand() {
        let mut alg = TagAlgebra::new();
        let t = alg.create_tag(0).unwrap();
        assert_eq!(alg.merge_tags_return_0(NO_TAG, t), NO_TAG);
        // t must remain its own leader: no union happened.
        assert_eq!(alg.find(t), t);
    }

    #[test]
    fn merge_return_0_still_unions_two_real_tags() {
        let mut alg = TagAlgebra::new();
        let a = alg.create_tag(0).unwrap();
        let b = alg.create_tag(0).unwrap();
        assert_eq!(alg.merge_tags_return_0(a, b), NO_TAG);
        assert_eq!(alg.find(a), alg.find(b));
    }

    #[test]
    fn store_weak_fresh_materializes() {
        let mut alg = TagAlgebra::new();
        alg.store_tag_n(0, 4, WEAK_FRESH).unwrap();
        let t = alg.load_tag_n(0, 4).unwrap();
        assert_ne!(t, WEAK_FRESH);
        assert_ne!(t, NO_TAG);
    }
}
