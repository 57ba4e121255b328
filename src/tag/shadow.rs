//! Component B — the tag shadow memory (spec §4.2).

use crate::consts::MAX_GUEST_ADDR;
use crate::error::{DynCompError, InvariantError};
use crate::tag::arena::UfArena;
use crate::tag::{Tag, NO_TAG, WEAK_FRESH};

const PAGE_BITS: u32 = 16;
const PAGE_SIZE: usize = 1 << PAGE_BITS;
const PAGE_MASK: u64 = (PAGE_SIZE as u64) - 1;

fn split(addr: u64) -> (usize, usize) {
    ((addr >> PAGE_BITS) as usize, (addr & PAGE_MASK) as usize)
}

/// Sparse two-level array mapping each guest byte address to a tag. Reads
/// of an unbacked page return `0`; pages are allocated zero-filled on
/// first write.
#[derive(Debug, Default)]
pub struct TagShadow {
    pages: Vec<Option<Box<[Tag; PAGE_SIZE]>>>,
    address_cap: u64,
}

impl TagShadow {
    /// A fresh shadow tracking addresses up to `MAX_GUEST_ADDR`.
    pub fn new() -> Self {
        Self::with_cap(MAX_GUEST_ADDR)
    }

    /// A fresh shadow with an explicit address-space cap.
    pub fn with_cap(address_cap: u64) -> Self {
        Self {
            pages: Vec::new(),
            address_cap,
        }
    }

    fn check_addr(&self, addr: u64) -> Result<(), DynCompError> {
        if addr > self.address_cap {
            return Err(InvariantError::ShadowAddressOverflow {
                addr,
                cap: self.address_cap,
            }
            .into());
        }
        Ok(())
    }

    /// Returns `0` if the containing page was never written.
    pub fn get_tag(&self, addr: u64) -> Tag {
        let (page_idx, off) = split(addr);
        self.pages
            .get(page_idx)
            .and_then(|p| p.as_deref())
            .map(|page| page[off])
            .unwrap_or(NO_TAG)
    }

    fn page_mut(&mut self, addr: u64) -> Result<&mut Tag, DynCompError> {
        self.check_addr(addr)?;
        let (page_idx, off) = split(addr);
        if page_idx >= self.pages.len() {
            self.pages.resize_with(page_idx + 1, || None);
        }
        let page = self.pages[page_idx].get_or_insert_with(|| Box::new([NO_TAG; PAGE_SIZE]));
        Ok(&mut page[off])
    }

    /// Write `t` into byte `addr`, allocating the page on first touch.
    pub fn set_tag(&mut self, addr: u64, t: Tag) -> Result<(), DynCompError> {
        *self.page_mut(addr)? = t;
        Ok(())
    }

    /// Write `t` to every byte in `[addr, addr+n)`. A write of
    /// `WEAK_FRESH` is rewritten to a freshly allocated real tag first, so
    /// stored tags in the shadow are never `WEAK_FRESH` (spec §4.2).
    pub fn set_tag_range(&mut self, addr: u64, n: u64, t: Tag, arena: &mut UfArena) -> Result<Tag, DynCompError> {
        let real = if t == WEAK_FRESH { arena.fresh()? } else { t };
        for i in 0..n {
            self.set_tag(addr + i, real)?;
        }
        Ok(real)
    }

    /// Visit every nonzero cell across every allocated page, replacing it
    /// in place with `f(cell)`. Used by the garbage collector's shadow
    /// sweep (spec §4.6 step 2); unallocated pages are never touched,
    /// since they are definitionally all-zero.
    pub fn for_each_tag_mut(&mut self, mut f: impl FnMut(Tag) -> Tag) {
        for page in self.pages.iter_mut().flatten() {
            for cell in page.iter_mut() {
                if *cell != NO_TAG {
                    *cell = f(*cell);
                }
            }
        }
    }

    /// Find the first nonzero byte-tag in `[addr, addr+n)`, union every
    /// other nonzero byte-tag into it, overwrite the whole range with the
    /// resulting leader, and return it (or `0` if the whole range is
    /// untagged). Idempotent: a second call with the same range performs
    /// no further unions and returns the same leader (spec §8).
    pub fn merge_range(&mut self, addr: u64, n: u64, arena: &mut UfArena) -> Result<Tag, DynCompError> {
        if n == 0 {
            return Ok(NO_TAG);
        }

        let mut leader = NO_TAG;
        for i in 0..n {
            let t = self.get_tag(addr + i);
            if t == NO_TAG {
                continue;
            }
            leader = if leader == NO_TAG {
                arena.find(t)
            } else {
                arena.union(leader, t)
            };
        }

        if leader != NO_TAG {
            for i in 0..n {
                self.set_tag(addr + i, leader)?;
            }
        }

        Ok(leader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_page_reads_zero() {
        let s = TagShadow::new();
        assert_eq!(s.get_tag(12345), NO_TAG);
    }

    #[test]
    fn weak_fresh_materializes_on_store() {
        let mut s = TagShadow::new();
        let mut a = UfArena::new();
        let real = s.set_tag_range(0, 4, WEAK_FRESH, &mut a).unwrap();
        assert_ne!(real, WEAK_FRESH);
        assert_ne!(real, NO_TAG);
        for i in 0..4 {
            assert_eq!(s.get_tag(i), real);
        }
    }

    #[test]
    fn merge_range_is_idempotent() {
        let mut s = TagShadow::new();
        let mut a = UfArena::new();
        let t1 = a.fresh().unwrap();
        let t2 = a.fresh().unwrap();
        s.set_tag(0, t1).unwrap();
        s.set_tag(1, t2).unwrap();

        let leader1 = s.merge_range(0, 2, &mut a).unwrap();
        let leader2 = s.merge_range(0, 2, &mut a).unwrap();
        assert_eq!(leader1, leader2);
    }

    #[test]
    fn merge_range_all_zero_returns_zero() {
        let mut s = TagShadow::new();
        let mut a = UfArena::new();
        assert_eq!(s.merge_range(100, 8, &mut a).unwrap(), NO_TAG);
    }

    #[test]
    fn overflow_is_rejected() {
        let mut s = TagShadow::with_cap(10);
        let mut a = UfArena::new();
        assert!(s.set_tag(11, 1).is_err());
        let _ = &mut a;
    }
}
