//! Component E — per-program-point structures (spec §3, §4.5).

pub mod observe;
mod varufmap;

pub use varufmap::VarUfMap;

use crate::tag::{Tag, NO_TAG};

/// Packed upper-triangle bit matrix used by detailed mode: `bit(i, j)` for
/// `i < j` records "variables `i` and `j` were observed to share a tag at
/// least once". Stored as `((n^2 - n) / 2 + 7) / 8` bytes (spec §3).
#[derive(Debug, Clone)]
pub struct BitMatrix {
    n: usize,
    bits: Vec<u8>,
}

impl BitMatrix {
    /// A zeroed matrix for `n` variables.
    pub fn new(n: usize) -> Self {
        let pair_count = n.saturating_mul(n.saturating_sub(1)) / 2;
        let bytes = (pair_count + 7) / 8;
        Self { n, bits: vec![0; bytes] }
    }

    fn index(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        debug_assert!(j < self.n && i < j);
        // Row-major offset into the upper triangle excluding the diagonal.
        i * self.n - i * (i + 1) / 2 + (j - i - 1)
    }

    /// Whether `(i, j)` has ever been marked. `i == j` is always `false`.
    pub fn get(&self, i: usize, j: usize) -> bool {
        if i == j {
            return false;
        }
        let bit = self.index(i, j);
        (self.bits[bit / 8] >> (bit % 8)) & 1 == 1
    }

    /// OR `value` into `(i, j)`. No-op if `i == j`.
    pub fn or_set(&mut self, i: usize, j: usize, value: bool) {
        if i == j || !value {
            return;
        }
        let bit = self.index(i, j);
        self.bits[bit / 8] |= 1 << (bit % 8);
    }
}

/// One per `(function, entry|exit)`. Lives for the whole process once
/// created by the declarations pass.
#[derive(Debug, Clone)]
pub struct ProgramPoint {
    /// The fixed count of catalog variables visited at this point.
    pub num_vars: usize,
    /// Current leader tag of the equivalence class each variable has been
    /// observed to hold, indexed by variable serial number.
    pub var_tags: Vec<Tag>,
    /// The per-ppt union-find over global leader tags (disjoint from the
    /// arena). Unused in detailed mode.
    pub var_uf_map: VarUfMap,
    /// Detailed-mode scratch, `None` unless `--dyncomp-detailed-mode` is
    /// active.
    pub detailed: Option<DetailedState>,
}

/// The O(n^2) detailed-mode alternative to `var_uf_map` (spec §4.5).
#[derive(Debug, Clone)]
pub struct DetailedState {
    /// Upper-triangle "observed comparable at least once" matrix.
    pub bitmatrix: BitMatrix,
    /// Scratch filled once per program-point execution before the
    /// post-visit OR pass.
    pub new_tag_leaders: Vec<Tag>,
}

impl ProgramPoint {
    /// A fresh program point tracking `num_vars` variables.
    pub fn new(num_vars: usize, detailed_mode: bool) -> Self {
        Self {
            num_vars,
            var_tags: vec![NO_TAG; num_vars],
            var_uf_map: VarUfMap::new(),
            detailed: detailed_mode.then(|| DetailedState {
                bitmatrix: BitMatrix::new(num_vars),
                new_tag_leaders: vec![NO_TAG; num_vars],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmatrix_roundtrips() {
        let mut m = BitMatrix::new(5);
        assert!(!m.get(1, 3));
        m.or_set(1, 3, true);
        assert!(m.get(1, 3));
        assert!(m.get(3, 1));
        assert!(!m.get(0, 1));
    }

    #[test]
    fn bitmatrix_diagonal_is_always_false() {
        let m = BitMatrix::new(4);
        for i in 0..4 {
            assert!(!m.get(i, i));
        }
    }
}
