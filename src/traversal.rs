//! Component H — variable catalog traversal (spec §4.7).
//!
//! Walks a function's formals, locals, and return variables out to every
//! leaf the trace emitter will name, expanding pointers, arrays, struct
//! fields, and superclasses, subject to the bounds in [`DynCompConfig`]
//! and a visited-type guard against self-referential structs.

use itertools::Itertools;

use crate::catalog::{Catalog, DisambiguationOverride, TypeEntry, TypeId, VariableEntry};
use crate::config::DynCompConfig;
use crate::host::DbiHost;

/// Where a visited variable's address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableOrigin {
    /// A formal, local, global, or return variable named directly in the
    /// catalog.
    Direct,
    /// Reached by dereferencing a pointer `depth` levels deep.
    PointerDeref { depth: u32 },
    /// The base of a static array of base-scalar/pointer elements,
    /// flattened (row-major, across every dimension) into a single
    /// sequence visit of `element_count` elements sharing this name
    /// (spec §4.7).
    Sequence { element_count: u32 },
    /// A field of a struct/class, `depth` levels of nesting below the
    /// variable that anchors the traversal.
    StructField { depth: u32 },
    /// A field inherited from a (transitively flattened) superclass.
    SuperclassField,
}

/// One fully-resolved variable instance ready for observation/emission:
/// a name path, its guest address (if it has one), its static type, and
/// why the traversal produced it.
#[derive(Debug, Clone)]
pub struct VisitedVariable {
    /// Dotted path from the root variable, e.g. `"node->next->value"`.
    pub path: String,
    pub addr: Option<u64>,
    /// For a scalar leaf, its own byte size. For a sequence, the byte
    /// size of one element -- element `i` lives at `addr + i * byte_size`.
    pub byte_size: u32,
    pub type_id: TypeId,
    pub origin: VariableOrigin,
    /// True if the address is provably non-dereferenceable (a null
    /// pointer, or a pointer traversal that ran past the configured
    /// depth cap) -- the emitter renders this as nonsensical rather than
    /// attempting a host read.
    pub unreachable: bool,
    /// `Some(n)` if this is a sequence visit of `n` elements (spec §4.7);
    /// `None` for an ordinary scalar/string/pointer leaf.
    pub sequence_len: Option<u32>,
    /// The disambiguation override in effect for this leaf, carried
    /// through so the emitter can render it without re-consulting the
    /// catalog (spec §4.7).
    pub disambiguation: DisambiguationOverride,
}

/// Output of traversing one root variable: every visited leaf plus, for
/// pointer-typed or array-typed roots, the variables produced by
/// dereferencing/flattening it.
#[derive(Debug, Clone, Default)]
pub struct TraversalResult {
    pub variables: Vec<VisitedVariable>,
}

struct Walker<'a, H: DbiHost> {
    catalog: &'a Catalog,
    host: &'a H,
    config: &'a DynCompConfig,
    out: Vec<VisitedVariable>,
}

/// Walk `root` (a formal, local, return variable, or global) and every
/// variable reachable from it, honoring `config`'s depth and fan-out
/// caps.
pub fn traverse<H: DbiHost>(root: &VariableEntry, root_addr: Option<u64>, catalog: &Catalog, host: &H, config: &DynCompConfig) -> TraversalResult {
    let mut w = Walker {
        catalog,
        host,
        config,
        out: Vec::new(),
    };
    w.visit(&root.name, root, root_addr, root.declared_type, catalog.type_entry(root.declared_type), 0, 0, VariableOrigin::Direct, &mut Vec::new());
    TraversalResult { variables: w.out }
}

impl<'a, H: DbiHost> Walker<'a, H> {
    #[allow(clippy::too_many_arguments)]
    fn visit(
        &mut self,
        path: &str,
        var: &VariableEntry,
        addr: Option<u64>,
        ty_id: TypeId,
        ty: &TypeEntry,
        ptr_depth: u32,
        struct_depth: u32,
        origin: VariableOrigin,
        visited_types: &mut Vec<TypeId>,
    ) {
        if matches!(var.disambiguation, DisambiguationOverride::ArrayAsPointer) && var.is_static_array() {
            // Treated as a bare pointer value; emit the single slot and stop.
            self.push_leaf(path, addr, var, origin);
            return;
        }

        if var.is_string || matches!(var.disambiguation, DisambiguationOverride::CharAsString) {
            // A string leaf's value lives at the pointee, not at the
            // pointer/array slot itself -- dereference first, exactly as
            // visit_pointer does for ordinary pointers, but only when
            // there's actually a pointer to dereference (a plain `char`
            // disambiguated as a one-character string has no pointer to
            // follow; its own address is the content).
            let str_addr = if var.is_pointer() { addr.and_then(|a| self.read_pointer(a)) } else { addr };
            self.push_leaf(path, str_addr, var, origin);
            return;
        }

        if var.is_pointer() {
            self.visit_pointer(path, var, addr, ty_id, ty, ptr_depth, struct_depth, visited_types);
            return;
        }

        if var.is_static_array() {
            self.visit_array(path, var, addr, ty_id, ty, ptr_depth, struct_depth, visited_types);
            return;
        }

        if ty.kind.is_aggregate() {
            self.visit_aggregate(path, addr, ty_id, ty, ptr_depth, struct_depth, visited_types);
            return;
        }

        self.push_leaf(path, addr, var, origin);
    }

    fn push_leaf(&mut self, path: &str, addr: Option<u64>, var: &VariableEntry, origin: VariableOrigin) {
        let unreachable = addr.is_none() || addr == Some(0);
        self.out.push(VisitedVariable {
            path: path.to_string(),
            addr: if unreachable { None } else { addr },
            byte_size: self.catalog.type_entry(var.declared_type).byte_size,
            type_id: var.declared_type,
            origin,
            unreachable,
            sequence_len: None,
            disambiguation: var.disambiguation,
        });
    }

    /// Push a single sequence visit covering `element_count` elements of
    /// `elem_size` bytes each, strided linearly from `addr` (spec §4.7).
    fn push_sequence(&mut self, path: &str, addr: Option<u64>, var: &VariableEntry, element_count: u32, elem_size: u32) {
        let unreachable = addr.is_none() || addr == Some(0);
        self.out.push(VisitedVariable {
            path: path.to_string(),
            addr: if unreachable { None } else { addr },
            byte_size: elem_size,
            type_id: var.declared_type,
            origin: VariableOrigin::Sequence { element_count },
            unreachable,
            sequence_len: Some(element_count),
            disambiguation: var.disambiguation,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_pointer(&mut self, path: &str, var: &VariableEntry, addr: Option<u64>, ty_id: TypeId, ty: &TypeEntry, ptr_depth: u32, struct_depth: u32, visited_types: &mut Vec<TypeId>) {
        self.push_leaf(path, addr, var, VariableOrigin::PointerDeref { depth: ptr_depth });

        if ptr_depth >= self.config.max_ptr_derefs {
            return;
        }

        let pointee_addr = addr.and_then(|a| self.read_pointer(a));
        let deref_path = format!("{path}->contents");
        let mut deref_var = var.clone();
        deref_var.ptr_levels = var.ptr_levels.saturating_sub(1);

        if deref_var.is_pointer() {
            self.visit_pointer(&deref_path, &deref_var, pointee_addr, ty_id, ty, ptr_depth + 1, struct_depth, visited_types);
        } else if ty.kind.is_aggregate() {
            self.visit_aggregate(&deref_path, pointee_addr, ty_id, ty, ptr_depth + 1, struct_depth, visited_types);
        } else {
            self.push_leaf(&deref_path, pointee_addr, &deref_var, VariableOrigin::PointerDeref { depth: ptr_depth + 1 });
        }
    }

    fn read_pointer(&self, addr: u64) -> Option<u64> {
        if !self.host.is_allocated(addr) || !self.host.is_initialized(addr) {
            return None;
        }
        let width = self.host.pointer_width();
        let bytes = self.host.read_bytes(addr, width)?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(&bytes);
        let val = u64::from_le_bytes(buf);
        if val == 0 {
            None
        } else {
            Some(val)
        }
    }

    /// A static array of base-scalar/pointer/string elements produces a
    /// single sequence visit sharing the array's own name, flattened
    /// row-major across every dimension into one run of
    /// `product(array_bounds)` elements (spec §4.7) -- a `T[M][N]`
    /// becomes one sequence of `M*N` elements, not `M` sequences of `N`.
    /// An array of structs/classes has no Daikon sequence representation,
    /// so it keeps the one-leaf-set-per-element flattening instead, named
    /// with one `[i]` per dimension.
    #[allow(clippy::too_many_arguments)]
    fn visit_array(&mut self, path: &str, var: &VariableEntry, addr: Option<u64>, ty_id: TypeId, ty: &TypeEntry, ptr_depth: u32, struct_depth: u32, visited_types: &mut Vec<TypeId>) {
        if ty.kind.is_aggregate() {
            let elem_size = ty.byte_size.max(1) as u64;
            let strides = row_major_strides(&var.array_bounds);
            let per_dimension: Vec<Vec<u32>> = var.array_bounds.iter().map(|&bound| (0..bound).collect()).collect();
            for indices in per_dimension.into_iter().multi_cartesian_product() {
                let elem_path = format!("{path}{}", indices.iter().map(|i| format!("[{i}]")).join(""));
                let flat: u64 = indices.iter().zip(&strides).map(|(&i, &s)| i as u64 * s).sum();
                let elem_addr = addr.map(|a| a + flat * elem_size);
                self.visit_aggregate(&elem_path, elem_addr, ty_id, ty, ptr_depth, struct_depth, visited_types);
            }
            return;
        }

        let elem_size = ty.byte_size.max(1);
        let count: u32 = var.array_bounds.iter().product();
        let mut elem_var = var.clone();
        elem_var.array_bounds.clear();
        self.push_sequence(path, addr, &elem_var, count, elem_size);
    }

    fn visit_aggregate(&mut self, path: &str, addr: Option<u64>, ty_id: TypeId, ty: &TypeEntry, ptr_depth: u32, struct_depth: u32, visited_types: &mut Vec<TypeId>) {
        if struct_depth >= self.config.max_nesting_depth {
            return;
        }

        if visited_types.contains(&ty_id) {
            return;
        }
        visited_types.push(ty_id);

        for field in &ty.fields {
            let field_path = format!("{path}.{}", field.name);
            let field_addr = addr.and_then(|a| field.struct_offset.map(|off| a + off as u64));
            let field_ty = self.catalog.type_entry(field.declared_type);
            self.visit(&field_path, field, field_addr, field.declared_type, field_ty, ptr_depth, struct_depth + 1, VariableOrigin::StructField { depth: struct_depth + 1 }, visited_types);
        }

        for super_id in self.catalog.transitive_superclasses(ty_id) {
            let super_ty = self.catalog.type_entry(super_id);
            for field in &super_ty.fields {
                let field_path = format!("{path}.{}", field.name);
                let field_addr = addr.and_then(|a| field.struct_offset.map(|off| a + off as u64));
                let field_ty = self.catalog.type_entry(field.declared_type);
                self.visit(&field_path, field, field_addr, field.declared_type, field_ty, ptr_depth, struct_depth + 1, VariableOrigin::SuperclassField, visited_types);
            }
        }

        visited_types.pop();
    }
}

/// Row-major stride for each dimension of a (possibly multidimensional)
/// array's bounds, e.g. `[2, 3, 4] -> [12, 4, 1]`.
fn row_major_strides(bounds: &[u32]) -> Vec<u64> {
    let mut strides = vec![1u64; bounds.len()];
    for i in (0..bounds.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * bounds[i + 1] as u64;
    }
    strides
}
