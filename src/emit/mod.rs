//! Component I — the declarations and values trace emitter (spec §6).

pub mod final_pass;
pub mod format;

use crate::catalog::{Catalog, DisambiguationOverride, TypeKind, VariableEntry};
use crate::consts::MAX_STRING_SCAN_BYTES;
use crate::error::DynCompError;
use crate::host::DbiHost;
use crate::tag::algebra::TagAlgebra;
use crate::tag::{Tag, NO_TAG};
use crate::traversal::VisitedVariable;
pub use format::Rendering;

/// Daikon-style modification bit: whether a value record's rendering
/// changed since the last time this program point ran. This crate does
/// not track per-variable value history across executions (an Open
/// Question resolved in favor of the simpler, always-correct-for-
/// comparability-purposes choice: the modification bit only ever
/// distinguishes "nonsensical" from "some concrete rendering", which is
/// all component J's comparability numbering depends on), so every
/// reachable value is `Modified`, and every nonsensical/uninitialized
/// value is `Nonsensical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modified {
    Modified = 1,
    Nonsensical = 2,
}

impl Modified {
    pub const fn as_trace_digit(self) -> u8 {
        self as u8
    }
}

/// One visited variable's value at one program point execution. Printed
/// to the values file as-is; comparability numbers are not part of it —
/// those belong to the declarations file and are only known once
/// component J's program-end pass runs over the whole run's history
/// (spec §4.8).
#[derive(Debug, Clone)]
pub struct ValueRecord {
    pub path: String,
    pub tag: Tag,
    pub rendering: Rendering,
    pub modified: Modified,
    /// The address component F should observe for this record, or `None`
    /// if there's nothing to observe. For a scalar leaf this is just its
    /// own address; for a sequence it's the first initialized element
    /// (spec §4.7's "after per-element emission" rule) -- the whole
    /// sequence already shares one comparability class by the time this
    /// address is reached, via the pairwise element-tag merge below.
    pub observe_addr: Option<u64>,
}

/// Write one values record: the program point name, then one
/// `path / value / modbit` triple per variable, in the teacher's
/// line-oriented emitter style (spec §4.8, §6). No comparability number
/// is printed here — see [`crate::emit::final_pass::finalize_ppt`].
pub fn write_values_record(out: &mut impl std::io::Write, ppt_name: &str, records: &[ValueRecord]) -> std::io::Result<()> {
    writeln!(out, "{ppt_name}")?;
    for r in records {
        writeln!(out, "{}", format::escape_name(&r.path))?;
        writeln!(out, "{}", r.rendering.as_trace_token())?;
        writeln!(out, "{}", r.modified.as_trace_digit())?;
    }
    writeln!(out)?;
    Ok(())
}

/// Build the value record for one traversed leaf: reads bytes from the
/// host (when reachable), determines nonsensical/uninitialized status
/// from the allocated/initialized bits, and merges the leaf's shadow
/// bytes into a single tag via `load_tag_N` (spec §4.3), which is itself
/// the act of observing the value for comparability purposes. A sequence
/// leaf (a static array of base-scalar/pointer/string elements) is
/// rendered and merged element-by-element instead (spec §4.7, §4.8).
pub fn build_value_record<H: DbiHost>(visited: &VisitedVariable, kind: TypeKind, host: &H, alg: &mut TagAlgebra) -> Result<ValueRecord, DynCompError> {
    if let Some(count) = visited.sequence_len {
        return build_sequence_record(visited, kind, host, alg, count);
    }

    let Some(addr) = visited.addr else {
        return Ok(ValueRecord {
            path: visited.path.clone(),
            tag: NO_TAG,
            rendering: Rendering::Nonsensical,
            modified: Modified::Nonsensical,
            observe_addr: None,
        });
    };

    if !host.is_allocated(addr) {
        return Ok(ValueRecord {
            path: visited.path.clone(),
            tag: NO_TAG,
            rendering: Rendering::Nonsensical,
            modified: Modified::Nonsensical,
            observe_addr: Some(addr),
        });
    }

    if !host.is_initialized(addr) {
        return Ok(ValueRecord {
            path: visited.path.clone(),
            tag: NO_TAG,
            rendering: Rendering::Uninitialized,
            modified: Modified::Nonsensical,
            observe_addr: Some(addr),
        });
    }

    let byte_size = visited.byte_size.max(1) as usize;
    let tag = alg.load_tag_n(addr, byte_size as u64)?;

    let rendering = if matches!(kind, TypeKind::CharAsString) {
        render_string(host, addr, visited.disambiguation)
    } else {
        let bytes = host.read_bytes(addr, byte_size).unwrap_or_else(|| vec![0u8; byte_size]);
        Rendering::Value(format::format_scalar(&bytes, kind))
    };

    Ok(ValueRecord {
        path: visited.path.clone(),
        tag,
        rendering,
        modified: Modified::Modified,
        observe_addr: Some(addr),
    })
}

/// Render a string leaf, honoring the three `char*`-specific
/// disambiguation overrides (spec §4.7; grounded in Fjalar/Kvasir's
/// `printDtraceSingleString`): by default the full NUL-terminated string;
/// `StringAsOneCharString` prints only the first character, still as a
/// string; `StringAsOneInt` prints the first character's numeric value;
/// `StringAsIntArray` prints every character up to the NUL as a sequence
/// of ints.
fn render_string<H: DbiHost>(host: &H, addr: u64, disambig: DisambiguationOverride) -> Rendering {
    let bytes = read_string_bytes(host, addr);
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let chars = &bytes[..end];
    match disambig {
        DisambiguationOverride::StringAsOneCharString => {
            let first = chars.first().copied().map_or(Vec::new(), |b| vec![b]);
            Rendering::Value(format::format_c_string(&first))
        }
        DisambiguationOverride::StringAsOneInt => {
            let first = chars.first().copied().unwrap_or(0) as i8;
            Rendering::Value(first.to_string())
        }
        DisambiguationOverride::StringAsIntArray => Rendering::Sequence(chars.iter().map(|&b| (b as i8).to_string()).collect()),
        _ => Rendering::Value(format::format_c_string(&bytes)),
    }
}

/// Build the value record for a sequence leaf: render and tag each
/// element, merging every initialized element's tag pairwise into the
/// first initialized element's leader (spec §4.7, §4.8), and reporting
/// that element's address as the one component F should observe. An
/// uninitialized element renders as `nonsensical`, since Daikon has no
/// per-element `uninit`.
fn build_sequence_record<H: DbiHost>(visited: &VisitedVariable, kind: TypeKind, host: &H, alg: &mut TagAlgebra, count: u32) -> Result<ValueRecord, DynCompError> {
    let Some(base_addr) = visited.addr else {
        return Ok(ValueRecord {
            path: visited.path.clone(),
            tag: NO_TAG,
            rendering: Rendering::Nonsensical,
            modified: Modified::Nonsensical,
            observe_addr: None,
        });
    };

    let elem_size = visited.byte_size.max(1) as u64;
    let mut tokens = Vec::with_capacity(count as usize);
    let mut merged_tag = NO_TAG;
    let mut first_initialized_addr: Option<u64> = None;

    for i in 0..count as u64 {
        let elem_addr = base_addr + i * elem_size;
        if !host.is_allocated(elem_addr) || !host.is_initialized(elem_addr) {
            tokens.push("nonsensical".to_string());
            continue;
        }

        let elem_tag = alg.load_tag_n(elem_addr, elem_size)?;
        merged_tag = alg.merge_tags(merged_tag, elem_tag);
        if first_initialized_addr.is_none() {
            first_initialized_addr = Some(elem_addr);
        }

        let bytes = host.read_bytes(elem_addr, elem_size as usize).unwrap_or_else(|| vec![0u8; elem_size as usize]);
        tokens.push(format::format_scalar(&bytes, kind));
    }

    let modified = if first_initialized_addr.is_some() { Modified::Modified } else { Modified::Nonsensical };

    Ok(ValueRecord {
        path: visited.path.clone(),
        tag: merged_tag,
        rendering: Rendering::Sequence(tokens),
        modified,
        observe_addr: first_initialized_addr,
    })
}

/// One declaration-file entry for a single catalog variable (spec §6),
/// including the comparability number component J assigned for it at
/// program end.
#[derive(Debug, Clone)]
pub struct DeclEntry {
    pub path: String,
    pub dec_type: String,
    pub rep_type: &'static str,
    pub comparability: u32,
}

/// Scan for a NUL terminator starting at `addr`, shrinking the probe
/// length geometrically when the host can't satisfy a full read (the
/// allocation is shorter than the scan window).
fn read_string_bytes<H: DbiHost>(host: &H, addr: u64) -> Vec<u8> {
    let mut len = MAX_STRING_SCAN_BYTES;
    while len > 0 {
        if let Some(bytes) = host.read_bytes(addr, len) {
            return bytes;
        }
        len /= 2;
    }
    Vec::new()
}

fn rep_type_for(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Float | TypeKind::Double | TypeKind::LongDouble => "double",
        TypeKind::CharAsString => "java.lang.String",
        TypeKind::Bool => "boolean",
        TypeKind::StructOrClass | TypeKind::Union | TypeKind::Function | TypeKind::Void => "hashcode",
        _ => "int",
    }
}

/// Build one declaration entry for a catalog variable at the given path,
/// as produced by [`crate::traversal::traverse`], tagged with the
/// comparability number component J assigned it (spec §4.8). Three of the
/// `char*` disambiguation overrides change the rep-type away from
/// whatever the base declared type would otherwise imply (grounded in
/// Fjalar/Kvasir's `printDeclsEntryAction` rep-type switch).
pub fn decl_entry_for(path: &str, var: &VariableEntry, catalog: &Catalog, comparability: u32) -> DeclEntry {
    let ty = catalog.type_entry(var.declared_type);
    let stars = "*".repeat(var.ptr_levels as usize);
    let rep_type = match var.disambiguation {
        DisambiguationOverride::StringAsOneInt | DisambiguationOverride::StringAsIntArray => "int",
        DisambiguationOverride::StringAsOneCharString => "java.lang.String",
        _ => rep_type_for(ty.kind),
    };
    DeclEntry {
        path: path.to_string(),
        dec_type: format!("{}{}", ty.name, stars),
        rep_type,
        comparability,
    }
}

/// Write the declarations file header plus one `DECLARE` block per decl
/// entry, in the teacher's line-oriented, append-friendly emitter style.
/// Emitted once, at program end (spec §6).
pub fn write_declarations(out: &mut impl std::io::Write, ppt_name: &str, entries: &[DeclEntry]) -> std::io::Result<()> {
    writeln!(out, "DECLARE")?;
    writeln!(out, "{ppt_name}")?;
    for e in entries {
        writeln!(out, "{}", format::escape_name(&e.path))?;
        writeln!(out, "{}", format::escape_name(&e.dec_type))?;
        writeln!(out, "{}", e.rep_type)?;
        writeln!(out, "{}", e.comparability)?;
    }
    writeln!(out)?;
    Ok(())
}
