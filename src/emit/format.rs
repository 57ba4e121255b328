//! Value rendering and text escaping for the trace emitter (spec §6).

use crate::catalog::TypeKind;

/// How one variable's live value renders in a values record.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendering {
    /// A concrete, formatted scalar/string/pointer value.
    Value(String),
    /// The variable has no valid address: a null pointer, a pointer
    /// traversal past the configured depth cap, or an unallocated slot.
    Nonsensical,
    /// The slot is allocated but the host has never written it.
    Uninitialized,
    /// A static array's elements, already formatted, in order. Daikon has
    /// no "uninit" for sequence elements, so uninitialized elements are
    /// pre-rendered as `"nonsensical"` by the caller (spec §4.8).
    Sequence(Vec<String>),
}

impl Rendering {
    /// The literal token written to the values trace.
    pub fn as_trace_token(&self) -> String {
        match self {
            Rendering::Value(s) => s.clone(),
            Rendering::Nonsensical => "nonsensical".to_string(),
            Rendering::Uninitialized => "uninit".to_string(),
            Rendering::Sequence(elems) => format!("[ {} ]", elems.join(" ")),
        }
    }
}

/// Escape a string for the values trace: backslash and double-quote are
/// backslash-escaped, and control characters that would otherwise break
/// line-oriented parsing are rendered as their C-style escapes (spec §6).
pub fn escape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Escape a variable's fully qualified name for the declarations/values
/// trace (spec §4.8 item 1, §6 "Escaping"): a leading `/` marking a
/// global is rewritten to `::`, spaces become `\_`, backslashes are
/// doubled, and the *first* `[]` in the name becomes `[..]` (later ones
/// are left alone -- only one level of sequence is supported). The same
/// escaping applies to declared-type strings.
pub fn escape_name(raw: &str) -> String {
    let unmarked = match raw.strip_prefix('/') {
        Some(rest) => format!("::{rest}"),
        None => raw.to_string(),
    };

    let mut escaped = String::with_capacity(unmarked.len());
    for c in unmarked.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ' ' => escaped.push_str("\\_"),
            c => escaped.push(c),
        }
    }

    if let Some(pos) = escaped.find("[]") {
        escaped.replace_range(pos..pos + 2, "[..]");
    }
    escaped
}

/// Render `bytes` (little-endian, exactly the declared byte size) as a
/// [`Rendering::Value`] appropriate to `kind`. Aggregate/array/pointer
/// kinds are never passed here -- the traversal flattens those down to
/// base-scalar and string leaves before this is called.
pub fn format_scalar(bytes: &[u8], kind: TypeKind) -> String {
    match kind {
        TypeKind::Bool => {
            if bytes.first().copied().unwrap_or(0) != 0 {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        TypeKind::Char | TypeKind::UnsignedChar => {
            let v = bytes.first().copied().unwrap_or(0);
            (v as i8 as i64).to_string()
        }
        TypeKind::Short => i16::from_le_bytes(pad::<2>(bytes)).to_string(),
        TypeKind::Int | TypeKind::Enum => i32::from_le_bytes(pad::<4>(bytes)).to_string(),
        TypeKind::LongLong => i64::from_le_bytes(pad::<8>(bytes)).to_string(),
        TypeKind::Float => f32::from_le_bytes(pad::<4>(bytes)).to_string(),
        TypeKind::Double | TypeKind::LongDouble => f64::from_le_bytes(pad::<8>(bytes)).to_string(),
        TypeKind::Void | TypeKind::Function | TypeKind::StructOrClass | TypeKind::Union | TypeKind::CharAsString => {
            // Pointer-sized fallback: every remaining kind reaching this
            // point is some flavor of address-valued leaf.
            let mut buf = [0u8; 8];
            let n = bytes.len().min(8);
            buf[..n].copy_from_slice(&bytes[..n]);
            format!("{:#x}", u64::from_le_bytes(buf))
        }
    }
}

fn pad<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    let n = bytes.len().min(N);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

/// Render a NUL-terminated (or length-capped) byte run as an escaped
/// string literal, for `char*`/`char[]` leaves under the default
/// disambiguation.
pub fn format_c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let s = String::from_utf8_lossy(&bytes[..end]);
    escape_value(&s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quote_and_backslash() {
        assert_eq!(escape_value("a\\b\"c"), "\"a\\\\b\\\"c\"");
    }

    #[test]
    fn escapes_control_chars() {
        assert_eq!(escape_value("a\nb"), "\"a\\nb\"");
    }

    #[test]
    fn formats_negative_int() {
        let bytes = (-5i32).to_le_bytes();
        assert_eq!(format_scalar(&bytes, TypeKind::Int), "-5");
    }

    #[test]
    fn formats_bool() {
        assert_eq!(format_scalar(&[1], TypeKind::Bool), "true");
        assert_eq!(format_scalar(&[0], TypeKind::Bool), "false");
    }

    #[test]
    fn c_string_stops_at_nul() {
        assert_eq!(format_c_string(b"hi\0garbage"), "\"hi\"");
    }

    #[test]
    fn leading_slash_becomes_global_marker() {
        assert_eq!(escape_name("/counter"), "::counter");
    }

    #[test]
    fn spaces_and_backslashes_are_escaped() {
        assert_eq!(escape_name("a b"), "a\\_b");
        assert_eq!(escape_name("a\\b"), "a\\\\b");
    }

    #[test]
    fn only_the_first_bracket_pair_is_rewritten() {
        assert_eq!(escape_name("arr[]extra[]"), "arr[..]extra[]");
    }

    #[test]
    fn name_without_special_characters_is_unchanged() {
        assert_eq!(escape_name("node.next.value"), "node.next.value");
    }
}
