//! The boundary to the out-of-scope DBI host (spec §1, §6): the dynamic
//! binary translator that lifts guest instructions, shadows guest state,
//! and schedules instrumented blocks. This crate only ever consumes this
//! trait; nothing here implements it outside of tests.

use crate::tag::Tag;

/// Identifies a guest thread for per-thread register shadow access.
pub type ThreadId = u32;

/// Everything components C2 (trace emitter) and H (variable traversal)
/// need from the host to read a variable's live value and shadow bits,
/// plus the register-shadow accessors component D's instrumentation
/// needs at IR-translation time.
pub trait DbiHost {
    /// Whether guest byte `addr` is currently backed by allocated memory.
    fn is_allocated(&self, addr: u64) -> bool;

    /// Whether guest byte `addr` holds a defined value. Only meaningful
    /// when [`Self::is_allocated`] is also true.
    fn is_initialized(&self, addr: u64) -> bool;

    /// Read `len` raw bytes starting at `addr`, or `None` if any byte in
    /// the range is unreadable (e.g. unmapped). Returned bytes may still
    /// be uninitialized; callers consult [`Self::is_initialized`]
    /// separately before trusting the contents.
    fn read_bytes(&self, addr: u64, len: usize) -> Option<Vec<u8>>;

    /// The guest program counter at the current instrumented event.
    fn current_instruction_pointer(&self) -> u64;

    /// The tag currently shadowing guest register `offset` for `thread`.
    fn guest_register_shadow(&self, thread: ThreadId, offset: u64) -> Tag;

    /// Overwrite the tag shadowing guest register `offset` for `thread`.
    fn put_guest_register_shadow(&mut self, thread: ThreadId, offset: u64, tag: Tag);

    /// Total size, in bytes, of one thread's guest-state record; used by
    /// the register shadow offset formula (spec §4.4).
    fn guest_state_bytes(&self) -> u64;

    /// Width of a guest pointer, in bytes. Defaults to 8 (64-bit guests).
    fn pointer_width(&self) -> usize {
        8
    }
}
