//! Module & Range Enumerator: walks `/proc/<pid>/maps` (and
//! `/proc/self/task`) and emits modules, ranges, and thread details to a
//! visitor, in file order, stopping early when the visitor asks to.
//!
//! Grounded line-for-line on `gum_process_enumerate_threads`,
//! `gum_process_enumerate_modules`, `gum_linux_enumerate_ranges`,
//! `gum_module_enumerate_ranges` and `gum_module_find_base_address` in
//! `examples/original_source/gum/backend-linux/gumprocess-linux.c`.

use std::io::BufRead;
use std::path::Path;

use crate::broker::modify_thread;
use crate::cpu_context::CpuContext;
use crate::memory_range::MemoryRange;
use crate::page_protection::PageProtection;
use crate::procfs::{parse_module_line, parse_module_range_line, parse_range_line, parse_task_state};
use crate::thread_id::ThreadId;
use crate::thread_state::ThreadState;

/// A single thread's identity, run state, and current register
/// snapshot, as materialised by [`enumerate_threads`].
#[derive(Clone, Debug)]
pub struct ThreadDetails {
    pub id: ThreadId,
    pub state: ThreadState,
    pub context: CpuContext,
}

/// Visits every thread of the calling process. `visitor` returns `false`
/// to stop early. Returns `false` only if `/proc/self/task` itself could
/// not be opened; individual threads that exit mid-enumeration, or that
/// cannot be hijacked for a register snapshot, are silently skipped.
pub fn enumerate_threads<F>(mut visitor: F) -> bool
where
    F: FnMut(&ThreadDetails) -> bool,
{
    let dir = match std::fs::read_dir("/proc/self/task") {
        Ok(dir) => dir,
        Err(e) => {
            log::warn!("failed to open /proc/self/task: {e}");
            return false;
        }
    };

    for entry in dir {
        let Ok(entry) = entry else { continue };
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Ok(tid) = name.parse::<ThreadId>() else {
            continue;
        };

        let stat_path = format!("/proc/self/task/{name}/stat");
        let Ok(contents) = std::fs::read_to_string(&stat_path) else {
            continue; // thread exited between readdir and read
        };

        let Some(state_char) = parse_task_state(&contents) else {
            log::warn!("malformed stat line for tid {tid}: {contents:?}");
            continue;
        };
        let state = ThreadState::from_proc_status_char(state_char);

        let mut context = CpuContext::default();
        let captured = modify_thread(tid, |ctx| context = *ctx);
        if !captured {
            continue;
        }

        let details = ThreadDetails { id: tid, state, context };
        if !visitor(&details) {
            return true;
        }
    }

    true
}

/// `true` iff the first four bytes mapped at `start` in this process's
/// own address space are the ELF magic. Reading directly out of this
/// process's memory is sound here because `enumerate_modules` only ever
/// walks `/proc/self/maps`, never another process's.
fn elf_magic_matches(start: usize) -> bool {
    if start == 0 {
        return false;
    }
    let bytes = unsafe { std::slice::from_raw_parts(start as *const u8, 4) };
    bytes == [0x7f, b'E', b'L', b'F']
}

fn basename(path: &str) -> &str {
    Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path)
}

/// Visits every loaded ELF shared object of the calling process:
/// `(basename, load_base, full_path)`. Consecutive mappings of the same
/// backing file are coalesced into a single emission, pseudo-regions
/// (`[vdso]`, `[stack]`, ...) are never emitted, and a mapping whose
/// first four bytes aren't the ELF magic is skipped (this is what
/// distinguishes a module's primary text mapping from its later data
/// segments and from anonymous mappings).
pub fn enumerate_modules<F>(mut visitor: F) -> bool
where
    F: FnMut(&str, usize, &str) -> bool,
{
    let file = match std::fs::File::open("/proc/self/maps") {
        Ok(f) => f,
        Err(e) => {
            log::warn!("failed to open /proc/self/maps: {e}");
            return false;
        }
    };
    let reader = std::io::BufReader::new(file);

    let mut prev_path = String::new();

    for line in reader.lines() {
        let Ok(line) = line else { break };
        let Some((start, path)) = parse_module_line(&line) else {
            continue;
        };

        if path.starts_with('[') {
            continue;
        }
        if path == prev_path {
            continue;
        }
        if !elf_magic_matches(start) {
            continue;
        }

        let name = basename(path);
        prev_path = path.to_string();

        if !visitor(name, start, path) {
            return true;
        }
    }

    true
}

/// Visits every mapped range of the calling process whose protection is
/// a superset of `protection`.
pub fn enumerate_ranges<F>(protection: PageProtection, visitor: F) -> bool
where
    F: FnMut(&MemoryRange, PageProtection) -> bool,
{
    enumerate_ranges_of(unsafe { libc::getpid() }, protection, visitor)
}

/// Visits every mapped range of `pid` whose protection is a superset of
/// `protection`.
pub fn enumerate_ranges_of<F>(pid: libc::pid_t, protection: PageProtection, mut visitor: F) -> bool
where
    F: FnMut(&MemoryRange, PageProtection) -> bool,
{
    let path = format!("/proc/{pid}/maps");
    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            log::warn!("failed to open {path}: {e}");
            return false;
        }
    };
    let reader = std::io::BufReader::new(file);

    for line in reader.lines() {
        let Ok(line) = line else { break };
        let Some((start, end, perms)) = parse_range_line(&line) else {
            continue;
        };

        let current = PageProtection::from_perms_str(perms);
        if !current.satisfies(protection) {
            continue;
        }

        let range = MemoryRange::new(start, end - start);
        if !visitor(&range, current) {
            return true;
        }
    }

    true
}

/// Visits every mapped range belonging to `module_name` whose protection
/// is a superset of `protection`.
pub fn enumerate_module_ranges<F>(module_name: &str, protection: PageProtection, mut visitor: F) -> bool
where
    F: FnMut(&MemoryRange, PageProtection) -> bool,
{
    let file = match std::fs::File::open("/proc/self/maps") {
        Ok(f) => f,
        Err(e) => {
            log::warn!("failed to open /proc/self/maps: {e}");
            return false;
        }
    };
    let reader = std::io::BufReader::new(file);

    for line in reader.lines() {
        let Ok(line) = line else { break };
        let Some((start, end, perms, path)) = parse_module_range_line(&line) else {
            continue;
        };

        if path.starts_with('[') {
            continue;
        }
        if basename(path) != module_name {
            continue;
        }

        let current = PageProtection::from_perms_str(perms);
        if !current.satisfies(protection) {
            continue;
        }

        let range = MemoryRange::new(start, end - start);
        if !visitor(&range, current) {
            return true;
        }
    }

    true
}

/// Returns the runtime load-base address of `module_name`, or `0` if no
/// such module is currently loaded.
pub fn find_module_base_address(module_name: &str) -> usize {
    let mut result = 0usize;
    enumerate_modules(|name, base, _path| {
        if name == module_name {
            result = base;
            false
        } else {
            true
        }
    });
    result
}

/// Finds the load-base address and on-disk path of `module_name`, for
/// internal use by the ELF export resolver.
pub(crate) fn find_module_base_and_path(module_name: &str) -> Option<(usize, String)> {
    let mut found = None;
    enumerate_modules(|name, base, path| {
        if name == module_name {
            found = Some((base, path.to_string()));
            false
        } else {
            true
        }
    });
    found
}
