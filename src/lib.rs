//! In-process introspection of a Linux process's own threads, loaded
//! modules, and mapped memory, plus a broker that can present any
//! thread's CPU register snapshot to a visitor and resume it with
//! whatever the visitor wrote back — including threads other than the
//! caller, via a real-time-signal rendezvous.
//!
//! Every enumeration function in this crate follows the same shape: a
//! `FnMut`/`FnOnce` visitor is called once per item, in file order, and
//! a `false` return from the visitor stops the walk early. A `false`
//! return from the enumeration function itself means the underlying
//! `/proc` file could not be opened at all, not that nothing matched.

pub mod broker;
pub mod config;
pub mod cpu_context;
pub mod elf;
pub mod enumerate;
pub mod memory_range;
pub mod page_protection;
mod procfs;
pub mod thread_id;
pub mod thread_state;

pub use broker::modify_thread;
pub use config::hijack_signal_number;
pub use cpu_context::CpuContext;
pub use elf::{enumerate_module_exports, find_module_export_by_name};
pub use enumerate::{
    enumerate_module_ranges, enumerate_modules, enumerate_ranges, enumerate_ranges_of, enumerate_threads,
    find_module_base_address, ThreadDetails,
};
pub use memory_range::MemoryRange;
pub use page_protection::PageProtection;
pub use thread_id::{get_current_thread_id, ThreadId};
pub use thread_state::ThreadState;
