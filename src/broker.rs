//! Thread Context Broker: `modify_thread`, the hardest component in the
//! crate.
//!
//! Presents a thread's current CPU register snapshot to a visitor and
//! resumes the thread with whatever the visitor wrote back. When the
//! target is the calling thread this is a same-thread
//! `getcontext`/`setcontext` round trip with no signalling involved.
//! When it is another thread, a single process-wide mutex serialises a
//! rendezvous conducted entirely through a real-time signal and three
//! flags, following `gum_process_modify_thread`/`gum_do_modify_thread`
//! in `examples/original_source/gum/backend-linux/gumprocess-linux.c`
//! step for step.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::hijack_signal_number;
use crate::cpu_context::{cpu_context_from_ucontext, cpu_context_to_ucontext, CpuContext};
use crate::thread_id::{get_current_thread_id, ThreadId};

/// The process-wide rendezvous state: one mutex serialising all
/// cross-thread hijacks, the three handshake flags, and the single
/// shared `CpuContext` buffer they guard. There is exactly one instance
/// per process, per spec.md §9 ("global only in the sense of 'there is
/// one per process'").
struct RendezvousState {
    mutex: Mutex<()>,
    did_load: AtomicBool,
    did_modify: AtomicBool,
    did_store: AtomicBool,
    shared_context: UnsafeCell<CpuContext>,
}

// SAFETY: `shared_context` is only ever touched by the one thread
// currently holding `mutex` (the requester, between the mutex lock and
// unlock) or by the signal handler running on the target thread during
// that same window; the three flags establish the acquire/release
// handoff between those two threads so the accesses never race.
unsafe impl Sync for RendezvousState {}

lazy_static::lazy_static! {
    static ref RENDEZVOUS: RendezvousState = RendezvousState {
        mutex: Mutex::new(()),
        did_load: AtomicBool::new(false),
        did_modify: AtomicBool::new(false),
        did_store: AtomicBool::new(false),
        shared_context: UnsafeCell::new(CpuContext::default()),
    };
}

/// Presents `target_id`'s current CPU register snapshot to `visitor`,
/// which may mutate it in place, and causes the target thread to resume
/// with the (possibly mutated) registers.
///
/// Returns `true` iff the rendezvous completed and `visitor` ran. Fails
/// (without running `visitor`, and without any observable effect on the
/// target) when the target thread cannot be signalled, e.g. because it
/// has already exited.
pub fn modify_thread<F>(target_id: ThreadId, visitor: F) -> bool
where
    F: FnOnce(&mut CpuContext),
{
    if target_id == get_current_thread_id() {
        modify_current_thread(visitor);
        true
    } else {
        modify_other_thread(target_id, visitor)
    }
}

/// Same-thread fast path: capture this thread's own machine context,
/// hand it to `visitor`, and resume execution at the (possibly mutated)
/// context. Does not block and never touches the rendezvous signal.
fn modify_current_thread<F>(visitor: F)
where
    F: FnOnce(&mut CpuContext),
{
    let mut uc: libc::ucontext_t = unsafe { std::mem::zeroed() };
    // The re-entry guard spec.md §4.1/§9 calls for: `setcontext` below
    // resumes execution right after `getcontext`, in this same stack
    // frame, so this local must not be re-initialized on that second
    // pass, and the compiler must not hoist or elide the check across
    // the context switch. An atomic read-modify-write gives both
    // properties without a volatile-local, which Rust has no syntax for.
    let restored = AtomicBool::new(false);

    let result = unsafe { libc::getcontext(&mut uc) };

    // Must be checked before `result` is ever inspected: on the resumed
    // pass, execution re-enters right here with the CPU registers
    // (including the one `result` is read from) holding whatever
    // `cpu_context_to_ucontext` wrote below, i.e. the visitor's mutated
    // context, not a real getcontext return code. `restored` itself
    // lives in memory untouched by setcontext, so it alone can tell the
    // two passes apart.
    if restored.swap(true, Ordering::AcqRel) {
        return;
    }

    if result != 0 {
        log::warn!("getcontext failed in same-thread modify_thread");
        return;
    }

    let mut ctx = cpu_context_from_ucontext(&uc);
    visitor(&mut ctx);
    cpu_context_to_ucontext(&ctx, &mut uc);

    unsafe {
        libc::setcontext(&uc);
    }
    unreachable!("setcontext only returns by resuming at the getcontext call above");
}

/// Cross-thread rendezvous: install a handler for the hijack signal,
/// `tgkill` the target, and hand off the visitor through the shared
/// context buffer once the target's handler has published its captured
/// registers.
fn modify_other_thread<F>(target_id: ThreadId, visitor: F) -> bool
where
    F: FnOnce(&mut CpuContext),
{
    let _guard = RENDEZVOUS.mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    RENDEZVOUS.did_load.store(false, Ordering::Relaxed);
    RENDEZVOUS.did_modify.store(false, Ordering::Relaxed);
    RENDEZVOUS.did_store.store(false, Ordering::Relaxed);

    let signal = hijack_signal_number();

    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = rendezvous_handler as usize;
    action.sa_flags = libc::SA_SIGINFO;
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
    }

    let mut previous_action: libc::sigaction = unsafe { std::mem::zeroed() };
    if unsafe { libc::sigaction(signal, &action, &mut previous_action) } != 0 {
        log::warn!("sigaction({signal}) failed installing hijack handler: {}", std::io::Error::last_os_error());
        return false;
    }

    let pid = unsafe { libc::getpid() };
    let sent = unsafe { libc::syscall(libc::SYS_tgkill, pid, target_id, signal) };

    let success = if sent == 0 {
        while !RENDEZVOUS.did_load.load(Ordering::Acquire) {
            std::thread::yield_now();
        }

        {
            // SAFETY: `did_load == true` means the target's handler has
            // finished writing `shared_context` and is now only reading
            // `did_modify`; we are the sole writer until we set it.
            let ctx = unsafe { &mut *RENDEZVOUS.shared_context.get() };
            visitor(ctx);
        }
        RENDEZVOUS.did_modify.store(true, Ordering::Release);

        while !RENDEZVOUS.did_store.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
        true
    } else {
        log::warn!(
            "tgkill(pid={pid}, tid={target_id}, sig={signal}) failed: {}",
            std::io::Error::last_os_error()
        );
        false
    };

    unsafe {
        libc::sigaction(signal, &previous_action, std::ptr::null_mut());
    }

    success
}

/// Runs on the target thread, inside the signal handler. Allocation-free
/// and logging-free: it only touches the flags, the shared context, and
/// its own delivered `ucontext_t`.
extern "C" fn rendezvous_handler(_sig: libc::c_int, _info: *mut libc::siginfo_t, context: *mut libc::c_void) {
    let uc = unsafe { &mut *(context as *mut libc::ucontext_t) };

    // SAFETY: the requester is blocked on `did_load` and has not yet
    // touched `shared_context`, so this is the only writer right now.
    unsafe {
        *RENDEZVOUS.shared_context.get() = cpu_context_from_ucontext(uc);
    }
    RENDEZVOUS.did_load.store(true, Ordering::Release);

    while !RENDEZVOUS.did_modify.load(Ordering::Acquire) {
        std::hint::spin_loop();
    }

    // SAFETY: `did_modify == true` means the requester has finished
    // mutating `shared_context` and is now only reading `did_store`.
    let ctx = unsafe { *RENDEZVOUS.shared_context.get() };
    cpu_context_to_ucontext(&ctx, uc);
    RENDEZVOUS.did_store.store(true, Ordering::Release);
}
