//! Thread identity: the kernel thread id, as returned by `gettid`.

/// Opaque kernel thread id. Equal to the value the per-task identity
/// syscall returns for the calling thread.
pub type ThreadId = libc::pid_t;

/// Returns the kernel thread id of the calling thread.
pub fn get_current_thread_id() -> ThreadId {
    unsafe { libc::syscall(libc::SYS_gettid) as ThreadId }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn current_thread_id_is_stable_within_a_call() {
        let a = get_current_thread_id();
        let b = get_current_thread_id();
        assert_eq!(a, b);
        assert!(a > 0);
    }
}
