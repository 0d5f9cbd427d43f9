//! Thread run state, as decoded from `/proc/<pid>/task/<tid>/stat`.

/// Coarse run state of a thread, collapsed from the `/proc` state
/// character set.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ThreadState {
    Running,
    Waiting,
    Uninterruptible,
    Stopped,
}

impl ThreadState {
    /// Maps a `/proc/<pid>/task/<tid>/stat` state character to a
    /// `ThreadState`. Any character outside `{R, S, D, Z, T, W}` is a
    /// programmer-detectable invariant violation: the kernel is not
    /// expected to ever report one, so we abort rather than guess.
    pub fn from_proc_status_char(c: char) -> ThreadState {
        match c {
            'R' => ThreadState::Running,
            'S' => ThreadState::Waiting,
            'D' | 'Z' | 'W' => ThreadState::Uninterruptible,
            'T' => ThreadState::Stopped,
            other => panic!("unrecognized /proc task state character {other:?}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn maps_known_characters() {
        assert_eq!(ThreadState::from_proc_status_char('R'), ThreadState::Running);
        assert_eq!(ThreadState::from_proc_status_char('S'), ThreadState::Waiting);
        assert_eq!(ThreadState::from_proc_status_char('D'), ThreadState::Uninterruptible);
        assert_eq!(ThreadState::from_proc_status_char('Z'), ThreadState::Uninterruptible);
        assert_eq!(ThreadState::from_proc_status_char('W'), ThreadState::Uninterruptible);
        assert_eq!(ThreadState::from_proc_status_char('T'), ThreadState::Stopped);
    }

    #[test]
    #[should_panic]
    fn panics_on_unknown_character() {
        ThreadState::from_proc_status_char('?');
    }
}
