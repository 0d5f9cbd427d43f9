//! Process-wide configuration. The one knob the design exposes is which
//! real-time signal the Thread Context Broker hijacks threads with
//! (spec.md §4.1, §6: `SIGRTMIN + 7`).

/// Default offset from `SIGRTMIN` used to select the hijack signal.
const DEFAULT_RT_SIGNAL_OFFSET: i32 = 7;

const RT_SIGNAL_OFFSET_ENV_VAR: &str = "THREADCTL_RT_SIGNAL_OFFSET";

lazy_static::lazy_static! {
    static ref HIJACK_SIGNAL: i32 = resolve_hijack_signal();
}

/// The real-time signal number used for cross-thread hijacking.
/// Resolved once per process; see [`RT_SIGNAL_OFFSET_ENV_VAR`] to
/// override the default offset of `+7` from `SIGRTMIN`.
pub fn hijack_signal_number() -> i32 {
    *HIJACK_SIGNAL
}

fn resolve_hijack_signal() -> i32 {
    let offset = match std::env::var(RT_SIGNAL_OFFSET_ENV_VAR) {
        Ok(raw) => parse_offset(&raw).unwrap_or_else(|| {
            log::warn!(
                "invalid {RT_SIGNAL_OFFSET_ENV_VAR}={raw:?}, falling back to default offset {DEFAULT_RT_SIGNAL_OFFSET}"
            );
            DEFAULT_RT_SIGNAL_OFFSET
        }),
        Err(_) => DEFAULT_RT_SIGNAL_OFFSET,
    };

    unsafe { libc::SIGRTMIN() + offset }
}

fn parse_offset(raw: &str) -> Option<i32> {
    let offset: i32 = raw.trim().parse().ok()?;
    let max_offset = unsafe { libc::SIGRTMAX() - libc::SIGRTMIN() };
    if (0..=max_offset).contains(&offset) {
        Some(offset)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_out_of_range_offsets() {
        assert_eq!(parse_offset("not a number"), None);
        assert_eq!(parse_offset("-1"), None);
        assert_eq!(parse_offset("100000"), None);
    }

    #[test]
    fn accepts_in_range_offsets() {
        assert_eq!(parse_offset("0"), Some(0));
        assert_eq!(parse_offset("7"), Some(7));
    }
}
