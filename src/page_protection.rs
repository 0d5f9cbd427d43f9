//! Page protection bitset, decoded from the four-character `rwxp`-style
//! permission string `/proc/<pid>/maps` prints for each mapping.

bitflags::bitflags! {
    /// Bitset over the three permission bits `/proc/<pid>/maps` reports.
    /// `NoAccess` is the empty set.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct PageProtection: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

impl PageProtection {
    /// Decodes the first three characters of a `maps` permission field
    /// (`r`/`-`, `w`/`-`, `x`/`-`). The fourth character (shared/private)
    /// is not part of this bitset.
    pub fn from_perms_str(perms: &str) -> PageProtection {
        let bytes = perms.as_bytes();
        let mut prot = PageProtection::empty();
        if bytes.first() == Some(&b'r') {
            prot |= PageProtection::READ;
        }
        if bytes.get(1) == Some(&b'w') {
            prot |= PageProtection::WRITE;
        }
        if bytes.get(2) == Some(&b'x') {
            prot |= PageProtection::EXECUTE;
        }
        prot
    }

    /// `true` iff `requested` is a subset of `self` — i.e. `self`
    /// "satisfies" `requested`.
    pub fn satisfies(self, requested: PageProtection) -> bool {
        (self & requested) == requested
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_access() {
        assert_eq!(PageProtection::from_perms_str("---p"), PageProtection::empty());
    }

    #[test]
    fn full_access() {
        assert_eq!(
            PageProtection::from_perms_str("rwxp"),
            PageProtection::READ | PageProtection::WRITE | PageProtection::EXECUTE
        );
    }

    #[test]
    fn satisfies_is_subset() {
        let rx = PageProtection::READ | PageProtection::EXECUTE;
        let rwx = rx | PageProtection::WRITE;
        assert!(rwx.satisfies(rx));
        assert!(!rx.satisfies(rwx));
    }
}
