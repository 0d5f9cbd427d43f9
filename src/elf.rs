//! ELF Export Resolver: maps a named module's on-disk image and walks
//! its dynamic symbol table, yielding exported function symbols rebased
//! to their runtime address.
//!
//! This is a minimal, hand-rolled ELF32/ELF64 reader — not a general
//! ELF library. It understands exactly what spec.md §4.5 asks for: the
//! file header, the section header table, one `SHT_DYNSYM` section and
//! its companion string table, and the symbol table entries themselves.
//! Grounded field-for-field on `gum_module_enumerate_exports` in
//! `examples/original_source/gum/backend-linux/gumprocess-linux.c`.

use crate::enumerate::find_module_base_and_path;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const EI_CLASS_OFFSET: usize = 4;
const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;

const ET_DYN: u16 = 3;
const SHT_DYNSYM: u32 = 11;

const STB_GLOBAL: u8 = 1;
const STB_WEAK: u8 = 2;
const STT_FUNC: u8 = 2;
const SHN_UNDEF: u16 = 0;

#[derive(Copy, Clone)]
enum ElfClass {
    Elf32,
    Elf64,
}

struct ElfHeader {
    class: ElfClass,
    e_type: u16,
    e_shoff: u64,
    e_shentsize: u16,
    e_shnum: u16,
}

struct SectionHeader {
    sh_type: u32,
    sh_link: u32,
    sh_offset: u64,
    sh_size: u64,
    sh_entsize: u64,
}

struct DynSymTable {
    class: ElfClass,
    offset: u64,
    size: u64,
    entsize: u64,
    strtab_offset: u64,
}

struct RawSym {
    name_offset: u32,
    info: u8,
    shndx: u16,
    value: u64,
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
}

fn read_cstr(data: &[u8], offset: usize) -> Option<&str> {
    let bytes = data.get(offset..)?;
    let end = bytes.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&bytes[..end]).ok()
}

impl ElfHeader {
    fn parse(data: &[u8]) -> Option<ElfHeader> {
        if data.len() < 20 || data[0..4] != ELF_MAGIC {
            return None;
        }

        let class = match data[EI_CLASS_OFFSET] {
            ELFCLASS32 => ElfClass::Elf32,
            ELFCLASS64 => ElfClass::Elf64,
            _ => return None,
        };

        match class {
            ElfClass::Elf32 => {
                if data.len() < 52 {
                    return None;
                }
                Some(ElfHeader {
                    class,
                    e_type: read_u16(data, 16)?,
                    e_shoff: read_u32(data, 32)? as u64,
                    e_shentsize: read_u16(data, 46)?,
                    e_shnum: read_u16(data, 48)?,
                })
            }
            ElfClass::Elf64 => {
                if data.len() < 64 {
                    return None;
                }
                Some(ElfHeader {
                    class,
                    e_type: read_u16(data, 16)?,
                    e_shoff: read_u64(data, 40)?,
                    e_shentsize: read_u16(data, 58)?,
                    e_shnum: read_u16(data, 60)?,
                })
            }
        }
    }

    fn is_shared_object(&self) -> bool {
        self.e_type == ET_DYN
    }

    fn section_header(&self, data: &[u8], index: u16) -> Option<SectionHeader> {
        let offset = self.e_shoff as usize + (index as usize) * (self.e_shentsize as usize);
        match self.class {
            ElfClass::Elf32 => Some(SectionHeader {
                sh_type: read_u32(data, offset + 4)?,
                sh_link: read_u32(data, offset + 24)?,
                sh_offset: read_u32(data, offset + 16)? as u64,
                sh_size: read_u32(data, offset + 20)? as u64,
                sh_entsize: read_u32(data, offset + 36)? as u64,
            }),
            ElfClass::Elf64 => Some(SectionHeader {
                sh_type: read_u32(data, offset + 4)?,
                sh_link: read_u32(data, offset + 40)?,
                sh_offset: read_u64(data, offset + 24)?,
                sh_size: read_u64(data, offset + 32)?,
                sh_entsize: read_u64(data, offset + 56)?,
            }),
        }
    }

    /// Finds the single `SHT_DYNSYM` section and resolves its `sh_link`
    /// to the companion string table's file offset.
    fn find_dynsym(&self, data: &[u8]) -> Option<DynSymTable> {
        for i in 0..self.e_shnum {
            let shdr = self.section_header(data, i)?;
            if shdr.sh_type != SHT_DYNSYM {
                continue;
            }

            // A malformed dynsym section is an invariant violation, not
            // a "not found": the file claims to be a valid ELF shared
            // object but its own symbol table is inconsistent. Checked
            // in this order so entry_count()'s later division is always
            // by a nonzero entsize.
            assert_ne!(shdr.sh_entsize, 0, "dynsym section has sh_entsize == 0");
            assert_eq!(
                shdr.sh_size % shdr.sh_entsize,
                0,
                "dynsym section size {} is not a multiple of entry size {}",
                shdr.sh_size,
                shdr.sh_entsize
            );

            let strtab = self.section_header(data, shdr.sh_link as u16)?;
            return Some(DynSymTable {
                class: self.class,
                offset: shdr.sh_offset,
                size: shdr.sh_size,
                entsize: shdr.sh_entsize,
                strtab_offset: strtab.sh_offset,
            });
        }
        None
    }
}

impl DynSymTable {
    fn entry_count(&self) -> usize {
        (self.size / self.entsize) as usize
    }

    fn symbol_at(&self, data: &[u8], index: usize) -> Option<RawSym> {
        let offset = self.offset as usize + index * self.entsize as usize;
        match self.class {
            ElfClass::Elf32 => Some(RawSym {
                name_offset: read_u32(data, offset)?,
                value: read_u32(data, offset + 4)? as u64,
                info: *data.get(offset + 12)?,
                shndx: read_u16(data, offset + 14)?,
            }),
            ElfClass::Elf64 => Some(RawSym {
                name_offset: read_u32(data, offset)?,
                info: *data.get(offset + 4)?,
                shndx: read_u16(data, offset + 6)?,
                value: read_u64(data, offset + 8)?,
            }),
        }
    }
}

impl RawSym {
    fn bind(&self) -> u8 {
        self.info >> 4
    }

    fn symbol_type(&self) -> u8 {
        self.info & 0xf
    }

    /// Global or weak, function-typed, and defined (not `SHN_UNDEF`) —
    /// the subset of the dynamic symbol table spec.md §4.5 calls
    /// "exported function symbols".
    fn is_exported_function(&self) -> bool {
        matches!(self.bind(), STB_GLOBAL | STB_WEAK) && self.symbol_type() == STT_FUNC && self.shndx != SHN_UNDEF
    }
}

/// Visits every exported function symbol of `module_name`:
/// `(symbol_name, runtime_address)`. Emits nothing (without signalling
/// failure) if the module isn't loaded, its file can't be parsed as
/// ELF32/64, or it isn't a shared object (`ET_DYN`) — all "expected
/// not-found" outcomes per spec.md §7. Returns `false` only when the
/// module's disk file exists but could not be opened or mapped.
pub fn enumerate_module_exports<F>(module_name: &str, mut visitor: F) -> bool
where
    F: FnMut(&str, usize) -> bool,
{
    let Some((base, path)) = find_module_base_and_path(module_name) else {
        return true;
    };

    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            log::warn!("failed to open {path} for export resolution: {e}");
            return false;
        }
    };

    // SAFETY: this is a private, read-only mapping of a regular file we
    // just opened ourselves; it is released when `mapping` drops at the
    // end of this function, on every exit path including early return.
    let mapping = match unsafe { memmap2::Mmap::map(&file) } {
        Ok(m) => m,
        Err(e) => {
            log::warn!("failed to mmap {path}: {e}");
            return false;
        }
    };
    let data: &[u8] = &mapping;

    let Some(header) = ElfHeader::parse(data) else {
        log::trace!("{path} is not a recognisable ELF32/64 image");
        return true;
    };

    if !header.is_shared_object() {
        log::trace!("{path} is not ET_DYN; no exports to resolve");
        return true;
    }

    let Some(dynsym) = header.find_dynsym(data) else {
        return true;
    };

    for i in 0..dynsym.entry_count() {
        let Some(sym) = dynsym.symbol_at(data, i) else {
            break;
        };
        if !sym.is_exported_function() {
            continue;
        }
        let Some(name) = read_cstr(data, dynsym.strtab_offset as usize + sym.name_offset as usize) else {
            continue;
        };
        let address = base + sym.value as usize;
        if !visitor(name, address) {
            return true;
        }
    }

    true
}

/// Returns the runtime address of `symbol_name` exported by
/// `module_name`, or `0` if no such export exists.
pub fn find_module_export_by_name(module_name: &str, symbol_name: &str) -> usize {
    let mut result = 0usize;
    enumerate_module_exports(module_name, |name, address| {
        if name == symbol_name {
            result = address;
            false
        } else {
            true
        }
    });
    result
}

#[cfg(test)]
mod test {
    use super::*;

    fn elf64_fixture_with_one_export(symbol: &str, value: u64) -> Vec<u8> {
        // Hand-assembled minimal ELF64 shared object: header, one
        // SHT_DYNSYM section and its SHT_STRTAB, one exported function
        // symbol. Section header string table is omitted (unneeded by
        // this resolver, which never reads section *names*).
        let strtab: Vec<u8> = {
            let mut s = vec![0u8]; // index 0 is always the empty string
            s.extend_from_slice(symbol.as_bytes());
            s.push(0);
            s
        };

        let ehdr_size = 64usize;
        let shdr_size = 64usize;
        let sym_size = 24usize;

        let strtab_offset = ehdr_size;
        let strtab_size = strtab.len();
        let dynsym_offset = strtab_offset + strtab_size;
        let num_syms = 2; // index 0 is the mandatory null symbol
        let dynsym_size = sym_size * num_syms;
        let shoff = dynsym_offset + dynsym_size;

        let mut buf = vec![0u8; shoff + shdr_size * 2];

        buf[0..4].copy_from_slice(&ELF_MAGIC);
        buf[EI_CLASS_OFFSET] = ELFCLASS64;
        buf[16..18].copy_from_slice(&ET_DYN.to_le_bytes());
        buf[40..48].copy_from_slice(&(shoff as u64).to_le_bytes());
        buf[58..60].copy_from_slice(&(shdr_size as u16).to_le_bytes());
        buf[60..62].copy_from_slice(&2u16.to_le_bytes()); // e_shnum

        buf[strtab_offset..strtab_offset + strtab_size].copy_from_slice(&strtab);

        // Symbol 1: the exported function.
        let sym1_offset = dynsym_offset + sym_size;
        let name_off = 1u32; // past the leading NUL
        buf[sym1_offset..sym1_offset + 4].copy_from_slice(&name_off.to_le_bytes());
        buf[sym1_offset + 4] = (STB_GLOBAL << 4) | STT_FUNC; // st_info
        buf[sym1_offset + 6..sym1_offset + 8].copy_from_slice(&1u16.to_le_bytes()); // st_shndx != SHN_UNDEF
        buf[sym1_offset + 8..sym1_offset + 16].copy_from_slice(&value.to_le_bytes());

        // Section 0: SHT_STRTAB for the dynsym string table.
        let shdr0 = shoff;
        buf[shdr0 + 4..shdr0 + 8].copy_from_slice(&3u32.to_le_bytes()); // SHT_STRTAB
        buf[shdr0 + 24..shdr0 + 32].copy_from_slice(&(strtab_offset as u64).to_le_bytes());
        buf[shdr0 + 32..shdr0 + 40].copy_from_slice(&(strtab_size as u64).to_le_bytes());

        // Section 1: SHT_DYNSYM, sh_link -> section 0.
        let shdr1 = shoff + shdr_size;
        buf[shdr1 + 4..shdr1 + 8].copy_from_slice(&SHT_DYNSYM.to_le_bytes());
        buf[shdr1 + 24..shdr1 + 32].copy_from_slice(&(dynsym_offset as u64).to_le_bytes());
        buf[shdr1 + 32..shdr1 + 40].copy_from_slice(&(dynsym_size as u64).to_le_bytes());
        buf[shdr1 + 40..shdr1 + 44].copy_from_slice(&0u32.to_le_bytes()); // sh_link -> section 0
        buf[shdr1 + 56..shdr1 + 64].copy_from_slice(&(sym_size as u64).to_le_bytes());

        buf
    }

    #[test]
    fn parses_header_and_rejects_non_elf() {
        assert!(ElfHeader::parse(b"not an elf file").is_none());
    }

    #[test]
    fn walks_dynsym_and_rebases_addresses() {
        let data = elf64_fixture_with_one_export("frob", 0x1234);
        let header = ElfHeader::parse(&data).expect("fixture should parse");
        assert!(header.is_shared_object());

        let dynsym = header.find_dynsym(&data).expect("fixture should have a dynsym section");
        assert_eq!(dynsym.entry_count(), 2);

        let mut exports = Vec::new();
        for i in 0..dynsym.entry_count() {
            let sym = dynsym.symbol_at(&data, i).unwrap();
            if sym.is_exported_function() {
                let name = read_cstr(&data, dynsym.strtab_offset as usize + sym.name_offset as usize).unwrap();
                exports.push((name.to_string(), sym.value));
            }
        }

        assert_eq!(exports, vec![("frob".to_string(), 0x1234)]);
    }

    #[test]
    fn executable_type_is_not_a_shared_object() {
        let mut data = elf64_fixture_with_one_export("frob", 0x1234);
        data[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        let header = ElfHeader::parse(&data).unwrap();
        assert!(!header.is_shared_object());
    }

    #[test]
    fn local_binding_is_not_exported() {
        let sym = RawSym { name_offset: 0, info: (0 << 4) | STT_FUNC, shndx: 1, value: 0 };
        assert!(!sym.is_exported_function());
    }

    #[test]
    fn weak_undefined_is_not_exported() {
        let sym = RawSym { name_offset: 0, info: (STB_WEAK << 4) | STT_FUNC, shndx: SHN_UNDEF, value: 0 };
        assert!(!sym.is_exported_function());
    }

    #[test]
    fn global_function_defined_is_exported() {
        let sym = RawSym { name_offset: 0, info: (STB_GLOBAL << 4) | STT_FUNC, shndx: 1, value: 0 };
        assert!(sym.is_exported_function());
    }
}
