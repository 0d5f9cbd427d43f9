//! Canonical, architecture-tagged register snapshot, and the two pure
//! functions that convert it to and from the kernel-delivered machine
//! context (`ucontext_t`).
//!
//! Segment registers, FP/SIMD state, and flags are intentionally absent
//! here — a limitation of the design being implemented, not an
//! oversight (see spec.md §4.2).
//!
//! Only x86 and x86-64 are covered; any other target is a compile-time
//! error at this boundary, same as `rd`'s own `RD_NATIVE_ARCH` split in
//! `registers.rs` is only ever instantiated for the architectures it
//! actually supports.

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
compile_error!("threadctl's CpuContext marshaller only covers x86 and x86-64 targets");

#[cfg(target_arch = "x86_64")]
static_assertions::const_assert_eq!(std::mem::size_of::<libc::greg_t>(), 8);

/// x86-64 general-purpose registers plus the instruction pointer.
#[cfg(target_arch = "x86_64")]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CpuContext {
    pub rip: u64,
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub rbx: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,
}

/// x86-32 general-purpose registers plus the instruction pointer.
#[cfg(target_arch = "x86")]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CpuContext {
    pub eip: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

#[cfg(target_arch = "x86_64")]
pub(crate) fn cpu_context_from_ucontext(uc: &libc::ucontext_t) -> CpuContext {
    let gr = &uc.uc_mcontext.gregs;
    CpuContext {
        rip: gr[libc::REG_RIP as usize] as u64,
        r15: gr[libc::REG_R15 as usize] as u64,
        r14: gr[libc::REG_R14 as usize] as u64,
        r13: gr[libc::REG_R13 as usize] as u64,
        r12: gr[libc::REG_R12 as usize] as u64,
        r11: gr[libc::REG_R11 as usize] as u64,
        r10: gr[libc::REG_R10 as usize] as u64,
        r9: gr[libc::REG_R9 as usize] as u64,
        r8: gr[libc::REG_R8 as usize] as u64,
        rdi: gr[libc::REG_RDI as usize] as u64,
        rsi: gr[libc::REG_RSI as usize] as u64,
        rbp: gr[libc::REG_RBP as usize] as u64,
        rsp: gr[libc::REG_RSP as usize] as u64,
        rbx: gr[libc::REG_RBX as usize] as u64,
        rdx: gr[libc::REG_RDX as usize] as u64,
        rcx: gr[libc::REG_RCX as usize] as u64,
        rax: gr[libc::REG_RAX as usize] as u64,
    }
}

#[cfg(target_arch = "x86_64")]
pub(crate) fn cpu_context_to_ucontext(ctx: &CpuContext, uc: &mut libc::ucontext_t) {
    let gr = &mut uc.uc_mcontext.gregs;
    gr[libc::REG_RIP as usize] = ctx.rip as i64;
    gr[libc::REG_R15 as usize] = ctx.r15 as i64;
    gr[libc::REG_R14 as usize] = ctx.r14 as i64;
    gr[libc::REG_R13 as usize] = ctx.r13 as i64;
    gr[libc::REG_R12 as usize] = ctx.r12 as i64;
    gr[libc::REG_R11 as usize] = ctx.r11 as i64;
    gr[libc::REG_R10 as usize] = ctx.r10 as i64;
    gr[libc::REG_R9 as usize] = ctx.r9 as i64;
    gr[libc::REG_R8 as usize] = ctx.r8 as i64;
    gr[libc::REG_RDI as usize] = ctx.rdi as i64;
    gr[libc::REG_RSI as usize] = ctx.rsi as i64;
    gr[libc::REG_RBP as usize] = ctx.rbp as i64;
    gr[libc::REG_RSP as usize] = ctx.rsp as i64;
    gr[libc::REG_RBX as usize] = ctx.rbx as i64;
    gr[libc::REG_RDX as usize] = ctx.rdx as i64;
    gr[libc::REG_RCX as usize] = ctx.rcx as i64;
    gr[libc::REG_RAX as usize] = ctx.rax as i64;
}

#[cfg(target_arch = "x86")]
pub(crate) fn cpu_context_from_ucontext(uc: &libc::ucontext_t) -> CpuContext {
    let gr = &uc.uc_mcontext.gregs;
    CpuContext {
        eip: gr[libc::REG_EIP as usize] as u32,
        edi: gr[libc::REG_EDI as usize] as u32,
        esi: gr[libc::REG_ESI as usize] as u32,
        ebp: gr[libc::REG_EBP as usize] as u32,
        esp: gr[libc::REG_ESP as usize] as u32,
        ebx: gr[libc::REG_EBX as usize] as u32,
        edx: gr[libc::REG_EDX as usize] as u32,
        ecx: gr[libc::REG_ECX as usize] as u32,
        eax: gr[libc::REG_EAX as usize] as u32,
    }
}

#[cfg(target_arch = "x86")]
pub(crate) fn cpu_context_to_ucontext(ctx: &CpuContext, uc: &mut libc::ucontext_t) {
    let gr = &mut uc.uc_mcontext.gregs;
    gr[libc::REG_EIP as usize] = ctx.eip as i32;
    gr[libc::REG_EDI as usize] = ctx.edi as i32;
    gr[libc::REG_ESI as usize] = ctx.esi as i32;
    gr[libc::REG_EBP as usize] = ctx.ebp as i32;
    gr[libc::REG_ESP as usize] = ctx.esp as i32;
    gr[libc::REG_EBX as usize] = ctx.ebx as i32;
    gr[libc::REG_EDX as usize] = ctx.edx as i32;
    gr[libc::REG_ECX as usize] = ctx.ecx as i32;
    gr[libc::REG_EAX as usize] = ctx.eax as i32;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_a_zeroed_ucontext() {
        let mut uc: libc::ucontext_t = unsafe { std::mem::zeroed() };

        let mut ctx = CpuContext::default();
        #[cfg(target_arch = "x86_64")]
        {
            ctx.rip = 0x1000;
            ctx.rax = 42;
            ctx.rsp = 0x7ffdeadbeef0;
        }
        #[cfg(target_arch = "x86")]
        {
            ctx.eip = 0x1000;
            ctx.eax = 42;
            ctx.esp = 0xdeadbeef;
        }

        cpu_context_to_ucontext(&ctx, &mut uc);
        let round_tripped = cpu_context_from_ucontext(&uc);

        assert_eq!(ctx, round_tripped);
    }
}
