/// Context switching: the one primitive the scheduler core treats as a
/// black box, `switch_context(prev, next) -> prev_ptr`.
///
/// Unlike the teacher's timer-ISR frame swap (which only works when
/// already inside an interrupt handler), threads here also block from
/// plain function calls (`sema_down`, `lock_acquire`, `cond_wait`), so
/// the switch has to be an ordinary callee-saved-register save/restore
/// that any code path can invoke directly — only the six callee-preserved
/// GPRs, the stack pointer, and the resume address need saving.

/// Saved machine state for one thread, written/read only by
/// `switch_context` and thread creation.
#[derive(Debug, Default)]
#[repr(C)]
pub struct ThreadContext {
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rsp: u64,
    pub rip: u64,
}

/// Low-level context switch. Saves the caller's callee-saved registers
/// and stack pointer into `prev`, loads `next`'s, and jumps to `next`'s
/// saved `rip`.
///
/// Returns the context pointer of whichever thread was running
/// immediately before *this* resumption — not necessarily the `prev` the
/// caller passed in, since some other thread may have switched into
/// `next` in the meantime. This relies on `rdi`/`rsi` being left
/// untouched by the asm below: when a later call resumes this stack
/// frame by jumping to the saved `rip`, `rdi` still holds that later
/// call's own `prev` argument.
#[unsafe(naked)]
pub extern "C" fn switch_context(
    prev: *mut ThreadContext,
    next: *const ThreadContext,
) -> *mut ThreadContext {
    core::arch::naked_asm!(
        "mov [rdi + 0x00], rbx",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], r12",
        "mov [rdi + 0x18], r13",
        "mov [rdi + 0x20], r14",
        "mov [rdi + 0x28], r15",
        "mov [rdi + 0x30], rsp",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x38], rax",
        "mov rbx, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov r12, [rsi + 0x10]",
        "mov r13, [rsi + 0x18]",
        "mov r14, [rsi + 0x20]",
        "mov r15, [rsi + 0x28]",
        "mov rsp, [rsi + 0x30]",
        "jmp [rsi + 0x38]",
        "2:",
        "mov rax, rdi",
        "ret",
    );
}

/// Entry trampoline every freshly created thread's `ThreadContext.rip`
/// points at. Invoked by `switch_context`'s `jmp [rsi + 0x38]`, never by
/// a `call`, so it must not assume a return address is already on the
/// stack.
///
/// Expects `r12` = entry function pointer, `r13` = entry argument, set
/// up by `scheduler::create` when it lays out the new stack.
#[unsafe(naked)]
pub(crate) extern "C" fn thread_entry_trampoline() {
    core::arch::naked_asm!(
        // `switch_context` never runs `schedule_tail` for the thread it
        // switches *into* on this, its first run — that only happens for
        // a thread resuming back inside `schedule()`. Run the equivalent
        // here, before anything else, so the thread is marked `Running`
        // (and its slice counter reset) before its entry function, or
        // even a preemption, can observe it still `Ready`.
        "call {enter}",
        // New threads are always created with interrupts off; enable them
        // here so the thread is preemptible like every other runnable one.
        "sti",
        "mov rdi, r13",
        "call r12",
        "call {exit}",
        "ud2",
        enter = sym trampoline_enter,
        exit = sym trampoline_exit,
    );
}

extern "C" fn trampoline_enter() {
    super::scheduler::schedule_tail();
}

extern "C" fn trampoline_exit() -> ! {
    super::scheduler::exit();
}

/// Address `ThreadContext.rip` is primed with for a freshly created thread.
pub(crate) fn trampoline_addr() -> u64 {
    thread_entry_trampoline as usize as u64
}
