/// Scheduler boot configuration.
///
/// Mirrors the handful of command-line options the kernel boot glue
/// would parse out of a bootloader command line (`-o mlfqs` in the
/// source this is derived from). MLFQS itself is out of scope: the
/// flag is carried so `get_nice`/`get_load_avg`/`get_recent_cpu` have
/// somewhere to read "not implemented, return 0" from, without being
/// wired to an actual multi-level feedback queue.

/// Ticks in one scheduling quantum before a running thread is forced
/// to yield on return from the timer interrupt.
pub const TIME_SLICE: u32 = 4;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub mlfqs: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { mlfqs: false }
    }
}

static mut CONFIG: SchedulerConfig = SchedulerConfig { mlfqs: false };

/// Installs the boot configuration. Must run before `task::scheduler::init()`.
pub fn install(config: SchedulerConfig) {
    unsafe {
        CONFIG = config;
    }
}

pub fn mlfqs_enabled() -> bool {
    unsafe { CONFIG.mlfqs }
}

/// Always 0: MLFQS accounting is not implemented, only its flag is carried.
pub fn get_nice() -> i32 {
    0
}

/// Always 0, for the same reason as `get_nice`.
pub fn get_load_avg() -> i32 {
    0
}

/// Always 0, for the same reason as `get_nice`.
pub fn get_recent_cpu() -> i32 {
    0
}
