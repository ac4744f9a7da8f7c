/// Integration test: verify `Lock`/`Semaphore`/`CondVar` priority donation
/// and wake ordering on the real in-kernel scheduler.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(kthreads::test_runner)]
#![reexport_test_harness_entry = "test_main"]

extern crate alloc;

use bootloader_api::{entry_point, BootInfo, BootloaderConfig};
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU64, Ordering};
use kthreads::task::scheduler;
use kthreads::task::sync::{CondVar, Lock, Semaphore};
use kthreads::{allocator, memory};

#[allow(deprecated)]
pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(bootloader_api::config::Mapping::Dynamic);
    config
};

entry_point!(main, config = &BOOTLOADER_CONFIG);

fn main(boot_info: &'static mut BootInfo) -> ! {
    kthreads::init();

    let phys_mem_offset = x86_64::VirtAddr::new(
        boot_info
            .physical_memory_offset
            .into_option()
            .expect("physical_memory_offset not available"),
    );
    let mut mapper = unsafe { memory::init(phys_mem_offset) };
    let mut frame_allocator =
        unsafe { memory::BootInfoFrameAllocator::init(&boot_info.memory_regions) };
    allocator::init_heap(&mut mapper, &mut frame_allocator).expect("heap initialization failed");

    scheduler::init();
    scheduler::start();

    test_main();
    kthreads::hlt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kthreads::test_panic_handler(info)
}

static LOCK: Lock = Lock::new();
static HOLDER_ACQUIRED: Semaphore = Semaphore::new(0);
static HOLDER_DONE: Semaphore = Semaphore::new(0);
static WAITER_DONE: Semaphore = Semaphore::new(0);
static OBSERVED_PRIORITY: AtomicU64 = AtomicU64::new(0);

extern "C" fn donation_holder_entry(_aux: u64) {
    LOCK.acquire();
    HOLDER_ACQUIRED.up();
    while scheduler::get_priority() < 50 {
        scheduler::yield_now();
    }
    OBSERVED_PRIORITY.store(scheduler::get_priority() as u64, Ordering::Relaxed);
    LOCK.release();
    HOLDER_DONE.up();
}

extern "C" fn donation_waiter_entry(_aux: u64) {
    LOCK.acquire();
    LOCK.release();
    WAITER_DONE.up();
}

#[test_case]
fn lock_acquire_donates_priority_to_holder() {
    scheduler::create("dh-holder", 20, donation_holder_entry, 0).expect("create holder");
    HOLDER_ACQUIRED.down();

    scheduler::create("dh-waiter", 50, donation_waiter_entry, 0).expect("create waiter");

    WAITER_DONE.down();
    HOLDER_DONE.down();

    assert_eq!(OBSERVED_PRIORITY.load(Ordering::Relaxed), 50);
}

static SEM: Semaphore = Semaphore::new(0);
static SEM_ORDER: spin::Mutex<alloc::vec::Vec<u8>> = spin::Mutex::new(alloc::vec::Vec::new());

extern "C" fn sem_waiter_entry(priority: u64) {
    SEM.down();
    SEM_ORDER.lock().push(priority as u8);
}

#[test_case]
fn semaphore_wakes_highest_priority_waiter_first() {
    SEM_ORDER.lock().clear();
    let original = scheduler::get_priority();
    scheduler::set_priority(kthreads::task::PRI_MIN);

    scheduler::create("sem-low", 10, sem_waiter_entry, 10).expect("create sem-low");
    scheduler::create("sem-high", 20, sem_waiter_entry, 20).expect("create sem-high");

    SEM.up();

    scheduler::set_priority(original);

    assert_eq!(SEM_ORDER.lock().first(), Some(&20));
}

static CV_LOCK: Lock = Lock::new();
static CV: CondVar = CondVar::new();
static CV_ORDER: spin::Mutex<alloc::vec::Vec<u8>> = spin::Mutex::new(alloc::vec::Vec::new());

extern "C" fn cv_waiter_entry(priority: u64) {
    CV_LOCK.acquire();
    CV.wait(&CV_LOCK);
    CV_ORDER.lock().push(priority as u8);
    CV_LOCK.release();
}

#[test_case]
fn condvar_signal_wakes_highest_priority_waiter_first() {
    CV_ORDER.lock().clear();
    let original = scheduler::get_priority();
    scheduler::set_priority(kthreads::task::PRI_MIN);

    scheduler::create("cv-low", 10, cv_waiter_entry, 10).expect("create cv-low");
    scheduler::create("cv-high", 30, cv_waiter_entry, 30).expect("create cv-high");

    CV_LOCK.acquire();
    CV.signal(&CV_LOCK);
    CV.signal(&CV_LOCK);
    CV_LOCK.release();

    scheduler::set_priority(original);

    assert_eq!(CV_ORDER.lock().as_slice(), [30, 10]);
}
