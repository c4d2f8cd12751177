//! Interrupt handling for the supervisor.
//!
//! SIGINT/SIGTERM set a process-wide stop flag and forward an interrupt to the
//! registered module process groups. Only async-signal-safe operations happen in
//! the handler (atomic stores and `kill`); the full stop escalation runs on the
//! supervisor thread when it notices the flag.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// More slots than modules, so registration never has to wait.
const MAX_GROUPS: usize = 4;

static STOP: AtomicBool = AtomicBool::new(false);
static GROUPS: [AtomicI32; MAX_GROUPS] = [
    AtomicI32::new(0),
    AtomicI32::new(0),
    AtomicI32::new(0),
    AtomicI32::new(0),
];

/// Install the SIGINT/SIGTERM handlers. Safe to call more than once.
pub fn install() -> io::Result<()> {
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| unsafe {
        install_handlers();
    });
    Ok(())
}

unsafe fn install_handlers() {
    extern "C" fn handler(_signum: libc::c_int) {
        request_stop();
    }

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_flags = libc::SA_RESTART;
        action.sa_sigaction = handler as usize;

        let mut empty_set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut empty_set as *mut libc::sigset_t);
        action.sa_mask = empty_set;

        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());
    }
}

/// Whether a stop was requested, by signal or programmatically.
pub fn stop_requested() -> bool {
    STOP.load(Ordering::SeqCst)
}

/// Request a stop and interrupt every registered module process group right away,
/// so teardown is not delayed behind a full monitor tick. Async-signal-safe.
pub fn request_stop() {
    STOP.store(true, Ordering::SeqCst);
    for slot in &GROUPS {
        let pgid = slot.load(Ordering::SeqCst);
        if pgid != 0 {
            unsafe {
                libc::kill(-pgid, libc::SIGINT);
            }
        }
    }
}

/// Make a module process group reachable from the signal handler.
pub fn register_group(pgid: i32) {
    if pgid == 0 {
        return;
    }
    for slot in &GROUPS {
        if slot
            .compare_exchange(0, pgid, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return;
        }
    }
}

pub fn unregister_group(pgid: i32) {
    for slot in &GROUPS {
        let _ = slot.compare_exchange(pgid, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}
