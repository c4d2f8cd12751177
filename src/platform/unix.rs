use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, Pid};
use psutil::process::{processes, Process};
use std::collections::HashSet;
use tracing::debug;

/// Check whether a process is alive.
///
/// Signal 0 probes existence without delivering anything; EPERM means the process
/// exists but belongs to someone else.
pub fn process_alive(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(errno) => errno == Errno::EPERM,
    }
}

/// Process group id of a process, falling back to the pid itself when the group
/// cannot be read (the group leader is created with `setpgid(0, 0)` at launch).
pub fn process_group_of(pid: u32) -> i32 {
    getpgid(Some(Pid::from_raw(pid as i32)))
        .map(Pid::as_raw)
        .unwrap_or(pid as i32)
}

/// Send SIGINT to a whole process group. Vanished groups are not an error.
pub fn interrupt_group(pgid: i32) {
    match killpg(Pid::from_raw(pgid), Signal::SIGINT) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => debug!("killpg({pgid}, SIGINT) failed: {errno}"),
    }
}

/// SIGKILL one process, tolerating the already-reaped race.
pub fn kill_process(pid: u32) {
    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => debug!("kill({pid}, SIGKILL) failed: {errno}"),
    }
}

/// Enumerate every live descendant of a process, transitively.
///
/// The process table is snapshotted once; entries that vanish mid-scan are skipped.
pub fn descendants(root: u32) -> Vec<Process> {
    let Ok(all) = processes() else {
        return Vec::new();
    };

    let mut table: Vec<(u32, Option<u32>, Process)> = Vec::new();
    for process in all.into_iter().flatten() {
        let pid = process.pid();
        let ppid = process.ppid().ok().flatten();
        table.push((pid, ppid, process));
    }

    let mut members: HashSet<u32> = HashSet::new();
    members.insert(root);
    loop {
        let before = members.len();
        for (pid, ppid, _) in &table {
            if let Some(ppid) = ppid {
                if members.contains(ppid) {
                    members.insert(*pid);
                }
            }
        }
        if members.len() == before {
            break;
        }
    }

    table
        .into_iter()
        .filter(|(pid, _, _)| *pid != root && members.contains(pid))
        .map(|(_, _, process)| process)
        .collect()
}

/// Find the first descendant whose executable name matches.
pub fn find_descendant_by_name(root: u32, name: &str) -> Option<Process> {
    descendants(root)
        .into_iter()
        .find(|p| p.name().map(|n| n == name).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn current_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[test]
    fn group_of_current_process_is_positive() {
        assert!(process_group_of(std::process::id()) > 0);
    }

    #[test]
    fn finds_spawned_descendant() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("sleep 5; exit 0")
            .spawn()
            .expect("spawn sh");
        // the sleep child may need a moment to appear in the process table
        let mut found = false;
        for _ in 0..10 {
            if find_descendant_by_name(child.id(), "sleep").is_some() {
                found = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        kill_process(child.id());
        let _ = child.wait();
        assert!(found, "sleep should appear among the shell's descendants");
    }

    #[test]
    fn kill_tolerates_missing_process() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let _ = child.wait();
        // pid is reaped; both calls must be no-ops
        kill_process(child.id());
        kill_process(child.id());
    }
}
