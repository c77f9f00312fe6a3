//! Host process table backed by sysinfo

use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, ProcessStatus, System};

use crate::traits::ProcessTable;

/// Real process table using the platform's process list
pub struct SystemProcessTable {
    system: Mutex<System>,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn find_by_name(&self, name: &str) -> Vec<u32> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes();

        let own_pid = std::process::id();
        system
            .processes_by_exact_name(name)
            // Zombies are already dead, they only wait for their parent to reap them
            .filter(|process| !matches!(process.status(), ProcessStatus::Zombie))
            .map(|process| process.pid().as_u32())
            .filter(|pid| *pid != own_pid)
            .collect()
    }

    fn kill(&self, pid: u32) -> bool {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let pid = Pid::from_u32(pid);
        if !system.refresh_process(pid) {
            // Already gone
            return true;
        }
        system.process(pid).map_or(true, |process| process.kill())
    }

    fn memory_of(&self, pid: u32) -> Option<u64> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let pid = Pid::from_u32(pid);
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|process| process.memory())
    }
}
