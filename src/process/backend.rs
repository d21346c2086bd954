use crate::error::{FpsmonError, Result};
use crate::process::types::{FoundProcess, SpawnedServer};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// OS operations the crash supervisor depends on
#[async_trait]
pub trait ProcessBackend: Send {
    /// Look up a running process by executable name
    async fn find_by_name(&mut self, name: &str) -> Result<Option<FoundProcess>>;

    /// Resident memory in bytes if `pid` is alive, `None` otherwise
    async fn probe(&mut self, pid: u32) -> Result<Option<u64>>;

    /// Ask `pid` to exit
    async fn terminate(&mut self, pid: u32) -> Result<()>;

    /// Start the server detached from our stdio
    async fn spawn(&mut self, exe: &Path, cwd: &Path) -> Result<SpawnedServer>;
}

/// Backend using sysinfo for enumeration and tokio for spawning
pub struct SystemBackend {
    system: System,
    /// Servers we started, kept so their exit status can be reaped
    children: HashMap<u32, Child>,
}

impl SystemBackend {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            children: HashMap::new(),
        }
    }

    /// Reap a child we spawned; true if it has exited
    fn reap_child(&mut self, pid: u32) -> bool {
        let Some(child) = self.children.get_mut(&pid) else {
            return false;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Server process {} exited with {}", pid, status);
                self.children.remove(&pid);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to poll child {}: {}", pid, e);
                false
            }
        }
    }
}

impl Default for SystemBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Only what the supervisor reads: memory, plus the exe path for name matching
fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new()
        .with_memory()
        .with_exe(UpdateKind::OnlyIfNotSet)
}

fn epoch_to_utc(secs: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0).single().unwrap_or_else(Utc::now)
}

#[async_trait]
impl ProcessBackend for SystemBackend {
    async fn find_by_name(&mut self, name: &str) -> Result<Option<FoundProcess>> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            refresh_kind(),
        );

        let target = OsStr::new(name);
        let found = self
            .system
            .processes()
            .values()
            .filter(|p| {
                // Linux truncates process names, so also match the exe name
                p.name() == target
                    || p.exe().and_then(|exe| exe.file_name()) == Some(target)
            })
            .min_by_key(|p| p.pid().as_u32())
            .map(|p| FoundProcess {
                pid: p.pid().as_u32(),
                start_time: epoch_to_utc(p.start_time()),
                memory_bytes: p.memory(),
            });

        Ok(found)
    }

    async fn probe(&mut self, pid: u32) -> Result<Option<u64>> {
        if self.reap_child(pid) {
            return Ok(None);
        }

        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            refresh_kind(),
        );

        Ok(self.system.process(sys_pid).map(|p| p.memory()))
    }

    #[cfg(unix)]
    async fn terminate(&mut self, pid: u32) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid as NixPid;

        kill(NixPid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| match e {
            Errno::ESRCH => FpsmonError::ProcessLookup(format!("no process with PID {}", pid)),
            other => FpsmonError::Terminate(pid, other.to_string()),
        })?;
        self.reap_child(pid);
        Ok(())
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self, pid: u32) -> Result<()> {
        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            refresh_kind(),
        );

        match self.system.process(sys_pid) {
            Some(process) if process.kill() => {
                self.reap_child(pid);
                Ok(())
            }
            Some(_) => Err(FpsmonError::Terminate(pid, "kill refused".to_string())),
            None => Err(FpsmonError::ProcessLookup(format!(
                "no process with PID {}",
                pid
            ))),
        }
    }

    async fn spawn(&mut self, exe: &Path, cwd: &Path) -> Result<SpawnedServer> {
        if !exe.exists() {
            return Err(FpsmonError::Spawn(format!(
                "Server executable not found at: {}",
                exe.display()
            )));
        }

        let child = Command::new(exe)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FpsmonError::Spawn(format!("{}: {}", exe.display(), e)))?;

        let pid = child
            .id()
            .ok_or_else(|| FpsmonError::Spawn("no PID returned".to_string()))?;

        self.children.insert(pid, child);

        Ok(SpawnedServer {
            pid,
            started: Utc::now(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_spawn_probe_terminate() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("server.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut backend = SystemBackend::new();
        let spawned = backend.spawn(&script, temp_dir.path()).await.unwrap();
        assert!(spawned.pid > 0);
        assert!(backend.probe(spawned.pid).await.unwrap().is_some());

        backend.terminate(spawned.pid).await.unwrap();

        let mut alive = true;
        for _ in 0..50 {
            if backend.probe(spawned.pid).await.unwrap().is_none() {
                alive = false;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(!alive);
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let temp_dir = TempDir::new().unwrap();
        let mut backend = SystemBackend::new();

        let result = backend
            .spawn(&temp_dir.path().join("missing-server"), temp_dir.path())
            .await;
        assert!(matches!(result, Err(FpsmonError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_probe_current_process() {
        let mut backend = SystemBackend::new();
        let memory = backend.probe(std::process::id()).await.unwrap();
        assert!(memory.is_some());
    }

    #[tokio::test]
    async fn test_find_current_executable_by_name() {
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_str().unwrap().to_string();

        let mut backend = SystemBackend::new();
        let found = backend.find_by_name(&name).await.unwrap().unwrap();
        assert!(found.memory_bytes > 0);
        assert!(found.start_time <= Utc::now());
    }

    #[tokio::test]
    async fn test_terminate_missing_process() {
        let mut backend = SystemBackend::new();
        let result = backend.terminate(0x3FFF_FFFF).await;
        assert!(matches!(result, Err(FpsmonError::ProcessLookup(_))));
    }

    #[tokio::test]
    async fn test_probe_reaped_child() {
        let temp_dir = TempDir::new().unwrap();
        let mut backend = SystemBackend::new();
        let spawned = backend
            .spawn(Path::new("/bin/true"), temp_dir.path())
            .await
            .unwrap();

        let mut alive = true;
        for _ in 0..50 {
            if backend.probe(spawned.pid).await.unwrap().is_none() {
                alive = false;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(!alive);
    }
}
