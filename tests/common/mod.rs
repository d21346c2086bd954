// Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fpsmon::config::{CrashMonitorConfig, MonitorConfig};
use fpsmon::error::{FpsmonError, Result};
use fpsmon::process::{FoundProcess, ProcessBackend, SpawnedServer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Calls observed by a [`FakeBackend`]
#[derive(Debug, Default)]
pub struct BackendCalls {
    pub terminated: Vec<u32>,
    pub spawned: Vec<PathBuf>,
    /// Process returned by `find_by_name`
    pub running: Option<FoundProcess>,
    /// Pids reported alive by `probe`
    pub alive: Vec<u32>,
    pub fail_spawn: bool,
    next_pid: u32,
}

/// In-memory process backend
#[derive(Clone, Default)]
pub struct FakeBackend {
    pub calls: Arc<Mutex<BackendCalls>>,
}

impl FakeBackend {
    pub fn with_running(pid: u32, start_time: DateTime<Utc>) -> Self {
        let backend = Self::default();
        {
            let mut calls = backend.calls.lock().unwrap();
            calls.running = Some(FoundProcess {
                pid,
                start_time,
                memory_bytes: 512 * 1024 * 1024,
            });
            calls.alive.push(pid);
        }
        backend
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.calls.lock().unwrap().terminated.clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.calls.lock().unwrap().spawned.len()
    }
}

#[async_trait]
impl ProcessBackend for FakeBackend {
    async fn find_by_name(&mut self, _name: &str) -> Result<Option<FoundProcess>> {
        Ok(self.calls.lock().unwrap().running.clone())
    }

    async fn probe(&mut self, pid: u32) -> Result<Option<u64>> {
        let calls = self.calls.lock().unwrap();
        Ok(calls.alive.contains(&pid).then_some(256 * 1024 * 1024))
    }

    async fn terminate(&mut self, pid: u32) -> Result<()> {
        let mut calls = self.calls.lock().unwrap();
        calls.terminated.push(pid);
        calls.alive.retain(|p| *p != pid);
        if calls.running.as_ref().map(|p| p.pid) == Some(pid) {
            calls.running = None;
        }
        Ok(())
    }

    async fn spawn(&mut self, exe: &Path, _cwd: &Path) -> Result<SpawnedServer> {
        let mut calls = self.calls.lock().unwrap();
        calls.spawned.push(exe.to_path_buf());
        if calls.fail_spawn {
            return Err(FpsmonError::Spawn("spawn disabled".to_string()));
        }

        calls.next_pid += 1;
        let pid = 10_000 + calls.next_pid;
        calls.alive.push(pid);
        Ok(SpawnedServer {
            pid,
            started: Utc::now(),
        })
    }
}

/// Log root, data dir and server working dir under one temp dir
pub struct Workspace {
    pub temp: TempDir,
    pub log_root: PathBuf,
    pub data_dir: PathBuf,
    pub server_dir: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let log_root = temp.path().join("logs");
        let data_dir = temp.path().join("data");
        let server_dir = temp.path().join("server");
        fs::create_dir_all(&log_root).unwrap();
        fs::create_dir_all(&server_dir).unwrap();

        Self {
            temp,
            log_root,
            data_dir,
            server_dir,
        }
    }

    pub fn config(&self) -> MonitorConfig {
        let mut config = MonitorConfig::for_log_root(&self.log_root);
        config.data_dir = self.data_dir.clone();
        config
    }

    /// Configuration with crash supervision and no restart delays
    pub fn crash_config(&self, max_restart_attempts: u32) -> MonitorConfig {
        let mut config = self.config();
        config.crash_monitor = CrashMonitorConfig {
            enabled: true,
            server_exe_path: self.server_dir.join("ArmaReforgerServer"),
            server_working_dir: self.server_dir.clone(),
            crash_keywords: vec!["Application crashed".to_string(), "FATAL".to_string()],
            max_restart_attempts,
            restart_cooldown_minutes: 0,
            restart_delay_seconds: 0,
            update_title: false,
            ..CrashMonitorConfig::default()
        };
        config
    }

    /// Write `lines` as the console log of session `name`
    pub fn write_log(&self, session: &str, lines: &[&str]) -> PathBuf {
        let dir = self.log_root.join(session);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("console.log");
        fs::write(&path, lines.join("\n") + "\n").unwrap();
        path
    }
}

pub fn at(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, hour, min, sec).unwrap()
}
