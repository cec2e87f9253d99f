use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::process::{Command, Stdio};

use crate::config::CliConfig;
use crate::utils;

/// Start the orchestrator as a detached background process, recording its
/// PID so `stop`/`status` can find it again.
pub async fn start(bind_address: Option<String>) -> Result<()> {
    let config = CliConfig::load()?;
    let pid_file = CliConfig::pids_dir()?.join("orchestrator.pid");

    if pid_file.exists() && pid_is_running(&pid_file) {
        println!("{}", "orchestrator is already running".yellow());
        println!("run 'webhook-proxy stop' first to restart it");
        return Ok(());
    }

    let binary = utils::orchestrator_binary_path()?;
    let mut command = Command::new(&binary);
    command
        .env("PROXY_BIND_ADDRESS", bind_address.unwrap_or_else(|| "0.0.0.0:8080".to_string()))
        .env("JWT_SECRET", &config.api_token)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let child = command
        .spawn()
        .with_context(|| format!("failed to spawn orchestrator at {binary:?}"))?;

    fs::write(&pid_file, child.id().to_string())?;
    println!("{} orchestrator started (pid {})", "ok:".green(), child.id());
    Ok(())
}

pub async fn stop() -> Result<()> {
    let pid_file = CliConfig::pids_dir()?.join("orchestrator.pid");
    if !pid_file.exists() {
        println!("orchestrator is not running");
        return Ok(());
    }

    let pid: i32 = fs::read_to_string(&pid_file)?.trim().parse().context("corrupt pid file")?;
    #[cfg(unix)]
    {
        unsafe {
            libc_kill(pid);
        }
    }
    let _ = fs::remove_file(&pid_file);
    println!("{} orchestrator stopped", "ok:".green());
    Ok(())
}

pub async fn status() -> Result<()> {
    let pid_file = CliConfig::pids_dir()?.join("orchestrator.pid");
    if pid_file.exists() && pid_is_running(&pid_file) {
        println!("{}", "orchestrator is running".green());
    } else {
        println!("{}", "orchestrator is not running".yellow());
    }
    Ok(())
}

fn pid_is_running(pid_file: &std::path::Path) -> bool {
    let Ok(contents) = fs::read_to_string(pid_file) else {
        return false;
    };
    let Ok(pid) = contents.trim().parse::<i32>() else {
        return false;
    };
    #[cfg(unix)]
    {
        return unsafe { libc_kill_probe(pid) };
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(unix)]
unsafe fn libc_kill_probe(pid: i32) -> bool {
    libc::kill(pid, 0) == 0
}

#[cfg(unix)]
unsafe fn libc_kill(pid: i32) {
    libc::kill(pid, libc::SIGTERM);
}
