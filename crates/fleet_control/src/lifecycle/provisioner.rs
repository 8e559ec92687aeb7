//! Creating and launching new instance directories.
//!
//! Layout under the instance root:
//!
//! ```text
//! <root>/<type>/template/                 copied for every new instance
//! <root>/<type>/active-servers/<name>/    one directory per provisioned instance
//! ```
//!
//! Provisioning copies the template, points `server-port` and `query.port` in
//! `server.properties` at the assigned port, writes a start script and
//! launches it as a detached process. The orchestrator never supervises the
//! launched process; it learns whether startup worked from later probes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::FleetError;
use crate::types::Slot;

/// File inside each instance directory that carries its listen ports.
pub const PROPERTIES_FILE: &str = "server.properties";

const PORT_KEYS: [&str; 2] = ["server-port", "query.port"];

#[cfg(unix)]
const START_SCRIPT: &str = "run.sh";
#[cfg(windows)]
const START_SCRIPT: &str = "run.bat";

/// Side-effecting half of instance creation.
///
/// Any error returned here is reported to clients as a failed initialization;
/// it never aborts the dispatcher.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Materializes and starts the instance `name` occupying `slot`, listening
    /// on `port`.
    async fn provision(&self, slot: &Slot, name: &str, port: &str) -> Result<(), FleetError>;
}

/// Provisions instances as directories on the local filesystem.
#[derive(Debug, Clone)]
pub struct FilesystemProvisioner {
    root: PathBuf,
    launch_command: String,
    launch: bool,
}

impl FilesystemProvisioner {
    /// Creates a provisioner rooted at `root` that starts instances with
    /// `launch_command`.
    pub fn new(root: impl Into<PathBuf>, launch_command: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            launch_command: launch_command.into(),
            launch: true,
        }
    }

    /// Prepares instance directories without starting them.
    pub fn without_launch(mut self) -> Self {
        self.launch = false;
        self
    }

    pub fn template_dir(&self, slot: &Slot) -> PathBuf {
        self.root.join(slot.instance_type.as_str()).join("template")
    }

    pub fn instance_dir(&self, slot: &Slot, name: &str) -> PathBuf {
        self.root
            .join(slot.instance_type.as_str())
            .join("active-servers")
            .join(name)
    }

    async fn write_start_script(&self, dir: &Path) -> Result<PathBuf, FleetError> {
        let script = dir.join(START_SCRIPT);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let body = format!("#!/bin/sh\ncd \"$(dirname \"$0\")\"\nexec {}\n", self.launch_command);
            fs::write(&script, body).await?;
            fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).await?;
        }

        #[cfg(windows)]
        {
            let body = format!("@echo off\r\ncd /d \"%~dp0\"\r\n{}\r\n", self.launch_command);
            fs::write(&script, body).await?;
        }

        Ok(script)
    }
}

#[async_trait]
impl Provisioner for FilesystemProvisioner {
    async fn provision(&self, slot: &Slot, name: &str, port: &str) -> Result<(), FleetError> {
        let template = self.template_dir(slot);
        let target = self.instance_dir(slot, name);

        debug!("Copying {} to {}", template.display(), target.display());
        copy_dir_recursive(&template, &target).await?;

        set_properties(&target.join(PROPERTIES_FILE), &PORT_KEYS, port).await?;

        let script = self.write_start_script(&target).await?;

        if self.launch {
            spawn_detached(&script, &target)?;
            info!("🚀 Launched instance {} on port {}", name, port);
        } else {
            info!("📁 Prepared instance {} on port {} (launch disabled)", name, port);
        }

        Ok(())
    }
}

/// Copies the tree at `from` into `to`, creating directories as needed and
/// overwriting files that already exist.
pub async fn copy_dir_recursive(from: &Path, to: &Path) -> Result<(), FleetError> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst).await?;

        let mut entries = fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let dest = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), dest));
            } else {
                fs::copy(entry.path(), &dest).await?;
            }
        }
    }

    Ok(())
}

/// Sets every key in `keys` to `value` in a Java-style properties file.
///
/// Existing assignments are replaced in place and missing keys are appended.
/// Comments, ordering and unrelated keys are left untouched.
pub async fn set_properties(path: &Path, keys: &[&str], value: &str) -> Result<(), FleetError> {
    let contents = fs::read_to_string(path).await?;
    fs::write(path, rewrite_properties(&contents, keys, value)).await?;
    Ok(())
}

fn rewrite_properties(contents: &str, keys: &[&str], value: &str) -> String {
    let mut seen = vec![false; keys.len()];
    let mut out = String::with_capacity(contents.len() + 64);

    for line in contents.lines() {
        match keys.iter().position(|key| assigns_key(line, key)) {
            Some(idx) => {
                seen[idx] = true;
                out.push_str(&format!("{}={}", keys[idx], value));
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }

    for (key, _) in keys.iter().zip(&seen).filter(|(_, seen)| !**seen) {
        out.push_str(&format!("{key}={value}\n"));
    }

    out
}

fn assigns_key(line: &str, key: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with('!') {
        return false;
    }
    trimmed
        .strip_prefix(key)
        .and_then(|rest| rest.trim_start().chars().next())
        .is_some_and(|c| c == '=' || c == ':')
}

fn spawn_detached(script: &Path, dir: &Path) -> Result<(), FleetError> {
    #[cfg(unix)]
    let mut command = {
        let mut command = Command::new("sh");
        command.arg(script).process_group(0);
        command
    };

    #[cfg(windows)]
    let mut command = {
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        let mut command = Command::new("cmd");
        command.arg("/C").arg(script).creation_flags(DETACHED_PROCESS);
        command
    };

    let child = command
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    debug!("Instance process started with pid {:?}", child.id());
    Ok(())
}
