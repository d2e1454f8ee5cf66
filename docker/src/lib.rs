use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerParams {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<(String, String)>,
    pub memory: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// A live image pull that can be awaited or force-killed mid-flight.
#[async_trait]
pub trait PullProcess: Send {
    async fn wait(&mut self) -> Result<()>;
    async fn kill(&mut self) -> Result<()>;
}

#[async_trait]
pub trait ContainerRuntime: Sync + Send {
    async fn start_pull(&self, image: &str) -> Result<Box<dyn PullProcess>>;
    async fn start_container(&self, params: &ContainerParams) -> Result<ContainerHandle>;
    /// Restarts a previously created container by name (`docker start`).
    async fn restart_container(&self, name: &str) -> Result<()>;
    async fn is_running(&self, name: &str) -> Result<bool>;
    async fn is_daemon_online(&self) -> bool;
    /// Spawns a task piping the container's log output into the process log.
    async fn follow_logs(&self, name: &str) -> Result<()>;
}

pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    async fn output(&self, args: &[&str]) -> Result<std::process::Output> {
        log::debug!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.binary))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

struct DockerPull {
    child: Child,
}

#[async_trait]
impl PullProcess for DockerPull {
    async fn wait(&mut self) -> Result<()> {
        let status = self.child.wait().await?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(pipe) = self.child.stderr.take() {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    stderr.push_str(&line);
                    stderr.push('\n');
                }
            }
            bail!("docker pull exited with {status}: {}", stderr.trim());
        }
        Ok(())
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

pub fn run_args(params: &ContainerParams) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        params.name.clone(),
    ];
    for port in &params.ports {
        args.push("-p".to_string());
        args.push(format!("{}:{}", port.host, port.container));
    }
    for (host, container) in &params.volumes {
        args.push("-v".to_string());
        args.push(format!("{host}:{container}"));
    }
    if let Some(memory) = &params.memory {
        args.push("--memory".to_string());
        args.push(memory.clone());
    }
    args.push(params.image.clone());
    args.extend(params.args.iter().cloned());
    args
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start_pull(&self, image: &str) -> Result<Box<dyn PullProcess>> {
        log::info!("Pulling image {image}");
        let child = Command::new(&self.binary)
            .args(["pull", image])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {} pull", self.binary))?;
        Ok(Box::new(DockerPull { child }))
    }

    async fn start_container(&self, params: &ContainerParams) -> Result<ContainerHandle> {
        let args = run_args(params);
        let args = args.iter().map(String::as_str).collect::<Vec<_>>();
        let output = self.output(&args).await?;
        if !output.status.success() {
            bail!(
                "docker run failed for {}: {}",
                params.name,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        log::info!("Started container {} ({id})", params.name);
        Ok(ContainerHandle {
            id,
            name: params.name.clone(),
        })
    }

    async fn restart_container(&self, name: &str) -> Result<()> {
        let output = self.output(&["start", name]).await?;
        if !output.status.success() {
            bail!(
                "docker start failed for {name}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        let output = self.output(&["inspect", "-f", "{{.State.Running}}", name]).await?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn is_daemon_online(&self) -> bool {
        match self.output(&["info"]).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn follow_logs(&self, name: &str) -> Result<()> {
        let mut child = Command::new(&self.binary)
            .args(["logs", "-f", "--tail", "0", name])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {} logs", self.binary))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let container = name.to_string();
        tokio::spawn(async move {
            if let Some(pipe) = stdout {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::info!("[{container}] {line}");
                }
            }
        });
        let container = name.to_string();
        tokio::spawn(async move {
            if let Some(pipe) = stderr {
                let mut lines = BufReader::new(pipe).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::info!("[{container}] {line}");
                }
            }
            let _ = child.wait().await;
        });
        Ok(())
    }
}
