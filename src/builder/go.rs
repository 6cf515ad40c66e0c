//! Go toolchain builder
//!
//! One job = one working directory:
//!
//! ```text
//! {work_root}/{uuid}/
//!   src/            unpacked repository
//!   home/           HOME, GOPATH, GOCACHE, module cache
//!   out/            the single built binary
//! ```
//!
//! Only the fetch phase (archive download, `go mod download`) may reach the
//! network. The compile phase runs with `GOPROXY=off`.

use crate::artifact::{Artifact, CacheKey};
use crate::builder::process::{run_step, Limits, StepFailure};
use crate::builder::unpack::unpack_tar_gz;
use crate::builder::workdir::WorkDir;
use crate::builder::{Builder, PlatformSet, SourceLocation};
use crate::config::schema::BuilderConfig;
use crate::config::ConfigManager;
use crate::error::BuildError;
use crate::http::{bearer, HttpClient};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Builds Go packages with `go build`
pub struct GoBuilder {
    go_binary: String,
    work_root: PathBuf,
    timeout: Duration,
    limits: Limits,
    max_archive_bytes: u64,
    goproxy: String,
    platforms: PlatformSet,
    archive_token: Option<String>,
    http: HttpClient,
}

impl GoBuilder {
    /// `archive_token` authenticates source downloads (the GitHub token)
    pub fn new(config: &BuilderConfig, archive_token: Option<String>) -> Self {
        Self {
            go_binary: config.go_binary.clone(),
            work_root: config
                .work_dir
                .clone()
                .unwrap_or_else(ConfigManager::builds_dir),
            timeout: config.timeout(),
            limits: Limits {
                cpu_secs: config.cpu_limit_secs,
                file_bytes: config.max_file_bytes(),
            },
            max_archive_bytes: config.max_archive_bytes(),
            goproxy: config.goproxy.clone(),
            platforms: PlatformSet::parse(&config.platforms),
            archive_token,
            http: HttpClient::new(config.timeout()),
        }
    }

    pub fn platforms(&self) -> &PlatformSet {
        &self.platforms
    }

    fn timed_out(&self) -> BuildError {
        BuildError::Timeout {
            secs: self.timeout.as_secs(),
        }
    }

    /// Toolchain command with a cleared, job-local environment
    fn go_command(&self, dir: &WorkDir, args: &[&str]) -> Command {
        let home = dir.join("home");
        let mut cmd = Command::new(&self.go_binary);
        cmd.args(args)
            .current_dir(dir.join("src"))
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("HOME", &home)
            .env("GOPATH", home.join("go"))
            .env("GOCACHE", home.join("cache"))
            .env("GOTOOLCHAIN", "local")
            .env("GOFLAGS", "-mod=mod -modcacherw")
            .env("CGO_ENABLED", "0");
        cmd
    }

    async fn fetch(
        &self,
        dir: &WorkDir,
        source: &SourceLocation,
        deadline: Instant,
    ) -> Result<(), BuildError> {
        debug!(url = %source.archive_url, "downloading source archive");

        let headers = bearer(self.archive_token.as_deref()).into_iter().collect();
        let download = self
            .http
            .get(&source.archive_url, headers, self.max_archive_bytes);
        let resp = tokio::time::timeout_at(deadline, download)
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| BuildError::fetch(e.to_string()))?;

        if !resp.is_success() {
            return Err(BuildError::fetch(format!(
                "GET {} returned HTTP {}",
                source.archive_url, resp.status
            )));
        }

        let src = dir.join("src");
        for path in [&src, &dir.join("home"), &dir.join("out")] {
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| BuildError::fetch(format!("creating {}: {}", path.display(), e)))?;
        }

        let archive = resp.body;
        let dest = src.clone();
        let unpack = tokio::task::spawn_blocking(move || unpack_tar_gz(&archive, &dest));
        let files = tokio::time::timeout_at(deadline, unpack)
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| BuildError::fetch(format!("unpacking archive: {}", e)))?
            .map_err(|e| BuildError::fetch(format!("unpacking archive: {}", e)))?;
        debug!(files, "unpacked source archive");

        // Packages predating modules get a synthesized go.mod
        let needs_init = !src.join("go.mod").exists();
        if needs_init {
            let init = self.go_command(dir, &["mod", "init", source.module.as_str()]);
            run_step(init, deadline, self.limits)
                .await
                .map_err(|f| self.step_error(f, "go mod init", BuildError::fetch))?;
        }

        let (step, args) = if needs_init {
            ("go mod tidy", ["mod", "tidy"])
        } else {
            ("go mod download", ["mod", "download"])
        };
        let mut modules = self.go_command(dir, &args);
        modules.env("GOPROXY", &self.goproxy);
        run_step(modules, deadline, self.limits)
            .await
            .map_err(|f| self.step_error(f, step, BuildError::fetch))?;

        Ok(())
    }

    async fn compile(
        &self,
        dir: &WorkDir,
        key: &CacheKey,
        source: &SourceLocation,
        deadline: Instant,
    ) -> Result<Vec<u8>, BuildError> {
        let out_dir = dir.join("out");
        let mut binary_name = source.binary_name.clone();
        if key.os == "windows" {
            binary_name.push_str(".exe");
        }
        let output = out_dir.join(&binary_name);
        let output_arg = output.to_string_lossy().into_owned();
        let package = match &source.subpath {
            Some(sub) => format!("./{}", sub),
            None => ".".to_string(),
        };

        let mut cmd = self.go_command(
            dir,
            &[
                "build",
                "-trimpath",
                "-ldflags=-s -w",
                "-o",
                output_arg.as_str(),
                package.as_str(),
            ],
        );
        cmd.env("GOOS", &key.os)
            .env("GOARCH", &key.arch)
            .env("GOPROXY", "off")
            .env("GOSUMDB", "off");

        run_step(cmd, deadline, self.limits)
            .await
            .map_err(|f| self.step_error(f, "go build", BuildError::compile))?;

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&out_dir)
            .await
            .map_err(|e| BuildError::compile(format!("reading output directory: {}", e)))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BuildError::compile(format!("reading output directory: {}", e)))?
        {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }

        if files.len() != 1 {
            return Err(BuildError::compile(format!(
                "expected exactly one binary, found {}",
                files.len()
            )));
        }

        tokio::fs::read(&files[0])
            .await
            .map_err(|e| BuildError::compile(format!("reading binary: {}", e)))
    }

    /// Map a failed step to `Timeout`, or to `kind` with its diagnostics
    fn step_error(
        &self,
        failure: StepFailure,
        step: &str,
        kind: fn(String) -> BuildError,
    ) -> BuildError {
        match failure {
            StepFailure::TimedOut => self.timed_out(),
            other => {
                let detail = other.describe(step);
                error!(step, output = %detail, "build step failed");
                kind(detail)
            }
        }
    }
}

#[async_trait]
impl Builder for GoBuilder {
    fn supports(&self, os: &str, arch: &str) -> bool {
        self.platforms.contains(os, arch)
    }

    async fn build(&self, key: &CacheKey, source: &SourceLocation) -> Result<Artifact, BuildError> {
        if !self.supports(&key.os, &key.arch) {
            return Err(BuildError::UnsupportedPlatform {
                os: key.os.clone(),
                arch: key.arch.clone(),
            });
        }

        let started = std::time::Instant::now();
        let deadline = Instant::now() + self.timeout;
        info!(key = %key, "build started");

        let dir = WorkDir::create(&self.work_root)
            .await
            .map_err(|e| BuildError::fetch(format!("creating build directory: {}", e)))?;

        let result = async {
            self.fetch(&dir, source, deadline).await?;
            self.compile(&dir, key, source, deadline).await
        }
        .await;
        dir.cleanup().await;

        let bytes = result?;
        let artifact = Artifact::new(key.clone(), bytes);
        info!(
            key = %key,
            size = artifact.size,
            checksum = %artifact.checksum,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build finished"
        );
        Ok(artifact)
    }
}
