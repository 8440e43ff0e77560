//! Publish and deploy trigger.
//!
//! Commits the changed catalog, pushes it, rebuilds and redeploys the site, restarts the local
//! server and checks that it answers. Every external process goes through a [`CommandRunner`] so
//! runs can be exercised without git or a node toolchain.

use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use crate::{
    config::PublishConfig,
    error::SiteError,
    outcome::{Outcome, PublishReport, Step},
    retry::retry_with_backoff,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new<S: Into<String>>(program: S, args: Vec<String>, timeout: Duration) -> Self {
        CommandSpec {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// `None` for an empty word list, which marks a step as disabled.
    pub fn from_words(words: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = words.split_first()?;
        Some(CommandSpec::new(program.clone(), args.to_vec(), timeout))
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion within `spec.timeout`, capturing output. A non-zero exit is not an
    /// error at this level.
    async fn run(&self, cwd: &Path, spec: &CommandSpec) -> Result<CommandOutput, SiteError>;

    /// Launch a long-running process and return without waiting for it.
    async fn spawn_detached(&self, cwd: &Path, spec: &CommandSpec) -> Result<(), SiteError>;
}

/// Run `spec` and turn a non-zero exit into [`SiteError::Process`].
pub async fn run_checked(
    runner: &dyn CommandRunner,
    cwd: &Path,
    spec: &CommandSpec,
) -> Result<CommandOutput, SiteError> {
    tracing::debug!("+ {}", spec.display());
    let output = runner.run(cwd, spec).await?;
    if output.success() {
        Ok(output)
    } else {
        let detail = output
            .stderr
            .lines()
            .chain(output.stdout.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();
        let status = output
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        Err(SiteError::Process(format!(
            "`{}` exited with status {status}: {detail}",
            spec.program
        )))
    }
}

/// Runs real child processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, cwd: &Path, spec: &CommandSpec) -> Result<CommandOutput, SiteError> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.spawn().map_err(|err| {
            SiteError::Process(format!("failed to start `{}`: {err}", spec.program))
        })?;
        let output = tokio::time::timeout(spec.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                SiteError::Process(format!(
                    "`{}` timed out after {}s",
                    spec.program,
                    spec.timeout.as_secs()
                ))
            })??;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn spawn_detached(&self, cwd: &Path, spec: &CommandSpec) -> Result<(), SiteError> {
        tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                SiteError::Process(format!("failed to start `{}`: {err}", spec.program))
            })?;
        Ok(())
    }
}

pub struct Publisher<'a> {
    config: &'a PublishConfig,
    site_root: &'a Path,
    runner: &'a dyn CommandRunner,
}

impl<'a> Publisher<'a> {
    pub fn new(
        config: &'a PublishConfig,
        site_root: &'a Path,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Publisher {
            config,
            site_root,
            runner,
        }
    }

    fn git(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new(
            self.config.git_program.clone(),
            args.iter().map(|a| a.to_string()).collect(),
            self.config.git_timeout,
        )
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(self.site_root).unwrap_or(path)
    }

    /// Stage `files`, commit them, then pull-rebase and push with the configured retries.
    pub async fn commit_and_push(&self, files: &[PathBuf], message: &str) -> PublishReport {
        let mut report = PublishReport::default();

        let commit = self.commit(files, message).await;
        if !report.record(Step::Commit, Outcome::from_result(commit)).is_success() {
            report.record(Step::Push, Outcome::Skipped("commit failed".to_string()));
            return report;
        }

        let remote = self.config.remote.as_str();
        let branch = self.config.branch.as_str();
        let push = retry_with_backoff(&self.config.push_retry, "git push", |_| async move {
            run_checked(
                self.runner,
                self.site_root,
                &self.git(&["pull", "--rebase", remote, branch]),
            )
            .await?;
            run_checked(self.runner, self.site_root, &self.git(&["push", remote, branch])).await
        })
        .await;
        report.record(Step::Push, Outcome::from_result(push));
        report
    }

    async fn commit(&self, files: &[PathBuf], message: &str) -> Result<(), SiteError> {
        let mut add = vec!["add".to_string(), "--".to_string()];
        add.extend(
            files
                .iter()
                .map(|f| self.relative(f).to_string_lossy().to_string()),
        );
        let add = CommandSpec::new(self.config.git_program.clone(), add, self.config.git_timeout);
        run_checked(self.runner, self.site_root, &add).await?;
        run_checked(self.runner, self.site_root, &self.git(&["commit", "-m", message])).await?;
        tracing::info!("📦 git commit: {message}");
        Ok(())
    }

    /// Build, deploy, restart and liveness check. Each step is independent and best-effort.
    pub async fn deploy(&self) -> PublishReport {
        let mut report = PublishReport::default();

        let build = self.run_optional(&self.config.build_command, self.config.build_timeout);
        report.record(Step::Build, build.await);

        let deploy = self.run_optional(&self.config.deploy_command, self.config.deploy_timeout);
        report.record(Step::Deploy, deploy.await);

        report.record(Step::Restart, self.restart().await);
        report.record(Step::Liveness, self.liveness().await);
        report
    }

    async fn run_optional(&self, words: &[String], timeout: Duration) -> Outcome {
        match CommandSpec::from_words(words, timeout) {
            Some(spec) => {
                tracing::info!("🔨 {}", spec.display());
                Outcome::from_result(run_checked(self.runner, self.site_root, &spec).await)
            }
            None => Outcome::Skipped("no command configured".to_string()),
        }
    }

    /// Process-manager restart, falling back to killing the port owner and relaunching.
    pub async fn restart(&self) -> Outcome {
        let timeout = self.config.restart_timeout;
        let manager = CommandSpec::from_words(&self.config.restart_command, timeout);
        let start = CommandSpec::from_words(&self.config.start_command, timeout);
        if manager.is_none() && start.is_none() {
            return Outcome::Skipped("no restart command configured".to_string());
        }

        if let Some(spec) = manager {
            match run_checked(self.runner, self.site_root, &spec).await {
                Ok(_) => {
                    tracing::info!("🌐 server restarted via `{}`", spec.program);
                    return Outcome::Success;
                }
                Err(err) => {
                    tracing::warn!("process manager restart failed: {}", err.headline());
                    if start.is_none() {
                        return Outcome::Failed(err.headline());
                    }
                }
            }
        }

        let Some(start) = start else {
            return Outcome::Skipped("no start command configured".to_string());
        };
        if let Err(err) = self.stop_port_owner(timeout).await {
            tracing::debug!("stopping port {} owner: {}", self.config.port, err.headline());
        }
        tokio::time::sleep(Duration::from_secs(1).min(timeout)).await;
        let relaunch = self.runner.spawn_detached(self.site_root, &start).await;
        if relaunch.is_ok() {
            tracing::info!("🌐 server relaunched: {}", start.display());
        }
        Outcome::from_result(relaunch)
    }

    async fn stop_port_owner(&self, timeout: Duration) -> Result<(), SiteError> {
        let lsof = CommandSpec::new(
            "lsof",
            vec!["-ti".to_string(), format!(":{}", self.config.port)],
            timeout,
        );
        // lsof exits 1 when nothing listens.
        let output = self.runner.run(self.site_root, &lsof).await?;
        let pids: Vec<String> = output
            .stdout
            .split_whitespace()
            .filter(|pid| pid.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .collect();
        if pids.is_empty() {
            return Ok(());
        }
        let kill = CommandSpec::new("kill", pids, timeout);
        run_checked(self.runner, self.site_root, &kill).await?;
        Ok(())
    }

    /// Poll the liveness URL until it answers 200 or the timeout elapses.
    pub async fn liveness(&self) -> Outcome {
        let Some(url) = self.config.liveness_url.as_deref() else {
            return Outcome::Skipped("no liveness url configured".to_string());
        };
        match wait_for_ok(
            url,
            self.config.liveness_timeout,
            self.config.liveness_interval,
        )
        .await
        {
            Ok(()) => Outcome::Success,
            Err(err) => Outcome::Failed(err.headline()),
        }
    }
}

/// GET `url` every `interval` until it returns 200, giving up after `timeout`.
pub async fn wait_for_ok(
    url: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<(), SiteError> {
    let per_request = interval
        .max(Duration::from_secs(1))
        .min(timeout.max(Duration::from_millis(1)));
    let client = reqwest::Client::builder().timeout(per_request).build()?;
    let mut last = String::from("no response");
    let poll = async {
        loop {
            match client.get(url).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::OK => return,
                Ok(resp) => last = format!("HTTP {}", resp.status().as_u16()),
                Err(err) => last = SiteError::from(err).headline(),
            }
            tokio::time::sleep(interval).await;
        }
    };
    match tokio::time::timeout(timeout, poll).await {
        Ok(()) => {
            tracing::info!("💓 {url} is live");
            Ok(())
        }
        Err(_) => Err(SiteError::Network(format!(
            "{url} not live after {}s ({last})",
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use std::sync::Mutex;

    /// Fails any command whose rendered line starts with one of `failing`.
    struct ScriptedRunner {
        failing: Vec<&'static str>,
        lsof_stdout: &'static str,
        calls: Mutex<Vec<String>>,
        spawned: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(failing: Vec<&'static str>) -> Self {
            ScriptedRunner {
                failing,
                lsof_stdout: "",
                calls: Mutex::new(Vec::new()),
                spawned: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, _cwd: &Path, spec: &CommandSpec) -> Result<CommandOutput, SiteError> {
            let line = spec.display();
            self.calls.lock().unwrap().push(line.clone());
            let failed = self.failing.iter().any(|prefix| line.starts_with(prefix));
            Ok(CommandOutput {
                code: Some(if failed { 1 } else { 0 }),
                stdout: if spec.program == "lsof" {
                    self.lsof_stdout.to_string()
                } else {
                    String::new()
                },
                stderr: if failed { "boom".to_string() } else { String::new() },
            })
        }

        async fn spawn_detached(&self, _cwd: &Path, spec: &CommandSpec) -> Result<(), SiteError> {
            self.spawned.lock().unwrap().push(spec.display());
            Ok(())
        }
    }

    fn config() -> PublishConfig {
        PublishConfig {
            push_retry: RetryPolicy::new(3, Duration::ZERO),
            restart_timeout: Duration::from_millis(10),
            liveness_url: None,
            ..PublishConfig::default()
        }
    }

    #[tokio::test]
    async fn commit_and_push_runs_git_in_order() {
        let runner = ScriptedRunner::new(vec![]);
        let config = config();
        let root = Path::new("/srv/site");
        let publisher = Publisher::new(&config, root, &runner);
        let report = publisher
            .commit_and_push(
                &[root.join("content/standards/standards-catalog.json")],
                "auto: update",
            )
            .await;
        assert!(report.git_succeeded());
        assert_eq!(
            runner.calls(),
            vec![
                "git add -- content/standards/standards-catalog.json",
                "git commit -m auto: update",
                "git pull --rebase origin main",
                "git push origin main",
            ]
        );
    }

    #[tokio::test]
    async fn push_is_retried_then_reported_failed() {
        let runner = ScriptedRunner::new(vec!["git push"]);
        let config = config();
        let publisher = Publisher::new(&config, Path::new("/srv/site"), &runner);
        let report = publisher.commit_and_push(&[], "auto: update").await;
        assert!(!report.git_succeeded());
        let pushes = runner
            .calls()
            .iter()
            .filter(|c| c.starts_with("git push"))
            .count();
        assert_eq!(pushes, 3);
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].starts_with("push: "));
    }

    #[tokio::test]
    async fn failed_commit_skips_push() {
        let runner = ScriptedRunner::new(vec!["git commit"]);
        let config = config();
        let publisher = Publisher::new(&config, Path::new("/srv/site"), &runner);
        let report = publisher.commit_and_push(&[], "auto: update").await;
        assert!(matches!(report.outcome(Step::Push), Some(Outcome::Skipped(_))));
        assert!(!runner.calls().iter().any(|c| c.starts_with("git push")));
    }

    #[tokio::test]
    async fn build_failure_does_not_stop_deploy() {
        let runner = ScriptedRunner::new(vec!["npx next build"]);
        let config = config();
        let publisher = Publisher::new(&config, Path::new("/srv/site"), &runner);
        let report = publisher.deploy().await;
        assert!(report.outcome(Step::Build).unwrap().is_failure());
        assert!(report.outcome(Step::Deploy).unwrap().is_success());
        assert!(report.outcome(Step::Restart).unwrap().is_success());
        assert!(matches!(
            report.outcome(Step::Liveness),
            Some(Outcome::Skipped(_))
        ));
    }

    #[tokio::test]
    async fn restart_falls_back_to_kill_and_relaunch() {
        let mut runner = ScriptedRunner::new(vec!["pm2"]);
        runner.lsof_stdout = "4242\n4243\n";
        let config = config();
        let publisher = Publisher::new(&config, Path::new("/srv/site"), &runner);
        assert_eq!(publisher.restart().await, Outcome::Success);
        assert!(runner.calls().contains(&"kill 4242 4243".to_string()));
        assert_eq!(
            runner.spawned.lock().unwrap().clone(),
            vec!["npx next start -p 3000".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_commands_are_skipped() {
        let runner = ScriptedRunner::new(vec![]);
        let config = PublishConfig {
            build_command: vec![],
            deploy_command: vec![],
            restart_command: vec![],
            start_command: vec![],
            ..config()
        };
        let publisher = Publisher::new(&config, Path::new("/srv/site"), &runner);
        let report = publisher.deploy().await;
        assert!(report.failures().is_empty());
        assert!(report
            .steps()
            .iter()
            .all(|s| matches!(s.outcome, Outcome::Skipped(_))));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn liveness_times_out_against_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let result = wait_for_ok(
            &format!("http://127.0.0.1:{port}/"),
            Duration::from_millis(300),
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result, Err(SiteError::Network(_))));
    }
}
