//! Process layer for build commands.
//!
//! Renders the build command from its template, spawns it in its own process
//! group, streams its output line by line and persists run logs.

use crate::domain::{BuildRequest, OutputLine, OutputStream, RunId};
use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

const PLACEHOLDER_PATTERN: &str = r"\{([^{}]*)\}";
const KNOWN_PLACEHOLDERS: &[&str] = &["build_type", "workers", "packages"];
const PACKAGES_PLACEHOLDER: &str = "{packages}";

/// Build tool invocation with `{build_type}`, `{workers}` and `{packages}`
/// placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    #[serde(default = "default_program")]
    pub program: String,
    /// Always passed, first
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Passed when symlink install is enabled
    #[serde(default = "default_symlink_install_args")]
    pub symlink_install_args: Vec<String>,
    #[serde(default = "default_parallel_args")]
    pub parallel_args: Vec<String>,
    /// Passed unless the build type is left to the packages
    #[serde(default = "default_build_type_args")]
    pub build_type_args: Vec<String>,
    /// `{packages}` must be a whole argument; it expands to one per package
    #[serde(default = "default_package_args")]
    pub package_args: Vec<String>,
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            symlink_install_args: default_symlink_install_args(),
            parallel_args: default_parallel_args(),
            build_type_args: default_build_type_args(),
            package_args: default_package_args(),
        }
    }
}

fn default_program() -> String {
    "colcon".to_string()
}

fn default_args() -> Vec<String> {
    vec!["build".into()]
}

fn default_symlink_install_args() -> Vec<String> {
    vec!["--symlink-install".into()]
}

fn default_parallel_args() -> Vec<String> {
    vec!["--parallel-workers".into(), "{workers}".into()]
}

fn default_build_type_args() -> Vec<String> {
    vec![
        "--cmake-args".into(),
        "-DCMAKE_BUILD_TYPE={build_type}".into(),
    ]
}

fn default_package_args() -> Vec<String> {
    vec!["--packages-select".into(), PACKAGES_PLACEHOLDER.into()]
}

impl CommandTemplate {
    fn all_args(&self) -> impl Iterator<Item = &String> {
        self.args
            .iter()
            .chain(&self.symlink_install_args)
            .chain(&self.parallel_args)
            .chain(&self.build_type_args)
            .chain(&self.package_args)
    }

    /// Check that only known placeholders are used, and `{packages}` only as
    /// a whole argument
    pub fn validate(&self) -> BuildResult<()> {
        let pattern =
            Regex::new(PLACEHOLDER_PATTERN).map_err(|e| BuildError::Template(e.to_string()))?;

        for arg in self.all_args() {
            for capture in pattern.captures_iter(arg) {
                let name = &capture[1];
                if !KNOWN_PLACEHOLDERS.contains(&name) {
                    return Err(BuildError::Template(format!(
                        "unknown placeholder {{{}}} in {:?}",
                        name, arg
                    )));
                }
                if name == "packages" && arg != PACKAGES_PLACEHOLDER {
                    return Err(BuildError::Template(format!(
                        "{} must be a whole argument, found {:?}",
                        PACKAGES_PLACEHOLDER, arg
                    )));
                }
            }
        }
        Ok(())
    }

    /// Produce the concrete command line for a request
    pub fn render(&self, request: &BuildRequest) -> BuildResult<RenderedCommand> {
        self.validate()?;

        let options = &request.options;
        let workers = options.parallel_workers.max(1).to_string();
        let build_type = options.build_type.cmake_value();

        let mut groups: Vec<&[String]> = vec![self.args.as_slice()];
        if options.symlink_install {
            groups.push(self.symlink_install_args.as_slice());
        }
        groups.push(self.parallel_args.as_slice());
        if build_type.is_some() {
            groups.push(self.build_type_args.as_slice());
        }
        groups.push(self.package_args.as_slice());

        let mut args = Vec::new();
        for arg in groups.into_iter().flatten() {
            if arg == PACKAGES_PLACEHOLDER {
                args.extend(request.packages.iter().cloned());
                continue;
            }
            args.push(
                arg.replace("{workers}", &workers)
                    .replace("{build_type}", build_type.unwrap_or_default()),
            );
        }

        Ok(RenderedCommand {
            program: self.program.clone(),
            args,
        })
    }
}

/// A command line ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for RenderedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// A running build process under supervision
#[async_trait]
pub trait BuildProcess: Send {
    /// OS process id, if known
    fn id(&self) -> Option<u32>;

    /// Ask the process to stop (unix: SIGTERM to its process group)
    fn terminate(&mut self) -> io::Result<()>;

    /// Stop the process forcibly (unix: SIGKILL to its process group)
    fn kill(&mut self) -> io::Result<()>;

    /// Wait for exit. Death by signal `n` reports `128 + n`.
    async fn wait(&mut self) -> io::Result<i32>;
}

/// A launched process together with its merged output
pub struct Spawned {
    pub process: Box<dyn BuildProcess>,
    pub output: mpsc::UnboundedReceiver<OutputLine>,
    /// Command line for logging
    pub command: String,
}

/// Starts build processes; tests substitute fakes
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, request: &BuildRequest, cwd: &Path) -> BuildResult<Spawned>;
}

/// Launcher running the configured build tool
#[derive(Debug, Clone, Default)]
pub struct CommandLauncher {
    template: CommandTemplate,
}

impl CommandLauncher {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }
}

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, request: &BuildRequest, cwd: &Path) -> BuildResult<Spawned> {
        let rendered = self.template.render(request)?;
        tracing::debug!("Spawning {} in {}", rendered, cwd.display());

        let mut command = Command::new(&rendered.program);
        command
            .args(&rendered.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| BuildError::Spawn(format!("{}: {}", rendered.program, e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, OutputStream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, OutputStream::Stderr, tx);
        }

        Ok(Spawned {
            process: Box::new(ChildProcess::new(child)),
            output: rx,
            command: rendered.to_string(),
        })
    }
}

/// Forward lines from a pipe until it closes. Invalid UTF-8 is replaced.
fn spawn_reader<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }
                    let content = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(OutputLine::new(content, stream)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("Stopped reading {:?}: {}", stream, e);
                    break;
                }
            }
        }
    });
}

/// Real child process in its own process group
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self { child, pid }
    }

    #[cfg(unix)]
    fn signal_group(&mut self, signal: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };
        match killpg(Pid::from_raw(pid as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

#[async_trait]
impl BuildProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        self.signal_group(nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    #[cfg(unix)]
    fn kill(&mut self) -> io::Result<()> {
        self.signal_group(nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(not(unix))]
    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait().await?;
        if let Some(code) = status.code() {
            return Ok(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Ok(128 + signal);
            }
        }
        Ok(-1)
    }
}

/// Per-run log file
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    /// Create `run-<id>-<timestamp>.log` in `dir` and write its header
    pub fn create(dir: &Path, run: RunId, packages: &[String], command: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let timestamp = unix_timestamp();
        let path = dir.join(format!("run-{}-{}.log", run.0, timestamp));
        let mut writer = BufWriter::new(File::create(&path)?);

        writeln!(writer, "# Build run {}", run)?;
        writeln!(writer, "# Started: {}", timestamp)?;
        writeln!(writer, "# Packages: {}", packages.join(" "))?;
        writeln!(writer, "# Command: {}", command)?;
        writeln!(writer, "---")?;

        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one output line, tagged with its stream
    pub fn append(&mut self, line: &OutputLine) -> io::Result<()> {
        let tag = match line.stream {
            OutputStream::Stdout => "OUT",
            OutputStream::Stderr => "ERR",
        };
        writeln!(self.writer, "[{}] {}", tag, line.content)
    }

    /// Write the footer and flush
    pub fn finish(mut self, outcome: &str) -> io::Result<PathBuf> {
        writeln!(self.writer, "---")?;
        writeln!(self.writer, "# Finished: {} ({})", unix_timestamp(), outcome)?;
        self.writer.flush()?;
        Ok(self.path)
    }
}

/// Seconds since the unix epoch
fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildOptions, BuildType};
    use tempfile::TempDir;

    fn request(packages: &[&str], build_type: BuildType, symlink: bool) -> BuildRequest {
        BuildRequest::new(
            packages.iter().copied(),
            BuildOptions {
                build_type,
                symlink_install: symlink,
                parallel_workers: 4,
                include_dependencies: false,
            },
        )
    }

    #[test]
    fn test_render_default_template() {
        let rendered = CommandTemplate::default()
            .render(&request(&["nav_core", "nav_planner"], BuildType::Release, true))
            .unwrap();

        insta::assert_snapshot!(
            rendered.to_string(),
            @"colcon build --symlink-install --parallel-workers 4 --cmake-args -DCMAKE_BUILD_TYPE=Release --packages-select nav_core nav_planner"
        );
    }

    #[test]
    fn test_render_skips_optional_groups() {
        let rendered = CommandTemplate::default()
            .render(&request(&["solo"], BuildType::Unspecified, false))
            .unwrap();

        insta::assert_snapshot!(
            rendered.to_string(),
            @"colcon build --parallel-workers 4 --packages-select solo"
        );
        assert_eq!(rendered.program, "colcon");
    }

    #[test]
    fn test_render_quotes_arguments() {
        let template = CommandTemplate {
            program: "sh".into(),
            args: vec!["-c".into(), "echo it's done".into()],
            ..CommandTemplate::default()
        };
        let rendered = template
            .render(&request(&["a"], BuildType::Debug, false))
            .unwrap();

        assert!(rendered
            .to_string()
            .starts_with(r"sh -c 'echo it'\''s done' --parallel-workers 4"));
    }

    #[test]
    fn test_validate_rejects_bad_placeholders() {
        let unknown = CommandTemplate {
            args: vec!["build".into(), "--jobs={jobs}".into()],
            ..CommandTemplate::default()
        };
        assert!(matches!(unknown.validate(), Err(BuildError::Template(_))));

        let embedded = CommandTemplate {
            package_args: vec!["--packages-select={packages}".into()],
            ..CommandTemplate::default()
        };
        assert!(matches!(embedded.validate(), Err(BuildError::Template(_))));

        assert!(CommandTemplate::default().validate().is_ok());
    }

    #[test]
    fn test_run_log() {
        let temp = TempDir::new().unwrap();
        let mut log = RunLog::create(
            &temp.path().join("logs"),
            RunId(7),
            &["a".to_string(), "b".to_string()],
            "colcon build",
        )
        .unwrap();
        log.append(&OutputLine::new("Starting >>> a", OutputStream::Stdout))
            .unwrap();
        log.append(&OutputLine::new("warning: unused", OutputStream::Stderr))
            .unwrap();
        let path = log.finish("succeeded").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("run-7-"));
        assert!(text.contains("# Packages: a b"));
        assert!(text.contains("[OUT] Starting >>> a\n[ERR] warning: unused\n"));
        assert!(text.contains("(succeeded)"));
    }

    #[cfg(unix)]
    fn shell(script: &str) -> CommandLauncher {
        CommandLauncher::new(CommandTemplate {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "sh".into()],
            symlink_install_args: vec![],
            parallel_args: vec![],
            build_type_args: vec![],
            package_args: vec![PACKAGES_PLACEHOLDER.into()],
        })
    }

    #[cfg(unix)]
    async fn collect(mut spawned: Spawned) -> (i32, Vec<(OutputStream, String)>) {
        let code = spawned.process.wait().await.unwrap();
        let mut lines = Vec::new();
        while let Some(line) = spawned.output.recv().await {
            lines.push((line.stream, line.content));
        }
        (code, lines)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_streams_both_pipes() {
        let temp = TempDir::new().unwrap();
        let launcher = shell("echo \"building $1\"; printf 'bad \\377 byte\\n' >&2; printf tail; exit 3");

        let spawned = launcher
            .launch(&request(&["pkg"], BuildType::Release, false), temp.path())
            .unwrap();
        assert!(spawned.process.id().is_some());
        let (code, lines) = collect(spawned).await;

        assert_eq!(code, 3);
        let stdout: Vec<&str> = lines
            .iter()
            .filter(|(s, _)| *s == OutputStream::Stdout)
            .map(|(_, l)| l.as_str())
            .collect();
        assert_eq!(stdout, vec!["building pkg", "tail"]);
        assert!(lines
            .iter()
            .any(|(s, l)| *s == OutputStream::Stderr && l == "bad \u{FFFD} byte"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_reports_signal() {
        let temp = TempDir::new().unwrap();
        let launcher = shell("sleep 30");

        let mut spawned = launcher
            .launch(&request(&["pkg"], BuildType::Release, false), temp.path())
            .unwrap();
        spawned.process.terminate().unwrap();
        let code = spawned.process.wait().await.unwrap();

        assert_eq!(code, 128 + 15);
    }

    #[test]
    fn test_launch_missing_program() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let launcher = CommandLauncher::new(CommandTemplate {
            program: "wsman-no-such-build-tool".into(),
            ..CommandTemplate::default()
        });

        let result = launcher.launch(&request(&["a"], BuildType::Release, true), Path::new("."));
        assert!(matches!(result, Err(BuildError::Spawn(_))));
    }
}
