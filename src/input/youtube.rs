//! YouTube 地址校验与媒体直链解析 (yt-dlp)

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::StreamError;
use crate::settings::YoutubeConfig;

/// 只做子串检查, 不访问网络
pub fn validate_youtube_url(url: &str) -> Result<(), StreamError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(StreamError::InvalidInput(
            "Please enter a YouTube URL".to_string(),
        ));
    }
    if !(url.contains("youtube.com/watch") || url.contains("youtu.be/")) {
        return Err(StreamError::InvalidInput(
            "Invalid YouTube URL. Please provide a valid YouTube video URL.".to_string(),
        ));
    }
    Ok(())
}

/// 页面地址 → 可直接解码的媒体地址
pub trait StreamResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Result<String, StreamError>;
}

/// 调用外部 yt-dlp (`-g` 只输出直链)
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    format: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(config: &YoutubeConfig) -> Self {
        Self {
            program: config.program.clone(),
            format: config.format.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    fn command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--no-playlist", "--no-warnings", "-f", &self.format, "-g", url])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(&YoutubeConfig::default())
    }
}

impl StreamResolver for YtDlp {
    fn resolve(&self, url: &str) -> Result<String, StreamError> {
        info!("resolving {} with {}", url, self.program);
        let output = run_with_timeout(self.command(url), self.timeout).map_err(|e| match e {
            StreamError::Io(e) => {
                StreamError::Extraction(format!("cannot run `{}`: {}", self.program, e))
            }
            other => other,
        })?;

        if !output.status.success() {
            let reason = output
                .stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output")
                .trim()
                .to_string();
            return Err(StreamError::Extraction(format!("{} ({})", reason, output.status)));
        }

        parse_media_url(&output.stdout)
    }
}

struct ProcessOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// 未回收的子进程在析构时 kill
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// 运行子进程, 等待期间持续读取 stdout/stderr, 超时则 kill
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<ProcessOutput, StreamError> {
    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let mut guard = ChildGuard {
        child,
        reaped: false,
    };

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = guard.child.try_wait()? {
            guard.reaped = true;
            break status;
        }
        if Instant::now() >= deadline {
            return Err(StreamError::Extraction(format!(
                "timed out after {}s",
                timeout.as_secs_f32()
            )));
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    Ok(ProcessOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

/// 取第一条 http(s) 直链 (视频+音频分离时第一条为视频)
fn parse_media_url(stdout: &str) -> Result<String, StreamError> {
    let url = stdout
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("http://") || l.starts_with("https://"))
        .ok_or_else(|| StreamError::Extraction("no stream URL in output".to_string()))?;
    debug!("media url: {}...", url.chars().take(64).collect::<String>());
    Ok(url.to_string())
}
