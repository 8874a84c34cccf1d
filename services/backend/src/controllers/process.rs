// Child process runner
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

/// Result of one finished tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// True when either stream produced more than the capture limit.
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs `program` with an argument vector (no shell) and waits for it.
///
/// At most `limit` bytes of stdout and of stderr are kept; the tail wins,
/// since tools print their fatal error last. The child is killed if the
/// returned future is dropped.
pub async fn run<I, S>(program: &Path, args: I, cwd: &Path, limit: usize) -> std::io::Result<ProcessOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, (stdout, out_cut), (stderr, err_cut)) = tokio::try_join!(
        child.wait(),
        capture_tail(stdout, limit),
        capture_tail(stderr, limit),
    )?;

    let output = ProcessOutput {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        truncated: out_cut || err_cut,
    };
    debug!(
        "{} exited with {:?} (stdout {} bytes, stderr {} bytes{})",
        program.display(),
        output.exit_code,
        output.stdout.len(),
        output.stderr.len(),
        if output.truncated { ", truncated" } else { "" }
    );
    Ok(output)
}

async fn capture_tail<R>(reader: Option<R>, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut kept = TailBuffer::new(limit);
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        kept.push(&chunk[..n]);
    }
    Ok(kept.into_parts())
}

/// Keeps the last `limit` bytes written to it.
#[derive(Debug)]
struct TailBuffer {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl TailBuffer {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.limit {
            let excess = self.buf.len() - self.limit;
            self.buf.drain(..excess);
            self.truncated = true;
        }
    }

    fn into_parts(self) -> (Vec<u8>, bool) {
        (self.buf, self.truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn tail_buffer_keeps_most_recent_bytes() {
        let mut tail = TailBuffer::new(5);
        tail.push(b"abc");
        tail.push(b"defg");
        assert_eq!(tail.into_parts(), (b"cdefg".to_vec(), true));

        let mut tail = TailBuffer::new(16);
        tail.push(b"short");
        assert_eq!(tail.into_parts(), (b"short".to_vec(), false));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_captures_exit_code_and_streams() {
        let cwd = std::env::temp_dir();
        let output = run(
            Path::new("/bin/sh"),
            ["-c", "echo out; echo err >&2; exit 3"],
            &cwd,
            1024,
        )
        .await
        .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.truncated);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_bounds_noisy_output() {
        let cwd = std::env::temp_dir();
        let output = run(
            Path::new("/bin/sh"),
            ["-c", "i=0; while [ $i -lt 500 ]; do echo line-$i; i=$((i+1)); done"],
            &cwd,
            64,
        )
        .await
        .unwrap();
        assert!(output.success());
        assert!(output.truncated);
        assert!(output.stdout.len() <= 64);
        assert!(output.stdout.ends_with("line-499\n"));
    }

    /// Gone, or a zombie waiting to be reaped.
    #[cfg(target_os = "linux")]
    fn is_dead(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropping_the_future_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());

        let pending = run(Path::new("/bin/sh"), ["-c", script.as_str()], dir.path(), 64);
        let timed_out = tokio::time::timeout(Duration::from_millis(500), pending).await;
        assert!(timed_out.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        for _ in 0..200 {
            if is_dead(&pid) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("child {pid} outlived its dropped future");
    }

    #[tokio::test]
    async fn run_reports_missing_program() {
        let cwd = std::env::temp_dir();
        let err = run(Path::new("/definitely/not/a/tool"), ["--version"], &cwd, 64)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
