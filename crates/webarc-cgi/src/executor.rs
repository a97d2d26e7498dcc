use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::env::{cgi_vars, filter_query, inherited_vars};
use crate::error::{CgiError, Result};
use crate::request::CgiRequest;
use crate::response::{CgiResponse, parse_output};

#[derive(Clone, Debug)]
pub struct CgiConfig {
    /// Interpreter binary, e.g. `php-cgi`.
    pub interpreter: PathBuf,
    /// Primary web root scripts may live under.
    pub document_root: PathBuf,
    /// Secondary root for scripts shipped separately from content.
    pub script_root: PathBuf,
    pub timeout: Duration,
    /// How long a timed-out process gets between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
    pub max_stdout: usize,
    pub max_stderr: usize,
}

impl Default for CgiConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("php-cgi"),
            document_root: PathBuf::from("htdocs"),
            script_root: PathBuf::from("cgi-bin"),
            timeout: Duration::from_secs(30),
            kill_grace: Duration::from_secs(2),
            max_stdout: 16 * 1024 * 1024,
            max_stderr: 64 * 1024,
        }
    }
}

/// Runs one external interpreter process per request with CGI/1.1 framing.
pub struct CgiExecutor {
    config: CgiConfig,
}

enum CappedRead {
    Full(Vec<u8>),
    Overflow,
}

impl CgiExecutor {
    pub fn new(config: CgiConfig) -> Self {
        Self { config }
    }

    /// Execute `script_path` for `request`.
    ///
    /// The path is resolved to its real form before the root check, so a
    /// symlink inside a root pointing elsewhere cannot bypass it. The
    /// interpreter receives the script as an explicit argument; nothing
    /// derived from the request ever lands on the command line.
    pub async fn execute(&self, script_path: &Path, request: &CgiRequest) -> Result<CgiResponse> {
        let resolved = tokio::fs::canonicalize(script_path)
            .await
            .map_err(|_| CgiError::ScriptNotFound(script_path.to_path_buf()))?;
        let metadata = tokio::fs::metadata(&resolved).await?;
        if !metadata.is_file() {
            return Err(CgiError::ScriptNotFound(script_path.to_path_buf()));
        }

        if !self.within_allowed_roots(&resolved).await {
            tracing::warn!(
                script = %script_path.display(),
                resolved = %resolved.display(),
                "rejecting script outside allowed roots"
            );
            return Err(CgiError::OutsideRoots { path: resolved });
        }

        let (query, dropped) = filter_query(&request.query);
        if dropped > 0 {
            tracing::warn!(
                script = %resolved.display(),
                dropped,
                "dropped flag-like query segments"
            );
        }

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.env_clear()
            .envs(inherited_vars())
            .envs(cgi_vars(request, &resolved.to_string_lossy(), &query))
            .arg(&resolved)
            .stdin(if request.body.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| CgiError::SpawnFailed {
            interpreter: self.config.interpreter.clone(),
            source,
        })?;

        let outcome = tokio::time::timeout(
            self.config.timeout,
            self.drive_child(&mut child, request),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_elapsed) => {
                self.terminate(&mut child).await;
                Err(CgiError::Timeout {
                    seconds: self.config.timeout.as_secs(),
                })
            }
        }
    }

    /// Feed stdin, drain stdout/stderr under their caps, reap the child,
    /// and parse the output.
    async fn drive_child(&self, child: &mut Child, request: &CgiRequest) -> Result<CgiResponse> {
        if let Some(mut stdin) = child.stdin.take() {
            if let Some(body) = &request.body {
                // The script may exit without reading its body; a broken
                // pipe here is not an error.
                let _ = stdin.write_all(body).await;
            }
        }

        let mut stdout = child.stdout.take().ok_or(CgiError::StreamMissing)?;
        let stderr = child.stderr.take().ok_or(CgiError::StreamMissing)?;

        // stderr is drained on its own task so a chatty script can never
        // deadlock against an unread pipe; only a prefix is kept.
        let max_stderr = self.config.max_stderr;
        let stderr_task =
            tokio::spawn(async move { read_prefix_and_drain(stderr, max_stderr).await });

        let stdout_read = read_capped(&mut stdout, self.config.max_stdout).await?;
        let stdout_data = match stdout_read {
            CappedRead::Full(data) => data,
            CappedRead::Overflow => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_task.abort();
                return Err(CgiError::OutputTooLarge {
                    limit: self.config.max_stdout,
                });
            }
        };

        let status = child.wait().await?;
        let stderr_data = stderr_task
            .await
            .map(|r| r.unwrap_or_default())
            .unwrap_or_default();

        if !stderr_data.is_empty() {
            tracing::debug!(
                stderr = %String::from_utf8_lossy(&stderr_data),
                "script stderr"
            );
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Err(CgiError::KilledBySignal(signal));
            }
        }
        if !status.success() {
            // PHP exits non-zero on fatal errors but still writes a usable
            // response; parse whatever arrived.
            tracing::warn!(code = status.code(), "script exited non-zero");
        }

        Ok(parse_output(&stdout_data))
    }

    async fn within_allowed_roots(&self, resolved: &Path) -> bool {
        for root in [&self.config.document_root, &self.config.script_root] {
            if let Ok(root) = tokio::fs::canonicalize(root).await
                && resolved.starts_with(&root)
            {
                return true;
            }
        }
        false
    }

    /// Graceful stop: SIGTERM, a grace period, then SIGKILL.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if tokio::time::timeout(self.config.kill_grace, child.wait())
                .await
                .is_ok()
            {
                return;
            }
        }
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

async fn read_capped<R: AsyncRead + Unpin>(reader: &mut R, cap: usize) -> Result<CappedRead> {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(CappedRead::Full(data));
        }
        if data.len() + n > cap {
            return Ok(CappedRead::Overflow);
        }
        data.extend_from_slice(&buf[..n]);
    }
}

/// Keep the first `cap` bytes, then keep reading and discarding so the
/// writer never blocks on a full pipe.
async fn read_prefix_and_drain<R: AsyncRead + Unpin>(
    mut reader: R,
    cap: usize,
) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(data);
        }
        let keep = cap.saturating_sub(data.len()).min(n);
        data.extend_from_slice(&buf[..keep]);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    fn sh_executor(dir: &Path) -> CgiExecutor {
        CgiExecutor::new(CgiConfig {
            interpreter: PathBuf::from("/bin/sh"),
            document_root: dir.to_path_buf(),
            script_root: dir.join("cgi-bin"),
            timeout: Duration::from_secs(5),
            kill_grace: Duration::from_millis(200),
            max_stdout: 64 * 1024,
            max_stderr: 4 * 1024,
        })
    }

    fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn get_request() -> CgiRequest {
        CgiRequest {
            method: "GET".into(),
            script_name: "/test.sh".into(),
            ..CgiRequest::default()
        }
    }

    #[tokio::test]
    async fn executes_script_and_parses_response() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "ok.sh",
            "printf 'Status: 201 Created\\r\\nContent-Type: text/plain\\r\\n\\r\\nhello'",
        );
        let executor = sh_executor(dir.path());

        let response = executor.execute(&script, &get_request()).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(&response.body[..], b"hello");
    }

    #[tokio::test]
    async fn query_string_reaches_script_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "query.sh",
            "printf 'Content-Type: text/plain\\r\\n\\r\\n%s' \"$QUERY_STRING\"",
        );
        let executor = sh_executor(dir.path());

        let mut request = get_request();
        request.query = "a=1&-s&b=2".into();
        let response = executor.execute(&script, &request).await.unwrap();
        assert_eq!(&response.body[..], b"a=1&b=2");
    }

    #[tokio::test]
    async fn body_is_piped_to_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "echo.sh",
            "printf 'Content-Type: text/plain\\r\\n\\r\\n'; cat",
        );
        let executor = sh_executor(dir.path());

        let mut request = get_request();
        request.method = "POST".into();
        request.body = Some(Bytes::from_static(b"ping"));
        let response = executor.execute(&script, &request).await.unwrap();
        assert_eq!(&response.body[..], b"ping");
    }

    #[tokio::test]
    async fn missing_script_is_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = sh_executor(dir.path());
        let err = executor
            .execute(&dir.path().join("nope.sh"), &get_request())
            .await
            .unwrap_err();
        assert!(matches!(err, CgiError::ScriptNotFound(_)));
    }

    #[tokio::test]
    async fn script_outside_roots_is_rejected() {
        let roots = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let script = write_script(elsewhere.path(), "evil.sh", "printf 'x'");
        let executor = sh_executor(roots.path());

        let err = executor.execute(&script, &get_request()).await.unwrap_err();
        assert!(matches!(err, CgiError::OutsideRoots { .. }));
    }

    #[tokio::test]
    async fn symlink_out_of_root_is_rejected() {
        let roots = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let target = write_script(elsewhere.path(), "target.sh", "printf 'x'");
        let link = roots.path().join("link.sh");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let executor = sh_executor(roots.path());

        let err = executor.execute(&link, &get_request()).await.unwrap_err();
        assert!(matches!(err, CgiError::OutsideRoots { .. }));
    }

    #[tokio::test]
    async fn slow_script_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "slow.sh", "sleep 30");
        let mut executor = sh_executor(dir.path());
        executor.config.timeout = Duration::from_millis(200);

        let err = executor.execute(&script, &get_request()).await.unwrap_err();
        assert!(matches!(err, CgiError::Timeout { .. }));
    }

    #[tokio::test]
    async fn oversized_output_is_aborted() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "big.sh", "head -c 200000 /dev/zero");
        let mut executor = sh_executor(dir.path());
        executor.config.max_stdout = 1024;

        let err = executor.execute(&script, &get_request()).await.unwrap_err();
        assert!(matches!(err, CgiError::OutputTooLarge { limit: 1024 }));
    }
}
