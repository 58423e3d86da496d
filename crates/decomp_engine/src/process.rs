use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use decomp_core::JobId;
use decomp_logging::{decomp_debug, decomp_warn};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::sink::LogSink;
use crate::store::trim_line_ending;

/// How long the output reader may keep draining after the child is gone.
const READER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunFailure {
    #[error("process timeout after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("process exited with code {code}{}", last_line_suffix(.last_line))]
    ExitCode {
        code: i32,
        last_line: Option<String>,
    },
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },
    #[error("failed waiting for process: {0}")]
    Wait(String),
}

fn last_line_suffix(last_line: &Option<String>) -> String {
    match last_line {
        Some(line) => format!(": {line}"),
        None => String::new(),
    }
}

/// Runs the external tool and streams its combined output into a [`LogSink`].
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    sink: LogSink,
}

enum Outcome {
    Exited(ExitStatus),
    WaitFailed(io::Error),
    TimedOut,
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl ProcessRunner {
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }

    /// Runs `program args` in `working_dir` and waits at most `timeout`.
    ///
    /// Output lines reach the sink as they are produced. The reader task is
    /// joined before this returns, whatever the outcome.
    pub async fn run(
        &self,
        job_id: &JobId,
        program: &str,
        args: &[String],
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<(), RunFailure> {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|err| RunFailure::Spawn {
            program: program.to_string(),
            message: err.to_string(),
        })?;
        decomp_debug!("Spawned {} for job {} (pid {:?})", program, job_id, child.id());

        let reader = tokio::spawn(forward_output(
            self.sink.clone(),
            job_id.clone(),
            child.stdout.take(),
            child.stderr.take(),
        ));

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        let outcome = match waited {
            Ok(Ok(status)) => Outcome::Exited(status),
            Ok(Err(err)) => {
                terminate(job_id, &mut child).await;
                Outcome::WaitFailed(err)
            }
            Err(_) => {
                terminate(job_id, &mut child).await;
                Outcome::TimedOut
            }
        };

        let last_line = join_reader(job_id, reader).await;

        match outcome {
            Outcome::Exited(status) if status.success() => Ok(()),
            Outcome::Exited(status) => Err(RunFailure::ExitCode {
                // Killed by a signal.
                code: status.code().unwrap_or(-1),
                last_line,
            }),
            Outcome::WaitFailed(err) => Err(RunFailure::Wait(err.to_string())),
            Outcome::TimedOut => Err(RunFailure::Timeout(timeout)),
        }
    }
}

async fn terminate(job_id: &JobId, child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child leads its own process group; a negative pid signals the
        // whole group so grandchildren holding the pipes die too.
        let result = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
        if result != 0 {
            decomp_debug!(
                "killpg for job {} failed: {}",
                job_id,
                io::Error::last_os_error()
            );
        }
    }
    if let Err(err) = child.kill().await {
        decomp_warn!("Failed to kill process for job {}: {}", job_id, err);
    }
}

async fn join_reader(job_id: &JobId, mut reader: JoinHandle<Option<String>>) -> Option<String> {
    match tokio::time::timeout(READER_GRACE, &mut reader).await {
        Ok(Ok(last_line)) => last_line,
        Ok(Err(err)) => {
            decomp_warn!("Output reader for job {} failed: {}", job_id, err);
            None
        }
        Err(_) => {
            decomp_warn!(
                "Output of job {} still open {}s after exit; detaching reader",
                job_id,
                READER_GRACE.as_secs()
            );
            reader.abort();
            let _ = reader.await;
            None
        }
    }
}

/// Forwards stdout and stderr line by line until both reach EOF. Returns the
/// last non-blank line seen.
async fn forward_output(
    sink: LogSink,
    job_id: JobId,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> Option<String> {
    let mut out = stdout.map(BufReader::new);
    let mut err = stderr.map(BufReader::new);
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut last_line = None;

    loop {
        // `read_until` keeps partial data in the buffer when the other
        // branch wins, so nothing is lost between iterations.
        let (read, stream) = tokio::select! {
            read = read_chunk(&mut out, &mut out_buf), if out.is_some() => (read, Stream::Stdout),
            read = read_chunk(&mut err, &mut err_buf), if err.is_some() => (read, Stream::Stderr),
            else => break,
        };

        let buf = match stream {
            Stream::Stdout => &mut out_buf,
            Stream::Stderr => &mut err_buf,
        };
        let finished = match read {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => {
                decomp_warn!("Reading output of job {} failed: {}", job_id, e);
                true
            }
        };
        if !buf.is_empty() {
            {
                let text = String::from_utf8_lossy(buf);
                let line = trim_line_ending(&text);
                if !line.trim().is_empty() {
                    last_line = Some(line.to_string());
                }
                sink.emit(&job_id, line);
            }
            buf.clear();
        }
        if finished {
            match stream {
                Stream::Stdout => out = None,
                Stream::Stderr => err = None,
            }
        }
    }

    last_line
}

async fn read_chunk<R>(reader: &mut Option<R>, buf: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(reader) => reader.read_until(b'\n', buf).await,
        None => Ok(0),
    }
}
