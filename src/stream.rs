use crate::error::StreamError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
        }
    }
}

/// One line of receiver output, newline stripped, consumed once by dispatch.
#[derive(Debug, Clone)]
pub struct RawLine {
    pub channel: Channel,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ReceiverCommand {
    pub program: String,
    pub protocols: Vec<String>,
}

impl ReceiverCommand {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-q".to_string(), "-F".to_string(), "json".to_string()];
        for protocol in &self.protocols {
            args.push("-R".to_string());
            args.push(protocol.clone());
        }
        args
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub forwarded: u64,
    pub dropped: u64,
}

/// Starts the receiver and a task that owns it for the life of the agent.
/// The task only returns once the stream is unusable; its value says why.
pub fn spawn_reader(
    command: &ReceiverCommand,
    stall_timeout: Option<Duration>,
    tx: mpsc::Sender<RawLine>,
) -> Result<JoinHandle<StreamError>, StreamError> {
    let mut child = Command::new(&command.program)
        .args(command.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| StreamError::Spawn {
            program: command.program.clone(),
            source,
        })?;

    tracing::info!(
        program = %command.program,
        args = ?command.args(),
        pid = ?child.id(),
        "started sensor receiver"
    );

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(StreamError::Closed {
            status: "receiver output pipes unavailable".to_string(),
        });
    };

    Ok(tokio::spawn(async move {
        let (err, stats) = pump_lines(stdout, stderr, stall_timeout, &tx).await;
        tracing::info!(
            forwarded = stats.forwarded,
            dropped = stats.dropped,
            "sensor reader stopping"
        );
        match err {
            StreamError::Closed { .. } => {
                let status = match child.wait().await {
                    Ok(status) => status.to_string(),
                    Err(wait_err) => format!("unknown ({wait_err})"),
                };
                StreamError::Closed { status }
            }
            other => {
                if let Err(kill_err) = child.kill().await {
                    tracing::warn!(error = %kill_err, "failed to kill sensor receiver");
                }
                other
            }
        }
    }))
}

/// Reads both output channels as one stream and hands each line to the
/// queue without waiting on the consumer. A full queue drops the line.
pub async fn pump_lines<O, E>(
    stdout: O,
    stderr: E,
    stall_timeout: Option<Duration>,
    tx: &mpsc::Sender<RawLine>,
) -> (StreamError, PumpStats)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let stdout = SplitStream::new(BufReader::new(stdout).split(b'\n'))
        .map(|line| (Channel::Stdout, line));
    let stderr = SplitStream::new(BufReader::new(stderr).split(b'\n'))
        .map(|line| (Channel::Stderr, line));
    let merged = stdout.merge(stderr);
    tokio::pin!(merged);
    let mut stats = PumpStats::default();

    loop {
        let next = match stall_timeout {
            Some(idle) => match tokio::time::timeout(idle, merged.next()).await {
                Ok(next) => next,
                Err(_) => return (StreamError::Stalled { idle }, stats),
            },
            None => merged.next().await,
        };

        let (channel, mut bytes) = match next {
            Some((channel, Ok(bytes))) => (channel, bytes),
            Some((_, Err(err))) => return (StreamError::Read(err), stats),
            None => {
                return (
                    StreamError::Closed {
                        status: "end of stream".to_string(),
                    },
                    stats,
                )
            }
        };

        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match tx.try_send(RawLine { channel, bytes }) {
            Ok(()) => {
                stats.forwarded += 1;
                tracing::trace!(
                    channel = channel.as_str(),
                    queue_depth = tx.max_capacity() - tx.capacity(),
                    "queued sensor line"
                );
            }
            Err(TrySendError::Full(line)) => {
                stats.dropped += 1;
                tracing::warn!(
                    channel = line.channel.as_str(),
                    dropped = stats.dropped,
                    "hand-off queue full; dropping sensor line"
                );
            }
            Err(TrySendError::Closed(_)) => return (StreamError::QueueClosed, stats),
        }
    }
}
