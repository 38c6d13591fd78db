//! Live remote shell session backed by a russh channel.
//!
//! russh delivers all channel traffic through one `ChannelMsg` stream and
//! accepts writes through channel methods, so a single actor task owns the
//! channel: it demultiplexes inbound messages into stdout/stderr pipes and
//! drains a command queue for writes, resizes, and shutdown. The rest of the
//! bridge sees plain `AsyncRead`/`AsyncWrite` streams plus a control handle,
//! which keeps the pump and lifecycle logic testable with in-memory pipes.

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use seashell_core::{BridgeError, BridgeResult};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Extended data type code for stderr (RFC 4254 §5.2).
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Commands accepted by the channel actor.
#[derive(Debug)]
pub enum ShellCommand {
    Data(Vec<u8>),
    Resize { rows: u32, cols: u32 },
    Close,
}

/// Out-of-band operations on a live session.
#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Propagate a terminal geometry change to the remote PTY.
    async fn resize(&self, rows: u32, cols: u32) -> BridgeResult<()>;

    /// Shut the session down. Idempotent.
    async fn close(&self);
}

/// An established remote shell, exposed as byte streams plus a control handle.
pub struct RemoteSession {
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub control: Arc<dyn SessionControl>,
}

impl RemoteSession {
    /// Wrap an open channel (PTY and shell already requested) in a session.
    ///
    /// Spawns the channel actor; when the actor exits it shuts the pipe
    /// writers down, so readers observe a clean EOF.
    pub fn from_channel<H>(channel: Channel<Msg>, handle: Handle<H>) -> Self
    where
        H: client::Handler + 'static,
    {
        let (stdout_rd, stdout_wr) = tokio::io::simplex(PIPE_CAPACITY);
        let (stderr_rd, stderr_wr) = tokio::io::simplex(PIPE_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        tokio::spawn(channel_actor(
            channel,
            handle,
            commands_rx,
            stdout_wr,
            stderr_wr,
        ));

        Self {
            stdout: Box::new(stdout_rd),
            stderr: Box::new(stderr_rd),
            stdin: Box::new(CommandWriter {
                commands: commands_tx.clone(),
            }),
            control: Arc::new(ShellControl {
                commands: commands_tx,
            }),
        }
    }
}

/// Owns the russh channel for the lifetime of the session.
async fn channel_actor<H, W>(
    mut channel: Channel<Msg>,
    handle: Handle<H>,
    mut commands: mpsc::UnboundedReceiver<ShellCommand>,
    mut stdout: W,
    mut stderr: W,
) where
    H: client::Handler,
    W: AsyncWrite + Send + Unpin,
{
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ShellCommand::Data(bytes)) => {
                    if channel.data(&bytes[..]).await.is_err() {
                        break;
                    }
                }
                Some(ShellCommand::Resize { rows, cols }) => {
                    if let Err(e) = channel.window_change(cols, rows, 0, 0).await {
                        debug!(error = %e, "window change rejected");
                    }
                }
                Some(ShellCommand::Close) | None => {
                    let _ = channel.eof().await;
                    break;
                }
            },
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { ref data }) => {
                    if stdout.write_all(data).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExtendedData { ref data, ext })
                    if ext == SSH_EXTENDED_DATA_STDERR =>
                {
                    if stderr.write_all(data).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!(exit_status, "remote shell exited");
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
        }
    }

    close_output_pipes(&mut stdout, &mut stderr).await;
    let _ = handle
        .disconnect(Disconnect::ByApplication, "session closed", "en")
        .await;
}

/// Shut both output pipes down so their readers see EOF.
///
/// Merely dropping a simplex writer leaves pending reads blocked.
async fn close_output_pipes<W>(stdout: &mut W, stderr: &mut W)
where
    W: AsyncWrite + Unpin,
{
    let _ = stdout.shutdown().await;
    let _ = stderr.shutdown().await;
}

/// `AsyncWrite` adapter feeding the channel actor's command queue.
struct CommandWriter {
    commands: mpsc::UnboundedSender<ShellCommand>,
}

impl AsyncWrite for CommandWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.commands.send(ShellCommand::Data(buf.to_vec())) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "shell channel closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct ShellControl {
    commands: mpsc::UnboundedSender<ShellCommand>,
}

#[async_trait]
impl SessionControl for ShellControl {
    async fn resize(&self, rows: u32, cols: u32) -> BridgeResult<()> {
        self.commands
            .send(ShellCommand::Resize { rows, cols })
            .map_err(|_| BridgeError::Transport("shell channel closed".to_string()))
    }

    async fn close(&self) {
        let _ = self.commands.send(ShellCommand::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closing_output_pipes_unblocks_readers() {
        use tokio::io::AsyncReadExt;

        let (mut stdout_rd, mut stdout_wr) = tokio::io::simplex(64);
        let (mut stderr_rd, mut stderr_wr) = tokio::io::simplex(64);
        stdout_wr.write_all(b"logout\r\n").await.unwrap();

        close_output_pipes(&mut stdout_wr, &mut stderr_wr).await;

        let mut out = Vec::new();
        stdout_rd.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"logout\r\n");
        assert_eq!(stderr_rd.read(&mut [0u8; 8]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn command_writer_forwards_bytes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut writer = CommandWriter { commands: tx };
        writer.write_all(b"ls -la\n").await.unwrap();
        match rx.recv().await.unwrap() {
            ShellCommand::Data(bytes) => assert_eq!(bytes, b"ls -la\n"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn command_writer_reports_broken_pipe_after_actor_exit() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut writer = CommandWriter { commands: tx };
        let err = writer.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn shell_control_sends_resize_and_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let control = ShellControl { commands: tx };

        control.resize(50, 120).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            ShellCommand::Resize {
                rows: 50,
                cols: 120
            }
        ));

        control.close().await;
        assert!(matches!(rx.recv().await.unwrap(), ShellCommand::Close));
    }

    #[tokio::test]
    async fn shell_control_resize_fails_after_actor_exit() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let control = ShellControl { commands: tx };
        assert!(matches!(
            control.resize(24, 80).await,
            Err(BridgeError::Transport(_))
        ));
    }
}
