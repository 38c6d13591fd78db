//! The three pumps moving bytes between the transport and the remote shell.
//!
//! Output and diagnostic pumps copy remote stdout/stderr to the transport in
//! bounded chunks, one binary frame per read. The input pump decodes inbound
//! frames and applies them: input bytes go to remote stdin, resizes go to the
//! session control handle. Each pump reports exactly one outcome; the
//! lifecycle coordinator acts on the first.

use crate::bridge::lifecycle::{self, PumpOutcome};
use crate::bridge::session::{RemoteSession, SessionControl};
use seashell_core::control::decode;
use seashell_core::{BridgeResult, ControlFrame, FrameTransport, PumpKind};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::warn;

/// Upper bound on bytes forwarded per outbound frame.
const OUTPUT_CHUNK: usize = 1024;

fn stream_io(pump: PumpKind, detail: impl std::fmt::Display) -> seashell_core::BridgeError {
    seashell_core::BridgeError::StreamIo {
        pump,
        detail: detail.to_string(),
    }
}

/// Copy one remote output stream to the transport until EOF.
async fn stream_pump<R>(
    pump: PumpKind,
    mut source: R,
    transport: Arc<dyn FrameTransport>,
) -> BridgeResult<()>
where
    R: AsyncRead + Send + Unpin,
{
    let mut buf = [0u8; OUTPUT_CHUNK];
    loop {
        let n = source
            .read(&mut buf)
            .await
            .map_err(|e| stream_io(pump, e))?;
        if n == 0 {
            return Ok(());
        }
        transport
            .send(buf[..n].to_vec())
            .await
            .map_err(|e| stream_io(pump, e))?;
    }
}

/// Apply inbound frames until the peer closes.
async fn input_pump<W>(
    transport: Arc<dyn FrameTransport>,
    mut stdin: W,
    control: Arc<dyn SessionControl>,
) -> BridgeResult<()>
where
    W: AsyncWrite + Send + Unpin,
{
    loop {
        let frame = transport
            .recv()
            .await
            .map_err(|e| stream_io(PumpKind::Input, e))?;
        let Some(frame) = frame else {
            return Ok(());
        };

        match decode(&frame) {
            ControlFrame::Input { data } => {
                stdin
                    .write_all(&data)
                    .await
                    .map_err(|e| stream_io(PumpKind::Input, e))?;
                stdin
                    .flush()
                    .await
                    .map_err(|e| stream_io(PumpKind::Input, e))?;
            }
            ControlFrame::Resize { rows, cols } => {
                // A failed resize leaves the terminal mis-sized, not broken.
                if let Err(e) = control.resize(rows, cols).await {
                    warn!(rows, cols, error = %e, "resize request failed");
                }
            }
        }
    }
}

/// Run one session to completion: spawn the pumps, wait for the first
/// outcome, tear down.
pub async fn run(session: RemoteSession, transport: Arc<dyn FrameTransport>) -> BridgeResult<()> {
    let RemoteSession {
        stdout,
        stderr,
        stdin,
        control,
    } = session;

    let (outcomes, outcomes_rx) = mpsc::channel::<PumpOutcome>(3);

    let tx = outcomes.clone();
    let t = transport.clone();
    tokio::spawn(async move {
        let result = stream_pump(PumpKind::Output, stdout, t).await;
        let _ = tx
            .send(PumpOutcome {
                pump: PumpKind::Output,
                result,
            })
            .await;
    });

    let tx = outcomes.clone();
    let t = transport.clone();
    tokio::spawn(async move {
        let result = stream_pump(PumpKind::Diagnostic, stderr, t).await;
        let _ = tx
            .send(PumpOutcome {
                pump: PumpKind::Diagnostic,
                result,
            })
            .await;
    });

    let tx = outcomes;
    let t = transport.clone();
    let session_control = control.clone();
    tokio::spawn(async move {
        let result = input_pump(t, stdin, session_control).await;
        let _ = tx
            .send(PumpOutcome {
                pump: PumpKind::Input,
                result,
            })
            .await;
    });

    lifecycle::supervise(outcomes_rx, control, transport).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seashell_core::control::{encode_input, encode_resize};
    use seashell_core::BridgeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;

    struct TestTransport {
        inbound: Mutex<mpsc::Receiver<Vec<u8>>>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl FrameTransport for TestTransport {
        async fn send(&self, frame: Vec<u8>) -> BridgeResult<()> {
            self.outbound
                .send(frame)
                .map_err(|_| BridgeError::Transport("outbound closed".into()))
        }

        async fn recv(&self) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.inbound.lock().await.recv().await)
        }

        async fn send_text(&self, _message: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockControl {
        resizes: StdMutex<Vec<(u32, u32)>>,
        closes: AtomicUsize,
    }

    impl MockControl {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                resizes: StdMutex::new(Vec::new()),
                closes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SessionControl for MockControl {
        async fn resize(&self, rows: u32, cols: u32) -> BridgeResult<()> {
            self.resizes.lock().unwrap().push((rows, cols));
            Ok(())
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        transport: Arc<TestTransport>,
        control: Arc<MockControl>,
        inbound: mpsc::Sender<Vec<u8>>,
        outbound: mpsc::UnboundedReceiver<Vec<u8>>,
        stdout_wr: tokio::io::WriteHalf<tokio::io::SimplexStream>,
        stderr_wr: tokio::io::WriteHalf<tokio::io::SimplexStream>,
        stdin_rd: tokio::io::ReadHalf<tokio::io::SimplexStream>,
        session: RemoteSession,
    }

    fn harness() -> Harness {
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(TestTransport {
            inbound: Mutex::new(inbound_rx),
            outbound: outbound_tx,
            closes: AtomicUsize::new(0),
        });

        let (stdout_rd, stdout_wr) = tokio::io::simplex(4096);
        let (stderr_rd, stderr_wr) = tokio::io::simplex(4096);
        let (stdin_rd, stdin_wr) = tokio::io::simplex(4096);
        let control = MockControl::new();

        let session = RemoteSession {
            stdout: Box::new(stdout_rd),
            stderr: Box::new(stderr_rd),
            stdin: Box::new(stdin_wr),
            control: control.clone(),
        };

        Harness {
            transport,
            control,
            inbound: inbound_tx,
            outbound: outbound_rx,
            stdout_wr,
            stderr_wr,
            stdin_rd,
            session,
        }
    }

    #[tokio::test]
    async fn forwards_input_and_output() {
        let mut h = harness();

        h.inbound.send(encode_input("ls\n").unwrap()).await.unwrap();
        h.stdout_wr.write_all(b"total 0\r\n").await.unwrap();

        let run = tokio::spawn(run(h.session, h.transport.clone()));

        let mut typed = [0u8; 3];
        h.stdin_rd.read_exact(&mut typed).await.unwrap();
        assert_eq!(&typed, b"ls\n");

        let frame = h.outbound.recv().await.unwrap();
        assert_eq!(frame, b"total 0\r\n");

        // Remote shell exits: stdout reaches EOF and the session ends cleanly.
        h.stdout_wr.shutdown().await.unwrap();
        run.await.unwrap().unwrap();
        assert_eq!(h.transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.control.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resize_reaches_control_and_streaming_continues() {
        let mut h = harness();

        h.inbound
            .send(encode_resize(50, 120).unwrap())
            .await
            .unwrap();
        h.inbound.send(encode_input("w\n").unwrap()).await.unwrap();

        let run = tokio::spawn(run(h.session, h.transport.clone()));

        // Input frames are applied in order, so once stdin carries the
        // second frame the resize has been recorded.
        let mut typed = [0u8; 2];
        h.stdin_rd.read_exact(&mut typed).await.unwrap();
        assert_eq!(&typed, b"w\n");
        assert_eq!(*h.control.resizes.lock().unwrap(), vec![(50, 120)]);

        h.stdout_wr.shutdown().await.unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unstructured_inbound_frames_pass_through_to_stdin() {
        let mut h = harness();

        h.inbound.send(b"\x1b[A".to_vec()).await.unwrap();

        let _run = tokio::spawn(run(h.session, h.transport.clone()));

        let mut typed = [0u8; 3];
        h.stdin_rd.read_exact(&mut typed).await.unwrap();
        assert_eq!(&typed, b"\x1b[A");
    }

    #[tokio::test]
    async fn first_error_wins_and_tears_down() {
        let mut h = harness();

        // Peer goes away: outbound sends start failing.
        h.outbound.close();
        h.stdout_wr.write_all(b"data").await.unwrap();

        let result = run(h.session, h.transport.clone()).await;
        assert!(matches!(
            result,
            Err(BridgeError::StreamIo {
                pump: PumpKind::Output,
                ..
            })
        ));
        assert_eq!(h.transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.control.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clean_peer_close_ends_session_ok() {
        let h = harness();

        // Browser closes: inbound stream ends.
        drop(h.inbound);

        let result = run(h.session, h.transport.clone()).await;
        assert!(result.is_ok());
        assert_eq!(h.transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(h.control.closes.load(Ordering::SeqCst), 1);
    }
}
