//! Response bodies fed by a child process.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::Stream;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio_util::io::ReaderStream;

use crate::send_data::error::SendDataError;

/// Spawn `command` with stdout piped. The child is killed if dropped.
pub(crate) fn spawn_piped(mut command: Command, program: &str) -> Result<Child, SendDataError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SendDataError::spawn(program, e))
}

/// Streams `reader` and owns the child producing it, so dropping the body
/// (client gone) terminates the process.
///
/// Once the output ends the child is reaped. A failing exit status turns
/// into a final stream error, so a truncated body aborts the response.
pub struct ChildBody<R> {
    stream: ReaderStream<R>,
    child: Option<Child>,
    exit: Option<BoxFuture<'static, io::Result<ExitStatus>>>,
    sent: u64,
}

impl<R: AsyncRead + Unpin> ChildBody<R> {
    pub fn new(reader: R, child: Child) -> Self {
        Self {
            stream: ReaderStream::new(reader),
            child: Some(child),
            exit: None,
            sent: 0,
        }
    }

    fn poll_exit(&mut self, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let Some(exit) = self.exit.as_mut() else {
            return Poll::Ready(None);
        };
        let status = ready!(exit.as_mut().poll(cx));
        self.exit = None;

        Poll::Ready(match status {
            Ok(status) if status.success() => {
                tracing::debug!(bytes = self.sent, "Child output complete");
                None
            }
            Ok(status) => {
                tracing::warn!(%status, bytes = self.sent, "Child exited with failure");
                Some(Err(io::Error::other(format!("child exited with {status}"))))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Waiting for child failed");
                Some(Err(e))
            }
        })
    }
}

impl<R: AsyncRead + Unpin> Stream for ChildBody<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.exit.is_some() {
            return this.poll_exit(cx);
        }

        match ready!(Pin::new(&mut this.stream).poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Child output failed");
                Poll::Ready(Some(Err(e)))
            }
            None => match this.child.take() {
                Some(mut child) => {
                    this.exit = Some(Box::pin(async move { child.wait().await }));
                    this.poll_exit(cx)
                }
                None => Poll::Ready(None),
            },
        }
    }
}
