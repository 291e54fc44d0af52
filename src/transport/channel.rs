//! Channel-backed transport feeding a hyper response
//!
//! The handler task writes into a [`ChannelTransport`]; the connection task awaits the
//! head on a [`ResponseReceiver`] and hands hyper a [`ChannelBody`] that drains the body
//! queue. The queue is bounded, so a slow peer back-pressures the handler.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use hyper::body::{Body, Bytes, Frame};
use hyper::Response;
use tokio::sync::{mpsc, oneshot};

use super::Transport;
use crate::http::ResponseHead;

/// Body chunks buffered between handler and connection
const BODY_QUEUE_DEPTH: usize = 4;

/// Create a connected transport / receiver pair
pub fn channel() -> (ChannelTransport, ResponseReceiver) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_QUEUE_DEPTH);
    (
        ChannelTransport {
            head_tx: Some(head_tx),
            body_tx,
            body_rx: Some(body_rx),
        },
        ResponseReceiver { head_rx },
    )
}

/// Response body streamed from a [`ChannelTransport`]
#[derive(Debug)]
pub struct ChannelBody {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelBody {
    /// A body that ends immediately
    pub fn empty() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self { rx }
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|bytes| Ok(Frame::data(bytes))))
    }
}

/// Writing half, owned by the handler
#[derive(Debug)]
pub struct ChannelTransport {
    head_tx: Option<oneshot::Sender<Response<ChannelBody>>>,
    body_tx: mpsc::Sender<Bytes>,
    body_rx: Option<mpsc::Receiver<Bytes>>,
}

impl Transport for ChannelTransport {
    async fn send_head(&mut self, head: &ResponseHead) -> io::Result<()> {
        let (Some(head_tx), Some(rx)) = (self.head_tx.take(), self.body_rx.take()) else {
            return Err(io::Error::other("response head already sent"));
        };
        let mut response = Response::new(ChannelBody { rx });
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers.clone();
        head_tx.send(response).map_err(|_| closed())
    }

    async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.head_tx.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "body sent before response head",
            ));
        }
        self.body_tx
            .send(Bytes::copy_from_slice(data))
            .await
            .map(|()| data.len())
            .map_err(|_| closed())
    }
}

// Receiver dropped: the connection is gone
fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "connection closed by peer")
}

/// Reading half, owned by the connection task
#[derive(Debug)]
pub struct ResponseReceiver {
    head_rx: oneshot::Receiver<Response<ChannelBody>>,
}

impl ResponseReceiver {
    /// Wait for the response head; `None` if the handler finished without sending one
    pub async fn recv(self) -> Option<Response<ChannelBody>> {
        self.head_rx.await.ok()
    }
}
