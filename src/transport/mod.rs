//! Response transport
//!
//! The file server writes responses through a [`Transport`]: a response head followed by
//! body bytes pushed in fixed-size chunks. [`send_all`] owns the retry policy for the
//! body: transient connection errors are retried a bounded number of times with a timer
//! backoff, would-block conditions pause without counting, anything else aborts.

mod channel;

pub use channel::{channel, ChannelBody, ChannelTransport, ResponseReceiver};

use std::io;
use std::time::{Duration, Instant};

use crate::config::StaticFilesConfig;
use crate::error::ServeError;
use crate::http::ResponseHead;
use crate::logger;

/// Sink for one response
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send the status line and headers; called once, before any body bytes
    async fn send_head(&mut self, head: &ResponseHead) -> io::Result<()>;

    /// Send body bytes, returning how many were accepted (possibly fewer than offered)
    async fn send(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// Chunking and retry parameters for body transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub chunk_size: usize,
    pub send_retries: u32,
    pub retry_delay: Duration,
    pub would_block_pause: Duration,
}

impl StreamSettings {
    pub fn from_config(config: &StaticFilesConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            send_retries: config.send_retries,
            retry_delay: config.retry_delay(),
            would_block_pause: config.would_block_pause(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from_config(&StaticFilesConfig::default())
    }
}

/// Stream `body` to the transport in chunks
///
/// Returns the number of bytes delivered. On failure, bytes already sent stay sent: the
/// peer sees a truncated body.
pub async fn send_all<T: Transport>(
    transport: &mut T,
    body: &[u8],
    settings: &StreamSettings,
) -> Result<usize, ServeError> {
    let total = body.len();
    let chunk_size = settings.chunk_size.max(1);
    let started = Instant::now();
    let mut sent = 0;
    let mut retries = 0;
    let mut reported_decile = 0;

    while sent < total {
        let end = (sent + chunk_size).min(total);
        match transport.send(&body[sent..end]).await {
            Ok(0) => {
                return Err(ServeError::SocketFatal {
                    sent,
                    source: io::Error::new(io::ErrorKind::WriteZero, "peer accepted no bytes"),
                });
            }
            Ok(n) => {
                sent += n.min(end - sent);
                retries = 0;
                let decile = sent * 10 / total;
                if decile > reported_decile {
                    reported_decile = decile;
                    logger::log_transfer_progress(
                        u8::try_from(decile * 10).unwrap_or(100),
                        sent,
                        total,
                        started.elapsed(),
                    );
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tokio::time::sleep(settings.would_block_pause).await;
            }
            Err(e) if ServeError::is_transient(&e) => {
                if retries >= settings.send_retries {
                    logger::log_error(&format!(
                        "Transfer aborted after {sent}/{total} bytes: maximum retry attempts reached"
                    ));
                    return Err(ServeError::SocketFatal { sent, source: e });
                }
                retries += 1;
                logger::log_warning(&format!(
                    "{}, retrying ({retries}/{})",
                    ServeError::SocketTransient(e),
                    settings.send_retries
                ));
                tokio::time::sleep(settings.retry_delay).await;
            }
            Err(e) => return Err(ServeError::SocketFatal { sent, source: e }),
        }
    }

    logger::log_transfer_complete(sent, started.elapsed());
    Ok(sent)
}

#[cfg(test)]
pub(crate) mod mock {
    use super::{io, ResponseHead, Transport};
    use std::collections::VecDeque;

    /// Scripted outcome of one `send` call
    #[derive(Debug)]
    pub enum Step {
        /// Accept at most this many bytes
        Accept(usize),
        Fail(io::ErrorKind),
    }

    /// In-memory transport that records everything and follows a script of send outcomes
    ///
    /// Once the script runs out every send is accepted in full.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        pub heads: Vec<ResponseHead>,
        pub body: Vec<u8>,
        pub send_calls: usize,
        script: VecDeque<Step>,
    }

    impl MockTransport {
        pub fn scripted(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                script: steps.into_iter().collect(),
                ..Self::default()
            }
        }

        pub fn head(&self) -> &ResponseHead {
            &self.heads[0]
        }
    }

    impl Transport for MockTransport {
        async fn send_head(&mut self, head: &ResponseHead) -> io::Result<()> {
            self.heads.push(head.clone());
            Ok(())
        }

        async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
            self.send_calls += 1;
            match self.script.pop_front() {
                Some(Step::Accept(limit)) => {
                    let n = limit.min(data.len());
                    self.body.extend_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Step::Fail(kind)) => Err(kind.into()),
                None => {
                    self.body.extend_from_slice(data);
                    Ok(data.len())
                }
            }
        }
    }
}
