use futures::Stream;
use mcsm_protocol::utils::Encoding;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::select;

use crate::utils::StopSignal;

/// Longer output without a newline is split into chunks of this size.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Line-by-line view over one child output stream.
///
/// Finite and not restartable: it ends at EOF, when the stop signal is
/// raised, or right after reporting a read error.
pub struct LineSource<R> {
    reader: BufReader<R>,
    encoding: Encoding,
    stop: StopSignal,
    buf: Vec<u8>,
    max_line: usize,
    finished: bool,
}

impl<R: AsyncRead + Unpin> LineSource<R> {
    pub fn new(stream: R, encoding: Encoding, stop: StopSignal) -> Self {
        Self {
            reader: BufReader::new(stream),
            encoding,
            stop,
            buf: Vec::with_capacity(256),
            max_line: MAX_LINE_BYTES,
            finished: false,
        }
    }

    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line.max(1);
        self
    }

    pub async fn next_line(&mut self) -> Option<String> {
        if self.finished || self.stop.is_raised() {
            self.finished = true;
            return None;
        }
        self.buf.clear();

        let mut limited = (&mut self.reader).take(self.max_line as u64);
        let read = select! {
            biased;
            _ = self.stop.raised() => None,
            read = limited.read_until(b'\n', &mut self.buf) => Some(read),
        };

        match read {
            None | Some(Ok(0)) => {
                self.finished = true;
                None
            }
            Some(Ok(_)) => {
                let end = self
                    .buf
                    .iter()
                    .rposition(|b| *b != b'\n' && *b != b'\r')
                    .map_or(0, |i| i + 1);
                Some(self.encoding.decode_lossy(&self.buf[..end]))
            }
            Some(Err(err)) => {
                self.finished = true;
                Some(format!("[daemon] console stream read failed: {}", err))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_stream(self) -> impl Stream<Item = String> {
        futures::stream::unfold(self, |mut source| async move {
            source.next_line().await.map(|line| (line, source))
        })
    }
}
