//! Token streams: bounded forwarding and synthesized chunking.
//!
//! Both helpers push items through a bounded `tokio::sync::mpsc` channel so
//! a fast producer blocks instead of buffering without limit when the
//! consumer (usually a UI callback) falls behind.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use super::TokenStream;

/// Default number of chunks buffered between producer and consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Shape of synthesized streams.
///
/// Used for providers without native streaming and to replay cache hits.
/// The chunking is an approximation of token delivery, not a protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Words per emitted chunk. Default: 3.
    pub chunk_words: usize,
    /// Pause between chunks. Default: 30ms.
    pub chunk_delay: Duration,
    /// Channel capacity. Default: [`DEFAULT_STREAM_BUFFER`].
    pub buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_words: 3,
            chunk_delay: Duration::from_millis(30),
            buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_words(mut self, words: usize) -> Self {
        self.chunk_words = words;
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn buffer(mut self, size: usize) -> Self {
        self.buffer = size;
        self
    }
}

/// Split `text` into chunks of `words_per_chunk` words each.
///
/// Whitespace is kept with the word before it, so concatenating the chunks
/// restores `text` exactly.
pub fn chunk_text(text: &str, words_per_chunk: usize) -> Vec<&str> {
    let per_chunk = words_per_chunk.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut words = 0;
    let mut in_word = false;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            if words == per_chunk {
                chunks.push(&text[start..i]);
                start = i;
                words = 0;
            }
            words += 1;
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Stream `text` as word chunks separated by `config.chunk_delay`.
///
/// Requires a tokio runtime; the producer task stops when the consumer
/// drops the stream.
pub fn synthesize_stream(text: &str, config: &StreamConfig) -> TokenStream {
    let chunks: Vec<String> = chunk_text(text, config.chunk_words)
        .into_iter()
        .map(str::to_owned)
        .collect();
    let delay = config.chunk_delay;
    let (tx, rx) = tokio::sync::mpsc::channel(config.buffer.max(1));

    tokio::spawn(async move {
        for (i, chunk) in chunks.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if tx.send(Ok(chunk)).await.is_err() {
                break; // receiver dropped
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Forward a native provider stream through a bounded channel.
pub fn bounded_stream(inner: TokenStream, buffer: usize) -> TokenStream {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer.max(1));

    tokio::spawn(async move {
        let mut inner = inner;
        while let Some(item) = inner.next().await {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
