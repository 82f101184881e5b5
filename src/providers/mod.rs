//! Provider call port and streaming helpers.

mod port;
pub mod stream;

pub use port::{ProviderPort, ProviderRequest, TokenStream};
pub use stream::{DEFAULT_STREAM_BUFFER, StreamConfig, bounded_stream, chunk_text, synthesize_stream};
