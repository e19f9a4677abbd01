//! In-memory bytes decoded on every value request.

use super::{Decoder, Source};
use crate::error::SourceError;
use crate::schema::{Schema, Shadow};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A source that decodes a fixed document with a caller-supplied decoder.
///
/// The format is entirely the decoder's business.
///
/// # Examples
///
/// ```rust
/// use stacked_config::prelude::*;
/// use std::io::Read;
///
/// #[derive(Debug, Default, Clone, PartialEq, Stackable)]
/// struct AppConfig {
///     pub greeting: String,
/// }
///
/// let source = DecodedSource::<AppConfig, _>::new(
///     "inline",
///     b"hello".to_vec(),
///     |input: &mut dyn Read| -> std::result::Result<Shadow<AppConfig>, SourceError> {
///         let mut text = String::new();
///         input.read_to_string(&mut text)?;
///         Ok(Some(AppConfigShadow { greeting: Some(text) }))
///     },
/// );
/// # let _ = source;
/// ```
pub struct DecodedSource<T: Schema, D> {
    name: String,
    bytes: Arc<[u8]>,
    decoder: D,
    _schema: PhantomData<fn() -> T>,
}

impl<T: Schema, D: Decoder<T>> DecodedSource<T, D> {
    /// A source decoding `bytes` with `decoder`.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>, decoder: D) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            decoder,
            _schema: PhantomData,
        }
    }

    /// The undecoded document.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[async_trait]
impl<T: Schema, D: Decoder<T>> Source<T> for DecodedSource<T, D> {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn value(&self, _cancel: &CancellationToken) -> Result<Shadow<T>, SourceError> {
        let mut input: &[u8] = &self.bytes;
        self.decoder.decode(&mut input)
    }
}

impl<T: Schema, D> std::fmt::Debug for DecodedSource<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedSource")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}
