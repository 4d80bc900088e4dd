use crate::error::Result;

/// The encoding-layer contract, expressed as a small trait parameterized
/// over the message type rather than the source's `Any`-keyed
/// marshal/unmarshal function pair: Rust's static typing makes a
/// `(fn(&dyn Any) -> ..., fn(&mut dyn Read) -> ...)` pair clumsy compared
/// to letting each concrete encoding own a typed `Codec` impl.
///
/// `T` is almost always the concrete request/response message type an
/// encoding-specific generated stub works with; for raw-bytes encodings it
/// is `Vec<u8>` itself.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}
