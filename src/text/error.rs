use derive_more::{Display, Error};

/// The error returned by [`CowString::get`](super::CowString::get) and
/// [`CowString::set`](super::CowString::set) when the requested index falls outside `[0, len)`.
///
/// This is a local, recoverable condition: the value itself is left untouched (in particular, an
/// out-of-range write never detaches a shared buffer), so the caller is free to retry with a
/// valid index. Negative indices are unrepresentable because the index type is [`usize`].
#[derive(Clone, Copy, Debug, Display, Error, PartialEq, Eq)]
#[display("index {index} out of bounds for text with {len} bytes")]
pub struct IndexOutOfBounds {
    /// The offending index.
    pub index: usize,
    /// The length of the text at the time of access.
    pub len: usize,
}
