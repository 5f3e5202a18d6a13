/// Conditions signaled synchronously by the containers and ownership handles.
///
/// The receiving object is left untouched whenever one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Bounds-checked access with an index at or past the length.
    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },
    /// A shared handle does not point at a value of the requested type.
    #[error("invalid conversion of shared handle to `{target}`")]
    InvalidConversion { target: &'static str },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::pedantic)]

    use super::*;

    #[test]
    fn out_of_range_display() {
        assert_eq!(
            Error::OutOfRange { index: 7, len: 3 }.to_string(),
            "index 7 out of range for length 3"
        );
    }

    #[test]
    fn invalid_conversion_display() {
        assert_eq!(
            Error::InvalidConversion { target: "u8" }.to_string(),
            "invalid conversion of shared handle to `u8`"
        );
    }
}
