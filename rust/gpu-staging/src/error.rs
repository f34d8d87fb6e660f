use thiserror::Error;

/// Failure of a staging buffer operation.
///
/// Allocation is the only way a buffer operation can fail; zero-length and
/// already-satisfied requests are absorbed by rounding and no-op checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The backing store could not grow to `requested` bytes. Also reported when
    /// rounding the request to `alignment` overflows, or the rounded size exceeds
    /// what a single allocation can describe.
    #[error("failed to allocate {requested} bytes aligned to {alignment}")]
    AllocationFailure { requested: usize, alignment: usize },
}

impl Error {
    pub fn allocation_failure(requested: usize, alignment: usize) -> Error {
        Error::AllocationFailure {
            requested,
            alignment,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::allocation_failure(8192, 4096);
        assert_eq!(
            err.to_string(),
            "failed to allocate 8192 bytes aligned to 4096"
        );
    }
}
