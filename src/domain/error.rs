//! Domain error types.

/// Top-level error type for chanlun.
#[derive(Debug, thiserror::Error)]
pub enum ChanError {
    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("structural consistency fault: {reason}")]
    Structure { reason: String },

    #[error("bar out of order: index {received} does not follow index {previous}")]
    OutOfOrder { previous: usize, received: usize },

    #[error("invalid bar {index}: {reason}")]
    InvalidBar { index: usize, reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChanError {
    pub(crate) fn structure(reason: impl Into<String>) -> Self {
        ChanError::Structure {
            reason: reason.into(),
        }
    }

    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        ChanError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// True for faults that mean the derived structure can no longer be trusted.
    pub fn is_structural(&self) -> bool {
        matches!(self, ChanError::Structure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_message_names_section_and_key() {
        let err = ChanError::config_invalid("chan", "seg_algo", "unsupported segment algorithm");
        assert_eq!(
            err.to_string(),
            "invalid config value [chan] seg_algo: unsupported segment algorithm"
        );
    }

    #[test]
    fn out_of_order_message() {
        let err = ChanError::OutOfOrder {
            previous: 7,
            received: 7,
        };
        assert_eq!(
            err.to_string(),
            "bar out of order: index 7 does not follow index 7"
        );
    }

    #[test]
    fn only_structure_faults_are_structural() {
        assert!(ChanError::structure("missing predecessor").is_structural());
        assert!(
            !ChanError::OutOfOrder {
                previous: 1,
                received: 0
            }
            .is_structural()
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::other("disk full");
        let err: ChanError = io.into();
        assert!(matches!(err, ChanError::Io(_)));
    }
}
