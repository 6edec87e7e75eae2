//! Error types.

use thiserror::Error;

/// Errors reported by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A write was attempted on a computed that has no setter.
    #[error("write operation failed: computed value is readonly")]
    ReadonlyComputed,

    /// A scheduled job kept re-queueing itself within one flush.
    #[error(
        "maximum recursive updates exceeded: a job was queued more than {limit} times in one flush"
    )]
    RecursionLimit {
        /// The per-flush limit that was exceeded.
        limit: usize,
    },

    /// A post-flush job panicked; the queue kept going.
    #[error("post-flush job panicked: {message}")]
    JobPanicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl ReactiveError {
    /// Build a [`ReactiveError::JobPanicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_owned()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        ReactiveError::JobPanicked { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(
            ReactiveError::from_panic(payload.as_ref()),
            ReactiveError::JobPanicked {
                message: "boom".into()
            }
        );

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(
            ReactiveError::from_panic(payload.as_ref()).to_string(),
            "post-flush job panicked: bang"
        );
    }

    #[test]
    fn recursion_limit_mentions_the_limit() {
        let err = ReactiveError::RecursionLimit { limit: 100 };
        assert!(err.to_string().contains("100"));
    }
}
