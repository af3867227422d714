// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("value of {size} bytes exceeds the {limit} byte item limit")]
    TooLarge { size: usize, limit: usize },
    #[error("internal: {0}")]
    Internal(String),
    #[error("computation failed: {0}")]
    Compute(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Relative time-to-live in seconds. Zero or negative means the entry never
/// expires, which is how permanent fallback entries are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlSeconds(pub i64);

impl TtlSeconds {
    pub const NEVER: TtlSeconds = TtlSeconds(0);

    pub fn never_expires(self) -> bool {
        self.0 <= 0
    }

    pub fn as_duration(self) -> Option<std::time::Duration> {
        if self.never_expires() {
            None
        } else {
            Some(std::time::Duration::from_secs(self.0 as u64))
        }
    }
}

pub mod config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_ttls_never_expire() {
        assert!(TtlSeconds::NEVER.never_expires());
        assert!(TtlSeconds(-30).never_expires());
        assert!(!TtlSeconds(60).never_expires());
    }

    #[test]
    fn ttl_converts_to_duration() {
        assert_eq!(
            TtlSeconds(90).as_duration(),
            Some(std::time::Duration::from_secs(90))
        );
        assert_eq!(TtlSeconds::NEVER.as_duration(), None);
        assert_eq!(TtlSeconds(-1).as_duration(), None);
    }
}
