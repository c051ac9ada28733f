use std::fmt;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

/// RFC3339 timestamps, always in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcRfc3339;

impl UtcRfc3339 {
    pub(crate) fn format(at: OffsetDateTime) -> String {
        at.format(&Rfc3339)
            .unwrap_or_else(|_| "<invalid-time>".to_string())
    }
}

impl FormatTime for UtcRfc3339 {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{} ", Self::format(OffsetDateTime::now_utc()))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn formats_with_z_suffix() {
        let at = datetime!(2024-03-01 12:30:05 UTC);
        assert_eq!(UtcRfc3339::format(at), "2024-03-01T12:30:05Z");
    }
}
