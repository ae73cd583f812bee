//! TLV type codes.
//!
//! Which code carries JSON metadata depends on the channel: flip detail
//! uses [`INFO`], event monitoring uses [`EVENT`].

/// Raw image bytes (JPEG).
pub const IMAGE: u8 = 0x00;

/// Live view information (JSON), flip detail channel.
pub const INFO: u8 = 0x01;

/// Event notification (JSON), event monitoring channel.
pub const EVENT: u8 = 0x02;

/// Returns a human-readable name for a type code.
pub fn kind_name(kind: u8) -> &'static str {
    match kind {
        IMAGE => "IMAGE",
        INFO => "INFO",
        EVENT => "EVENT",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_known_and_unknown_codes() {
        assert_eq!(kind_name(IMAGE), "IMAGE");
        assert_eq!(kind_name(INFO), "INFO");
        assert_eq!(kind_name(EVENT), "EVENT");
        assert_eq!(kind_name(0x7F), "UNKNOWN");
    }
}
