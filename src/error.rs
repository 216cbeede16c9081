//! Coarse classification shared by all error types of this crate.

use core::fmt;

/// What went wrong, independent of which component noticed.
///
/// Every error type of the crate maps onto one kind through its `kind()`
/// method. Rejections that arrive as plain reason strings (from a ledger
/// behind some transport) are classified with [ErrorKind::from_revert_reason].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, e.g. a zero amount or an unencodable value.
    Validation,
    /// Wrong sender or a signature that does not match the participant.
    Authorization,
    /// The exact state was committed before.
    Replay,
    /// The nonce does not increase, or a receipt is already committed.
    Ordering,
    /// The update would shrink the escrow or overflow.
    Conservation,
    InsufficientFunds,
    /// Submission or confirmation did not complete. The only retryable kind.
    Transport,
    EmptyChannel,
    /// Receipt log I/O or a corrupted record.
    Storage,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transport)
    }

    /// Map a ledger rejection reason onto its kind. Unknown reasons are
    /// treated as transport failures, since nothing is known about them.
    pub fn from_revert_reason(reason: &str) -> Self {
        match reason {
            "amount must be positive" => ErrorKind::Validation,
            "sender does not participate in this channel" | "invalid sig0" | "invalid sig1" => {
                ErrorKind::Authorization
            }
            "hash was already committed" => ErrorKind::Replay,
            "nonce must increment" => ErrorKind::Ordering,
            "invalid balances" => ErrorKind::Conservation,
            "insufficient free balance" => ErrorKind::InsufficientFunds,
            "lock some funds into the channel first" => ErrorKind::EmptyChannel,
            _ => ErrorKind::Transport,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Replay => "replay",
            ErrorKind::Ordering => "ordering",
            ErrorKind::Conservation => "conservation",
            ErrorKind::InsufficientFunds => "insufficient funds",
            ErrorKind::Transport => "transport",
            ErrorKind::EmptyChannel => "empty channel",
            ErrorKind::Storage => "storage",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_reasons() {
        let cases = [
            ("amount must be positive", ErrorKind::Validation),
            ("sender does not participate in this channel", ErrorKind::Authorization),
            ("invalid sig0", ErrorKind::Authorization),
            ("invalid sig1", ErrorKind::Authorization),
            ("hash was already committed", ErrorKind::Replay),
            ("nonce must increment", ErrorKind::Ordering),
            ("invalid balances", ErrorKind::Conservation),
            ("insufficient free balance", ErrorKind::InsufficientFunds),
            ("lock some funds into the channel first", ErrorKind::EmptyChannel),
            ("out of gas", ErrorKind::Transport),
        ];
        for (reason, kind) in cases {
            assert_eq!(ErrorKind::from_revert_reason(reason), kind, "{}", reason);
        }
    }

    #[test]
    fn only_transport_is_retryable() {
        assert!(ErrorKind::Transport.is_retryable());
        assert!(!ErrorKind::Replay.is_retryable());
        assert!(!ErrorKind::Storage.is_retryable());
    }
}
