use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum RuleError {
    /// The rule combines criteria that cannot be combined, or carries none
    InvalidRule,
    /// A named content-scan rule is unknown to the scanner. Warned, not
    /// fatal: the term still evaluates, the scan criterion just never fires
    UnresolvedRule,
    BadRegex,
    BadGlob,
    BadHex,
    ScanFailed,
}

impl std::error::Error for RuleError {}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::InvalidRule => write!(f, "Invalid rule"),
            RuleError::UnresolvedRule => write!(f, "Unknown content-scan rule"),
            RuleError::BadRegex => write!(f, "Failed to compile regex"),
            RuleError::BadGlob => write!(f, "Failed to compile glob"),
            RuleError::BadHex => write!(f, "Failed to decode hex literal"),
            RuleError::ScanFailed => write!(f, "Content scan failed"),
        }
    }
}
