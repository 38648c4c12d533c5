use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum NtfsError {
    /// Record header is not `FILE`
    BadSignature,
    /// Multi-sector transfer check failed, record bytes rejected
    BadFixup,
    /// Attribute length steps past the record's used bytes
    AttributeOverflow,
    UnknownAttributeForm,
    /// On-disk bytes end before the structure does
    Truncated,
    /// Data run list could not be decoded
    BadRun,
    /// Record needed for completeness is absent and cannot be fetched
    MissingReference,
    /// The MFT source cannot perform targeted fetches
    NotSupported,
    /// Underlying volume read failed
    Io,
    /// A callback asked the walk to stop
    StopRequested,
}

impl std::error::Error for NtfsError {}

impl fmt::Display for NtfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtfsError::BadSignature => write!(f, "Record signature is not FILE"),
            NtfsError::BadFixup => write!(f, "Multi-sector fixup verification failed"),
            NtfsError::AttributeOverflow => write!(f, "Attribute overflows record bounds"),
            NtfsError::UnknownAttributeForm => write!(f, "Unknown attribute form code"),
            NtfsError::Truncated => write!(f, "Structure truncated"),
            NtfsError::BadRun => write!(f, "Bad data run list"),
            NtfsError::MissingReference => write!(f, "Referenced record is missing"),
            NtfsError::NotSupported => write!(f, "Operation not supported by this source"),
            NtfsError::Io => write!(f, "Volume read failed"),
            NtfsError::StopRequested => write!(f, "Walk stopped by callback"),
        }
    }
}
