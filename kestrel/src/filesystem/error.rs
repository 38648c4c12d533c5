use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum FileSystemError {
    OpenFile,
    ReadFile,
    SeekFile,
    NotFile,
}

impl std::error::Error for FileSystemError {}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSystemError::OpenFile => write!(f, "Failed to open file"),
            FileSystemError::ReadFile => write!(f, "Failed to read file"),
            FileSystemError::SeekFile => write!(f, "Failed to seek file"),
            FileSystemError::NotFile => write!(f, "Not a file"),
        }
    }
}
