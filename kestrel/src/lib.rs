//! kestrel - NTFS MFT enumeration and search core
//!
//! The engine walks NTFS volumes (live disks, mounted images, or exported
//! $MFT streams), reconstructs the Master File Table as an in-memory graph of
//! file records, resolves cross-record attribute references, rebuilds full
//! paths, and evaluates a declarative rule set to surface matching files
//! along with their metadata, data streams, and hashes.
//!
//! References:
//!   `https://flatcap.github.io/linux-ntfs/ntfs/`
//!   `https://github.com/libyal/libfsntfs/blob/main/documentation`

pub mod filefind;
pub mod filesystem;
pub mod ntfs;
pub mod structs;
pub(crate) mod utils;
