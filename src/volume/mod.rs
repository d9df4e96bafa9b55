//! Volume-spanning addressing and streams.
//!
//! A split archive is a sequence of volume files that together form one
//! logical byte stream. Everything above this module addresses archive bytes
//! through [`VolumePosition`] and reads or writes them through
//! [`SpanningReader`] / [`SpanningWriter`], never through raw file offsets.
//!
//! ZIP headers must never straddle two volumes. Both streams therefore offer
//! an atomic-fit check and a scoped volume lock that turns any attempt to
//! cross a boundary into a [`FragmentedHeader`] error.
//!
//! [`FragmentedHeader`]: crate::CorruptionKind::FragmentedHeader

mod position;
mod reader;
mod set;
mod writer;

pub use position::VolumePosition;
pub use reader::{SpanningReader, VolumeLock};
pub use set::{MemoryFactory, SplitFileFactory, VolumeFactory, VolumeSet, split_volume_path};
pub use writer::{SpanningWriter, WriteLock};
