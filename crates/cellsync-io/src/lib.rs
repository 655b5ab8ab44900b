//! Backends for cellsync: the offline document codec, the live automation
//! surface, and the probe that chooses between them.

pub mod backends;
pub mod error;
pub mod live;
pub mod probe;
pub mod target;
pub mod traits;

pub use backends::{PowerShellConfig, PowerShellLive};
#[cfg(feature = "umya")]
pub use backends::UmyaCodec;
pub use error::IoError;
pub use live::{BackendReply, CloseOptions, LiveBackend, LiveDocument, OpenDocument, SheetChange};
pub use probe::{AccessProbe, Accessibility, FsProbe};
pub use target::{DocumentRef, ResolvedSheet, SheetResolution, SheetSelector, SheetTarget};
pub use traits::{CodecStore, DocumentCodec, OfflineStore, SheetSnapshot};

pub use cellsync_common as common;
