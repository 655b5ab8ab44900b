pub mod powershell;

#[cfg(feature = "umya")]
pub mod umya;

pub use powershell::{PowerShellConfig, PowerShellLive};
#[cfg(feature = "umya")]
pub use umya::UmyaCodec;
