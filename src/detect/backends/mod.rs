pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{StubDetector, StubModelProvider};

#[cfg(feature = "backend-tract")]
pub use tract::{TractModel, TractModelProvider};
