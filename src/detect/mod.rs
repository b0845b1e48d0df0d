mod backend;
pub mod backends;
pub mod loader;
mod result;

pub use backend::{DetectionModel, ModelProvider};
pub use backends::{StubDetector, StubModelProvider};
pub use loader::ModelLoader;
pub use result::{BoundingBox, Prediction};
