pub mod attachment;
pub mod common;
pub mod config;
pub mod detector;
pub mod endpoint;
pub mod error;
pub mod handle;
pub mod message;
pub mod param;
pub mod pending;
pub mod reactor;
pub mod state;
pub mod transport;

pub use error::{Error, Result};

pub use detector::{ControllerState, Detector, DetectorBuilder, DetectorOptions};
pub use handle::DetectorHandle;

pub trait Builder {
    type Output;
    fn build(self) -> Result<Self::Output>;
}
