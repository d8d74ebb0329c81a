//! Generator and patch discriminator for 4x image super-resolution, built on `tch`.
//!
//! Both networks create their parameters under a caller-supplied [`tch::nn::Path`],
//! so the caller's `VarStore` stays the single handle for optimizers and checkpoints.

pub mod activation;
pub mod discriminator;
pub mod error;
pub mod generator;
pub mod module;
pub mod residual;

pub use activation::{gelu, Gelu};
pub use discriminator::{Discriminator, DiscriminatorConfig, DISCRIMINATOR_FILTERS};
pub use error::{ArchError, Result};
pub use generator::{Generator, GeneratorConfig, UpsampleMode, TRUNK_CHANNELS, UPSCALE_FACTOR};
pub use module::{ImageModule, Mode, NamedParameters};
pub use residual::ResidualBlock;
