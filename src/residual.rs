use tch::{nn, Tensor};

use crate::activation::gelu;
use crate::error::{check_image, ArchError, Result};
use crate::module::{conv3x3, conv_parameters, ImageModule, Mode, NamedParameters};

/// Two 3x3 convolutions with a GELU between them, added back onto the input.
#[derive(Debug)]
pub struct ResidualBlock {
    channels: i64,
    conv_1: nn::Conv2D,
    conv_2: nn::Conv2D,
}

impl ResidualBlock {
    pub fn new(path: nn::Path, channels: i64) -> Result<ResidualBlock> {
        if channels <= 0 {
            return Err(ArchError::Configuration(format!(
                "residual block channels must be positive, got {channels}"
            )));
        }
        Ok(ResidualBlock {
            channels,
            conv_1: conv3x3(&path / "conv_1", channels, channels),
            conv_2: conv3x3(&path / "conv_2", channels, channels),
        })
    }

    pub fn channels(&self) -> i64 {
        self.channels
    }

    /// The learned transform alone, without the shortcut.
    pub fn transform(&self, xs: &Tensor) -> Tensor {
        gelu(&xs.apply(&self.conv_1)).apply(&self.conv_2)
    }
}

impl nn::Module for ResidualBlock {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs + self.transform(xs)
    }
}

impl NamedParameters for ResidualBlock {
    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        let mut params = conv_parameters("conv_1", &self.conv_1);
        params.extend(conv_parameters("conv_2", &self.conv_2));
        params
    }
}

impl ImageModule for ResidualBlock {
    fn name(&self) -> &'static str {
        "ResidualBlock"
    }

    fn evaluate(&self, input: &Tensor, _mode: Mode) -> Result<Tensor> {
        check_image(self.name(), input, self.channels)?;
        Ok(input.apply(self))
    }
}
