use tch::{nn, Tensor};

use crate::activation::gelu;
use crate::error::{check_image, ArchError, Result};
use crate::module::{conv3x3, conv_parameters, prefixed, ImageModule, Mode, NamedParameters};
use crate::residual::ResidualBlock;

/// Channel width of the generator's feature trunk.
pub const TRUNK_CHANNELS: i64 = 64;
/// Total spatial upscale of the generator (two x2 stages).
pub const UPSCALE_FACTOR: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsampleMode {
    /// Nearest-neighbour x2 followed by a 3x3 convolution.
    #[default]
    Nearest,
    /// 3x3 convolution to 4x channels followed by a x2 pixel shuffle.
    PixelShuffle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub in_channels: i64,
    pub out_channels: i64,
    pub residual_blocks: usize,
    pub upsample: UpsampleMode,
    pub reconstruction_kernel: i64,
}

impl Default for GeneratorConfig {
    fn default() -> GeneratorConfig {
        GeneratorConfig {
            in_channels: 3,
            out_channels: 3,
            residual_blocks: 10,
            upsample: UpsampleMode::Nearest,
            reconstruction_kernel: 9,
        }
    }
}

impl GeneratorConfig {
    pub fn new(in_channels: i64, out_channels: i64, residual_blocks: usize) -> GeneratorConfig {
        GeneratorConfig { in_channels, out_channels, residual_blocks, ..Default::default() }
    }

    pub fn with_upsample(mut self, upsample: UpsampleMode) -> GeneratorConfig {
        self.upsample = upsample;
        self
    }

    pub fn with_reconstruction_kernel(mut self, kernel: i64) -> GeneratorConfig {
        self.reconstruction_kernel = kernel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.in_channels <= 0 {
            return Err(ArchError::Configuration(format!(
                "in_channels must be positive, got {}",
                self.in_channels
            )));
        }
        if self.out_channels <= 0 {
            return Err(ArchError::Configuration(format!(
                "out_channels must be positive, got {}",
                self.out_channels
            )));
        }
        if self.reconstruction_kernel <= 0 || self.reconstruction_kernel % 2 == 0 {
            return Err(ArchError::Configuration(format!(
                "reconstruction_kernel must be odd and positive, got {}",
                self.reconstruction_kernel
            )));
        }
        Ok(())
    }
}

/// One x2 stage of the upsampling path, followed by GELU.
#[derive(Debug)]
struct UpsampleStage {
    mode: UpsampleMode,
    conv: nn::Conv2D,
}

impl UpsampleStage {
    fn new(path: nn::Path, mode: UpsampleMode) -> UpsampleStage {
        let c_out = match mode {
            UpsampleMode::Nearest => TRUNK_CHANNELS,
            UpsampleMode::PixelShuffle => TRUNK_CHANNELS * 4,
        };
        UpsampleStage { mode, conv: conv3x3(&path / "conv", TRUNK_CHANNELS, c_out) }
    }
}

impl nn::Module for UpsampleStage {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let ys = match self.mode {
            UpsampleMode::Nearest => {
                let size = xs.size();
                let (h, w) = (size[2], size[3]);
                xs.upsample_nearest2d([h * 2, w * 2], Some(2.0), Some(2.0)).apply(&self.conv)
            }
            UpsampleMode::PixelShuffle => xs.apply(&self.conv).pixel_shuffle(2),
        };
        gelu(&ys)
    }
}

/// 4x super-resolution generator.
///
/// stem (9x9 conv, GELU) -> residual trunk -> 3x3 refinement conv plus the long
/// skip from the stem -> two x2 upsample stages -> reconstruction conv. The
/// output carries no final activation.
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    stem: nn::Conv2D,
    trunk: Vec<ResidualBlock>,
    refine: nn::Conv2D,
    upsample: Vec<UpsampleStage>,
    reconstruct: nn::Conv2D,
}

impl Generator {
    pub fn new(path: nn::Path, config: GeneratorConfig) -> Result<Generator> {
        config.validate()?;

        let stem = nn::conv2d(
            &path / "stem",
            config.in_channels,
            TRUNK_CHANNELS,
            9,
            nn::ConvConfig { stride: 1, padding: 4, ..Default::default() },
        );
        let trunk = (0..config.residual_blocks)
            .map(|i| ResidualBlock::new(&path / "trunk" / i, TRUNK_CHANNELS))
            .collect::<Result<Vec<_>>>()?;
        let refine = conv3x3(&path / "refine", TRUNK_CHANNELS, TRUNK_CHANNELS);
        let upsample = (0..2)
            .map(|i| UpsampleStage::new(&path / "upsample" / i, config.upsample))
            .collect();
        let kernel = config.reconstruction_kernel;
        let reconstruct = nn::conv2d(
            &path / "reconstruct",
            TRUNK_CHANNELS,
            config.out_channels,
            kernel,
            nn::ConvConfig { stride: 1, padding: kernel / 2, ..Default::default() },
        );

        Ok(Generator { config, stem, trunk, refine, upsample, reconstruct })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Stem output and the refined trunk output (refine conv plus long skip),
    /// both at input resolution with `TRUNK_CHANNELS` channels.
    pub fn features(&self, xs: &Tensor) -> (Tensor, Tensor) {
        let stem_output = gelu(&xs.apply(&self.stem));
        let trunk_output = self
            .trunk
            .iter()
            .fold(stem_output.shallow_clone(), |acc, block| acc.apply(block));
        let refined_output = trunk_output.apply(&self.refine) + &stem_output;
        (stem_output, refined_output)
    }

    /// Output shape for a `(batch, in_channels, h, w)` input.
    pub fn output_shape(&self, batch: i64, h: i64, w: i64) -> [i64; 4] {
        [batch, self.config.out_channels, h * UPSCALE_FACTOR, w * UPSCALE_FACTOR]
    }
}

impl nn::Module for Generator {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let (_, refined_output) = self.features(xs);
        let upsampled_output = self
            .upsample
            .iter()
            .fold(refined_output, |acc, stage| acc.apply(stage));
        upsampled_output.apply(&self.reconstruct)
    }
}

impl NamedParameters for Generator {
    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        let mut params = conv_parameters("stem", &self.stem);
        for (i, block) in self.trunk.iter().enumerate() {
            params.extend(prefixed(&format!("trunk.{i}"), block.named_parameters()));
        }
        params.extend(conv_parameters("refine", &self.refine));
        for (i, stage) in self.upsample.iter().enumerate() {
            params.extend(conv_parameters(&format!("upsample.{i}.conv"), &stage.conv));
        }
        params.extend(conv_parameters("reconstruct", &self.reconstruct));
        params
    }
}

impl ImageModule for Generator {
    fn name(&self) -> &'static str {
        "Generator"
    }

    fn evaluate(&self, input: &Tensor, _mode: Mode) -> Result<Tensor> {
        check_image(self.name(), input, self.config.in_channels)?;
        Ok(input.apply(self))
    }
}
