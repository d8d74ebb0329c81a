use tch::{nn, Tensor};

use crate::error::{check_image, ArchError, Result};
use crate::module::{
    batch_norm_buffers, batch_norm_parameters, conv3x3, conv_parameters, prefixed, ImageModule,
    Mode, NamedParameters,
};

/// Output channels of the six discriminator blocks.
pub const DISCRIMINATOR_FILTERS: [i64; 6] = [16, 32, 64, 128, 256, 512];

/// Spatial size after one 3x3, stride-2, padding-1 convolution.
fn downsampled(size: i64) -> i64 {
    (size + 2 - 3) / 2 + 1
}

/// Spatial size of the patch grid after all six stride-2 stages.
fn patch_grid(h: i64, w: i64) -> (i64, i64) {
    (0..DISCRIMINATOR_FILTERS.len()).fold((h, w), |(h, w), _| (downsampled(h), downsampled(w)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscriminatorConfig {
    /// `(channels, height, width)` of the expected input image.
    pub input_shape: (i64, i64, i64),
    pub dropout: f64,
    pub leaky_slope: f64,
}

impl Default for DiscriminatorConfig {
    fn default() -> DiscriminatorConfig {
        DiscriminatorConfig { input_shape: (3, 512, 512), dropout: 0.3, leaky_slope: 0.2 }
    }
}

impl DiscriminatorConfig {
    pub fn new(input_shape: (i64, i64, i64)) -> DiscriminatorConfig {
        DiscriminatorConfig { input_shape, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        let (c, h, w) = self.input_shape;
        if c <= 0 || h <= 0 || w <= 0 {
            return Err(ArchError::Configuration(format!(
                "input_shape must be positive, got {:?}",
                self.input_shape
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ArchError::Configuration(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(0.0..=1.0).contains(&self.leaky_slope) {
            return Err(ArchError::Configuration(format!(
                "leaky_slope must be in [0, 1], got {}",
                self.leaky_slope
            )));
        }
        Ok(())
    }

    /// `(1, h', w')` patch grid produced for `input_shape`; `h / 64` when divisible.
    pub fn output_shape(&self) -> (i64, i64, i64) {
        let (_, h, w) = self.input_shape;
        let (h, w) = patch_grid(h, w);
        (1, h, w)
    }
}

#[derive(Debug)]
struct DiscriminatorBlock {
    conv_1: nn::Conv2D,
    // absent on the first block so the raw input is not normalized
    bn_1: Option<nn::BatchNorm>,
    conv_2: nn::Conv2D,
    bn_2: nn::BatchNorm,
    dropout: f64,
    leaky_slope: f64,
}

impl DiscriminatorBlock {
    fn new(
        path: nn::Path,
        c_in: i64,
        c_out: i64,
        first_block: bool,
        config: &DiscriminatorConfig,
    ) -> Self {
        let bn_1 = if first_block {
            None
        } else {
            Some(nn::batch_norm2d(&path / "bn_1", c_out, Default::default()))
        };
        DiscriminatorBlock {
            conv_1: conv3x3(&path / "conv_1", c_in, c_out),
            bn_1,
            conv_2: nn::conv2d(
                &path / "conv_2",
                c_out,
                c_out,
                3,
                nn::ConvConfig { stride: 2, padding: 1, ..Default::default() },
            ),
            bn_2: nn::batch_norm2d(&path / "bn_2", c_out, Default::default()),
            dropout: config.dropout,
            leaky_slope: config.leaky_slope,
        }
    }

    fn leaky_relu(&self, xs: &Tensor) -> Tensor {
        xs.maximum(&(xs * self.leaky_slope))
    }

    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        let mut params = conv_parameters("conv_1", &self.conv_1);
        if let Some(bn) = &self.bn_1 {
            params.extend(batch_norm_parameters("bn_1", bn));
        }
        params.extend(conv_parameters("conv_2", &self.conv_2));
        params.extend(batch_norm_parameters("bn_2", &self.bn_2));
        params
    }

    fn named_buffers(&self) -> Vec<(String, Tensor)> {
        let mut buffers = Vec::new();
        if let Some(bn) = &self.bn_1 {
            buffers.extend(batch_norm_buffers("bn_1", bn));
        }
        buffers.extend(batch_norm_buffers("bn_2", &self.bn_2));
        buffers
    }
}

impl nn::ModuleT for DiscriminatorBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let mut ys = xs.apply(&self.conv_1).dropout(self.dropout, train);
        if let Some(bn) = &self.bn_1 {
            ys = ys.apply_t(bn, train);
        }
        let ys = self.leaky_relu(&ys).apply(&self.conv_2).dropout(self.dropout, train);
        self.leaky_relu(&ys.apply_t(&self.bn_2, train))
    }
}

/// Patch discriminator: six conv blocks, each halving H and W, then a 3x3
/// conv down to one channel of raw logits.
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    blocks: Vec<DiscriminatorBlock>,
    head: nn::Conv2D,
}

impl Discriminator {
    pub fn new(path: nn::Path, config: DiscriminatorConfig) -> Result<Discriminator> {
        config.validate()?;

        let mut blocks = Vec::with_capacity(DISCRIMINATOR_FILTERS.len());
        let mut c_in = config.input_shape.0;
        for (i, &c_out) in DISCRIMINATOR_FILTERS.iter().enumerate() {
            let block_path = &path / "blocks" / i;
            blocks.push(DiscriminatorBlock::new(block_path, c_in, c_out, i == 0, &config));
            c_in = c_out;
        }
        let head = conv3x3(&path / "head", c_in, 1);

        Ok(Discriminator { config, blocks, head })
    }

    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }

    pub fn input_shape(&self) -> (i64, i64, i64) {
        self.config.input_shape
    }

    pub fn output_shape(&self) -> (i64, i64, i64) {
        self.config.output_shape()
    }
}

impl nn::ModuleT for Discriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.blocks
            .iter()
            .fold(xs.shallow_clone(), |acc, block| acc.apply_t(block, train))
            .apply(&self.head)
    }
}

impl NamedParameters for Discriminator {
    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        let mut params = Vec::new();
        for (i, block) in self.blocks.iter().enumerate() {
            params.extend(prefixed(&format!("blocks.{i}"), block.named_parameters()));
        }
        params.extend(conv_parameters("head", &self.head));
        params
    }

    fn named_buffers(&self) -> Vec<(String, Tensor)> {
        let mut buffers = Vec::new();
        for (i, block) in self.blocks.iter().enumerate() {
            buffers.extend(prefixed(&format!("blocks.{i}"), block.named_buffers()));
        }
        buffers
    }
}

impl ImageModule for Discriminator {
    fn name(&self) -> &'static str {
        "Discriminator"
    }

    /// In `Mode::Train` the last stage's batch norm needs more than one value per
    /// channel, so `batch * h' * w'` must exceed 1.
    fn evaluate(&self, input: &Tensor, mode: Mode) -> Result<Tensor> {
        check_image(self.name(), input, self.config.input_shape.0)?;
        if mode.is_train() {
            let size = input.size();
            let (h, w) = patch_grid(size[2], size[3]);
            if size[0] * h * w <= 1 {
                return Err(ArchError::ShapeMismatch {
                    module: self.name(),
                    expected: "more than one value per channel at the last stage in train mode"
                        .to_string(),
                    actual: size,
                });
            }
        }
        Ok(input.apply_t(self, mode.is_train()))
    }
}
