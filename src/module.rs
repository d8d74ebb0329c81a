use tch::{nn, Tensor};

use crate::error::Result;

/// Whether dropout and batch-norm statistic updates are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Train,
    #[default]
    Eval,
}

impl Mode {
    pub fn is_train(self) -> bool {
        matches!(self, Mode::Train)
    }
}

impl From<bool> for Mode {
    fn from(train: bool) -> Mode {
        if train {
            Mode::Train
        } else {
            Mode::Eval
        }
    }
}

/// Ordered, named access to a module's learnable tensors.
///
/// Returned tensors are shallow clones: they share storage with the module,
/// so writing into them under `tch::no_grad` changes the module's parameters.
pub trait NamedParameters {
    fn named_parameters(&self) -> Vec<(String, Tensor)>;

    /// Non-learnable state such as batch-norm running statistics.
    fn named_buffers(&self) -> Vec<(String, Tensor)> {
        Vec::new()
    }

    fn parameter_count(&self) -> i64 {
        self.named_parameters()
            .iter()
            .map(|(_, t)| t.numel() as i64)
            .sum()
    }
}

/// A network that maps an image batch to a tensor.
pub trait ImageModule: NamedParameters {
    fn name(&self) -> &'static str;

    /// Validates `input` and runs the network.
    ///
    /// Inputs that would fail inside libtorch (wrong rank, wrong channel count,
    /// too few values for batch-norm statistics in `Mode::Train`) come back as
    /// `ArchError::ShapeMismatch` instead of panicking.
    fn evaluate(&self, input: &Tensor, mode: Mode) -> Result<Tensor>;
}

pub(crate) fn prefixed(prefix: &str, params: Vec<(String, Tensor)>) -> Vec<(String, Tensor)> {
    params
        .into_iter()
        .map(|(name, t)| (format!("{prefix}.{name}"), t))
        .collect()
}

pub(crate) fn conv_parameters(prefix: &str, conv: &nn::Conv2D) -> Vec<(String, Tensor)> {
    let mut params = vec![(format!("{prefix}.weight"), conv.ws.shallow_clone())];
    if let Some(bs) = &conv.bs {
        params.push((format!("{prefix}.bias"), bs.shallow_clone()));
    }
    params
}

pub(crate) fn batch_norm_parameters(prefix: &str, bn: &nn::BatchNorm) -> Vec<(String, Tensor)> {
    let mut params = Vec::new();
    if let Some(ws) = &bn.ws {
        params.push((format!("{prefix}.weight"), ws.shallow_clone()));
    }
    if let Some(bs) = &bn.bs {
        params.push((format!("{prefix}.bias"), bs.shallow_clone()));
    }
    params
}

pub(crate) fn batch_norm_buffers(prefix: &str, bn: &nn::BatchNorm) -> Vec<(String, Tensor)> {
    vec![
        (format!("{prefix}.running_mean"), bn.running_mean.shallow_clone()),
        (format!("{prefix}.running_var"), bn.running_var.shallow_clone()),
    ]
}

/// 3x3 stride-1 "same" convolution used throughout both networks.
pub(crate) fn conv3x3(path: nn::Path, c_in: i64, c_out: i64) -> nn::Conv2D {
    nn::conv2d(path, c_in, c_out, 3, nn::ConvConfig { stride: 1, padding: 1, ..Default::default() })
}
