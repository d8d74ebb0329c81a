use tch::{nn, Tensor};

const SQRT_2_OVER_PI: f64 = 0.797_884_560_802_865_4;
const CUBIC_COEFF: f64 = 0.044_715;

/// Tanh approximation of the Gaussian Error Linear Unit.
///
/// `0.5 * x * (1 + tanh(sqrt(2/pi) * (x + 0.044715 * x^3)))`, applied element-wise.
/// Very large inputs can overflow the cubic term to a non-finite value; inputs are
/// expected to be range-checked before they reach the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gelu;

impl Gelu {
    pub fn new() -> Gelu {
        Gelu
    }
}

pub fn gelu(xs: &Tensor) -> Tensor {
    let cubic = xs * xs * xs;
    let inner = (xs + cubic * CUBIC_COEFF) * SQRT_2_OVER_PI;
    xs * 0.5 * (inner.tanh() + 1.0)
}

impl nn::Module for Gelu {
    fn forward(&self, xs: &Tensor) -> Tensor {
        gelu(xs)
    }
}
