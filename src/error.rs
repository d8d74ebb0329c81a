use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchError {
    /// Constructor arguments that can never produce a well-formed network.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Input tensor rank or channel count does not match what the module was built for.
    #[error("shape mismatch in {module}: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        module: &'static str,
        expected: String,
        actual: Vec<i64>,
    },
}

pub type Result<T> = std::result::Result<T, ArchError>;

/// Checks that `xs` is a `(batch, channels, H, W)` tensor with the given channel count.
pub(crate) fn check_image(module: &'static str, xs: &tch::Tensor, channels: i64) -> Result<()> {
    let size = xs.size();
    match size.as_slice() {
        [b, c, h, w] if *c == channels && *b > 0 && *h > 0 && *w > 0 => Ok(()),
        _ => Err(ArchError::ShapeMismatch {
            module,
            expected: format!("(batch, {channels}, H, W)"),
            actual: size,
        }),
    }
}
