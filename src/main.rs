use tch::{kind, nn, Device, Tensor};
use anyhow::{bail, Result};
use clap::Parser;

use srgan_rs::{
    Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, ImageModule, Mode,
    UpsampleMode, UPSCALE_FACTOR,
};

#[derive(Parser, Debug)]
#[command(version, about = "SRGAN architecture inspector.", long_about = None)]
struct Args {
    #[arg(long, default_value_t = 3)]
    in_channels: i64,
    #[arg(long, default_value_t = 3)]
    out_channels: i64,
    #[arg(short, long, default_value_t = 10)]
    residual_blocks: usize,
    #[arg(long, default_value_t = false)]
    pixel_shuffle: bool,
    #[arg(long, default_value_t = 9)]
    reconstruction_kernel: i64,
    #[arg(long, default_value_t = 128)]
    lr_size: i64,
    #[arg(short, long, default_value_t = 1)]
    batch_size: i64,
    #[arg(short, long, default_value_t = false)]
    verbose: bool
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.batch_size <= 0 || args.lr_size <= 0 {
        bail!("--batch-size and --lr-size must be positive.")
    }

    let device = Device::cuda_if_available();
    println!("Use Device: {device:?}");
    println!("--------");

    let upsample = if args.pixel_shuffle {
        UpsampleMode::PixelShuffle
    } else {
        UpsampleMode::Nearest
    };
    let g_config = GeneratorConfig::new(args.in_channels, args.out_channels, args.residual_blocks)
        .with_upsample(upsample)
        .with_reconstruction_kernel(args.reconstruction_kernel);
    let hr_size = args.lr_size * UPSCALE_FACTOR;
    let d_config = DiscriminatorConfig::new((args.out_channels, hr_size, hr_size));

    println!("In Channels: {}", g_config.in_channels);
    println!("Out Channels: {}", g_config.out_channels);
    println!("Residual Blocks: {}", g_config.residual_blocks);
    println!("Upsample: {:?}", g_config.upsample);
    println!("Reconstruction Kernel: {}", g_config.reconstruction_kernel);
    println!("LR Size: {}", args.lr_size);
    println!("HR Size: {}", hr_size);
    println!("Batch Size: {}", args.batch_size);
    println!("--------");

    // Build Generator
    let g_vs = nn::VarStore::new(device);
    let generator = Generator::new(g_vs.root(), g_config)?;
    summary(&generator, args.verbose);

    // Build Discriminator
    let d_vs = nn::VarStore::new(device);
    let discriminator = Discriminator::new(d_vs.root(), d_config)?;
    summary(&discriminator, args.verbose);
    println!("Discriminator Output Shape: {:?}", discriminator.output_shape());
    println!("--------");

    println!("Shape check...");
    let lr_shape = [args.batch_size, args.in_channels, args.lr_size, args.lr_size];
    let (fake_shape, score_shape) = tch::no_grad(|| -> Result<(Vec<i64>, Vec<i64>)> {
        let lr = Tensor::rand(lr_shape, kind::FLOAT_CPU).to_device(device);
        let fake = generator.evaluate(&lr, Mode::Eval)?;
        let score = discriminator.evaluate(&fake, Mode::Eval)?;
        Ok((fake.size(), score.size()))
    })?;
    println!("Generator: {:?} -> {:?}", lr_shape, fake_shape);
    println!("Discriminator: {:?} -> {:?}", fake_shape, score_shape);

    let expected_fake = generator
        .output_shape(args.batch_size, args.lr_size, args.lr_size)
        .to_vec();
    if fake_shape != expected_fake {
        bail!("Generator output {fake_shape:?} does not match {expected_fake:?}")
    }
    let (c, h, w) = discriminator.output_shape();
    let expected_score = vec![args.batch_size, c, h, w];
    if score_shape != expected_score {
        bail!("Discriminator output {score_shape:?} does not match {expected_score:?}")
    }
    println!("OK");

    Ok(())
}

fn summary<M: ImageModule>(module: &M, verbose: bool) {
    println!("{}: {} parameters", module.name(), module.parameter_count());
    if verbose {
        for (name, tensor) in module.named_parameters() {
            println!("  {name}: {:?}", tensor.size());
        }
        for (name, tensor) in module.named_buffers() {
            println!("  {name} (buffer): {:?}", tensor.size());
        }
    }
}
