use rand::Rng;
use tch::{nn, Device, Kind, Tensor};

use srgan_rs::{
    ArchError, Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, ImageModule, Mode,
    NamedParameters,
};

fn generator(config: GeneratorConfig) -> (nn::VarStore, Generator) {
    let vs = nn::VarStore::new(Device::Cpu);
    let net = Generator::new(vs.root(), config).unwrap();
    (vs, net)
}

fn discriminator(input_shape: (i64, i64, i64)) -> (nn::VarStore, Discriminator) {
    let vs = nn::VarStore::new(Device::Cpu);
    let net = Discriminator::new(vs.root(), DiscriminatorConfig::new(input_shape)).unwrap();
    (vs, net)
}

#[test]
fn generator_shape_round_trip() {
    tch::manual_seed(0);
    let mut rng = rand::thread_rng();
    let (_vs, net) = generator(GeneratorConfig::new(3, 3, 2));
    for _ in 0..4 {
        let (b, h, w) = (rng.gen_range(1..=3), rng.gen_range(1..=9), rng.gen_range(1..=9));
        let xs = Tensor::randn([b, 3, h, w], (Kind::Float, Device::Cpu));
        let ys = tch::no_grad(|| net.evaluate(&xs, Mode::Eval)).unwrap();
        assert_eq!(ys.size(), vec![b, 3, 4 * h, 4 * w]);
    }
}

#[test]
fn default_generator_upscales_rgb() {
    let (_vs, net) = generator(GeneratorConfig::default());
    let xs = Tensor::randn([1, 3, 8, 6], (Kind::Float, Device::Cpu));
    let ys = tch::no_grad(|| net.evaluate(&xs, Mode::Eval)).unwrap();
    assert_eq!(ys.size(), vec![1, 3, 32, 24]);
}

#[test]
fn discriminator_reduces_to_patch_grid() {
    let (_vs, net) = discriminator((3, 512, 512));
    assert_eq!(net.output_shape(), (1, 8, 8));

    let big = Tensor::randn([1, 3, 512, 512], (Kind::Float, Device::Cpu));
    let small = Tensor::randn([2, 3, 256, 256], (Kind::Float, Device::Cpu));
    tch::no_grad(|| {
        assert_eq!(net.evaluate(&big, Mode::Eval).unwrap().size(), vec![1, 1, 8, 8]);
        assert_eq!(net.evaluate(&small, Mode::Eval).unwrap().size(), vec![2, 1, 4, 4]);
    });
}

#[test]
fn evaluation_is_deterministic() {
    let (_gvs, gen_net) = generator(GeneratorConfig::new(3, 3, 1));
    let (_dvs, disc_net) = discriminator((3, 64, 64));
    let xs = Tensor::randn([2, 3, 16, 16], (Kind::Float, Device::Cpu));

    let fake_a = gen_net.evaluate(&xs, Mode::Eval).unwrap();
    let fake_b = gen_net.evaluate(&xs, Mode::Eval).unwrap();
    assert!(fake_a.equal(&fake_b));

    let score_a = disc_net.evaluate(&fake_a, Mode::Eval).unwrap();
    let score_b = disc_net.evaluate(&fake_b, Mode::Eval).unwrap();
    assert!(score_a.equal(&score_b));
}

#[test]
fn networks_do_not_share_parameters() {
    let (_gvs, gen_net) = generator(GeneratorConfig::new(3, 3, 1));
    let (_dvs, disc_net) = discriminator((3, 64, 64));
    let lr = Tensor::randn([1, 3, 16, 16], (Kind::Float, Device::Cpu));
    let hr = Tensor::randn([1, 3, 64, 64], (Kind::Float, Device::Cpu));

    let fake_before = gen_net.evaluate(&lr, Mode::Eval).unwrap();
    tch::no_grad(|| {
        for (_, mut t) in disc_net.named_parameters() {
            let _ = t.fill_(0.5);
        }
    });
    assert!(gen_net.evaluate(&lr, Mode::Eval).unwrap().equal(&fake_before));

    let score_before = disc_net.evaluate(&hr, Mode::Eval).unwrap();
    tch::no_grad(|| {
        for (_, mut t) in gen_net.named_parameters() {
            let _ = t.zero_();
        }
    });
    assert!(disc_net.evaluate(&hr, Mode::Eval).unwrap().equal(&score_before));
    // all-zero generator produces an all-zero image
    let blank = gen_net.evaluate(&lr, Mode::Eval).unwrap();
    assert_eq!(blank.abs().sum(Kind::Float).double_value(&[]), 0.0);
}

#[test]
fn silent_trunk_reduces_to_blockless_generator() {
    let (full_vs, full_net) = generator(GeneratorConfig::new(3, 3, 3));
    tch::no_grad(|| {
        for (name, mut t) in full_net.named_parameters() {
            if name.starts_with("trunk.") || name.starts_with("refine.") {
                let _ = t.zero_();
            }
        }
    });
    let mut bare_vs = nn::VarStore::new(Device::Cpu);
    let bare_net = Generator::new(bare_vs.root(), GeneratorConfig::new(3, 3, 0)).unwrap();
    bare_vs.copy(&full_vs).unwrap();

    let xs = Tensor::randn([2, 3, 5, 4], (Kind::Float, Device::Cpu));
    let other = Tensor::randn([2, 3, 5, 4], (Kind::Float, Device::Cpu));
    tch::no_grad(|| {
        let full = full_net.evaluate(&xs, Mode::Eval).unwrap();
        let bare = bare_net.evaluate(&xs, Mode::Eval).unwrap();
        assert!(full.equal(&bare));
        // the stem still reaches the output through the long skip
        assert!(!full.equal(&full_net.evaluate(&other, Mode::Eval).unwrap()));
    });
}

#[test]
fn parameter_writes_reach_the_network() {
    let (_vs, net) = generator(GeneratorConfig::new(3, 3, 1));
    let xs = Tensor::randn([1, 3, 4, 4], (Kind::Float, Device::Cpu));
    let before = net.evaluate(&xs, Mode::Eval).unwrap();
    let (name, mut bias) = net.named_parameters().pop().unwrap();
    assert_eq!(name, "reconstruct.bias");
    tch::no_grad(|| {
        let _ = bias.g_add_scalar_(1.0);
    });
    let after = net.evaluate(&xs, Mode::Eval).unwrap();
    assert!((after - before - 1.0).abs().max().double_value(&[]) < 1e-5);
}

#[test]
fn channel_validation() {
    let vs = nn::VarStore::new(Device::Cpu);
    assert!(matches!(
        Generator::new(vs.root(), GeneratorConfig::new(0, 3, 10)),
        Err(ArchError::Configuration(_))
    ));

    let (_vs, net) = generator(GeneratorConfig::new(3, 3, 1));
    let xs = Tensor::zeros([1, 1, 8, 8], (Kind::Float, Device::Cpu));
    let err = net.evaluate(&xs, Mode::Eval).unwrap_err();
    assert!(matches!(err, ArchError::ShapeMismatch { .. }));
    assert!(err.to_string().contains("Generator"));
}

#[test]
fn modules_share_one_interface() {
    let (_gvs, gen_net) = generator(GeneratorConfig::new(3, 3, 1));
    let (_dvs, disc_net) = discriminator((3, 64, 64));
    let modules: Vec<&dyn ImageModule> = vec![&gen_net, &disc_net];
    let names: Vec<&str> = modules.iter().map(|m| m.name()).collect();
    assert_eq!(names, ["Generator", "Discriminator"]);
    for module in modules {
        assert!(module.parameter_count() > 0);
    }
}

#[test]
fn generator_trains_through_apply_t() {
    let vs = nn::VarStore::new(Device::Cpu);
    let net = Generator::new(vs.root(), GeneratorConfig::new(3, 3, 1)).unwrap();
    let xs = Tensor::randn([1, 3, 4, 4], (Kind::Float, Device::Cpu));
    let loss = xs.apply_t(&net, true).square().mean(Kind::Float);
    loss.backward();
    let (_, stem) = net.named_parameters().remove(0);
    assert!(stem.grad().defined());
}
