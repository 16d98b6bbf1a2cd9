use burn::{backend::NdArray, prelude::*, tensor::Distribution};
use cloud_unet::{Checkpoint, UNetConfig, UNetError, UpsampleMode};

type TestBackend = NdArray<f32>;

fn config() -> UNetConfig {
    UNetConfig::new(3, 2).with_base_channels(4)
}

#[test]
fn restored_network_reproduces_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let model = config().init::<TestBackend>(&device).unwrap();
    let input =
        Tensor::<TestBackend, 4>::random([1, 3, 24, 24], Distribution::Default, &device);

    let checkpoint = Checkpoint::new(dir.path().join("unet_final"));
    checkpoint.save(&config(), &model).unwrap();
    assert!(checkpoint.exists());

    let (stored, restored) = checkpoint.load::<TestBackend>(&device).unwrap();
    assert_eq!(stored, config());

    let expected = model.forward(input.clone()).unwrap().into_data();
    let actual = restored.forward(input).unwrap().into_data();
    expected.assert_approx_eq(&actual, 5);
}

#[test]
fn restore_rejects_other_architectures() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let model = config().init::<TestBackend>(&device).unwrap();

    let checkpoint = Checkpoint::new(dir.path());
    checkpoint.save(&config(), &model).unwrap();

    for other in [
        UNetConfig::new(1, 2).with_base_channels(4),
        UNetConfig::new(3, 1).with_base_channels(4),
        config().with_upsampling(UpsampleMode::Bilinear),
    ] {
        let result = checkpoint.restore::<TestBackend>(&other, &device);
        assert!(matches!(result, Err(UNetError::ShapeMismatch { .. })));
    }

    assert!(checkpoint.restore::<TestBackend>(&config(), &device).is_ok());
}

#[test]
fn weights_with_other_shapes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let path = dir.path().join("weights");

    config()
        .init::<TestBackend>(&device)
        .unwrap()
        .save_weights(&path)
        .unwrap();

    let result = UNetConfig::new(1, 2)
        .with_base_channels(4)
        .init::<TestBackend>(&device)
        .unwrap()
        .load_weights(&path, &device);

    match result {
        Err(UNetError::ShapeMismatch { context, .. }) => assert!(context.contains("inc")),
        other => panic!("expected a shape mismatch, got ok = {}", other.is_ok()),
    }
}

#[test]
fn missing_checkpoint_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    let checkpoint = Checkpoint::new(dir.path().join("absent"));

    assert!(!checkpoint.exists());
    assert!(checkpoint.load::<TestBackend>(&Default::default()).is_err());
}

fn assert_rejected(saved: UNetConfig, target: UNetConfig, param: &str) {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let path = dir.path().join("weights");

    saved
        .init::<TestBackend>(&device)
        .unwrap()
        .save_weights(&path)
        .unwrap();

    let result = target
        .init::<TestBackend>(&device)
        .unwrap()
        .load_weights(&path, &device);

    match result {
        Err(UNetError::ShapeMismatch { context, .. }) => assert!(
            context.contains(param),
            "mismatch reported on {context}, expected {param}"
        ),
        other => panic!("expected a shape mismatch, got ok = {}", other.is_ok()),
    }
}

#[test]
fn biased_weights_are_rejected_by_a_bias_free_network() {
    assert_rejected(config(), config().with_output_bias(false), "outc.bias");
}

#[test]
fn bias_free_weights_are_rejected_by_a_biased_network() {
    assert_rejected(config().with_output_bias(false), config(), "outc.bias");
}

#[test]
fn decoder_kinds_are_not_interchangeable() {
    let bilinear = config().with_upsampling(UpsampleMode::Bilinear);

    assert_rejected(bilinear.clone(), config(), "down4");
    assert_rejected(config(), bilinear, "down4");
}

#[test]
fn load_weights_accepts_matching_records() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let path = dir.path().join("weights");
    let bias_free = config().with_output_bias(false);
    let model = bias_free.init::<TestBackend>(&device).unwrap();
    model.save_weights(&path).unwrap();

    let restored = bias_free
        .init::<TestBackend>(&device)
        .unwrap()
        .load_weights(&path, &device)
        .unwrap();

    assert_eq!(restored.param_shapes(), model.param_shapes());
}
