use burn::{backend::NdArray, prelude::*, tensor::Distribution};
use cloud_unet::{UNetConfig, UNetError, UpsampleMode};

type TestBackend = NdArray<f32>;

fn small(input_channels: usize, num_classes: usize, upsampling: UpsampleMode) -> UNetConfig {
    UNetConfig::new(input_channels, num_classes)
        .with_upsampling(upsampling)
        .with_base_channels(4)
}

fn random_input(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
    Tensor::random(shape, Distribution::Uniform(0.0, 1.0), &Default::default())
}

#[test]
fn output_matches_input_size_when_divisible_by_16() {
    let device = Default::default();

    for upsampling in [UpsampleMode::TransposedConv, UpsampleMode::Bilinear] {
        for (input_channels, num_classes) in [(1, 1), (3, 1), (3, 4)] {
            let model = small(input_channels, num_classes, upsampling.clone())
                .init::<TestBackend>(&device)
                .unwrap();

            for [height, width] in [[16, 16], [32, 48]] {
                let output = model
                    .forward(random_input([2, input_channels, height, width]))
                    .unwrap();
                assert_eq!(output.dims(), [2, num_classes, height, width]);
            }
        }
    }
}

#[test]
fn single_class_output_is_a_probability() {
    let model = small(3, 1, UpsampleMode::TransposedConv)
        .init::<TestBackend>(&Default::default())
        .unwrap();

    let output = model.forward(random_input([1, 3, 32, 32]).mul_scalar(50.0)).unwrap();

    assert!(output.clone().min().into_scalar() >= 0.0);
    assert!(output.max().into_scalar() <= 1.0);
}

#[test]
fn multi_class_output_sums_to_one_per_pixel() {
    let model = small(1, 5, UpsampleMode::Bilinear)
        .init::<TestBackend>(&Default::default())
        .unwrap();

    let output = model.forward(random_input([1, 1, 32, 16])).unwrap();

    let sums = output.sum_dim(1).into_data().to_vec::<f32>().unwrap();
    assert_eq!(sums.len(), 32 * 16);
    assert!(sums.iter().all(|sum| (sum - 1.0).abs() < 1e-5));
}

#[test]
fn decoder_alignment_restores_odd_sizes() {
    let device = Default::default();

    for upsampling in [UpsampleMode::TransposedConv, UpsampleMode::Bilinear] {
        let model = small(1, 2, upsampling).init::<TestBackend>(&device).unwrap();

        for [height, width] in [[250, 250], [17, 33], [31, 20]] {
            let output = model.forward(random_input([1, 1, height, width])).unwrap();
            assert_eq!(output.dims(), [1, 2, height, width]);
        }
    }
}

#[test]
fn inference_is_deterministic() {
    let model = small(3, 3, UpsampleMode::TransposedConv)
        .init::<TestBackend>(&Default::default())
        .unwrap();
    let input = random_input([1, 3, 48, 40]);

    let first = model.forward(input.clone()).unwrap().into_data();
    let second = model.forward(input).unwrap().into_data();

    first.assert_eq(&second, true);
}

#[test]
fn zero_channel_counts_are_rejected() {
    let device = Default::default();

    let result = UNetConfig::new(0, 1).init::<TestBackend>(&device);
    assert!(matches!(result, Err(UNetError::InvalidConfiguration(_))));

    let result = UNetConfig::new(3, 0).init::<TestBackend>(&device);
    assert!(matches!(result, Err(UNetError::InvalidConfiguration(_))));
}

#[test]
fn wrong_input_channels_are_a_shape_mismatch() {
    let model = small(3, 1, UpsampleMode::TransposedConv)
        .init::<TestBackend>(&Default::default())
        .unwrap();

    let result = model.forward(random_input([1, 1, 16, 16]));

    match result {
        Err(UNetError::ShapeMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, "3");
            assert_eq!(actual, "1");
        }
        other => panic!("expected a shape mismatch, got {:?}", other.map(|t| t.dims())),
    }
}

#[test]
fn zero_image_end_to_end() {
    let device = Default::default();
    let zeros = Tensor::<TestBackend, 3>::zeros([1, 256, 256], &device);

    let model = small(1, 1, UpsampleMode::TransposedConv)
        .init::<TestBackend>(&device)
        .unwrap();
    let output = model.predict(zeros.clone()).unwrap();
    assert_eq!(output.dims(), [1, 256, 256]);
    assert!(output.clone().min().into_scalar() >= 0.0);
    assert!(output.max().into_scalar() <= 1.0);

    // Without transposed convolution biases only the output bias survives a zero
    // input, so every pixel carries the same probability.
    let model = small(1, 1, UpsampleMode::Bilinear)
        .init::<TestBackend>(&device)
        .unwrap();
    let output = model.predict(zeros).unwrap();
    let min = output.clone().min().into_scalar();
    let max = output.max().into_scalar();
    assert!((max - min).abs() < 1e-6);
}
