pub mod infer;
pub mod preprocess;
pub mod train;

#[cfg(not(feature = "ndarray"))]
pub type Backend = burn::backend::Wgpu<f32, i32>;

#[cfg(feature = "ndarray")]
pub type Backend = burn::backend::NdArray<f32>;
