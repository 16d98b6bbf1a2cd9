mod blocks;
mod checkpoint;
mod shapes;
mod unet;

pub use blocks::{
    DoubleConv, DoubleConvConfig, Down, DownConfig, Up, UpConfig, align_spatial, split_padding,
};
pub use checkpoint::Checkpoint;
pub use shapes::{ParamShapes, ensure_same_shapes};
pub use unet::{UNet, UNetConfig, UNetRecord, UpsampleMode};
