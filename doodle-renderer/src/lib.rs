//! # Doodle Moji Renderer
//!
//! Turns stroke drawings into fixed-size classifier input.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Drawing                     │
//! ├─────────────────────────────────────────────┤
//! │  Fit to bounds   │  tiny-skia stroke paths  │
//! │  (keep aspect)   │  (round caps and joins)  │
//! ├─────────────────────────────────────────────┤
//! │  Composite over opaque background           │
//! ├─────────────────────────────────────────────┤
//! │  FeatureTensor (ink intensity, row-major)   │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod raster;
pub mod tensor;

pub use error::{RenderError, RenderResult};
pub use raster::{RasterConfig, Rasterizer, DEFAULT_INPUT_SIZE};
pub use tensor::FeatureTensor;
