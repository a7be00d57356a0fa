pub mod color;
pub mod morphology;
pub mod segmentation;
pub mod vectorize;

pub use color::*;
pub use morphology::*;
pub use segmentation::*;
pub use vectorize::*;
