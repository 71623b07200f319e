pub use error::Error;
pub type Result<T = ()> = std::result::Result<T, Error>;

pub mod color;
pub mod colormap;
pub mod duration;
mod error;
pub mod feedback;
pub mod fs;
pub mod legend;

#[doc(inline)]
pub use color::Color;
#[doc(inline)]
pub use colormap::ColorMap;
#[doc(inline)]
pub use feedback::Feedback;
#[doc(inline)]
pub use legend::Legend;
