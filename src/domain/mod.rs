pub mod forecast;
pub mod observation;

pub use forecast::*;
pub use observation::*;
