pub mod attachment;
pub mod consult;
pub mod enums;
pub mod patient;

pub use attachment::*;
pub use consult::*;
pub use patient::*;
