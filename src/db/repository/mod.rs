pub mod artifact;
pub mod attachment;
pub mod consult;
pub mod note;
pub mod patient;
