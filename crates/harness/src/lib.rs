pub mod desk;

pub use desk::{TestDesk, row};
