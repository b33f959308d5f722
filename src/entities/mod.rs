
pub mod guest;
pub mod household;
