pub mod check;
pub mod common;
pub mod lifecycle;
pub mod run;
pub mod sync;
