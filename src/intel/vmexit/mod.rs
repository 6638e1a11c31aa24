pub mod breakpoint;
pub mod ept_violation;
pub mod mtf;
