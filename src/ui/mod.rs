pub mod icons;
pub mod report;

pub use report::{render_order, render_outcome, render_warnings};
