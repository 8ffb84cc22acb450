//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `order`    | `Order`          |
//! | `validate` | `Validate`       |
//! | `run`      | `Run`            |

pub mod order;
pub mod run;
pub mod validate;

pub use order::cmd_order;
pub use run::cmd_run;
pub use validate::cmd_validate;
