//! CLI command implementations.
//!
//! | Module        | Commands handled |
//! |---------------|------------------|
//! | `compose`     | `Compose`        |
//! | `instruments` | `Instruments`    |
//! | `checkpoints` | `Checkpoints`    |
//! | `config`      | `Config`         |

pub mod checkpoints;
pub mod compose;
pub mod config;
pub mod instruments;

pub use checkpoints::cmd_checkpoints;
pub use compose::cmd_compose;
pub use config::cmd_config;
pub use instruments::cmd_instruments;
