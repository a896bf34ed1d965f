//! # Lyssna Action Registry
//!
//! Catalog of the game's remote actions (`hero.hireHero`, `castle.getCastleInfo`,
//! ...). The capture client uses it to name packets that only carry a numeric
//! command id, and the engine uses it to check outbound requests.
//!
//! Sources are JSON or YAML documents keyed by action name:
//!
//! ```yaml
//! hero.hireHero:
//!   command_id: 1001
//!   parameters:
//!     - { name: castleId, type: int, required: true }
//!     - { name: heroName, type: string, required: true }
//! ```
//!
//! [`ActionRegistry::load`] never fails; a missing or malformed source yields
//! the built-in catalog.

mod builtin;
pub mod definition;
pub mod error;
pub mod registry;

pub use definition::{category_of, ActionDefinition, ParamDefinition, ParamType};
pub use error::{LoadError, ParamError};
pub use registry::ActionRegistry;
