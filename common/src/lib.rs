pub mod cards;
pub mod consent;
pub mod context;
pub mod preferences;
pub mod profile;
pub mod regions;

pub use cards::*;
pub use consent::*;
pub use context::*;
pub use preferences::*;
pub use profile::*;
pub use regions::*;
