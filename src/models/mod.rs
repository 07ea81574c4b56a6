pub mod lead;
pub mod call;
pub mod campaign;
pub mod prompt;
pub mod settings;
pub mod auth;

pub use lead::*;
pub use call::*;
pub use campaign::*;
pub use prompt::*;
pub use settings::*;
pub use auth::*;
