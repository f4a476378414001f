//! Miscellaneous common structs used throughout the library.

mod contact;
mod key;
pub mod messages;
mod value;

pub use contact::*;
pub use key::*;
pub use messages::*;
pub use value::*;
