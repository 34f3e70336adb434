//! Built-in classifier backends

mod builtin;
mod identity;
mod remote;
mod threshold;

pub use builtin::BuiltinClassifier;
pub use identity::IdentityClassifier;
pub use remote::{serve, RemoteClassifier};
pub use threshold::ThresholdClassifier;
