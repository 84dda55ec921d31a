//! The eVM interpreter: state, dispatch loop, and the builtin dispatch
//! table it calls out to.

pub mod builtin;
mod core;

pub use builtin::{Builtin, BuiltinTable};
pub use core::{Flags, Vm, VmError};
