//! Abstract interpretation of CIL method bodies.
//!
//! - [`opcode`]: mnemonic parsing into stack-effect classes
//! - [`walker`]: the single-pass interpreter yielding call/store events

pub mod opcode;
pub mod walker;

pub use opcode::OpCode;
pub use walker::{CallInfo, Event, MethodWalker, StoreInfo, Value};
