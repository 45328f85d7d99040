mod diagnostics;
mod resolver;

pub use diagnostics::BinaryResolveDebugInfo;
pub use resolver::{executable_name, resolve_binary, resolve_binary_debug};
