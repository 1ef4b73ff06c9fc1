use serde::{Deserialize, Serialize};
use std::fmt;

use crate::unit::CompUnit;

/// The ways a compilation unit can be identified.
/// Anonymous units can be checked but not included from other units.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ModuleDescriptor {
    Anonymous,

    /// An inclusion chain like foo.bar.baz. The last part is the unit name,
    /// the leading parts are its package.
    Name(Vec<String>),
}

impl ModuleDescriptor {
    /// Create a Name descriptor by splitting a dotted string.
    pub fn name(s: &str) -> ModuleDescriptor {
        ModuleDescriptor::Name(s.split('.').map(|part| part.to_string()).collect())
    }

    /// The package part of the descriptor: every part but the last.
    pub fn package(&self) -> &[String] {
        match self {
            ModuleDescriptor::Anonymous => &[],
            ModuleDescriptor::Name(parts) => {
                if parts.is_empty() {
                    &[]
                } else {
                    &parts[..parts.len() - 1]
                }
            }
        }
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModuleDescriptor::Anonymous => write!(f, "<anonymous>"),
            ModuleDescriptor::Name(parts) => write!(f, "{}", parts.join(".")),
        }
    }
}

/// Errors specific to resolving included modules.
/// Each string is a human-readable message.
#[derive(Debug)]
pub enum ImportError {
    /// No unit exists for the descriptor.
    NotFound(String),

    /// The inclusion chain loops back on itself.
    Circular(ModuleDescriptor),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImportError::NotFound(message) => write!(f, "{}", message),
            ImportError::Circular(descriptor) => {
                write!(f, "circular inclusion of module {}", descriptor)
            }
        }
    }
}

impl From<ImportError> for String {
    fn from(error: ImportError) -> Self {
        error.to_string()
    }
}

/// The module-resolution capability the core consumes. Implemented outside
/// the core; the checking passes only ever call these two methods.
pub trait ModuleResolver {
    /// Look up an included unit by descriptor. The returned unit has already
    /// been processed by its own session; its reports never land in the
    /// caller's sink.
    fn resolve(&mut self, descriptor: &ModuleDescriptor) -> Result<CompUnit, ImportError>;

    /// Tell the resolver which package relative inclusions resolve in.
    fn set_current_package(&mut self, package: &[String]);
}
