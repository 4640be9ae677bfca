//! Error types for the protolith-core library.
//!
//! Every failure in the recovery pipeline is fatal for the whole run: nothing
//! here is meant to be recovered locally. The variants are grouped so that a
//! caller can still tell *why* a run failed (see [`Error::category`]).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protolith operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all protolith operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Path traversal attempt detected (security error)
    #[error("path traversal detected: '{path}' would escape output directory")]
    PathTraversal {
        /// The suspicious path
        path: PathBuf,
    },

    /// Output file exists and overwriting was not requested
    #[error("output file '{path}' already exists")]
    OutputExists {
        /// The existing file
        path: PathBuf,
    },

    /// The metadata dump could not be parsed
    #[error("failed to parse metadata dump: {0}")]
    MetadataParse(#[from] serde_json::Error),

    /// The manual packaging rule file could not be parsed
    #[error("failed to parse packaging rules: {0}")]
    PackagingRules(#[from] toml::de::Error),

    /// A type matched none of the known code generators
    #[error("unrecognized compiler output for type '{type_name}'")]
    UnrecognizedCompilerOutput {
        /// Qualified name of the type
        type_name: String,
    },

    /// The interpreter could not evaluate a method body
    #[error("corrupt or unsupported method body in '{method}' at IL_{offset:04x}: {details}")]
    CorruptMethodBody {
        /// Qualified method name
        method: String,
        /// Offset of the offending instruction
        offset: u32,
        /// What went wrong
        details: String,
    },

    /// A recovered wire tag is not a valid protobuf tag
    #[error("invalid wire tag {tag:#x}: {details}")]
    InvalidTag {
        /// Raw tag value
        tag: u64,
        /// What is wrong with it
        details: String,
    },

    /// Truncated or overlong varint
    #[error("failed to decode varint at position {position}")]
    VarintDecode {
        /// Position where decoding failed
        position: usize,
    },

    /// A structure the generator conventions promise is absent
    #[error("type '{type_name}' is missing expected structure: {details}")]
    MissingStructure {
        /// Qualified name of the inspected type
        type_name: String,
        /// What was expected
        details: String,
    },

    /// A property referenced by generated code does not exist
    #[error("type '{type_name}' has no property matching '{property}'")]
    PropertyNotFound {
        /// Qualified name of the inspected type
        type_name: String,
        /// Name that was looked up
        property: String,
    },

    /// An enum uses an underlying type the schema languages cannot express
    #[error("enum '{type_name}' has unsupported underlying type '{underlying}'")]
    UnsupportedEnumKind {
        /// Qualified name of the enum
        type_name: String,
        /// Declared underlying type
        underlying: String,
    },

    /// A declared type has no schema equivalent
    #[error("type '{type_name}' cannot be mapped to a schema type")]
    UnsupportedType {
        /// Qualified name of the declared type
        type_name: String,
    },

    /// A referenced type is not defined in the loaded assembly
    #[error("type '{referenced}' referenced from '{from}' is not defined in the assembly")]
    UnresolvedType {
        /// The referencing type
        from: String,
        /// The missing type
        referenced: String,
    },

    /// Namespaces reference each other and the cycle could not be broken
    #[error("unresolvable namespace cycle between [{}]", namespaces.join(", "))]
    NamespaceCycle {
        /// Namespaces taking part in the cycle
        namespaces: Vec<String>,
    },

    /// An IR invariant no longer holds
    #[error("IR invariant violated after {stage}: {details}")]
    InvariantViolation {
        /// Pipeline stage that produced the broken program
        stage: String,
        /// Description of the violated invariant
        details: String,
    },

    /// The generated descriptors were rejected by prost-reflect
    #[error("generated descriptors failed verification: {0}")]
    DescriptorVerify(String),

    /// Unknown protobuf syntax name
    #[error("unsupported proto syntax: {syntax}")]
    UnsupportedSyntax {
        /// The syntax string
        syntax: String,
    },

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`], used to pick an exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// No inspector recognised a type
    UnrecognizedOutput,
    /// The interpreter rejected a method body
    CorruptBody,
    /// Generator conventions were not met
    MissingStructure,
    /// Unsupported enum underlying type
    UnsupportedEnum,
    /// A pipeline pass failed
    Pipeline,
    /// I/O, parsing and everything else
    Other,
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new path traversal error
    pub fn path_traversal(path: impl Into<PathBuf>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Creates a new unrecognized compiler output error
    pub fn unrecognized(type_name: impl Into<String>) -> Self {
        Self::UnrecognizedCompilerOutput {
            type_name: type_name.into(),
        }
    }

    /// Creates a new corrupt method body error
    pub fn corrupt_body(method: impl Into<String>, offset: u32, details: impl Into<String>) -> Self {
        Self::CorruptMethodBody {
            method: method.into(),
            offset,
            details: details.into(),
        }
    }

    /// Creates a new invalid tag error
    pub fn invalid_tag(tag: u64, details: impl Into<String>) -> Self {
        Self::InvalidTag {
            tag,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(position: usize) -> Self {
        Self::VarintDecode { position }
    }

    /// Creates a new missing structure error
    pub fn missing_structure(type_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::MissingStructure {
            type_name: type_name.into(),
            details: details.into(),
        }
    }

    /// Creates a new property lookup error
    pub fn property_not_found(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            type_name: type_name.into(),
            property: property.into(),
        }
    }

    /// Creates a new invariant violation error
    pub fn invariant(stage: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvariantViolation {
            stage: stage.into(),
            details: details.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the coarse category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnrecognizedCompilerOutput { .. } => ErrorCategory::UnrecognizedOutput,
            Self::CorruptMethodBody { .. } | Self::InvalidTag { .. } => ErrorCategory::CorruptBody,
            Self::MissingStructure { .. }
            | Self::PropertyNotFound { .. }
            | Self::UnresolvedType { .. }
            | Self::UnsupportedType { .. } => ErrorCategory::MissingStructure,
            Self::UnsupportedEnumKind { .. } => ErrorCategory::UnsupportedEnum,
            Self::NamespaceCycle { .. } | Self::InvariantViolation { .. } => {
                ErrorCategory::Pipeline
            }
            _ => ErrorCategory::Other,
        }
    }
}
