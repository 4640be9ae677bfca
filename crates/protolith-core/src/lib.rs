//! # protolith-core
//!
//! A library for recovering protocol buffer and flatbuffer schemas from
//! compiled .NET assemblies.
//!
//! Code generators for these formats leave a recognisable footprint in the
//! types they emit: marker interfaces, field number constants, static
//! naming tables and serialisation methods. This crate reads that footprint
//! back into a language-neutral program and renders it as `.proto` or
//! `.fbs` source.
//!
//! ## Architecture
//!
//! - [`metadata`]: read-only model of assembly types, loaded from JSON dumps
//! - [`cil`]: symbolic interpreter for CIL method bodies
//! - [`wire`]: protobuf wire-format tags and varints
//! - [`inspector`]: per-generator pattern matchers producing field lists
//! - [`decompiler`]: type closure and construction of the [`ir::Program`]
//! - [`transform`]: whole-program passes (case normalisation, packaging,
//!   cycle and collision resolution)
//! - [`emit`]: protobuf and flatbuffers emitters
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protolith_core::{Assembly, Decompiler, Pipeline, PipelineConfig, ProtoEmitter};
//! use protolith_core::emit::{emit_program, write_files};
//! use std::path::Path;
//!
//! let assembly = Assembly::from_path("Game.dll.json")?;
//! let program = Decompiler::new(&assembly).decompile()?;
//!
//! let config = PipelineConfig::new().resolve_circular_dependencies(true);
//! let program = Pipeline::from_config(&config).run(program)?;
//!
//! let files = emit_program(&program, &ProtoEmitter::new())?;
//! write_files(Path::new("out"), &files, false)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod cil;
pub mod decompiler;
pub mod emit;
pub mod error;
pub mod inspector;
pub mod ir;
pub mod metadata;
pub mod naming;
pub mod transform;
pub mod wire;

// Re-export primary types for convenience
pub use decompiler::{Decompiler, DecompilerConfig};
pub use emit::{EmittedFile, FlatbuffersEmitter, ProtoConfig, ProtoEmitter, ProtoSyntax, SchemaEmitter};
pub use error::{Error, ErrorCategory, Result};
pub use inspector::Framework;
pub use ir::Program;
pub use metadata::Assembly;
pub use transform::{PackagingRules, Pass, Pipeline, PipelineConfig};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
