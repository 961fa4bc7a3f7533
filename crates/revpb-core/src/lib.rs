//! # revpb-core
//!
//! A library for decoding Protocol Buffers wire data without the `.proto`
//! schema that produced it.
//!
//! This crate provides the core functionality for:
//! - Reading the wire primitives (varints, fixed-width values, length-delimited chunks)
//! - Decoding messages recursively, guessing what each length-delimited chunk holds
//! - Applying optional schema hints (field types, names, enums) where they exist
//! - Recording every failure as a diagnostic with a hex dump instead of aborting
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`wire`]: Byte cursor and wire format primitives
//! - [`value`]: The decoded tree (messages, fields, values)
//! - [`resolver`]: Mapping declared type names to decode routines
//! - [`hints`]: Optional schema hints, including a `prost-reflect` adapter
//! - [`decoder`]: The recursive decoder and guessing chain
//! - [`diagnostics`]: Diagnostics, the error log and hex dumps
//! - [`dump`]: Sinks for persisting `dump`-typed chunks
//! - [`render`]: Plain-text tree rendering
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use revpb_core::{render, Decoder};
//!
//! // 1: 150, 2: "Phone Book"
//! let data = b"\x08\x96\x01\x12\x0aPhone Book".to_vec();
//!
//! let mut decoder = Decoder::new();
//! let message = decoder.decode(data);
//!
//! assert_eq!(message.first(2).and_then(|v| v.as_str()), Some("Phone Book"));
//! println!("{}", render::render_message(&message, &Default::default()));
//! ```
//!
//! ## Extensibility
//!
//! The library provides several traits for customization:
//!
//! - [`TypeHints`]: Supply declared field types from any schema source
//! - [`DumpSink`]: Decide where `dump`-typed chunks are persisted
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decoder;
pub mod diagnostics;
pub mod dump;
pub mod error;
pub mod hints;
pub mod render;
pub mod resolver;
pub mod value;
pub mod wire;

// Re-export primary types for convenience
pub use decoder::{Decoder, DecoderConfig};
pub use diagnostics::{Diagnostic, ErrorLog, HexDump};
pub use dump::{DumpSink, MemoryDumpSink, NullDumpSink};
pub use error::{Error, Result};
pub use hints::{FieldHint, HintRegistry, NoHints, TypeHints};
pub use render::{MessageTree, RenderConfig};
pub use value::{ChunkKind, ChunkValue, Field, FieldDescriptor, Message, Projection, TypedData, Value};
pub use wire::WireType;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
