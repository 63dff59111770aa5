//! Metadata and icon extraction for console ROM and executable containers.
//!
//! Supported formats are Xbox executables (XBE), Xbox 360 executables (XEX2)
//! and their resource tables (XDBF), Nintendo 3DS files (SMDH, 3DSX, CIA,
//! CCI and NAND dumps) and Atari 8-bit SAP music files.
//!
//! The usual entry point is [`rom::open`], which sniffs the format of a
//! [`Source`] and returns a reader implementing [`RomData`]. Readers load
//! everything lazily: the field model, metadata and images are decoded on
//! first request and cached afterwards.
//!
//! ```no_run
//! use romprops::{rom, FileSource, Options};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), romprops::Error> {
//! let source = Arc::new(FileSource::open("game.xex")?);
//! let mut reader = rom::open(source, Some(".xex"), &Options::default())?;
//! println!("{}", reader.fields()?);
//! # Ok(())
//! # }
//! ```
//!
//! [`rom::open`]: rom/fn.open.html
//! [`Source`]: source/trait.Source.html
//! [`RomData`]: rom/trait.RomData.html

#![warn(missing_debug_implementations)]
#![forbid(unsafe_code)]
#![cfg_attr(feature = "cargo-clippy", allow(unreadable_literal, large_digit_groups))]

#[macro_use] extern crate bitflags;
#[macro_use] extern crate log;
#[macro_use] extern crate serde_derive;

pub mod crypto;
pub mod detect;
mod error;
pub mod fields;
pub mod image;
pub mod lazy;
pub mod metadata;
pub mod n3ds;
pub mod options;
pub mod pe;
pub mod raw;
pub mod rom;
pub mod sap;
pub mod source;
mod utils;
pub mod xbe;
pub mod xdbf;
pub mod xex;

pub use crate::error::{Error, Failure};
pub use crate::fields::Fields;
pub use crate::image::{DecodedImage, ImageType};
pub use crate::metadata::MetaData;
pub use crate::options::Options;
pub use crate::rom::RomData;
pub use crate::source::{FileSource, MemSource, Source};
