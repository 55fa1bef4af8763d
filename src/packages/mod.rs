// src/packages/mod.rs

//! HAP package format support
//!
//! A HAP is a flat, big-endian container: a magic prefix, the bundle name,
//! then length-prefixed file entries. This module provides the bounds-checked
//! reader, the extractor used by the installer, the profile parser and a
//! writer for building packages.

pub mod builder;
pub mod extractor;
pub mod profile;
pub mod reader;

pub use builder::HapBuilder;
pub use extractor::{extract_bundle_param, extract_hap, extract_hap_profile, PROFILE_NAME};
pub use profile::{parse_profile, ParsedProfile};
pub use reader::{HapReader, ParseError};
