// src/packages/builder.rs

//! HAP container writer
//!
//! Produces packages in the layout the extractor reads. Used to build
//! fixtures, including deliberately broken ones (custom magic, raw bytes).

use crate::packages::extractor::PROFILE_NAME;
use crate::packages::reader::{MAGIC_LEN, MAGIC_VALUE};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};
use std::path::Path;

/// A single file inside the container
#[derive(Debug, Clone)]
pub struct HapEntry {
    pub relative_path: String,
    pub name: String,
    pub data: Vec<u8>,
}

/// Builder for HAP containers
#[derive(Debug, Clone)]
pub struct HapBuilder {
    bundle_name: String,
    magic: [u8; MAGIC_LEN],
    entries: Vec<HapEntry>,
}

impl HapBuilder {
    pub fn new(bundle_name: impl Into<String>) -> Self {
        let mut magic = [0u8; MAGIC_LEN];
        magic[MAGIC_LEN - 1] = MAGIC_VALUE;
        Self {
            bundle_name: bundle_name.into(),
            magic,
            entries: Vec::new(),
        }
    }

    /// Override the magic prefix
    pub fn magic(mut self, magic: [u8; MAGIC_LEN]) -> Self {
        self.magic = magic;
        self
    }

    /// Add a file at `relative_path/name` (empty path = archive root)
    pub fn entry(
        mut self,
        relative_path: impl Into<String>,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.entries.push(HapEntry {
            relative_path: relative_path.into(),
            name: name.into(),
            data: data.into(),
        });
        self
    }

    /// Add the profile entry at the archive root
    pub fn profile(self, json: impl Into<Vec<u8>>) -> Self {
        self.entry("", PROFILE_NAME, json)
    }

    pub fn entries(&self) -> &[HapEntry] {
        &self.entries
    }

    /// Serialize the container
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write(&mut out);
        out
    }

    /// Serialize the container into `out`
    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.magic)?;
        write_str(out, &self.bundle_name)?;

        for entry in &self.entries {
            write_str(out, &entry.name)?;
            write_str(out, &entry.relative_path)?;
            out.write_u64::<BigEndian>(entry.data.len() as u64)?;
            out.write_all(&entry.data)?;
        }
        Ok(())
    }

    /// Write the container to a file
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }
}

fn write_str<W: Write>(out: &mut W, value: &str) -> io::Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string too long"))?;
    out.write_u32::<BigEndian>(len)?;
    out.write_all(value.as_bytes())
}
