//! Fixtures shared by unit tests.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Gzipped tarball holding `entries` as executable regular files.
pub fn tarball_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
  let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
  for (name, data) in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, name, *data).unwrap();
  }
  builder.into_inner().unwrap().finish().unwrap()
}

/// Write [`tarball_bytes`] to `path`.
pub fn write_tarball(path: &Path, entries: &[(&str, &[u8])]) {
  File::create(path).unwrap().write_all(&tarball_bytes(entries)).unwrap();
}
