//! Transfer encodings: gzip and pack200-gzip.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use url::Url;

use crate::http::ResponseMeta;

/// How a transferred body must be decoded before it is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
    Pack200Gzip,
}

impl Encoding {
    /// `Content-Encoding` wins; otherwise the negotiated URL's suffix decides.
    pub fn detect(meta: &ResponseMeta, url: &Url) -> Encoding {
        match meta.content_encoding.as_deref() {
            Some("pack200-gzip") => return Encoding::Pack200Gzip,
            Some("gzip") | Some("x-gzip") => return Encoding::Gzip,
            _ => {}
        }
        let path = url.path();
        if path.ends_with(".pack.gz") {
            Encoding::Pack200Gzip
        } else if path.ends_with(".gz") {
            Encoding::Gzip
        } else {
            Encoding::Identity
        }
    }
}

/// Turns a pack200 archive into a jar.
pub trait Unpacker: Send + Sync + fmt::Debug {
    fn unpack(&self, pack: &Path, jar_out: &Path) -> Result<()>;
}

/// Runs an external `unpack200 <pack> <jar>` program.
#[derive(Debug, Clone)]
pub struct ExternalUnpack200 {
    program: PathBuf,
}

impl ExternalUnpack200 {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Unpacker for ExternalUnpack200 {
    fn unpack(&self, pack: &Path, jar_out: &Path) -> Result<()> {
        let status = Command::new(&self.program)
            .arg(pack)
            .arg(jar_out)
            .status()
            .with_context(|| format!("run {}", self.program.display()))?;
        if !status.success() {
            bail!("{} exited with {}", self.program.display(), status);
        }
        Ok(())
    }
}

/// Decompresses `src` into `dst`; returns the decoded length.
pub fn gunzip_file(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(src)?));
    let mut out = BufWriter::new(File::create(dst)?);
    let n = io::copy(&mut decoder, &mut out)?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(n)
}

/// Decodes the raw transfer at `raw` into `out`. `raw` is left in place.
pub fn decode(
    encoding: Encoding,
    raw: &Path,
    out: &Path,
    unpacker: Option<&dyn Unpacker>,
) -> Result<()> {
    match encoding {
        Encoding::Identity => {
            std::fs::copy(raw, out).with_context(|| format!("copy {}", raw.display()))?;
        }
        Encoding::Gzip => {
            gunzip_file(raw, out).with_context(|| format!("gunzip {}", raw.display()))?;
        }
        Encoding::Pack200Gzip => {
            let Some(unpacker) = unpacker else {
                bail!("pack200 body received but no unpacker is configured");
            };
            let pack = raw.with_extension("pack");
            gunzip_file(raw, &pack).with_context(|| format!("gunzip {}", raw.display()))?;
            let result = unpacker.unpack(&pack, out);
            let _ = std::fs::remove_file(&pack);
            result?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn meta(enc: Option<&str>) -> ResponseMeta {
        ResponseMeta {
            status: 200,
            content_encoding: enc.map(str::to_string),
            ..ResponseMeta::default()
        }
    }

    #[test]
    fn detect_prefers_header_then_suffix() {
        let plain = Url::parse("http://h/a.jar").unwrap();
        let packed = Url::parse("http://h/a.jar.pack.gz").unwrap();
        let gz = Url::parse("http://h/a.jar.gz").unwrap();
        assert_eq!(Encoding::detect(&meta(None), &plain), Encoding::Identity);
        assert_eq!(Encoding::detect(&meta(Some("gzip")), &plain), Encoding::Gzip);
        assert_eq!(
            Encoding::detect(&meta(Some("pack200-gzip")), &plain),
            Encoding::Pack200Gzip
        );
        assert_eq!(Encoding::detect(&meta(None), &packed), Encoding::Pack200Gzip);
        assert_eq!(Encoding::detect(&meta(None), &gz), Encoding::Gzip);
    }

    #[test]
    fn gzip_decodes_into_output() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("body.raw");
        let out = dir.path().join("body");
        let mut enc = GzEncoder::new(File::create(&raw).unwrap(), Compression::default());
        enc.write_all(b"hello jar").unwrap();
        enc.finish().unwrap();
        decode(Encoding::Gzip, &raw, &out, None).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"hello jar");
    }

    #[test]
    fn pack200_without_unpacker_fails() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("body.raw");
        std::fs::write(&raw, b"x").unwrap();
        let err = decode(Encoding::Pack200Gzip, &raw, &dir.path().join("o"), None).unwrap_err();
        assert!(err.to_string().contains("unpacker"));
    }
}
