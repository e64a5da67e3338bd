//! Opening KML and KMZ sources from files, URLs and readers
//!
//! Servers mislabel KMZ as KML and the other way round, so a source is
//! treated as an archive when its media type or name says so, or when it
//! starts with the ZIP magic bytes. The first `.kml` entry of an archive is
//! the document; entries are inflated into memory since `zip` needs a
//! seekable reader.

use crate::error::{KmlError, Result};
use crate::options::ReaderOptions;
use crate::url_ref::unescape_path;
use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use url::Url;
use zip::ZipArchive;

/// Media type of KML documents
pub const MIME_TYPE_KML: &str = "application/vnd.google-earth.kml+xml";

/// Media type of KMZ archives
pub const MIME_TYPE_KMZ: &str = "application/vnd.google-earth.kmz";

/// `Accept` header sent with every fetch
pub const HTTP_ACCEPT: &str =
    "application/vnd.google-earth.kml+xml, application/vnd.google-earth.kmz, image/*, */*";

/// `User-Agent` sent with every fetch; some servers vary responses by client
pub const HTTP_USER_AGENT: &str = "GoogleEarth/5.2.1.1588(Windows;Microsoft Windows (5.1.2600.3);en-US;kml:2.2;client:Free;type:default)";

const ZIP_MAGIC: &[u8] = b"PK";

/// An opened KML byte stream
pub(crate) struct Opened {
    pub source: Box<dyn BufRead>,
    /// The document came out of a KMZ archive
    pub compressed: bool,
}

/// Open a `file:` or `http(s):` URL
pub(crate) fn open_url(url: &Url, options: &ReaderOptions) -> Result<Opened> {
    match url.scheme() {
        "file" => open_path(&file_path(url)?),
        "http" | "https" => {
            let response = get(url, options)?;
            let declared_kmz = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.starts_with(MIME_TYPE_KMZ))
                || has_kmz_extension(url.path());
            open_sniffed(BufReader::new(response), declared_kmz, url.as_str())
        }
        other => Err(KmlError::InvalidUri(format!(
            "unsupported scheme {other}: {url}"
        ))),
    }
}

/// Open a local `.kml` or `.kmz` file
pub(crate) fn open_path(path: &Path) -> Result<Opened> {
    let file = File::open(path)?;
    let declared_kmz = has_kmz_extension(&path.to_string_lossy());
    open_sniffed(
        BufReader::new(file),
        declared_kmz,
        &path.display().to_string(),
    )
}

/// Open an arbitrary byte stream, detecting archives by magic bytes only
pub(crate) fn open_reader<R: Read + 'static>(reader: R, label: &str) -> Result<Opened> {
    open_sniffed(BufReader::new(reader), false, label)
}

fn open_sniffed<R: Read + 'static>(
    mut reader: BufReader<R>,
    declared_kmz: bool,
    label: &str,
) -> Result<Opened> {
    let magic = reader.fill_buf()?.starts_with(ZIP_MAGIC);
    if !(magic || declared_kmz) {
        return Ok(Opened {
            source: Box::new(reader),
            compressed: false,
        });
    }

    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let entry = first_kml_entry(Cursor::new(bytes.as_slice()), label);
    match entry {
        Ok(kml) => Ok(Opened {
            source: Box::new(Cursor::new(kml)),
            compressed: true,
        }),
        Err(KmlError::Zip(e)) if !magic => {
            debug!("{label} is labelled KMZ but is not an archive ({e}), reading it as KML");
            Ok(Opened {
                source: Box::new(Cursor::new(bytes)),
                compressed: false,
            })
        }
        Err(e) => Err(e),
    }
}

/// Contents of the first `.kml` entry, in archive order, at any depth
fn first_kml_entry<R: Read + Seek>(reader: R, label: &str) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(reader)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(".kml") {
            continue;
        }
        debug!("Reading {} from {label}", entry.name());
        let mut kml = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut kml)?;
        return Ok(kml);
    }
    Err(KmlError::NoKmlInArchive(label.to_string()))
}

/// Open the entry `rel_path` of the archive at `archive_url`. Names are
/// compared with `%XX` escapes decoded on both sides, so `a%20b.kml`
/// finds an entry stored as `a b.kml` and the other way round.
pub(crate) fn open_archive_entry(
    archive_url: &Url,
    rel_path: &str,
    options: &ReaderOptions,
) -> Result<Box<dyn BufRead>> {
    let bytes = match archive_url.scheme() {
        "file" => find_entry(File::open(file_path(archive_url)?)?, archive_url, rel_path)?,
        "http" | "https" => {
            let body = get(archive_url, options)?.bytes()?;
            find_entry(Cursor::new(body), archive_url, rel_path)?
        }
        other => {
            return Err(KmlError::InvalidUri(format!(
                "unsupported scheme {other}: {archive_url}"
            )))
        }
    };
    Ok(Box::new(Cursor::new(bytes)))
}

fn find_entry<R: Read + Seek>(reader: R, archive_url: &Url, rel_path: &str) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(reader)?;
    let wanted = unescape_path(rel_path);
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || unescape_path(entry.name()) != wanted {
            continue;
        }
        let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut data)?;
        return Ok(data);
    }
    Err(KmlError::EntryNotFound {
        archive: archive_url.to_string(),
        path: rel_path.to_string(),
    })
}

fn get(url: &Url, options: &ReaderOptions) -> Result<Response> {
    let mut builder = Client::builder()
        .user_agent(HTTP_USER_AGENT)
        .timeout(options.http_timeout);
    if let Some(proxy) = &options.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
    }
    let client = builder.build()?;
    debug!("GET {url}");
    let response = client
        .get(url.clone())
        .header(ACCEPT, HTTP_ACCEPT)
        .send()?
        .error_for_status()?;
    Ok(response)
}

fn file_path(url: &Url) -> Result<PathBuf> {
    url.to_file_path()
        .map_err(|()| KmlError::InvalidUri(format!("not a local file URL: {url}")))
}

fn has_kmz_extension(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".kmz")
}
