//! Turns whatever the caller submitted into an inspectable file on disk.
//! Files that are already materialized pass through untouched; Base64 text
//! is decoded into a transient file that lives exactly as long as the
//! returned `Resource`.

use crate::config::Settings;
use crate::error::Result;
use crate::probe::{self, SNIFF_LEN};
use base64::{
    alphabet,
    engine::{self, general_purpose},
    Engine as _,
};
use once_cell::unsync::OnceCell;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Standard alphabet, padding optional, non-canonical trailing bits accepted
const LENIENT: engine::GeneralPurpose = engine::GeneralPurpose::new(
    &alphabet::STANDARD,
    general_purpose::GeneralPurposeConfig::new()
        .with_decode_padding_mode(engine::DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// A submitted value, as handed over by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputValue<'a> {
    /// The attribute was missing or null
    Absent,

    /// An upload the host already saved to disk
    File(&'a Path),

    /// Base64 text, optionally with a `data:<mime>;base64,` prefix
    Text(&'a str),
}

impl InputValue<'_> {
    /// Empty values are valid for every rule; presence is checked elsewhere
    pub fn is_empty(&self) -> bool {
        matches!(self, InputValue::Absent | InputValue::Text(""))
    }
}

impl<'a> From<&'a str> for InputValue<'a> {
    fn from(text: &'a str) -> Self {
        InputValue::Text(text)
    }
}

impl<'a> From<&'a String> for InputValue<'a> {
    fn from(text: &'a String) -> Self {
        InputValue::Text(text)
    }
}

impl<'a> From<Option<&'a str>> for InputValue<'a> {
    fn from(text: Option<&'a str>) -> Self {
        text.map_or(InputValue::Absent, InputValue::Text)
    }
}

impl<'a> From<&'a Path> for InputValue<'a> {
    fn from(path: &'a Path) -> Self {
        InputValue::File(path)
    }
}

impl<'a> From<&'a PathBuf> for InputValue<'a> {
    fn from(path: &'a PathBuf) -> Self {
        InputValue::File(path)
    }
}

#[derive(Debug)]
enum Storage<'a> {
    Materialized(&'a Path),
    Transient(NamedTempFile),
}

/// A file that rules can inspect. Transient files are deleted on drop.
#[derive(Debug)]
pub struct Resource<'a> {
    storage: Storage<'a>,
    content_type: OnceCell<&'static str>,
}

impl<'a> Resource<'a> {
    fn new(storage: Storage<'a>) -> Self {
        Resource {
            storage,
            content_type: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        match &self.storage {
            Storage::Materialized(path) => *path,
            Storage::Transient(file) => file.path(),
        }
    }

    /// Whether this resource owns a transient file created by the resolver
    pub fn is_transient(&self) -> bool {
        matches!(self.storage, Storage::Transient(_))
    }

    /// Size in bytes, read from the file system. Unreadable files count as
    /// empty.
    pub fn len(&self) -> u64 {
        fs::metadata(self.path()).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn open(&self) -> io::Result<fs::File> {
        fs::File::open(self.path())
    }

    /// A regular file that can be opened for reading
    pub fn is_readable_file(&self) -> bool {
        let is_file = fs::metadata(self.path()).map(|m| m.is_file()).unwrap_or(false);
        is_file && self.open().is_ok()
    }

    /// Content type sniffed from the first bytes; computed once
    pub fn content_type(&self) -> &'static str {
        self.content_type.get_or_init(|| match self.head() {
            Ok(head) => probe::sniff(&head),
            Err(e) => {
                debug!("cannot read {}: {e}", self.path().display());
                probe::EMPTY
            }
        })
    }

    /// Extension guessed from the content type
    pub fn extension(&self) -> Option<&'static str> {
        probe::extension_for(self.content_type())
    }

    /// Delete the transient file now instead of on drop
    pub fn release(self) -> io::Result<()> {
        match self.storage {
            Storage::Materialized(_) => Ok(()),
            Storage::Transient(file) => file.close(),
        }
    }

    fn head(&self) -> io::Result<Vec<u8>> {
        let mut head = Vec::with_capacity(SNIFF_LEN);
        self.open()?.take(SNIFF_LEN as u64).read_to_end(&mut head)?;
        Ok(head)
    }
}

/// Resolves submitted values into `Resource`s
#[derive(Debug, Clone)]
pub struct PayloadResolver {
    temp_dir: Option<PathBuf>,
    temp_prefix: String,
}

impl Default for PayloadResolver {
    fn default() -> Self {
        PayloadResolver::new(&Settings::default())
    }
}

impl PayloadResolver {
    pub fn new(settings: &Settings) -> Self {
        PayloadResolver {
            temp_dir: settings.temp_dir.clone(),
            temp_prefix: settings.temp_prefix.clone(),
        }
    }

    /// Produce an inspectable resource. Undecodable text yields an empty
    /// resource rather than an error; only storage faults are reported.
    pub fn resolve<'a>(&self, value: InputValue<'a>) -> Result<Resource<'a>> {
        match value {
            InputValue::File(path) => Ok(Resource::new(Storage::Materialized(path))),
            InputValue::Absent => self.materialize(&[]),
            InputValue::Text(text) => self.materialize(&decode_lenient(strip_data_uri(text))),
        }
    }

    fn materialize<'a>(&self, bytes: &[u8]) -> Result<Resource<'a>> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.temp_prefix);
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(bytes)?;
        file.flush()?;

        debug!(
            "materialized {} decoded bytes at {}",
            bytes.len(),
            file.path().display()
        );
        Ok(Resource::new(Storage::Transient(file)))
    }
}

/// Drop a `data:<mime>[;param];base64,` prefix. Everything after the first
/// `;` is split on `,` and the part after the last comma is the payload.
pub fn strip_data_uri(text: &str) -> &str {
    if !text.contains(";base64") {
        return text;
    }
    text.split_once(';')
        .and_then(|(_, rest)| rest.rsplit_once(','))
        .map_or("", |(_, payload)| payload)
}

/// Permissive Base64 decoding.
///
/// Characters outside the standard alphabet (whitespace, `=`, url-safe
/// symbols, garbage) are skipped, padding is optional and a dangling final
/// symbol is dropped. Whatever still fails to decode becomes an empty byte
/// sequence. Garbage is left for the size and type rules to reject.
pub fn decode_lenient(payload: &str) -> Vec<u8> {
    let mut symbols: Vec<u8> = payload
        .bytes()
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
        .collect();

    if symbols.len() % 4 == 1 {
        symbols.pop();
    }

    LENIENT.decode(&symbols).unwrap_or_else(|_| Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn test_round_trip_lengths() {
        let bytes = test::png(7, 3);
        let encoded = STANDARD.encode(&bytes);
        let resolver = PayloadResolver::default();

        for prefix in ["", "data:image/png;base64,", "data:application/pdf;base64,"] {
            let payload = format!("{prefix}{encoded}");
            let resource = resolver.resolve(payload.as_str().into()).unwrap();
            assert_eq!(resource.len(), bytes.len() as u64, "prefix {prefix:?}");
            assert_eq!(fs::read(resource.path()).unwrap(), bytes);
        }
    }

    #[test]
    fn test_independent_resources() {
        let payload = test::encode(&test::png(10, 10));
        let resolver = PayloadResolver::default();

        let first = resolver.resolve(payload.as_str().into()).unwrap();
        let second = resolver.resolve(payload.as_str().into()).unwrap();
        assert_ne!(first.path(), second.path());
        assert_eq!(first.len(), second.len());
        assert_eq!(first.content_type(), second.content_type());

        let first_path = first.path().to_path_buf();
        first.release().unwrap();
        assert!(!first_path.exists());
        assert!(second.path().exists());
    }

    #[test]
    fn test_transient_file_removed_on_drop() {
        let resolver = PayloadResolver::default();
        let path = {
            let resource = resolver.resolve("aGVsbG8=".into()).unwrap();
            assert!(resource.is_transient());
            assert!(resource.path().exists());
            resource.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_materialized_file_passes_through() {
        let file = test::file_with(b"plain bytes");
        let resource = PayloadResolver::default()
            .resolve(InputValue::File(file.path()))
            .unwrap();

        assert!(!resource.is_transient());
        assert_eq!(resource.path(), file.path());
        assert_eq!(resource.len(), 11);

        resource.release().unwrap();
        assert!(file.path().exists());
    }

    #[test]
    fn test_settings_control_location() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            temp_dir: Some(dir.path().to_path_buf()),
            temp_prefix: "upload-".into(),
            ..Settings::default()
        };

        let resource = PayloadResolver::new(&settings)
            .resolve("aGVsbG8=".into())
            .unwrap();
        assert_eq!(resource.path().parent(), Some(dir.path()));
        let name = resource.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("upload-"));
    }

    #[test]
    fn test_storage_fault_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            temp_dir: Some(dir.path().join("missing")),
            ..Settings::default()
        };

        let result = PayloadResolver::new(&settings).resolve("aGVsbG8=".into());
        assert!(matches!(result, Err(crate::error::RuleError::Storage(_))));
    }

    #[test]
    fn test_strip_data_uri() {
        assert_eq!(strip_data_uri("aGVsbG8="), "aGVsbG8=");
        assert_eq!(strip_data_uri("data:image/png;base64,aGVsbG8="), "aGVsbG8=");
        assert_eq!(
            strip_data_uri("data:image/svg+xml;charset=utf-8;base64,aGVsbG8="),
            "aGVsbG8="
        );
        // a marker without a payload separator leaves nothing to decode
        assert_eq!(strip_data_uri("data:image/png;base64"), "");
        // a semicolon alone is not a data-URI marker
        assert_eq!(strip_data_uri("a;b,c"), "a;b,c");
    }

    #[test]
    fn test_lenient_decoding() {
        assert_eq!(decode_lenient("aGVsbG8="), b"hello");
        assert_eq!(decode_lenient("aGVsbG8"), b"hello");
        assert_eq!(decode_lenient("aGVs\r\nbG8=\n"), b"hello");
        assert_eq!(decode_lenient("aGV*sbG8!"), b"hello");
        // dangling symbol
        assert_eq!(decode_lenient("aGVsbG8gd"), b"hello ");
        assert!(decode_lenient("!!!").is_empty());
        assert!(decode_lenient("").is_empty());
    }

    #[test]
    fn test_garbage_resolves_to_empty_resource() {
        let resource = PayloadResolver::default().resolve("%%%%".into()).unwrap();
        assert!(resource.is_empty());
        assert_eq!(resource.content_type(), probe::EMPTY);
        assert!(resource.is_readable_file());
    }

    #[test]
    fn test_input_emptiness() {
        assert!(InputValue::Absent.is_empty());
        assert!(InputValue::from("").is_empty());
        assert!(InputValue::from(None::<&str>).is_empty());
        assert!(!InputValue::from("aGVsbG8=").is_empty());
        assert!(!InputValue::File(Path::new("upload.png")).is_empty());
    }
}
