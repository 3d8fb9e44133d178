//! Upload rules for Base64-encoded payloads: size limits, file and image
//! checks, content-type allow-lists and pixel dimensions.
//!
//! ```no_run
//! use b64rules::rules::Base64Validator;
//!
//! let validator = Base64Validator::default();
//! let avatar = "data:image/png;base64,iVBORw0KGgo...";
//! let ok = validator.base64_dimensions("avatar", avatar, &["max_width=512", "ratio=1"])?;
//! # Ok::<(), b64rules::error::RuleError>(())
//! ```

pub mod compare;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod payload;
pub mod probe;
pub mod rules;

pub use error::RuleError;
pub use payload::{InputValue, PayloadResolver, Resource};
pub use rules::{Base64Validator, RuleKind};

/// Logging setup and test fixtures
pub mod util {
    use tracing_subscriber::EnvFilter;

    /// Install a global `tracing` subscriber writing to stderr. `RUST_LOG`
    /// takes precedence over `default_filter`.
    pub fn init_tracing(default_filter: &str) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    #[cfg(test)]
    pub(crate) mod test {
        use base64::{engine::general_purpose, Engine as _};
        use image::{DynamicImage, ImageOutputFormat};
        use std::io::{Cursor, Write};
        use tempfile::NamedTempFile;

        pub const SVG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10"/></svg>"#;

        fn render(image: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
            let mut buffer = Vec::new();
            image
                .write_to(&mut Cursor::new(&mut buffer), format)
                .expect("Failed to create test image");
            buffer
        }

        pub fn png(width: u32, height: u32) -> Vec<u8> {
            render(DynamicImage::new_rgb8(width, height), ImageOutputFormat::Png)
        }

        pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
            render(DynamicImage::new_rgb8(width, height), ImageOutputFormat::Jpeg(80))
        }

        pub fn gif(width: u32, height: u32) -> Vec<u8> {
            render(DynamicImage::new_rgba8(width, height), ImageOutputFormat::Gif)
        }

        /// Random bytes that no sniffer mistakes for an image or text
        pub fn garbage(len: usize) -> Vec<u8> {
            let mut bytes: Vec<u8> = (0..len.max(2)).map(|_| rand::random()).collect();
            bytes[0] = 0xaa;
            bytes[1] = 0x00;
            bytes
        }

        pub fn encode(bytes: &[u8]) -> String {
            general_purpose::STANDARD.encode(bytes)
        }

        /// An already-saved upload
        pub fn file_with(bytes: &[u8]) -> NamedTempFile {
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(bytes).unwrap();
            file.flush().unwrap();
            file
        }
    }
}
