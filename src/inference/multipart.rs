//! `multipart/form-data` body encoding for dispatch requests.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Encoded form body with its boundary.
pub struct MultipartBody {
    pub boundary: String,
    pub bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

pub struct MultipartBuilder {
    boundary: String,
    bytes: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        Self::with_boundary(format!("----overlay-client-{}", suffix))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            bytes: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part();
        self.bytes.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.open_part();
        self.bytes.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                name,
                sanitize_file_name(file_name),
                content_type
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> MultipartBody {
        self.bytes
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        MultipartBody {
            boundary: self.boundary,
            bytes: self.bytes,
        }
    }

    fn open_part(&mut self) {
        self.bytes
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }
}

impl Default for MultipartBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\r' | '\n' | '\\' => '_',
            other => other,
        })
        .collect()
}
