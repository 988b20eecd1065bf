/// Encoded still-image payload produced by one capture.
///
/// Deliberately not `Clone`: a payload belongs to the single request it was
/// captured for and is dropped once that request resolves.
#[derive(Debug, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    mime_type: &'static str,
}

impl CapturedImage {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32, mime_type: &'static str) -> Self {
        Self {
            bytes,
            width,
            height,
            mime_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raster width the payload was encoded at.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }
}
