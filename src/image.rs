use base64::{engine::general_purpose, Engine as _};
use std::path::Path;

/// 根据扩展名推断图片 MIME 类型
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

pub fn encode_bytes(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// 读取图片文件并编码为 data URI
pub fn encode_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(encode_bytes(&bytes, mime_for_path(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_mime_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.JPG");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(encode_file(&path).unwrap(), "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(mime_for_path(Path::new("scan.heic")), "application/octet-stream");
        assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = encode_file(Path::new("/definitely/not/here.png")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
